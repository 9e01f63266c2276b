pub mod error;
pub mod server;

pub mod handlers {
    pub mod health;
    pub mod proxy;
    pub mod stats;
}

pub use error::ApiError;
pub use server::{ApiState, build_router, start};
