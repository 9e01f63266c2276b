pub mod config;
pub mod error;
pub mod model;
pub mod upstream;

pub use config::AppConfig;
pub use error::SwapiError;
pub use model::{Endpoint, Kind, LogEntry, ResolvedRef, StatsSnapshot, TopQuery};
pub use upstream::{ListingEntry, ListingPage, UpstreamClient};
