pub mod reference;
pub mod resolver;

pub use reference::extract_id;
pub use resolver::{CrawlSummary, EntityResolver};
