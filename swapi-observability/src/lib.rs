pub mod file_writer;
pub mod metrics;
pub mod query_log;

pub use file_writer::LogFileWriter;
pub use metrics::ProxyMetrics;
pub use query_log::QueryLogger;
