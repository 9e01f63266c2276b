pub mod aggregate;
pub mod snapshot;
pub mod trigger;

pub use aggregate::{StatsAggregator, compute, compute_file};
pub use snapshot::SnapshotStore;
pub use trigger::{RecomputeTrigger, TriggerOutcome};
