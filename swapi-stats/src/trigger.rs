//! Recompute trigger.
//!
//! A single worker task owns aggregation. Requests reach it over an `mpsc`
//! channel of capacity one: while a run is in progress at most one further run
//! can be pending, and any request arriving while one is already pending
//! coalesces into it. Every request is therefore followed by at least one run
//! that starts after it, and runs never overlap.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::aggregate::StatsAggregator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A new run was queued.
    Queued,
    /// A run was already pending and will cover this request.
    Coalesced,
    /// The worker has stopped.
    Closed,
}

struct Recompute;

#[derive(Clone)]
pub struct RecomputeTrigger {
    sender: mpsc::Sender<Recompute>,
    completed: watch::Receiver<u64>,
}

impl RecomputeTrigger {
    /// Start the aggregation worker. Must be called from within a tokio runtime.
    pub fn spawn(aggregator: Arc<StatsAggregator>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(1);
        let (done_tx, done_rx) = watch::channel(0u64);
        let handle = tokio::spawn(Self::worker(aggregator, rx, done_tx));
        (
            Self {
                sender: tx,
                completed: done_rx,
            },
            handle,
        )
    }

    /// Request a recompute. Never blocks.
    pub fn trigger(&self) -> TriggerOutcome {
        match self.sender.try_send(Recompute) {
            Ok(()) => TriggerOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => TriggerOutcome::Coalesced,
            Err(mpsc::error::TrySendError::Closed(_)) => TriggerOutcome::Closed,
        }
    }

    /// Trigger on a fixed interval. The first tick fires immediately.
    pub fn spawn_schedule(&self, every: Duration) -> JoinHandle<()> {
        let trigger = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match trigger.trigger() {
                    TriggerOutcome::Closed => break,
                    outcome => debug!(?outcome, "Scheduled recompute"),
                }
            }
        })
    }

    /// Receiver of the number of completed runs.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.completed.clone()
    }

    pub fn completed_runs(&self) -> u64 {
        *self.completed.borrow()
    }

    async fn worker(
        aggregator: Arc<StatsAggregator>,
        mut rx: mpsc::Receiver<Recompute>,
        done: watch::Sender<u64>,
    ) {
        let mut runs = 0u64;
        while rx.recv().await.is_some() {
            let job = Arc::clone(&aggregator);
            match tokio::task::spawn_blocking(move || job.run()).await {
                Ok(snapshot) => debug!(total_requests = snapshot.total_requests, "Recompute finished"),
                Err(e) => error!(error = %e, "Recompute task failed"),
            }
            runs += 1;
            done.send_replace(runs);
        }
        info!(runs, "Recompute worker stopped");
    }
}
