use std::sync::Arc;
use swapi_core::config::QueryLogConfig;
use swapi_core::model::LogEntry;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::file_writer::LogFileWriter;
use crate::metrics::ProxyMetrics;

enum Command {
    Append(LogEntry),
    Flush(oneshot::Sender<()>),
}

/// Query logger. A true no-op when disabled.
///
/// `append` never blocks the request path and never fails. Entries are handed
/// to a background task over an unbounded channel, so a burst queues up in
/// memory instead of being discarded. The task drains the channel in batches
/// and writes each batch through [`LogFileWriter`] on the blocking pool. Only
/// file I/O failures lose entries, and those are counted as `write_failed`.
pub struct QueryLogger {
    sender: Option<mpsc::UnboundedSender<Command>>,
    metrics: Arc<ProxyMetrics>,
}

impl QueryLogger {
    /// Must be called from within a tokio runtime when `config.enabled`.
    pub fn new(config: &QueryLogConfig, metrics: Arc<ProxyMetrics>) -> Self {
        if !config.enabled {
            return Self::disabled();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let writer = Arc::new(LogFileWriter::new(config.path.clone()));
        tokio::spawn(Self::write_loop(
            writer,
            rx,
            config.batch_size.max(1),
            Arc::clone(&metrics),
        ));
        Self {
            sender: Some(tx),
            metrics,
        }
    }

    /// No-op constructor for disabled logging.
    pub fn disabled() -> Self {
        Self {
            sender: None,
            metrics: Arc::new(ProxyMetrics::disabled()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    /// Queue one entry for appending. Always returns immediately.
    #[inline]
    pub fn append(&self, entry: LogEntry) {
        let Some(ref sender) = self.sender else {
            return;
        };
        if sender.send(Command::Append(entry)).is_err() {
            debug!("Query log writer has stopped, entry dropped");
            self.metrics.record_query_log("dropped", 1);
        }
    }

    /// Wait until every entry queued before this call has been handed to the
    /// file writer.
    pub async fn flush(&self) {
        let Some(ref sender) = self.sender else {
            return;
        };
        let (tx, rx) = oneshot::channel();
        if sender.send(Command::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    async fn write_loop(
        writer: Arc<LogFileWriter>,
        mut rx: mpsc::UnboundedReceiver<Command>,
        batch_size: usize,
        metrics: Arc<ProxyMetrics>,
    ) {
        let mut batch: Vec<String> = Vec::with_capacity(batch_size);
        let mut waiters: Vec<oneshot::Sender<()>> = Vec::new();

        while let Some(command) = rx.recv().await {
            let mut next = Some(command);
            while let Some(command) = next.take() {
                match command {
                    Command::Append(entry) => batch.push(entry.to_json_line()),
                    Command::Flush(waiter) => waiters.push(waiter),
                }
                if batch.len() < batch_size {
                    next = rx.try_recv().ok();
                }
            }

            Self::write_batch(&writer, &mut batch, &metrics).await;
            for waiter in waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }

    async fn write_batch(writer: &Arc<LogFileWriter>, batch: &mut Vec<String>, metrics: &ProxyMetrics) {
        if batch.is_empty() {
            return;
        }
        let lines = std::mem::take(batch);
        let count = lines.len() as u64;
        let writer = Arc::clone(writer);
        let written = tokio::task::spawn_blocking(move || writer.append_best_effort(&lines))
            .await
            .unwrap_or(false);
        metrics.record_query_log(if written { "written" } else { "write_failed" }, count);
    }
}
