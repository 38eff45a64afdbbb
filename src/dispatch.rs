use crate::config::DispatchConfig;
use crate::record::LogRecord;
use crate::sink::LogSink;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

const DIAGNOSTICS: &str = "fluent_log_sink::diagnostics";

enum Command {
    Record(LogRecord),
    Flush(oneshot::Sender<()>),
}

/// Delivery counters of one [`Dispatcher`].
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Records offered to the dispatcher.
    pub total: AtomicU64,
    /// Successfully enqueued into the channel.
    pub enqueued: AtomicU64,
    /// Dropped because the channel was full or closed.
    pub dropped: AtomicU64,
    /// Rejected by the sink.
    pub failed: AtomicU64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.total.load(Ordering::Relaxed),
            self.enqueued.load(Ordering::Relaxed),
            self.dropped.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
        )
    }
}

/// Hands [`LogRecord`]s to a [`LogSink`] from a background task.
///
/// Callers never wait on the sink: records go through a bounded channel
/// and are dropped when it is full. The background task batches records
/// and sends them in order. A record the sink rejects is reported on the
/// diagnostics target and not retried.
#[derive(Clone)]
pub struct Dispatcher {
    name: &'static str,
    sender: mpsc::Sender<Command>,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    /// Spawn the delivery task for `sink` on `runtime`.
    ///
    /// Minimal thresholds are enforced for the buffer, batch size and
    /// flush interval to avoid degenerate configurations.
    pub fn spawn(
        name: &'static str,
        sink: Arc<dyn LogSink>,
        config: &DispatchConfig,
        runtime: &Handle,
    ) -> (Self, JoinHandle<()>) {
        let buffer = config.channel_buffer.max(16);
        let batch_size = config.batch_size.max(1);
        let flush_interval = config.flush_interval.max(Duration::from_millis(10));

        let (tx, rx) = mpsc::channel::<Command>(buffer);
        let stats = Arc::new(DispatchStats::default());

        let handle = runtime.spawn(run(name, sink, rx, batch_size, flush_interval, Arc::clone(&stats)));

        (
            Self {
                name,
                sender: tx,
                stats,
            },
            handle,
        )
    }

    /// Enqueue `record` without waiting.
    pub fn dispatch(&self, record: LogRecord) {
        self.stats.total.fetch_add(1, Ordering::Relaxed);
        match self.sender.try_send(Command::Record(record)) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(target: DIAGNOSTICS, sink = self.name, "log channel full, dropping log record");
            }
        }
    }

    /// Wait until every record enqueued before this call was handed to the
    /// sink and the sink was flushed.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(Command::Flush(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }
}

async fn run(
    name: &'static str,
    sink: Arc<dyn LogSink>,
    mut rx: mpsc::Receiver<Command>,
    batch_size: usize,
    flush_interval: Duration,
    stats: Arc<DispatchStats>,
) {
    let mut batch: Vec<LogRecord> = Vec::with_capacity(batch_size);

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Record(record)) => {
                    batch.push(record);
                    if batch.len() >= batch_size {
                        send_batch(name, &*sink, &mut batch, &stats).await;
                    }
                }
                Some(Command::Flush(done)) => {
                    send_batch(name, &*sink, &mut batch, &stats).await;
                    if let Err(e) = sink.flush().await {
                        tracing::warn!(target: DIAGNOSTICS, sink = name, error = %e, "log sink flush failed");
                    }
                    let _ = done.send(());
                }
                None => {
                    send_batch(name, &*sink, &mut batch, &stats).await;
                    break;
                }
            },
            _ = sleep(flush_interval) => {
                if !batch.is_empty() {
                    send_batch(name, &*sink, &mut batch, &stats).await;
                }
            }
        }
    }
}

/// Send every record of `batch` once, in order, then clear it.
async fn send_batch(name: &str, sink: &dyn LogSink, batch: &mut Vec<LogRecord>, stats: &DispatchStats) {
    for record in batch.drain(..) {
        if let Err(e) = sink.send(&record).await {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(target: DIAGNOSTICS, sink = name, error = %e, "log sink send failed, record dropped");
        }
    }
}
