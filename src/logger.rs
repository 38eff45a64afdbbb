use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Notify;

use crate::config::{DispatchConfig, LoggingConfig};
use crate::dispatch::{DispatchStats, Dispatcher};
use crate::env::hostname;
use crate::error::SetupError;
use crate::exception::Exception;
use crate::fluent::FluentLogBuilder;
use crate::http::{HttpContextProvider, NoHttpContext};
use crate::metrics::{Metric, MetricKey};
use crate::minimal::MinimalLogBuilder;
use crate::noop_sink::NoopSink;
use crate::origin::OriginFingerprinter;
use crate::record::LogRecord;
use crate::sanitize::Sanitizer;
use crate::severity::Severity;
use crate::sink::LogSink;

/// Shared, read-only state behind every [`Logger`] clone.
pub(crate) struct LoggerCore {
    pub(crate) config: LoggingConfig,
    pub(crate) sanitizer: Sanitizer,
    pub(crate) fingerprinter: OriginFingerprinter,
    pub(crate) context_provider: Arc<dyn HttpContextProvider>,
    pub(crate) events: Dispatcher,
    pub(crate) metrics: Dispatcher,
    pub(crate) minimal: Dispatcher,
    pub(crate) runtime: Handle,
    pub(crate) pending: Arc<PendingWrites>,
    pub(crate) machine_name: String,
    pub(crate) base_directory: Option<PathBuf>,
}

/// Background assemblies that have not reached their dispatcher yet.
#[derive(Debug, Default)]
pub(crate) struct PendingWrites {
    count: AtomicUsize,
    idle: Notify,
}

impl PendingWrites {
    pub(crate) fn begin(self: &Arc<Self>) -> PendingWrite {
        self.count.fetch_add(1, Ordering::SeqCst);
        PendingWrite(Arc::clone(self))
    }

    pub(crate) fn len(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    async fn wait_idle(&self) {
        loop {
            let idle = self.idle.notified();
            if self.len() == 0 {
                return;
            }
            idle.await;
        }
    }
}

/// Marks one background assembly as running until dropped.
pub(crate) struct PendingWrite(Arc<PendingWrites>);

impl Drop for PendingWrite {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Entry point of the logging facade.
///
/// Cheap to clone; every clone writes through the same sinks. Log calls
/// never return errors and never wait for delivery.
///
/// ```no_run
/// # async fn demo() -> Result<(), fluent_log_sink::error::SetupError> {
/// use fluent_log_sink::logger::Logger;
///
/// let logger = Logger::builder().build()?;
/// logger.message("Hello, World!").data("attempt", 2).write();
/// logger.flush().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Logger {
    core: Arc<LoggerCore>,
}

impl Logger {
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::default()
    }

    /// Start a log request with a message.
    pub fn message(&self, message: impl Into<String>) -> FluentLogBuilder {
        FluentLogBuilder::new(Arc::clone(&self.core)).message(message)
    }

    /// Start a log request for a failure.
    pub fn exception(&self, exception: Exception) -> FluentLogBuilder {
        FluentLogBuilder::new(Arc::clone(&self.core)).exception(exception)
    }

    /// Send a stat line to the metrics sink.
    pub fn write_metric(&self, metric: &Metric) {
        let line = self.core.config.metrics.line(metric, &self.core.machine_name);
        self.core
            .metrics
            .dispatch(LogRecord::new(Severity::Info, Some(line), self.core.machine_name.clone()));
    }

    /// One occurrence of `key`, optionally refined by `sub_key`.
    pub fn write_count(&self, key: impl MetricKey, sub_key: Option<&str>) {
        let mut metric = Metric::count(key);
        if let Some(sub_key) = sub_key {
            metric = metric.sub_key(sub_key);
        }
        self.write_metric(&metric);
    }

    /// `value` occurrences of `key` at once.
    pub fn write_counter(&self, key: impl MetricKey, sub_key: Option<&str>, value: i64) {
        let mut metric = Metric::counter(key, value);
        if let Some(sub_key) = sub_key {
            metric = metric.sub_key(sub_key);
        }
        self.write_metric(&metric);
    }

    /// Elapsed time of `key` in milliseconds.
    pub fn write_timer(&self, key: impl MetricKey, sub_key: Option<&str>, milliseconds: i64) {
        let mut metric = Metric::timer(key, milliseconds);
        if let Some(sub_key) = sub_key {
            metric = metric.sub_key(sub_key);
        }
        self.write_metric(&metric);
    }

    /// Start a record for the minimal JSON channel.
    pub fn minimal(&self) -> MinimalLogBuilder {
        MinimalLogBuilder::new(Arc::clone(&self.core))
    }

    /// Send `json` to the minimal channel under the configured message.
    pub fn write_minimal_data_log(&self, json: &str, severity: Option<Severity>) {
        self.minimal()
            .message(self.core.config.minimal_data_log_message.clone())
            .severity(severity)
            .raw_json(json)
            .write();
    }

    /// Wait until every record written so far was handed to its sink,
    /// including records still being assembled in the background.
    pub async fn flush(&self) {
        self.core.pending.wait_idle().await;
        self.core.events.flush().await;
        self.core.metrics.flush().await;
        self.core.minimal.flush().await;
    }

    pub fn config(&self) -> &LoggingConfig {
        &self.core.config
    }

    pub fn sanitizer(&self) -> &Sanitizer {
        &self.core.sanitizer
    }

    pub fn machine_name(&self) -> &str {
        &self.core.machine_name
    }

    pub fn event_stats(&self) -> &DispatchStats {
        self.core.events.stats()
    }
}

/// Builder for [`Logger`]. Unset sinks drop their records.
pub struct LoggerBuilder {
    config: LoggingConfig,
    event_sink: Arc<dyn LogSink>,
    metrics_sink: Arc<dyn LogSink>,
    minimal_sink: Arc<dyn LogSink>,
    context_provider: Arc<dyn HttpContextProvider>,
    dispatch: DispatchConfig,
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        Self {
            config: LoggingConfig::default(),
            event_sink: Arc::new(NoopSink),
            metrics_sink: Arc::new(NoopSink),
            minimal_sink: Arc::new(NoopSink),
            context_provider: Arc::new(NoHttpContext),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl LoggerBuilder {
    pub fn config(mut self, config: LoggingConfig) -> Self {
        self.config = config;
        self
    }

    /// Structured event stream.
    pub fn event_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Stat lines.
    pub fn metrics_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.metrics_sink = sink;
        self
    }

    /// Minimal JSON channel.
    pub fn minimal_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.minimal_sink = sink;
        self
    }

    pub fn context_provider(mut self, provider: Arc<dyn HttpContextProvider>) -> Self {
        self.context_provider = provider;
        self
    }

    pub fn dispatch_config(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Build on the current tokio runtime.
    pub fn build(self) -> Result<Logger, SetupError> {
        let runtime = Handle::try_current().map_err(|_| SetupError::NoRuntime)?;
        self.build_on(&runtime)
    }

    /// Build with delivery tasks spawned on `runtime`.
    pub fn build_on(self, runtime: &Handle) -> Result<Logger, SetupError> {
        let sanitizer = Sanitizer::new(&self.config.sanitizer)?;
        let fingerprinter = OriginFingerprinter::new(&self.config.origin);
        let machine_name = self.config.machine_name.clone().unwrap_or_else(hostname);
        let base_directory = self.config.base_directory.clone().or_else(|| {
            std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(PathBuf::from))
        });

        let (events, _) = Dispatcher::spawn("events", self.event_sink, &self.dispatch, runtime);
        let (metrics, _) = Dispatcher::spawn("metrics", self.metrics_sink, &self.dispatch, runtime);
        let (minimal, _) = Dispatcher::spawn("minimal", self.minimal_sink, &self.dispatch, runtime);

        tracing::debug!(
            target: "fluent_log_sink::diagnostics",
            machine_name = %machine_name,
            write_mode = ?self.config.write_mode,
            "logger initialized"
        );

        Ok(Logger {
            core: Arc::new(LoggerCore {
                config: self.config,
                sanitizer,
                fingerprinter,
                context_provider: self.context_provider,
                events,
                metrics,
                minimal,
                runtime: runtime.clone(),
                pending: Arc::new(PendingWrites::default()),
                machine_name,
                base_directory,
            }),
        })
    }
}
