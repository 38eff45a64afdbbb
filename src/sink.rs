use crate::error::BoxError;
use crate::record::LogRecord;
use async_trait::async_trait;

/// Asynchronous destination for finished [`LogRecord`]s.
///
/// A [`Logger`](crate::logger::Logger) owns three sinks (events, metrics and
/// the minimal JSON channel), each driven by its own
/// [`Dispatcher`](crate::dispatch::Dispatcher) task. Application code never
/// awaits a sink directly.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Deliver a single record.
    ///
    /// **Parameters**
    /// - `record`: fully assembled and sanitized [`LogRecord`].
    ///
    /// **Returns**
    /// - `Ok(())` if the backend accepted the record.
    /// - `Err(..)` on transport or serialization failure. The dispatcher
    ///   reports the failure on the diagnostics target and drops the
    ///   record; delivery is at most once.
    async fn send(&self, record: &LogRecord) -> Result<(), BoxError>;

    /// Flush any buffered records, if the backend implements buffering.
    ///
    /// Default implementation is a no-op.
    async fn flush(&self) -> Result<(), BoxError> {
        Ok(())
    }
}
