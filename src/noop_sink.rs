use crate::error::BoxError;
use crate::record::LogRecord;
use crate::sink::LogSink;
use async_trait::async_trait;

/// A sink that simply drops all records.
///
/// Default for every sink slot the [`LoggerBuilder`](crate::logger::LoggerBuilder)
/// is not given, and handy for measuring assembly overhead without I/O.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

#[async_trait]
impl LogSink for NoopSink {
    async fn send(&self, _record: &LogRecord) -> Result<(), BoxError> {
        Ok(())
    }
}
