use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::exception::ExceptionInfo;
use crate::properties::Properties;
use crate::severity::Severity;

/// A finished log record, handed to a [`LogSink`](crate::sink::LogSink)
/// exactly once.
///
/// Metric records carry the formatted stat line as `message` and no
/// properties.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: Option<String>,
    pub exception: Option<ExceptionInfo>,
    pub properties: Properties,
    pub machine_name: String,
}

impl LogRecord {
    pub fn new(severity: Severity, message: Option<String>, machine_name: impl Into<String>) -> Self {
        LogRecord {
            timestamp: Utc::now(),
            severity,
            message,
            exception: None,
            properties: Properties::new(),
            machine_name: machine_name.into(),
        }
    }

    /// Record message, or `""` when there is none.
    pub fn message_or_empty(&self) -> &str {
        self.message.as_deref().unwrap_or("")
    }
}
