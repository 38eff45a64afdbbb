//! Minimal JSON channel: a message, a severity and one raw JSON payload,
//! without HTTP, exception or SQL enrichment.

use serde_json::Value;
use std::sync::Arc;

use crate::logger::LoggerCore;
use crate::properties::PropertyValue;
use crate::record::LogRecord;
use crate::severity::Severity;

/// Property holding the payload.
pub const DATA_KEY: &str = "data";

#[must_use = "a log request does nothing until `write` is called"]
pub struct MinimalLogBuilder {
    core: Arc<LoggerCore>,
    message: Option<String>,
    json: Option<String>,
    severity: Option<Severity>,
}

impl MinimalLogBuilder {
    pub(crate) fn new(core: Arc<LoggerCore>) -> Self {
        Self {
            core,
            message: None,
            json: None,
            severity: None,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Payload; an empty string leaves the record without data.
    pub fn raw_json(mut self, json: &str) -> Self {
        if !json.is_empty() {
            self.json = Some(json.to_string());
        }
        self
    }

    /// `None` means Info.
    pub fn severity(mut self, severity: Option<Severity>) -> Self {
        self.severity = severity;
        self
    }

    pub fn into_record(self) -> LogRecord {
        let sanitizer = &self.core.sanitizer;
        let mut record = LogRecord::new(
            self.severity.unwrap_or(Severity::Info),
            self.message.as_deref().map(|m| sanitizer.sanitize(m)),
            self.core.machine_name.clone(),
        );
        if let Some(json) = &self.json {
            let data = match serde_json::from_str::<Value>(json) {
                Ok(parsed) => PropertyValue::from(parsed),
                Err(_) => PropertyValue::Text(json.clone()),
            };
            // A fresh map cannot collide.
            if let Err(e) = record.properties.set(sanitizer, DATA_KEY, data) {
                tracing::warn!(target: "fluent_log_sink::diagnostics", error = %e, "minimal log payload rejected");
            }
        }
        record
    }

    pub fn write(self) {
        let core = Arc::clone(&self.core);
        core.minimal.dispatch(self.into_record());
    }
}
