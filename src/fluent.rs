//! Caller-facing log request builder.
//!
//! A [`FluentLogBuilder`] is created per log call by
//! [`Logger::message`](crate::logger::Logger::message) or
//! [`Logger::exception`](crate::logger::Logger::exception), accumulates the
//! caller's intent and is consumed by [`FluentLogBuilder::write`]. Each
//! accumulation method moves the builder through and hands it back, so a
//! builder cannot be used again once written.

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde_json::Value;
use std::sync::Arc;

use crate::config::{FluentLoggerOptions, WriteMode};
use crate::error::BuildError;
use crate::event_properties::EventPropertiesBuilder;
use crate::exception::{Exception, ExceptionInfo};
use crate::http::{ContextResult, HttpContext, HttpRequest, HttpResponse};
use crate::logger::LoggerCore;
use crate::properties::{Properties, PropertyValue};
use crate::record::LogRecord;
use crate::severity::Severity;

/// Message of the record written when property assembly fails.
pub const FALLBACK_MESSAGE: &str = "Error building log properties";

/// Fields beyond this count are ignored by [`FluentLogBuilder::data_object`].
pub const MAX_LOGGABLE_FIELDS: usize = 30;

const DIAGNOSTICS: &str = "fluent_log_sink::diagnostics";

/// Scalar accepted by [`FluentLogBuilder::data`].
///
/// Numeric types add a suffix to the key so that values of different kinds
/// logged under the same name never collide.
pub trait LogData {
    const KEY_SUFFIX: &'static str;

    fn into_value(self) -> Value;
}

impl LogData for &str {
    const KEY_SUFFIX: &'static str = "";

    fn into_value(self) -> Value {
        Value::String(self.to_string())
    }
}

impl LogData for String {
    const KEY_SUFFIX: &'static str = "";

    fn into_value(self) -> Value {
        Value::String(self)
    }
}

impl LogData for bool {
    const KEY_SUFFIX: &'static str = "";

    fn into_value(self) -> Value {
        Value::String(self.to_string())
    }
}

impl LogData for i32 {
    const KEY_SUFFIX: &'static str = "+Int32";

    fn into_value(self) -> Value {
        Value::from(self)
    }
}

impl LogData for i64 {
    const KEY_SUFFIX: &'static str = "+Int64";

    fn into_value(self) -> Value {
        Value::from(self)
    }
}

impl LogData for f64 {
    const KEY_SUFFIX: &'static str = "+Decimal";

    fn into_value(self) -> Value {
        Value::from(self)
    }
}

/// Flat field value of a [`LoggableFields`] type.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
    Date(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
    TimeSpan(chrono::Duration),
}

impl FieldValue {
    fn into_value(self) -> Value {
        match self {
            FieldValue::Str(s) => Value::String(s),
            FieldValue::Int(v) => Value::from(v),
            FieldValue::Long(v) => Value::from(v),
            FieldValue::Float(v) => Value::from(v),
            FieldValue::Double(v) => Value::from(v),
            FieldValue::Bool(v) => Value::String(v.to_string()),
            FieldValue::Date(v) => Value::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            FieldValue::DateTimeOffset(v) => Value::String(v.to_rfc3339()),
            FieldValue::TimeSpan(v) => Value::String(v.to_string()),
        }
    }
}

/// A value that can describe itself as flat key/value pairs.
///
/// Only the first [`MAX_LOGGABLE_FIELDS`] fields are logged.
pub trait LoggableFields {
    fn loggable_fields(&self) -> Vec<(&'static str, FieldValue)>;

    /// Key prefix used by [`FluentLogBuilder::data_of`], without the
    /// trailing `_`.
    fn type_name(&self) -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }
}

#[must_use = "a log request does nothing until `write` is called"]
pub struct FluentLogBuilder {
    core: Arc<LoggerCore>,
    message: Option<String>,
    severity: Option<Severity>,
    exception: Option<Exception>,
    sql: Option<String>,
    sql_parameters: Option<Vec<(String, Value)>>,
    data: Vec<(String, Value)>,
    tags: Vec<String>,
    context: HttpContext,
    omit_request_body: bool,
    options: FluentLoggerOptions,
}

impl FluentLogBuilder {
    pub(crate) fn new(core: Arc<LoggerCore>) -> Self {
        let options = core.config.options;
        Self {
            core,
            message: None,
            severity: None,
            exception: None,
            sql: None,
            sql_parameters: None,
            data: Vec::new(),
            tags: Vec::new(),
            context: HttpContext::default(),
            omit_request_body: false,
            options,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn fatal(self) -> Self {
        self.severity(Severity::Fatal)
    }

    pub fn error(self) -> Self {
        self.severity(Severity::Error)
    }

    pub fn warn(self) -> Self {
        self.severity(Severity::Warn)
    }

    pub fn info(self) -> Self {
        self.severity(Severity::Info)
    }

    pub fn debug(self) -> Self {
        self.severity(Severity::Debug)
    }

    pub fn exception(mut self, exception: Exception) -> Self {
        self.exception = Some(exception);
        self
    }

    /// Add a scalar under `name` plus the type's key suffix.
    pub fn data<V: LogData>(mut self, name: &str, value: V) -> Self {
        self.data
            .push((format!("{name}{}", V::KEY_SUFFIX), value.into_value()));
        self
    }

    /// Add an arbitrary JSON value under `name` as-is. String entries are
    /// still sanitized when the record is assembled.
    pub fn data_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.data.push((name.into(), value));
        self
    }

    /// Flatten `value` into `"{prefix}{field}"` keys.
    pub fn data_object<T: LoggableFields + ?Sized>(mut self, prefix: &str, value: &T) -> Self {
        for (field, v) in value.loggable_fields().into_iter().take(MAX_LOGGABLE_FIELDS) {
            self.data.push((format!("{prefix}{field}"), v.into_value()));
        }
        self
    }

    /// [`data_object`](Self::data_object) with a `"{TypeName}_"` prefix.
    pub fn data_of<T: LoggableFields>(self, value: &T) -> Self {
        let prefix = format!("{}_", value.type_name());
        self.data_object(&prefix, value)
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Attach the failing SQL statement and, optionally, its parameters.
    pub fn sql(mut self, sql: impl Into<String>, parameters: Option<Vec<(String, Value)>>) -> Self {
        self.sql = Some(sql.into());
        self.sql_parameters = parameters;
        self
    }

    /// Describe this request instead of the ambient one.
    pub fn request(mut self, request: Arc<dyn HttpRequest>) -> Self {
        self.context.request = Some(request);
        self
    }

    /// Describe this response instead of the ambient one.
    pub fn response(mut self, response: Arc<dyn HttpResponse>) -> Self {
        self.context.response = Some(response);
        self
    }

    pub fn omit_request_body(mut self) -> Self {
        self.omit_request_body = true;
        self
    }

    /// Replace the logger's truncation settings for this call.
    pub fn options(mut self, options: FluentLoggerOptions) -> Self {
        self.options.merge(options);
        self
    }

    fn resolved_severity(&self) -> Severity {
        self.severity.unwrap_or(if self.exception.is_some() {
            Severity::Error
        } else {
            Severity::Info
        })
    }

    /// Assemble the record and hand it to the event sink.
    ///
    /// Never fails and never blocks on delivery. In
    /// [`WriteMode::Background`] the ambient HTTP context is captured here
    /// and assembly moves to the runtime's blocking pool;
    /// [`Logger::flush`](crate::logger::Logger::flush) waits for it.
    pub fn write(self) {
        let ambient = self.core.context_provider.current();
        match self.core.config.write_mode {
            WriteMode::Inline => {
                let core = Arc::clone(&self.core);
                core.events.dispatch(self.assemble(ambient));
            }
            WriteMode::Background => {
                let core = Arc::clone(&self.core);
                let pending = core.pending.begin();
                core.runtime.spawn_blocking(move || {
                    let _pending = pending;
                    let events = self.core.events.clone();
                    events.dispatch(self.assemble(ambient));
                });
            }
        }
    }

    /// Assemble the record without sending it.
    pub fn into_record(self) -> LogRecord {
        let ambient = self.core.context_provider.current();
        self.assemble(ambient)
    }

    fn assemble(self, ambient: ContextResult<Option<HttpContext>>) -> LogRecord {
        match self.build_properties(ambient) {
            Ok(properties) => {
                let sanitizer = &self.core.sanitizer;
                let message = self
                    .message
                    .as_deref()
                    .or(self.exception.as_ref().map(|e| e.message.as_str()))
                    .map(|m| sanitizer.sanitize(m));
                LogRecord {
                    timestamp: chrono::Utc::now(),
                    severity: self.resolved_severity(),
                    message,
                    exception: self
                        .exception
                        .as_ref()
                        .map(|e| ExceptionInfo::new(e, sanitizer)),
                    properties,
                    machine_name: self.core.machine_name.clone(),
                }
            }
            Err(error) => {
                tracing::warn!(target: DIAGNOSTICS, error = %error, "log property assembly failed, writing fallback record");
                self.fallback_record(&error)
            }
        }
    }

    fn build_properties(&self, ambient: ContextResult<Option<HttpContext>>) -> Result<Properties, BuildError> {
        let core = &self.core;
        let mut builder = EventPropertiesBuilder::new(&core.sanitizer, &core.fingerprinter);
        builder
            .with_machine_name(&core.machine_name)?
            .with_sql_data(self.sql.as_deref(), self.sql_parameters.as_deref())?
            .with_exception(self.exception.as_ref())?
            .with_current_version(core.base_directory.as_deref())?
            .with_unique_origin(self.message.as_deref(), self.exception.as_ref())?
            .with_context(self.context.clone(), ambient)?
            .include_basic_request_info()?;
        if !self.omit_request_body {
            builder.include_request_body(self.options.truncate_request_body_to)?;
        }
        builder
            .include_response(self.options.truncate_response_body_to)?
            .with_tags(&self.tags)?
            .with_additional_data(&self.data)?;
        Ok(builder.build())
    }

    /// Minimal record preserving the caller's message and exception text.
    fn fallback_record(&self, error: &BuildError) -> LogRecord {
        let sanitizer = &self.core.sanitizer;
        let mut props = Properties::new();
        if let Some(exception) = &self.exception {
            props.replace(sanitizer, "Original.Exception.Message", exception.message.as_str());
            props.replace(sanitizer, "Original.Exception.StackTrace", exception.stack_trace_text());
        }
        if let Some(message) = self.message.as_deref().filter(|m| !m.is_empty()) {
            props.replace(sanitizer, "Original.Message", message);
        }

        let mut build_failure = Exception::new(std::any::type_name::<BuildError>(), error.to_string());
        build_failure.data = error.diagnostic_data();
        match PropertyValue::structured(&ExceptionInfo::new(&build_failure, sanitizer)) {
            Ok(info) => props.replace(sanitizer, "Exception", info),
            Err(_) => props.replace(sanitizer, "Exception.Message", error.to_string()),
        }
        props.replace(sanitizer, "MachineName", self.core.machine_name.as_str());

        let mut record = LogRecord::new(
            Severity::Error,
            Some(FALLBACK_MESSAGE.to_string()),
            self.core.machine_name.clone(),
        );
        record.properties = props;
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quote {
        id: i64,
        title: String,
        expedited: bool,
    }

    impl LoggableFields for Quote {
        fn loggable_fields(&self) -> Vec<(&'static str, FieldValue)> {
            vec![
                ("Id", FieldValue::Long(self.id)),
                ("Title", FieldValue::Str(self.title.clone())),
                ("Expedited", FieldValue::Bool(self.expedited)),
            ]
        }
    }

    struct Wide;

    impl LoggableFields for Wide {
        fn loggable_fields(&self) -> Vec<(&'static str, FieldValue)> {
            const NAMES: [&str; 40] = [
                "F00", "F01", "F02", "F03", "F04", "F05", "F06", "F07", "F08", "F09", "F10", "F11",
                "F12", "F13", "F14", "F15", "F16", "F17", "F18", "F19", "F20", "F21", "F22", "F23",
                "F24", "F25", "F26", "F27", "F28", "F29", "F30", "F31", "F32", "F33", "F34", "F35",
                "F36", "F37", "F38", "F39",
            ];
            NAMES.iter().map(|n| (*n, FieldValue::Int(1))).collect()
        }
    }

    #[test]
    fn type_name_is_the_last_path_segment() {
        let quote = Quote { id: 1, title: String::new(), expedited: false };
        assert_eq!(quote.type_name(), "Quote");
    }

    #[test]
    fn field_values_render_as_json() {
        assert_eq!(FieldValue::Bool(true).into_value(), Value::from("true"));
        assert_eq!(FieldValue::Int(3).into_value(), Value::from(3));
        let date = chrono::NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        assert_eq!(FieldValue::Date(date).into_value(), Value::from("2024-05-01T08:30:00"));
        assert_eq!(
            FieldValue::TimeSpan(chrono::Duration::seconds(90)).into_value(),
            Value::from("PT90S")
        );
    }

    #[tokio::test]
    async fn wide_objects_are_capped() {
        let logger = crate::logger::Logger::builder().build().unwrap();
        let record = logger
            .message("wide")
            .data_object("", &Wide)
            .data_of(&Wide)
            .into_record();

        let props = &record.properties;
        assert_eq!(props.keys().filter(|k| k.starts_with('F')).count(), MAX_LOGGABLE_FIELDS);
        assert_eq!(props.keys().filter(|k| k.starts_with("Wide_F")).count(), MAX_LOGGABLE_FIELDS);
        assert!(props.contains_key("F29"));
        assert!(!props.contains_key("F30"));
        assert!(!props.contains_key("Wide_F30"));
    }

    #[test]
    fn quote_fields_are_flat() {
        let quote = Quote { id: 9, title: "Piano".into(), expedited: true };
        let fields = quote.loggable_fields();
        assert_eq!(fields[0], ("Id", FieldValue::Long(9)));
        assert_eq!(fields[2].1.clone().into_value(), Value::from("true"));
    }
}
