//! Assembly of the structured property map of one log record.
//!
//! Steps run in a fixed order; each one only adds keys, so a key written
//! twice is reported as [`BuildError::Collision`]. Values derived from the
//! HTTP context go through [`Properties::safe_set`] and never abort the build.

use serde_json::{Map, Value};
use std::path::{Component, Path};
use std::sync::Arc;

use crate::error::BuildError;
use crate::exception::{Exception, ExceptionInfo};
use crate::http::{
    calling_ip, peek_stream, to_query, ContextResult, HttpContext, HttpRequest, HttpResponse,
};
use crate::origin::{LogType, OriginFingerprinter};
use crate::properties::{Properties, PropertyValue};
use crate::sanitize::{clean_query_string, Sanitizer};

/// Appended to a body cut at its configured maximum length.
pub const TRUNCATION_MARKER: &str = "  #truncated#";

/// Caller data key mirrored into [`PARAMETERS_KEY`].
pub const ADDITIONAL_INFO_KEY: &str = "AdditionalInfo";
pub const PARAMETERS_KEY: &str = "Parameters";

/// Stored when the ambient HTTP context exists but cannot be read.
pub const UNREADABLE_REQUEST: &str = "Unable to read request instance";

pub struct EventPropertiesBuilder<'a> {
    props: Properties,
    sanitizer: &'a Sanitizer,
    fingerprinter: &'a OriginFingerprinter,
    log_type: Option<LogType>,
    sql: Option<String>,
    request: Option<Arc<dyn HttpRequest>>,
    response: Option<Arc<dyn HttpResponse>>,
}

impl<'a> EventPropertiesBuilder<'a> {
    pub fn new(sanitizer: &'a Sanitizer, fingerprinter: &'a OriginFingerprinter) -> Self {
        Self {
            props: Properties::new(),
            sanitizer,
            fingerprinter,
            log_type: None,
            sql: None,
            request: None,
            response: None,
        }
    }

    fn set(&mut self, key: &str, value: impl Into<PropertyValue>) -> Result<&mut Self, BuildError> {
        self.props.set(self.sanitizer, key, value)?;
        Ok(self)
    }

    fn safe_set<F>(&mut self, key: &str, getter: F) -> Result<&mut Self, BuildError>
    where
        F: FnOnce() -> ContextResult<PropertyValue>,
    {
        self.props.safe_set(self.sanitizer, key, getter)?;
        Ok(self)
    }

    pub fn with_machine_name(&mut self, machine_name: &str) -> Result<&mut Self, BuildError> {
        self.set("MachineName", machine_name)
    }

    /// `Sql` when the statement is non-empty; `SqlParameters` whenever
    /// parameters are given, each value stringified (`null` as `"null"`).
    pub fn with_sql_data(
        &mut self,
        sql: Option<&str>,
        parameters: Option<&[(String, Value)]>,
    ) -> Result<&mut Self, BuildError> {
        if let Some(sql) = sql.filter(|s| !s.is_empty()) {
            self.sql = Some(sql.to_string());
            self.set("Sql", sql)?;
        }
        if let Some(parameters) = parameters {
            let map: Map<String, Value> = parameters
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(stringify(v))))
                .collect();
            self.set("SqlParameters", map)?;
        }
        Ok(self)
    }

    /// `LogType` always; `Exception` (plus `ExceptionMessage` / `ErrorCode`
    /// for HTTP-layer failures) when an exception is present.
    pub fn with_exception(&mut self, exception: Option<&Exception>) -> Result<&mut Self, BuildError> {
        let log_type = LogType::resolve(exception.is_some(), self.sql.as_deref());
        self.log_type = Some(log_type);
        self.set("LogType", log_type.as_str())?;

        if let Some(exception) = exception {
            let info = ExceptionInfo::new(exception, self.sanitizer);
            self.set("Exception", PropertyValue::structured(&info)?)?;
            if let Some(code) = exception.http_error_code {
                self.set("ExceptionMessage", exception.message.as_str())?;
                self.set("ErrorCode", code)?;
            }
        }
        Ok(self)
    }

    /// `DeployVersion`: first integer-parseable segment of `base_directory`.
    pub fn with_current_version(&mut self, base_directory: Option<&Path>) -> Result<&mut Self, BuildError> {
        if let Some(version) = base_directory.and_then(deploy_version) {
            self.set("DeployVersion", version)?;
        }
        Ok(self)
    }

    pub fn with_unique_origin(
        &mut self,
        message: Option<&str>,
        exception: Option<&Exception>,
    ) -> Result<&mut Self, BuildError> {
        let log_type = self
            .log_type
            .unwrap_or_else(|| LogType::resolve(exception.is_some(), self.sql.as_deref()));
        let origin = self
            .fingerprinter
            .compute(log_type, message, exception, self.sql.as_deref());
        self.set("Origin", origin)
    }

    /// Pick the request/response to describe. Explicit halves win over the
    /// ambient context; an unreadable ambient context is recorded under
    /// `HttpRequest` and leaves only the explicit halves.
    pub fn with_context(
        &mut self,
        explicit: HttpContext,
        ambient: ContextResult<Option<HttpContext>>,
    ) -> Result<&mut Self, BuildError> {
        let ambient = match ambient {
            Ok(ctx) => ctx.unwrap_or_default(),
            Err(e) => {
                tracing::debug!(target: "fluent_log_sink::diagnostics", error = %e, "ambient http context unreadable");
                self.set("HttpRequest", UNREADABLE_REQUEST)?;
                HttpContext::default()
            }
        };
        self.request = explicit.request.or(ambient.request);
        self.response = explicit.response.or(ambient.response);
        Ok(self)
    }

    pub fn include_basic_request_info(&mut self) -> Result<&mut Self, BuildError> {
        let Some(request) = self.request.clone() else {
            return Ok(self);
        };
        let req = request.as_ref();
        self.safe_set("Url", || Ok(clean_query_string(&req.url()?).into()))?
            .safe_set("UserAgent", || Ok(req.user_agent()?.unwrap_or_default().into()))?
            .safe_set("IPAddress", || Ok(calling_ip(req)?.into()))?
            .safe_set("RequestMethod", || Ok(req.method()?.into()))?
            .safe_set("RequestHeaders", || Ok(to_query(&req.headers()?).into()))?
            .safe_set("Referrer", || {
                Ok(clean_query_string(&req.referrer()?.unwrap_or_default()).into())
            })?
            .safe_set("RawUrl", || Ok(req.raw_url()?.into()))?
            .safe_set("QueryString", || Ok(clean_query_string(&req.query_string()?).into()))?
            .safe_set("Server", || Ok(req.local_addr()?.unwrap_or_default().into()))
    }

    /// `RequestBody`: form fields if any, else the peeked raw body;
    /// sanitized, view state removed, then truncated to `max_length`.
    pub fn include_request_body(&mut self, max_length: Option<i64>) -> Result<&mut Self, BuildError> {
        let Some(request) = self.request.clone() else {
            return Ok(self);
        };
        let limit = checked_limit("truncate_request_body_to", max_length)?;
        let sanitizer = self.sanitizer;
        self.safe_set("RequestBody", || {
            let form = request.form()?;
            let content = if !form.is_empty() {
                to_query(&form)
            } else {
                match request.body()? {
                    Some(stream) => peek_stream(&stream)?,
                    None => String::new(),
                }
            };
            Ok(finished_body(sanitizer, &content, limit))
        })
    }

    /// `StatusCode`, `ResponseBody` (when the output stream is readable)
    /// and `ResponseHeaders`.
    pub fn include_response(&mut self, max_length: Option<i64>) -> Result<&mut Self, BuildError> {
        let Some(response) = self.response.clone() else {
            return Ok(self);
        };
        let limit = checked_limit("truncate_response_body_to", max_length)?;
        let sanitizer = self.sanitizer;

        self.set("StatusCode", response.status_code())?;
        match response.output_stream() {
            Ok(None) => {}
            Ok(Some(stream)) => {
                self.safe_set("ResponseBody", || {
                    Ok(finished_body(sanitizer, &peek_stream(&stream)?, limit))
                })?;
            }
            Err(e) => {
                self.safe_set("ResponseBody", || Err(e))?;
            }
        }
        self.safe_set("ResponseHeaders", || Ok(to_query(&response.headers()?).into()))
    }

    pub fn with_tags(&mut self, tags: &[String]) -> Result<&mut Self, BuildError> {
        if tags.is_empty() {
            return Ok(self);
        }
        self.set("Tags", tags.to_vec())
    }

    /// Caller data; `AdditionalInfo` is stored under `Parameters` as well.
    pub fn with_additional_data(&mut self, data: &[(String, Value)]) -> Result<&mut Self, BuildError> {
        if let Some((_, info)) = data.iter().find(|(k, _)| k == ADDITIONAL_INFO_KEY) {
            self.set(PARAMETERS_KEY, info.clone())?;
        }
        for (key, value) in data {
            self.set(key, value.clone())?;
        }
        Ok(self)
    }

    pub fn build(self) -> Properties {
        self.props
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn deploy_version(base_directory: &Path) -> Option<String> {
    base_directory.components().find_map(|c| match c {
        Component::Normal(segment) => segment
            .to_str()
            .filter(|s| s.parse::<i32>().is_ok())
            .map(str::to_string),
        _ => None,
    })
}

fn checked_limit(field: &'static str, max_length: Option<i64>) -> Result<Option<usize>, BuildError> {
    match max_length {
        None => Ok(None),
        Some(length) if length < 0 => Err(BuildError::NegativeTruncation { field, length }),
        Some(length) => Ok(Some(usize::try_from(length).unwrap_or(usize::MAX))),
    }
}

/// Sanitized, view-state-free and truncated body. Stored as a finished
/// value so the truncation marker survives.
fn finished_body(sanitizer: &Sanitizer, content: &str, limit: Option<usize>) -> PropertyValue {
    let clean = sanitizer.sanitize_property(content);
    PropertyValue::Structured(Value::String(truncate(clean, limit)))
}

/// Cut `text` to `limit` characters and append [`TRUNCATION_MARKER`].
pub fn truncate(text: String, limit: Option<usize>) -> String {
    match limit {
        Some(limit) if text.chars().count() > limit => {
            let mut cut: String = text.chars().take(limit).collect();
            cut.push_str(TRUNCATION_MARKER);
            cut
        }
        _ => text,
    }
}
