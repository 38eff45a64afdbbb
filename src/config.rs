use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::time::Duration;

use crate::env::{
    env_opt, FLUENT_LOG_BASE_DIRECTORY_ENV, FLUENT_LOG_MACHINE_NAME_ENV,
    FLUENT_LOG_METRICS_ENVIRONMENT_ENV, FLUENT_LOG_METRICS_SOURCE_ENV, FLUENT_LOG_METRIC_PATH_ENV,
};
use crate::error::SetupError;

/// Complete, immutable logger configuration.
///
/// Built once per process (explicitly, from JSON, or from defaults plus
/// environment overrides) and injected into the [`Logger`](crate::logger::Logger);
/// nothing in the crate reads ambient global configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub sanitizer: SanitizerRules,
    pub origin: OriginConfig,
    pub metrics: MetricsConfig,
    pub options: FluentLoggerOptions,
    /// Machine identity; the host name when unset.
    pub machine_name: Option<String>,
    /// Directory scanned for the deploy version; the executable's directory
    /// when unset.
    pub base_directory: Option<PathBuf>,
    /// Message stamped on records sent through the minimal JSON channel.
    pub minimal_data_log_message: String,
    pub write_mode: WriteMode,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            sanitizer: SanitizerRules::default(),
            origin: OriginConfig::default(),
            metrics: MetricsConfig::default(),
            options: FluentLoggerOptions::default(),
            machine_name: None,
            base_directory: None,
            minimal_data_log_message: "MinimalDataLogMessage".to_string(),
            write_mode: WriteMode::Inline,
        }
    }
}

impl LoggingConfig {
    /// Parse a JSON document; absent fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, SetupError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Defaults with the `FLUENT_LOG_*` environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Some(name) = env_opt(FLUENT_LOG_MACHINE_NAME_ENV) {
            self.machine_name = Some(name);
        }
        if let Some(source) = env_opt(FLUENT_LOG_METRICS_SOURCE_ENV) {
            self.metrics.source = Some(source);
        }
        if let Some(environment) = env_opt(FLUENT_LOG_METRICS_ENVIRONMENT_ENV) {
            self.metrics.environment = Some(environment);
        }
        if let Some(path) = env_opt(FLUENT_LOG_METRIC_PATH_ENV) {
            self.metrics.metric_path = path;
        }
        if let Some(dir) = env_opt(FLUENT_LOG_BASE_DIRECTORY_ENV) {
            self.base_directory = Some(PathBuf::from(dir));
        }
        self
    }
}

/// Sensitive-field rule definitions, in the three categories applied by the
/// [`Sanitizer`](crate::sanitize::Sanitizer).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizerRules {
    pub json_fields: Vec<String>,
    pub url_form_encoded_fields: Vec<String>,
    pub regex_replacements: Vec<RegexReplacementRule>,
}

impl Default for SanitizerRules {
    fn default() -> Self {
        let fields = vec![
            "password".to_string(),
            "creditCardNumber".to_string(),
            "cvv".to_string(),
        ];
        Self {
            json_fields: fields.clone(),
            url_form_encoded_fields: fields,
            regex_replacements: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexReplacementRule {
    pub pattern: String,
    /// Defaults to [`DEFAULT_REGEX_REPLACEMENT`](crate::sanitize::DEFAULT_REGEX_REPLACEMENT).
    #[serde(default)]
    pub replacement: Option<String>,
}

/// Namespace prefixes used to pick the throwing frame of an exception.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginConfig {
    pub target_namespaces: Vec<String>,
    pub excluded_namespaces: Vec<String>,
}

/// Metric line decoration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prefix prepended to every metric key.
    pub metric_path: String,
    pub source_enabled: bool,
    pub environment_enabled: bool,
    /// Ambient source; the host name is used when unset.
    pub source: Option<String>,
    pub environment: Option<String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            metric_path: "graphite.".to_string(),
            source_enabled: true,
            environment_enabled: true,
            source: None,
            environment: None,
        }
    }
}

/// Per-write body truncation settings. `None` disables truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FluentLoggerOptions {
    pub truncate_request_body_to: Option<i64>,
    pub truncate_response_body_to: Option<i64>,
}

impl Default for FluentLoggerOptions {
    fn default() -> Self {
        Self {
            truncate_request_body_to: Some(1000),
            truncate_response_body_to: Some(1000),
        }
    }
}

impl FluentLoggerOptions {
    /// Adopt every setting of `other`, including explicit `None`s.
    pub fn merge(&mut self, other: FluentLoggerOptions) {
        self.truncate_request_body_to = other.truncate_request_body_to;
        self.truncate_response_body_to = other.truncate_response_body_to;
    }
}

/// Where record assembly runs once `write` is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Assemble on the caller's thread, then enqueue for delivery.
    Inline,
    /// Move the builder snapshot onto the runtime and assemble there.
    Background,
}

/// Delivery task settings shared by every sink of a logger.
///
/// **Fields**
/// - `channel_buffer`: maximum number of records queued before new records
///   are dropped.
/// - `batch_size`: number of records handed to the sink per flush.
/// - `flush_interval`: maximum delay between flushes of a partial batch.
#[derive(Clone, Debug)]
pub struct DispatchConfig {
    pub channel_buffer: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            channel_buffer: 1024,
            batch_size: 128,
            flush_interval: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_config_keeps_defaults_for_missing_fields() {
        let cfg = LoggingConfig::from_json(
            r#"{
                "sanitizer": { "json_fields": ["secret"] },
                "origin": { "target_namespaces": ["my_app::"] },
                "options": { "truncate_request_body_to": null }
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.sanitizer.json_fields, vec!["secret".to_string()]);
        assert!(cfg.sanitizer.regex_replacements.is_empty());
        assert_eq!(cfg.origin.target_namespaces, vec!["my_app::".to_string()]);
        assert_eq!(cfg.options.truncate_request_body_to, None);
        assert_eq!(cfg.options.truncate_response_body_to, Some(1000));
        assert_eq!(cfg.metrics.metric_path, "graphite.");
        assert_eq!(cfg.write_mode, WriteMode::Inline);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(
            LoggingConfig::from_json("{not json"),
            Err(SetupError::Config(_))
        ));
    }

    #[test]
    fn merge_adopts_explicit_none() {
        let mut options = FluentLoggerOptions::default();
        options.merge(FluentLoggerOptions {
            truncate_request_body_to: None,
            truncate_response_body_to: Some(10),
        });
        assert_eq!(options.truncate_request_body_to, None);
        assert_eq!(options.truncate_response_body_to, Some(10));
    }

    #[test]
    fn environment_overrides_apply_on_top_of_defaults() {
        std::env::set_var(FLUENT_LOG_METRIC_PATH_ENV, "graphite.prod.");
        std::env::set_var(FLUENT_LOG_MACHINE_NAME_ENV, "  ");
        let cfg = LoggingConfig::from_env();
        std::env::remove_var(FLUENT_LOG_METRIC_PATH_ENV);
        std::env::remove_var(FLUENT_LOG_MACHINE_NAME_ENV);

        assert_eq!(cfg.metrics.metric_path, "graphite.prod.");
        assert_eq!(cfg.machine_name, None);
    }
}
