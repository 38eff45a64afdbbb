//! Stat-line formatting for the metrics sink.
//!
//! A line looks like `{path}{key}[.{sub_key}][~source=..][~env=..][~k=v..]:{value}|{unit}`.

use std::fmt::Write as _;

use crate::config::MetricsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricUnit {
    Count,
    Milliseconds,
}

impl MetricUnit {
    pub fn code(&self) -> &'static str {
        match self {
            MetricUnit::Count => "c",
            MetricUnit::Milliseconds => "ms",
        }
    }
}

/// Name of a metric. Implemented for every string type; applications
/// usually implement it for an enum of their stats.
pub trait MetricKey {
    fn key(&self) -> String;
}

impl<T: AsRef<str>> MetricKey for T {
    fn key(&self) -> String {
        self.as_ref().to_string()
    }
}

/// One stat observation with its per-call decorations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metric {
    pub key: String,
    pub sub_key: Option<String>,
    pub value: i64,
    pub unit: MetricUnit,
    /// Overrides the configured source.
    pub source: Option<String>,
    /// Overrides the configured environment.
    pub environment: Option<String>,
    pub tags: Vec<(String, String)>,
}

impl Metric {
    fn new(key: &dyn MetricKey, value: i64, unit: MetricUnit) -> Self {
        Self {
            key: key.key(),
            sub_key: None,
            value,
            unit,
            source: None,
            environment: None,
            tags: Vec::new(),
        }
    }

    /// A single occurrence (`:1|c`).
    pub fn count(key: impl MetricKey) -> Self {
        Self::new(&key, 1, MetricUnit::Count)
    }

    pub fn counter(key: impl MetricKey, value: i64) -> Self {
        Self::new(&key, value, MetricUnit::Count)
    }

    pub fn timer(key: impl MetricKey, milliseconds: i64) -> Self {
        Self::new(&key, milliseconds, MetricUnit::Milliseconds)
    }

    pub fn sub_key(mut self, sub_key: impl Into<String>) -> Self {
        self.sub_key = Some(sub_key.into()).filter(|s: &String| !s.is_empty());
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }
}

/// Render `metric` with already-resolved source and environment.
pub fn format_metric(
    metric_path: &str,
    metric: &Metric,
    source: Option<&str>,
    environment: Option<&str>,
) -> String {
    let mut line = format!("{metric_path}{}", metric.key);
    if let Some(sub_key) = &metric.sub_key {
        let _ = write!(line, ".{sub_key}");
    }
    if let Some(source) = source {
        let _ = write!(line, "~source={source}");
    }
    if let Some(environment) = environment {
        let _ = write!(line, "~env={environment}");
    }
    for (key, value) in &metric.tags {
        let _ = write!(line, "~{key}={value}");
    }
    let _ = write!(line, ":{}|{}", metric.value, metric.unit.code());
    line
}

impl MetricsConfig {
    /// Per-call override, then configured source, then `hostname`; `None`
    /// when source tagging is disabled.
    pub fn resolve_source(&self, override_source: Option<&str>, hostname: &str) -> Option<String> {
        if !self.source_enabled {
            return None;
        }
        Some(
            override_source
                .or(self.source.as_deref())
                .unwrap_or(hostname)
                .to_string(),
        )
    }

    /// Per-call override, then configured environment; `None` when
    /// environment tagging is disabled or nothing is set.
    pub fn resolve_environment(&self, override_environment: Option<&str>) -> Option<String> {
        if !self.environment_enabled {
            return None;
        }
        override_environment
            .or(self.environment.as_deref())
            .map(str::to_string)
    }

    /// The finished stat line for `metric`.
    pub fn line(&self, metric: &Metric, hostname: &str) -> String {
        let source = self.resolve_source(metric.source.as_deref(), hostname);
        let environment = self.resolve_environment(metric.environment.as_deref());
        format_metric(
            &self.metric_path,
            metric,
            source.as_deref(),
            environment.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(path: &str) -> MetricsConfig {
        MetricsConfig {
            metric_path: path.to_string(),
            ..MetricsConfig::default()
        }
    }

    #[test]
    fn count_with_hostname_source() {
        let line = config("graphite.test.").line(&Metric::count("Test"), "box1");
        assert_eq!(line, "graphite.test.Test~source=box1:1|c");
    }

    #[test]
    fn decorations_keep_fixed_order() {
        let metric = Metric::timer("Checkout", 250)
            .sub_key("Submit")
            .tag("region", "us")
            .tag("tier", "gold")
            .environment("prod");
        let line = config("stats.").line(&metric, "box1");
        assert_eq!(
            line,
            "stats.Checkout.Submit~source=box1~env=prod~region=us~tier=gold:250|ms"
        );
    }

    #[test]
    fn override_beats_config_beats_hostname() {
        let mut cfg = config("");
        assert_eq!(cfg.resolve_source(None, "box1").as_deref(), Some("box1"));
        cfg.source = Some("web".into());
        assert_eq!(cfg.resolve_source(None, "box1").as_deref(), Some("web"));
        assert_eq!(cfg.resolve_source(Some("job"), "box1").as_deref(), Some("job"));
    }

    #[test]
    fn disabled_decorations_are_omitted() {
        let cfg = MetricsConfig {
            metric_path: String::new(),
            source_enabled: false,
            environment_enabled: false,
            source: Some("web".into()),
            environment: Some("prod".into()),
        };
        let metric = Metric::counter("Orders", 5).source("job").environment("qa");
        assert_eq!(cfg.line(&metric, "box1"), "Orders:5|c");
    }

    #[test]
    fn empty_sub_key_is_ignored() {
        let line = format_metric("", &Metric::count("Hits").sub_key(""), None, None);
        assert_eq!(line, "Hits:1|c");
    }

    enum Stat {
        Login,
    }

    impl MetricKey for Stat {
        fn key(&self) -> String {
            match self {
                Stat::Login => "Auth.Login".to_string(),
            }
        }
    }

    #[test]
    fn application_keys_are_supported() {
        assert_eq!(format_metric("", &Metric::count(Stat::Login), None, None), "Auth.Login:1|c");
    }
}
