use std::sync::Arc;

use crate::noop_sink::NoopSink;
use crate::sink::LogSink;
use crate::udp::{UdpPayload, UdpSink};

/// Supported backend kinds that can be selected via DSN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Udp,
    Http,
    Noop,
}

/// Backend selected from a DSN.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Selected backend implementation.
    pub kind: BackendKind,
    /// Raw DSN that was used to construct this config.
    pub dsn: String,
}

impl BackendConfig {
    pub fn new(kind: BackendKind, dsn: impl Into<String>) -> Self {
        BackendConfig { kind, dsn: dsn.into() }
    }
}

/// Parse a DSN string and infer the backend kind from its scheme.
///
/// Examples:
/// - "udp://logstash.local:5960" (JSON datagrams)
/// - "udp://graphite.local:2003?format=line" (raw stat lines)
/// - "https://logs.example.com/ingest"
/// - "noop://"
pub fn parse_dsn(dsn: &str) -> Result<BackendConfig, DsnError> {
    let lower = dsn.to_ascii_lowercase();

    if lower.starts_with("udp://") {
        if udp_target(dsn).is_empty() {
            return Err(DsnError::MissingAddress);
        }
        Ok(BackendConfig::new(BackendKind::Udp, dsn))
    } else if lower.starts_with("http://") || lower.starts_with("https://") {
        Ok(BackendConfig::new(BackendKind::Http, dsn))
    } else if lower.starts_with("noop://") {
        Ok(BackendConfig::new(BackendKind::Noop, dsn))
    } else {
        Err(DsnError::UnknownScheme)
    }
}

/// `host:port` part of a `udp://` DSN.
fn udp_target(dsn: &str) -> &str {
    let rest = &dsn["udp://".len().min(dsn.len())..];
    rest.split(['?', '/']).next().unwrap_or_default()
}

fn udp_payload(dsn: &str) -> UdpPayload {
    let query = dsn.split_once('?').map(|(_, q)| q).unwrap_or_default();
    if query
        .split('&')
        .any(|pair| pair.eq_ignore_ascii_case("format=line"))
    {
        UdpPayload::MessageLine
    } else {
        UdpPayload::Json
    }
}

/// Error type returned when parsing a DSN.
#[derive(thiserror::Error, Debug)]
pub enum DsnError {
    #[error("unknown or unsupported DSN scheme")]
    UnknownScheme,

    #[error("udp DSN has no host:port")]
    MissingAddress,
}

/// Error type returned when building a backend sink from configuration.
#[derive(thiserror::Error, Debug)]
pub enum BackendBuildError {
    #[error("http feature is not enabled")]
    HttpFeatureDisabled,
}

/// Create a concrete `LogSink` implementation from a `BackendConfig`.
///
/// This is the main entry point for applications that want to select
/// a backend using a single DSN string instead of constructing sinks
/// manually.
pub fn make_sink_from_config(cfg: &BackendConfig) -> Result<Arc<dyn LogSink>, BackendBuildError> {
    match cfg.kind {
        BackendKind::Udp => {
            let sink = UdpSink::new(udp_target(&cfg.dsn), udp_payload(&cfg.dsn));
            Ok(Arc::new(sink) as Arc<dyn LogSink>)
        }
        BackendKind::Http => {
            #[cfg(feature = "http")]
            {
                use crate::http_sink::HttpSink;

                Ok(Arc::new(HttpSink::new(cfg.dsn.clone())) as Arc<dyn LogSink>)
            }

            #[cfg(not(feature = "http"))]
            {
                Err(BackendBuildError::HttpFeatureDisabled)
            }
        }
        BackendKind::Noop => Ok(Arc::new(NoopSink) as Arc<dyn LogSink>),
    }
}
