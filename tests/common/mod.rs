#![allow(dead_code)]

use std::sync::Arc;

use fluent_log_sink::config::{OriginConfig, LoggingConfig};
use fluent_log_sink::logger::Logger;
use fluent_log_sink::memory_sink::MemorySink;

pub struct Harness {
    pub logger: Logger,
    pub events: MemorySink,
    pub metrics: MemorySink,
    pub minimal: MemorySink,
}

pub fn config() -> LoggingConfig {
    LoggingConfig {
        machine_name: Some("box1".to_string()),
        base_directory: Some("/srv/app/current".into()),
        origin: OriginConfig {
            target_namespaces: vec!["scenarios".to_string()],
            excluded_namespaces: Vec::new(),
        },
        ..LoggingConfig::default()
    }
}

pub fn harness(config: LoggingConfig) -> Harness {
    harness_with(config, |b| b)
}

pub fn harness_with(
    config: LoggingConfig,
    customize: impl FnOnce(fluent_log_sink::LoggerBuilder) -> fluent_log_sink::LoggerBuilder,
) -> Harness {
    let events = MemorySink::new();
    let metrics = MemorySink::new();
    let minimal = MemorySink::new();
    let builder = Logger::builder()
        .config(config)
        .event_sink(Arc::new(events.clone()))
        .metrics_sink(Arc::new(metrics.clone()))
        .minimal_sink(Arc::new(minimal.clone()));
    let logger = customize(builder).build().expect("logger builds");
    Harness {
        logger,
        events,
        metrics,
        minimal,
    }
}
