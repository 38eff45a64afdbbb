//! Structured logging facade with sensitive-data sanitization, origin
//! fingerprinting and pluggable asynchronous sinks.
//!
//! Build a [`Logger`](logger::Logger) once per process, then write records
//! through the fluent builder it hands out. Records are delivered to sinks
//! from background tasks; log calls never fail and never block on I/O.

pub mod config;
pub mod env;
pub mod error;
pub mod severity;

pub mod sanitize;
pub mod properties;
pub mod exception;
pub mod origin;
pub mod http;
pub mod event_properties;

pub mod record;
pub mod fluent;
pub mod minimal;
pub mod metrics;
pub mod logger;

pub mod sink;
pub mod dispatch;
pub mod noop_sink;
pub mod memory_sink;
pub mod udp;
#[cfg(feature = "http")]
pub mod http_sink;
pub mod backend;

pub mod layer;
pub mod init;

pub use config::LoggingConfig;
pub use exception::{Exception, StackFrame};
pub use logger::{Logger, LoggerBuilder};
pub use record::LogRecord;
pub use severity::Severity;
pub use sink::LogSink;
