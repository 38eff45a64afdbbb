//! Stable deduplication fingerprint ("Origin") of a log site.

use md5::{Digest, Md5};
use serde::Serialize;
use std::fmt;

use crate::config::OriginConfig;
use crate::exception::Exception;

/// Kind of record, decided from exception presence and SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogType {
    Message,
    Exception,
    SqlException,
}

impl LogType {
    pub fn resolve(has_exception: bool, sql: Option<&str>) -> Self {
        match (has_exception, sql.is_some_and(|s| !s.is_empty())) {
            (false, _) => LogType::Message,
            (true, false) => LogType::Exception,
            (true, true) => LogType::SqlException,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Message => "Message",
            LogType::Exception => "Exception",
            LogType::SqlException => "SqlException",
        }
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Picks the throwing frame of an exception and hashes the canonical
/// origin string.
#[derive(Debug, Clone, Default)]
pub struct OriginFingerprinter {
    target_namespaces: Vec<String>,
    excluded_namespaces: Vec<String>,
}

impl OriginFingerprinter {
    pub fn new(config: &OriginConfig) -> Self {
        Self {
            target_namespaces: config.target_namespaces.clone(),
            excluded_namespaces: config.excluded_namespaces.clone(),
        }
    }

    /// Description of the first frame inside a target namespace and outside
    /// every excluded one; the first frame when none qualifies; `""` when
    /// there are no frames.
    pub fn throwing_frame(&self, exception: &Exception) -> String {
        let descriptions: Vec<String> = exception.frames.iter().map(|f| f.description()).collect();
        descriptions
            .iter()
            .find(|d| self.is_target(d) && !self.is_excluded(d))
            .or_else(|| descriptions.first())
            .cloned()
            .unwrap_or_default()
    }

    fn is_target(&self, description: &str) -> bool {
        self.target_namespaces
            .iter()
            .any(|ns| description.starts_with(ns.as_str()))
    }

    fn is_excluded(&self, description: &str) -> bool {
        self.excluded_namespaces
            .iter()
            .any(|ns| description.starts_with(ns.as_str()))
    }

    /// Canonical pre-hash string.
    ///
    /// **Parameters**
    /// - `message`: the record message for `Message` records, the caller's
    ///   custom grouping message for `Exception` records.
    /// - `sql`: SQL text of `SqlException` records.
    pub fn canonical(
        &self,
        log_type: LogType,
        message: Option<&str>,
        exception: Option<&Exception>,
        sql: Option<&str>,
    ) -> String {
        let message = message.unwrap_or("");
        match (log_type, exception) {
            (LogType::Exception, Some(_)) if !message.is_empty() => message.to_string(),
            (LogType::Exception, Some(e)) => format!("{};{}", e.message, self.throwing_frame(e)),
            (LogType::SqlException, Some(e)) => format!("{};{}", e.message, sql.unwrap_or("")),
            _ => message.to_string(),
        }
    }

    pub fn compute(
        &self,
        log_type: LogType,
        message: Option<&str>,
        exception: Option<&Exception>,
        sql: Option<&str>,
    ) -> String {
        origin_hash(&self.canonical(log_type, message, exception, sql))
    }
}

/// 32-character lowercase hex MD5 digest of `canonical`.
pub fn origin_hash(canonical: &str) -> String {
    hex::encode(Md5::digest(canonical.as_bytes()))
}
