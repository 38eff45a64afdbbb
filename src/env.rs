/// Environment variable names used by this crate for convenient
/// configuration of the logger from services.
///
/// These are purely helpers; [`LoggingConfig`](crate::config::LoggingConfig)
/// stays usable without any environment access.

/// Overrides the machine identity stamped on every record.
pub const FLUENT_LOG_MACHINE_NAME_ENV: &str = "FLUENT_LOG_MACHINE_NAME";

/// Ambient metrics source (takes precedence over the hostname).
pub const FLUENT_LOG_METRICS_SOURCE_ENV: &str = "FLUENT_LOG_METRICS_SOURCE";

/// Ambient metrics environment, e.g. `prod`.
pub const FLUENT_LOG_METRICS_ENVIRONMENT_ENV: &str = "FLUENT_LOG_METRICS_ENVIRONMENT";

/// Prefix prepended to every metric key, e.g. `graphite.prod.`.
pub const FLUENT_LOG_METRIC_PATH_ENV: &str = "FLUENT_LOG_METRIC_PATH";

/// Directory scanned for the numeric deploy version segment.
pub const FLUENT_LOG_BASE_DIRECTORY_ENV: &str = "FLUENT_LOG_BASE_DIRECTORY";

/// Read a non-empty environment variable.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Best-effort host name: `HOSTNAME`, `COMPUTERNAME`, then `/etc/hostname`.
pub fn hostname() -> String {
    env_opt("HOSTNAME")
        .or_else(|| env_opt("COMPUTERNAME"))
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| "unknown".to_string())
}
