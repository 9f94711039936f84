use std::fmt;
use std::path::Path;

use crate::ProxyConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Startup is refused.
    Error,
    /// Reported, startup continues.
    Warning,
}

/// One problem found in a configuration, tied to the offending key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub severity: Severity,
    /// Dotted key, e.g. `server.port`.
    pub key: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{tag}: {}: {}", self.key, self.message)
    }
}

/// Everything [`validate`] found, in check order.
#[derive(Debug, Default)]
pub struct ConfigReport {
    issues: Vec<ConfigIssue>,
}

impl ConfigReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ConfigIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ConfigIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.severity == Severity::Warning)
    }

    fn push(&mut self, severity: Severity, key: &'static str, message: impl Into<String>) {
        self.issues.push(ConfigIssue {
            severity,
            key,
            message: message.into(),
        });
    }

    fn warn(&mut self, key: &'static str, message: impl Into<String>) {
        self.push(Severity::Warning, key, message);
    }

    fn error(&mut self, key: &'static str, message: impl Into<String>) {
        self.push(Severity::Error, key, message);
    }
}

/// One issue per line, errors first.
impl fmt::Display for ConfigReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for issue in self.errors().chain(self.warnings()) {
            writeln!(f, "  {issue}")?;
        }
        Ok(())
    }
}

/// Validate a proxy configuration and return a report of issues.
pub fn validate(cfg: &ProxyConfig) -> ConfigReport {
    let mut report = ConfigReport::default();

    validate_server(cfg, &mut report);
    validate_upstream(cfg, &mut report);
    validate_cache(cfg, &mut report);
    validate_log(cfg, &mut report);

    report
}

fn validate_server(cfg: &ProxyConfig, report: &mut ConfigReport) {
    if cfg.server.host.trim().is_empty() {
        report.error("server.host", "must not be empty");
    }
    if cfg.server.port == 0 {
        report.error("server.port", "must be in 1..=65535");
    }
    if cfg.server.write_timeout < cfg.upstream.timeout_secs {
        report.warn(
            "server.write_timeout",
            format!(
                "{}s is shorter than upstream.timeout_secs ({}s); slow upstream calls will be cut off",
                cfg.server.write_timeout, cfg.upstream.timeout_secs
            ),
        );
    }
}

fn validate_upstream(cfg: &ProxyConfig, report: &mut ConfigReport) {
    let url = cfg.upstream.url.trim();
    if url.is_empty() {
        report.error("upstream.url", "must not be empty");
    } else if url.starts_with("https://") {
        report.error(
            "upstream.url",
            format!("'{url}' uses https, only plain http upstreams are supported"),
        );
    } else if !url.starts_with("http://") {
        report.error("upstream.url", format!("'{url}' must start with http://"));
    }
}

fn validate_cache(cfg: &ProxyConfig, report: &mut ConfigReport) {
    if !cfg.cache.enabled {
        return;
    }

    let db_path = cfg.cache.db_path.trim();
    if db_path.is_empty() {
        report.error("cache.db_path", "must not be empty when the cache is enabled");
    } else {
        let path = Path::new(db_path);
        if path.exists() && !path.is_dir() {
            report.error(
                "cache.db_path",
                format!("'{db_path}' exists but is not a directory"),
            );
        }
    }

    if cfg.cache.ttl_days == 0 {
        report.error("cache.ttl_days", "must be at least 1 when the cache is enabled");
    }
}

fn validate_log(cfg: &ProxyConfig, report: &mut ConfigReport) {
    if cfg.log.level.trim().is_empty() {
        report.error("log.level", "must not be empty");
    }
    if cfg.log.output.to_file() && cfg.log.file_path.trim().is_empty() {
        report.error("log.file_path", "is required when log.output writes to a file");
    }
}
