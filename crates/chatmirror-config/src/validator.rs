//! Sanity checks run on a parsed config before the relay starts.

use std::fmt;

use crate::error::ConfigError;
use crate::schema::Config;

/// A problem found in one setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// Dotted setting name, e.g. `devtools.ports`.
    pub path: String,
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Everything the validator found. Warnings never block startup.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn reject(&mut self, path: &str, message: impl Into<String>) {
        self.errors.push(Issue {
            path: path.to_string(),
            message: message.into(),
        });
    }

    fn caution(&mut self, path: &str, message: impl Into<String>) {
        self.warnings.push(Issue {
            path: path.to_string(),
            message: message.into(),
        });
    }

    /// Reject every listed setting whose value is zero.
    fn reject_zeros(&mut self, settings: &[(&str, u64)]) {
        for (path, value) in settings {
            if *value == 0 {
                self.reject(path, "must be greater than 0");
            }
        }
    }
}

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &Config) -> Result<ValidationResult, ConfigError> {
        let mut report = ValidationResult::default();
        Self::check_listener(config, &mut report);
        Self::check_devtools(config, &mut report);
        Self::check_sync(config, &mut report);
        Self::check_dedup(config, &mut report);
        Ok(report)
    }

    /// Like [`ConfigValidator::validate`], but the first error becomes a
    /// [`ConfigError::InvalidValue`].
    pub fn ensure_valid(config: &Config) -> Result<ValidationResult, ConfigError> {
        let report = Self::validate(config)?;
        match report.errors.first() {
            None => Ok(report),
            Some(issue) => Err(ConfigError::InvalidValue {
                field: issue.path.clone(),
                message: issue.message.clone(),
            }),
        }
    }

    fn check_listener(config: &Config, report: &mut ValidationResult) {
        if config.server.host.is_empty() {
            report.reject("server.host", "listen address is empty");
        }
        report.reject_zeros(&[("server.port", config.server.port.into())]);
    }

    fn check_devtools(config: &Config, report: &mut ValidationResult) {
        let devtools = &config.devtools;

        if devtools.host.is_empty() {
            report.reject("devtools.host", "debug host is empty");
        }
        if devtools.ports.is_empty() {
            report.reject("devtools.ports", "no debug ports configured");
        } else if devtools.ports.contains(&0) {
            report.reject("devtools.ports", "port 0 is not a debug port");
        } else if !devtools.ports.contains(&devtools.default_port) {
            report.reject(
                "devtools.default_port",
                format!("{} is not in {:?}", devtools.default_port, devtools.ports),
            );
        }
        report.reject_zeros(&[
            ("devtools.handshake_timeout_ms", devtools.handshake_timeout_ms),
            ("devtools.call_timeout_ms", devtools.call_timeout_ms),
        ]);

        if let Err(e) = regex::Regex::new(&devtools.title_exclude) {
            report.reject("devtools.title_exclude", e.to_string());
        }
        if devtools.url_pattern.is_empty() {
            report.caution("devtools.url_pattern", "empty pattern accepts every page target");
        }
    }

    fn check_sync(config: &Config, report: &mut ValidationResult) {
        let sync = &config.sync;

        report.reject_zeros(&[
            ("sync.poll_interval_ms", sync.poll_interval_ms),
            ("sync.subscriber_buffer", sync.subscriber_buffer as u64),
            ("sync.send_timeout_ms", sync.send_timeout_ms),
        ]);
        if (1..250).contains(&sync.poll_interval_ms) {
            report.caution(
                "sync.poll_interval_ms",
                "polling faster than 250ms loads the IDE renderer",
            );
        }

        if let Some(script) = sync.capture_script.as_deref() {
            if !script.is_file() {
                report.reject(
                    "sync.capture_script",
                    format!("{} is not a readable file", script.display()),
                );
            }
        }
    }

    fn check_dedup(config: &Config, report: &mut ValidationResult) {
        let dedup = &config.dedup;

        report.reject_zeros(&[
            ("dedup.window_secs", dedup.window_secs),
            ("dedup.derive_bucket_secs", dedup.derive_bucket_secs),
            ("dedup.sweep_interval_secs", dedup.sweep_interval_secs),
        ]);
        if dedup.window_secs == 1 {
            report.caution("dedup.window_secs", "a 1s window lets slow client retries through");
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
