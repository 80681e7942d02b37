use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::telemetry::HostKind;

/// Environment override for `sender.base_url`.
pub const COLLECTOR_URL_ENV: &str = "FREEZEGUARD_COLLECTOR_URL";

// ─── Top level ───────────────────────────────────────────────────

/// Everything needed to wire a [`crate::FreezeGuard`], usually read from a
/// TOML file. Every field has a default so an empty file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub monitor: MonitorConfig,
    pub sender: SenderConfig,
    pub log: LogConfig,
}

impl GuardConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a config file, applies environment overrides, then validates.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&text)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(COLLECTOR_URL_ENV) {
            if !url.trim().is_empty() {
                self.sender.base_url = url.trim().to_owned();
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.monitor.validate()?;
        self.sender.validate()?;
        Ok(())
    }
}

// ─── Stall monitor ───────────────────────────────────────────────

/// Probe cadence and stall threshold. Fixed once the monitor is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// How often a probe is posted to the primary context
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,

    /// Minimum scheduling delay that counts as a stall
    #[serde(default = "default_stall_threshold_ms")]
    pub stall_threshold_ms: u64,
}

fn default_period_ms() -> u64 {
    50
}
fn default_stall_threshold_ms() -> u64 {
    100
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
            stall_threshold_ms: default_stall_threshold_ms(),
        }
    }
}

impl MonitorConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn stall_threshold(&self) -> Duration {
        Duration::from_millis(self.stall_threshold_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period_ms == 0 {
            return Err(ConfigError::Zero {
                field: "monitor.period_ms",
            });
        }
        if self.stall_threshold_ms == 0 {
            return Err(ConfigError::Zero {
                field: "monitor.stall_threshold_ms",
            });
        }
        Ok(())
    }
}

// ─── Telemetry sender ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Collector base URL. Must use an IP literal, not a hostname.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Selects the thread labels written on the wire
    #[serde(default)]
    pub host: HostKind,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Upper bound for the whole delivery, body read included
    #[serde(default = "default_total_timeout_ms")]
    pub total_timeout_ms: u64,

    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".into()
}
fn default_connect_timeout_ms() -> u64 {
    1_000
}
fn default_request_timeout_ms() -> u64 {
    1_500
}
fn default_total_timeout_ms() -> u64 {
    2_500
}
fn default_ping_timeout_ms() -> u64 {
    1_000
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            host: HostKind::default(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            total_timeout_ms: default_total_timeout_ms(),
            ping_timeout_ms: default_ping_timeout_ms(),
        }
    }
}

impl SenderConfig {
    /// Convenience for tests and the CLI: defaults pointed at `base_url`.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn total_timeout(&self) -> Duration {
        Duration::from_millis(self.total_timeout_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    /// Parses `base_url`, requiring http(s) and an IP-literal host.
    pub fn collector_url(&self) -> Result<Url, ConfigError> {
        let invalid = |reason: &str| ConfigError::CollectorUrl {
            url: self.base_url.clone(),
            reason: reason.to_owned(),
        };

        let url = Url::parse(&self.base_url).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
        let literal = host.trim_start_matches('[').trim_end_matches(']');
        if literal.parse::<IpAddr>().is_err() {
            return Err(invalid("host must be an IP address such as 127.0.0.1"));
        }
        Ok(url)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("sender.connect_timeout_ms", self.connect_timeout_ms),
            ("sender.request_timeout_ms", self.request_timeout_ms),
            ("sender.total_timeout_ms", self.total_timeout_ms),
            ("sender.ping_timeout_ms", self.ping_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }
        if !(self.connect_timeout_ms < self.request_timeout_ms
            && self.request_timeout_ms < self.total_timeout_ms)
        {
            return Err(ConfigError::TimeoutOrdering {
                connect_ms: self.connect_timeout_ms,
                request_ms: self.request_timeout_ms,
                total_ms: self.total_timeout_ms,
            });
        }
        self.collector_url()?;
        Ok(())
    }
}

// ─── Logging ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive; `RUST_LOG` takes precedence when set
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = GuardConfig::from_toml_str("").unwrap();
        assert_eq!(config.monitor.period_ms, 50);
        assert_eq!(config.monitor.stall_threshold_ms, 100);
        assert_eq!(config.sender.base_url, "http://127.0.0.1:8000");
        assert_eq!(config.sender.host, HostKind::IntelliJ);
        assert_eq!(config.log.format, LogFormat::Pretty);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = GuardConfig::from_toml_str(
            r#"
            [monitor]
            stall_threshold_ms = 250

            [sender]
            host = "vscode"
            base_url = "http://127.0.0.1:9100"

            [log]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.monitor.period_ms, 50);
        assert_eq!(config.monitor.stall_threshold_ms, 250);
        assert_eq!(config.sender.host, HostKind::VsCode);
        assert_eq!(config.sender.total_timeout_ms, 2_500);
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn zero_period_is_rejected() {
        let err = GuardConfig::from_toml_str("[monitor]\nperiod_ms = 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Zero {
                field: "monitor.period_ms"
            }
        ));
    }

    #[test]
    fn timeouts_must_be_strictly_ordered() {
        let mut sender = SenderConfig::default();
        sender.request_timeout_ms = sender.connect_timeout_ms;
        assert!(matches!(
            sender.validate(),
            Err(ConfigError::TimeoutOrdering { .. })
        ));

        let mut sender = SenderConfig::default();
        sender.total_timeout_ms = sender.request_timeout_ms;
        assert!(matches!(
            sender.validate(),
            Err(ConfigError::TimeoutOrdering { .. })
        ));

        assert!(SenderConfig::default().validate().is_ok());
    }

    #[test]
    fn collector_host_must_be_an_ip_literal() {
        let sender = SenderConfig::with_base_url("http://localhost:8000");
        assert!(matches!(
            sender.validate(),
            Err(ConfigError::CollectorUrl { .. })
        ));

        let sender = SenderConfig::with_base_url("http://[::1]:8000");
        assert!(sender.validate().is_ok());

        let sender = SenderConfig::with_base_url("ftp://127.0.0.1/");
        assert!(sender.validate().is_err());
    }
}
