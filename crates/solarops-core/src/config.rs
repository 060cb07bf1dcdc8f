// Engine configuration
//
// EngineConfig is DB-agnostic and can be:
// - Created directly with defaults and fluent setters (tests, embedding)
// - Loaded from SOLAROPS_* environment variables by the server binary

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fault::Severity;

/// Configuration for the automation engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Trailing window within which a report for the same row is a continuation
    #[serde(default = "default_dedup_window_minutes")]
    pub dedup_window_minutes: i64,

    /// Active-ticket count at which an available technician flips to busy
    #[serde(default = "default_busy_threshold")]
    pub busy_threshold: u32,

    /// Serialise workflow runs for the same row for the duration of the transaction
    #[serde(default = "default_row_locking")]
    pub row_locking: bool,

    /// Delay before a deferred anomaly is turned into a ticket
    #[serde(default = "default_deferred_delay_secs")]
    pub deferred_delay_secs: u64,

    /// Number of ingest results kept for live subscribers and recent queries
    #[serde(default = "default_recent_results_capacity")]
    pub recent_results_capacity: usize,

    /// Outbound fault notifications; disabled when None
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

fn default_dedup_window_minutes() -> i64 {
    15
}

fn default_busy_threshold() -> u32 {
    4
}

fn default_row_locking() -> bool {
    true
}

fn default_deferred_delay_secs() -> u64 {
    3
}

fn default_recent_results_capacity() -> usize {
    100
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dedup_window_minutes: default_dedup_window_minutes(),
            busy_threshold: default_busy_threshold(),
            row_locking: default_row_locking(),
            deferred_delay_secs: default_deferred_delay_secs(),
            recent_results_capacity: default_recent_results_capacity(),
            webhook: None,
        }
    }
}

impl EngineConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `SOLAROPS_DEDUP_WINDOW_MINUTES` (default: 15)
    /// - `SOLAROPS_BUSY_THRESHOLD` (default: 4)
    /// - `SOLAROPS_ROW_LOCKING` (default: true)
    /// - `SOLAROPS_DEFERRED_DELAY_SECS` (default: 3)
    /// - `SOLAROPS_RECENT_RESULTS_CAPACITY` (default: 100)
    /// - `SOLAROPS_WEBHOOK_*`, see [`WebhookConfig::from_env`]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            dedup_window_minutes: env_parse("SOLAROPS_DEDUP_WINDOW_MINUTES")
                .unwrap_or(defaults.dedup_window_minutes),
            busy_threshold: env_parse("SOLAROPS_BUSY_THRESHOLD").unwrap_or(defaults.busy_threshold),
            row_locking: env::var("SOLAROPS_ROW_LOCKING")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.row_locking),
            deferred_delay_secs: env_parse("SOLAROPS_DEFERRED_DELAY_SECS")
                .unwrap_or(defaults.deferred_delay_secs),
            recent_results_capacity: env_parse("SOLAROPS_RECENT_RESULTS_CAPACITY")
                .unwrap_or(defaults.recent_results_capacity),
            webhook: WebhookConfig::from_env(),
        }
    }

    pub fn with_dedup_window_minutes(mut self, minutes: i64) -> Self {
        self.dedup_window_minutes = minutes;
        self
    }

    pub fn with_busy_threshold(mut self, threshold: u32) -> Self {
        self.busy_threshold = threshold;
        self
    }

    pub fn with_row_locking(mut self, enabled: bool) -> Self {
        self.row_locking = enabled;
        self
    }

    pub fn with_deferred_delay_secs(mut self, secs: u64) -> Self {
        self.deferred_delay_secs = secs;
        self
    }

    pub fn with_recent_results_capacity(mut self, capacity: usize) -> Self {
        self.recent_results_capacity = capacity;
        self
    }

    pub fn with_webhook(mut self, webhook: WebhookConfig) -> Self {
        self.webhook = Some(webhook);
        self
    }

    pub fn dedup_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.dedup_window_minutes.max(0))
    }

    pub fn deferred_delay(&self) -> Duration {
        Duration::from_secs(self.deferred_delay_secs)
    }
}

/// Outbound webhook configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,

    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per notification, including the first
    #[serde(default = "default_webhook_max_attempts")]
    pub max_attempts: u32,

    /// Lowest severity that is sent
    #[serde(default = "default_min_severity")]
    pub min_severity: Severity,
}

fn default_webhook_timeout_secs() -> u64 {
    30
}

fn default_webhook_max_attempts() -> u32 {
    3
}

fn default_min_severity() -> Severity {
    Severity::Medium
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_secs: default_webhook_timeout_secs(),
            max_attempts: default_webhook_max_attempts(),
            min_severity: default_min_severity(),
        }
    }

    /// Create configuration from environment variables
    ///
    /// Returns None if `SOLAROPS_WEBHOOK_URL` is unset or empty.
    pub fn from_env() -> Option<Self> {
        let url = env::var("SOLAROPS_WEBHOOK_URL").ok()?;
        if url.trim().is_empty() {
            return None;
        }

        let mut config = Self::new(url);
        if let Some(timeout) = env_parse("SOLAROPS_WEBHOOK_TIMEOUT_SECS") {
            config.timeout_secs = timeout;
        }
        if let Some(attempts) = env_parse("SOLAROPS_WEBHOOK_MAX_ATTEMPTS") {
            config.max_attempts = attempts;
        }
        if let Some(severity) = env::var("SOLAROPS_WEBHOOK_MIN_SEVERITY")
            .ok()
            .and_then(|v| Severity::parse(&v))
        {
            config.min_severity = severity;
        }
        Some(config)
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = severity;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.dedup_window_minutes, 15);
        assert_eq!(config.busy_threshold, 4);
        assert!(config.row_locking);
        assert_eq!(config.deferred_delay(), Duration::from_secs(3));
        assert_eq!(config.recent_results_capacity, 100);
        assert!(config.webhook.is_none());
    }

    #[test]
    fn test_builder_setters() {
        let config = EngineConfig::default()
            .with_dedup_window_minutes(30)
            .with_busy_threshold(2)
            .with_row_locking(false)
            .with_webhook(WebhookConfig::new("http://hooks.local/faults"));
        assert_eq!(config.dedup_window(), chrono::Duration::minutes(30));
        assert_eq!(config.busy_threshold, 2);
        assert!(!config.row_locking);
        assert_eq!(
            config.webhook.map(|w| w.min_severity),
            Some(Severity::Medium)
        );
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"busy_threshold": 6}"#).unwrap();
        assert_eq!(config.busy_threshold, 6);
        assert_eq!(config.dedup_window_minutes, 15);
        assert!(config.row_locking);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("TRUE"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("off"));
        assert!(!parse_flag(""));
    }
}
