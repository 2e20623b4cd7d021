//! Ledger configuration with TOML file support.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::{LedgerError, LedgerResult};

/// Precision used when comparing report bounds against entry timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateGranularity {
    /// Compare full timestamps
    #[default]
    Instant,
    /// Truncate both bounds to UTC midnight before comparing
    Day,
}

impl DateGranularity {
    /// Apply the granularity to a report bound
    pub fn truncate(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            DateGranularity::Instant => instant,
            DateGranularity::Day => instant
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .map(|midnight| midnight.and_utc())
                .unwrap_or(instant),
        }
    }
}

/// Configuration for a [`Ledger`](crate::Ledger).
///
/// Can be loaded from a TOML file via [`LedgerConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// How long an operation may wait for its account locks, in milliseconds.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Initial allocation for report results.
    #[serde(default = "default_report_capacity")]
    pub report_capacity: usize,

    /// Report bound precision.
    #[serde(default)]
    pub date_granularity: DateGranularity,

    /// Longest accepted account name, in characters.
    #[serde(default = "default_max_name_len")]
    pub max_name_len: usize,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_lock_timeout_ms() -> u64 {
    5_000
}

fn default_report_capacity() -> usize {
    100
}

fn default_max_name_len() -> usize {
    100
}

// ── Impl ───────────────────────────────────────────────────────────────

impl LedgerConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> LedgerResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| LedgerError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> LedgerResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| LedgerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> LedgerResult<String> {
        toml::to_string_pretty(self).map_err(|e| LedgerError::Config(e.to_string()))
    }

    /// Lock acquisition budget as a [`Duration`].
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Reject settings under which the ledger cannot operate.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.lock_timeout_ms == 0 {
            return Err(LedgerError::Config(
                "lock_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_name_len == 0 {
            return Err(LedgerError::Config(
                "max_name_len must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            report_capacity: default_report_capacity(),
            date_granularity: DateGranularity::default(),
            max_name_len: default_max_name_len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = LedgerConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        let parsed = LedgerConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = LedgerConfig::from_toml_str("").unwrap();
        assert_eq!(config.lock_timeout(), Duration::from_secs(5));
        assert_eq!(config.report_capacity, 100);
        assert_eq!(config.date_granularity, DateGranularity::Instant);
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            lock_timeout_ms = 250
            date_granularity = "day"
        "#;
        let config = LedgerConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.lock_timeout_ms, 250);
        assert_eq!(config.date_granularity, DateGranularity::Day);
        assert_eq!(config.max_name_len, 100);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(matches!(
            LedgerConfig::from_toml_str("lock_timeout_ms = 0"),
            Err(LedgerError::Config(_))
        ));
    }

    #[test]
    fn day_granularity_truncates_to_midnight() {
        let instant = Utc.with_ymd_and_hms(2024, 3, 9, 17, 45, 12).unwrap();
        assert_eq!(
            DateGranularity::Day.truncate(instant),
            Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap()
        );
        assert_eq!(DateGranularity::Instant.truncate(instant), instant);
    }
}
