use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::identity::PLACEHOLDER_ID_THRESHOLD;

/// Whether a run is wrapped in a store transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionMode {
    /// Independent store calls; successful writes stand even if others fail.
    BestEffort,
    /// All-or-nothing; requires a transactional store.
    Atomic,
    /// Transaction when the store supports one, rolled back only on a fatal
    /// error. Partial failures are committed alongside the successful writes.
    #[default]
    Auto,
}

impl TransactionMode {
    /// Whether a run with non-fatal failures still keeps its successful writes.
    pub fn keeps_partial_results(self) -> bool {
        !matches!(self, Self::Atomic)
    }
}

impl FromStr for TransactionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "best-effort" | "best_effort" | "besteffort" => Ok(Self::BestEffort),
            "atomic" => Ok(Self::Atomic),
            "auto" => Ok(Self::Auto),
            other => Err(format!(
                "transaction mode must be one of: best-effort, atomic, auto (got '{}')",
                other
            )),
        }
    }
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BestEffort => "best-effort",
            Self::Atomic => "atomic",
            Self::Auto => "auto",
        };
        f.write_str(s)
    }
}

/// Reconciliation settings
///
/// # Examples
///
/// ```
/// use orgsync::{ReconcileConfig, TransactionMode};
///
/// let config = ReconcileConfig::new()
///     .fan_out(4)
///     .transaction_mode(TransactionMode::BestEffort);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Maximum concurrent store calls within one stage
    pub fan_out: usize,

    pub transaction_mode: TransactionMode,

    /// Per-call deadline applied by the `Reconciler` to every store call
    pub store_timeout: Option<Duration>,

    /// Smallest numeric id treated as a client placeholder
    pub placeholder_threshold: i64,
}

impl ReconcileConfig {
    pub fn new() -> Self {
        Self {
            fan_out: 8,
            transaction_mode: TransactionMode::Auto,
            store_timeout: None,
            placeholder_threshold: PLACEHOLDER_ID_THRESHOLD,
        }
    }

    /// Read overrides from `ORGSYNC_FAN_OUT`, `ORGSYNC_TRANSACTION_MODE`
    /// and `ORGSYNC_STORE_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self, String> {
        let mut config = Self::new();

        if let Ok(raw) = env::var("ORGSYNC_FAN_OUT") {
            config.fan_out = raw
                .parse()
                .map_err(|_| "ORGSYNC_FAN_OUT must be a positive integer".to_string())?;
        }
        if let Ok(raw) = env::var("ORGSYNC_TRANSACTION_MODE") {
            config.transaction_mode = raw.parse()?;
        }
        if let Ok(raw) = env::var("ORGSYNC_STORE_TIMEOUT_MS") {
            let ms: u64 = raw
                .parse()
                .map_err(|_| "ORGSYNC_STORE_TIMEOUT_MS must be milliseconds".to_string())?;
            config.store_timeout = Some(Duration::from_millis(ms));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = fan_out;
        self
    }

    pub fn transaction_mode(mut self, mode: TransactionMode) -> Self {
        self.transaction_mode = mode;
        self
    }

    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = Some(timeout);
        self
    }

    pub fn placeholder_threshold(mut self, threshold: i64) -> Self {
        self.placeholder_threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.fan_out == 0 {
            return Err("fan_out must be > 0".to_string());
        }

        if self.placeholder_threshold <= 1 {
            return Err("placeholder_threshold must be > 1".to_string());
        }

        if self.store_timeout.is_some_and(|t| t.is_zero()) {
            return Err("store_timeout cannot be zero".to_string());
        }

        Ok(())
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReconcileConfig::default();
        assert_eq!(config.fan_out, 8);
        assert_eq!(config.transaction_mode, TransactionMode::Auto);
        assert_eq!(config.placeholder_threshold, 1_000_000_000_000);
        assert!(config.store_timeout.is_none());
    }

    #[test]
    fn test_builder_pattern() {
        let config = ReconcileConfig::new()
            .fan_out(2)
            .transaction_mode(TransactionMode::Atomic)
            .store_timeout(Duration::from_millis(250));

        assert_eq!(config.fan_out, 2);
        assert_eq!(config.transaction_mode, TransactionMode::Atomic);
        assert_eq!(config.store_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_validate() {
        assert!(ReconcileConfig::new().validate().is_ok());
        assert!(ReconcileConfig::new().fan_out(0).validate().is_err());
        assert!(ReconcileConfig::new().placeholder_threshold(0).validate().is_err());
        assert!(
            ReconcileConfig::new()
                .store_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_transaction_mode_parse() {
        assert_eq!("atomic".parse::<TransactionMode>(), Ok(TransactionMode::Atomic));
        assert_eq!("Best-Effort".parse::<TransactionMode>(), Ok(TransactionMode::BestEffort));
        assert!("sometimes".parse::<TransactionMode>().is_err());
    }

    #[test]
    fn test_only_atomic_discards_partial_results() {
        assert!(TransactionMode::Auto.keeps_partial_results());
        assert!(TransactionMode::BestEffort.keeps_partial_results());
        assert!(!TransactionMode::Atomic.keeps_partial_results());
    }
}
