//! Configuration types for the ledger.
//!
//! Every field has a default, so a JSON document only needs the values it
//! overrides:
//!
//! ```rust
//! use confession_ledger::LedgerConfig;
//!
//! let config = LedgerConfig::from_json(r#"{"rate_limit": {"quota": 10}}"#).unwrap();
//! assert_eq!(config.rate_limit.quota, 10);
//! assert_eq!(config.rate_limit.window_ms, 60_000);
//! ```

use std::collections::HashSet;
use std::time::Duration;

use confession_ledger_core::{KeccakHash, ZERO_HASH};
use serde::Deserialize;

use crate::error::ConfigError;

/// Runtime configuration for the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Time between scheduled seals.
    pub block_interval_ms: u64,

    /// Upper bound on submissions sealed into one block.
    pub max_submissions_per_block: usize,

    /// Per-identity admission limits.
    pub rate_limit: RateLimitConfig,

    /// Maximum content length, in characters.
    pub max_content_length: usize,

    /// `prev_hash` of block 1.
    pub genesis_hash: KeccakHash,

    /// Allowed categories. A submission without a category is always allowed.
    pub categories: Vec<String>,

    /// Bound on a single anchor publish.
    pub anchor_timeout_ms: u64,

    /// Seal a block even when the mempool is empty (false = skip the tick).
    pub seal_empty_blocks: bool,

    /// Buffer size of the event channel.
    pub event_capacity: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            block_interval_ms: 60_000,
            max_submissions_per_block: 100,
            rate_limit: RateLimitConfig::default(),
            max_content_length: 1_000,
            genesis_hash: ZERO_HASH,
            categories: ["confession", "secret", "regret", "gratitude", "other"]
                .into_iter()
                .map(String::from)
                .collect(),
            anchor_timeout_ms: 10_000,
            seal_empty_blocks: true,
            event_capacity: 1_024,
        }
    }
}

impl LedgerConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("block_interval_ms", self.block_interval_ms),
            (
                "max_submissions_per_block",
                self.max_submissions_per_block as u64,
            ),
            ("rate_limit.window_ms", self.rate_limit.window_ms),
            ("rate_limit.quota", u64::from(self.rate_limit.quota)),
            (
                "rate_limit.sweep_interval_ms",
                self.rate_limit.sweep_interval_ms,
            ),
            ("max_content_length", self.max_content_length as u64),
            ("anchor_timeout_ms", self.anchor_timeout_ms),
            ("event_capacity", self.event_capacity as u64),
        ];
        if let Some((field, _)) = non_zero.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Zero(*field));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = self.categories.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(ConfigError::DuplicateCategory(dup.clone()));
        }

        Ok(())
    }

    pub fn block_interval(&self) -> Duration {
        Duration::from_millis(self.block_interval_ms)
    }

    pub fn anchor_timeout(&self) -> Duration {
        Duration::from_millis(self.anchor_timeout_ms)
    }
}

/// Fixed-window admission limits.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub window_ms: u64,

    /// Admissions allowed per identity per window.
    pub quota: u32,

    /// How often expired windows are dropped.
    pub sweep_interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            quota: 5,
            sweep_interval_ms: 300_000,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}
