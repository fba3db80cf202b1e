//! DM client configuration loaded from environment variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for the send tracker and the dual-send protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmConfig {
    /// Bounded wait for each round-result query.
    /// Env: `MURMUR_ROUND_TIMEOUT_SECS`
    /// Default: 60 s
    pub round_results_timeout: Duration,

    /// Number of timed-out round-result queries after which a round is
    /// considered failed.
    /// Env: `MURMUR_MAX_ROUND_CHECKS`
    /// Default: 3
    pub max_round_checks: u32,

    /// Added to the current time for the UI timestamp of a pending send.
    pub pending_timestamp_lead: Duration,
}

impl Default for DmConfig {
    fn default() -> Self {
        Self {
            round_results_timeout: Duration::from_secs(60),
            max_round_checks: 3,
            pending_timestamp_lead: Duration::from_secs(1),
        }
    }
}

impl DmConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("MURMUR_ROUND_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.round_results_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(
                    value = %val,
                    "Invalid MURMUR_ROUND_TIMEOUT_SECS, using default"
                ),
            }
        }

        if let Ok(val) = std::env::var("MURMUR_MAX_ROUND_CHECKS") {
            match val.parse::<u32>() {
                Ok(n) if n > 0 => config.max_round_checks = n,
                _ => tracing::warn!(
                    value = %val,
                    "Invalid MURMUR_MAX_ROUND_CHECKS, using default"
                ),
            }
        }

        config
    }
}
