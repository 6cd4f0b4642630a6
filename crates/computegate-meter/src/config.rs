//! Meter tuning

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retries of transient balance-read failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 disables retrying)
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Cap on the doubled delay
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryConfig {
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// How the meter bounds and orders its ledger calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterConfig {
    /// Bound on each balance read
    pub balance_timeout: Duration,
    /// Outer bound on a charge, including its confirmation wait
    pub charge_timeout: Duration,
    pub balance_retry: RetryConfig,
    /// Serialize `authorize` calls for the same requester
    pub serialize_per_requester: bool,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            balance_timeout: Duration::from_secs(15),
            charge_timeout: Duration::from_secs(90),
            balance_retry: RetryConfig::default(),
            serialize_per_requester: false,
        }
    }
}

/// File/env representation of [`MeterConfig`], durations in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterSettings {
    #[serde(default = "default_balance_timeout_ms")]
    pub balance_timeout_ms: u64,

    #[serde(default = "default_charge_timeout_ms")]
    pub charge_timeout_ms: u64,

    #[serde(default = "default_balance_retries")]
    pub balance_retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default)]
    pub serialize_per_requester: bool,
}

impl Default for MeterSettings {
    fn default() -> Self {
        Self {
            balance_timeout_ms: default_balance_timeout_ms(),
            charge_timeout_ms: default_charge_timeout_ms(),
            balance_retries: default_balance_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            serialize_per_requester: false,
        }
    }
}

impl From<&MeterSettings> for MeterConfig {
    fn from(settings: &MeterSettings) -> Self {
        Self {
            balance_timeout: Duration::from_millis(settings.balance_timeout_ms),
            charge_timeout: Duration::from_millis(settings.charge_timeout_ms),
            balance_retry: RetryConfig {
                max_retries: settings.balance_retries,
                initial_backoff: Duration::from_millis(settings.retry_backoff_ms),
                max_backoff: Duration::from_millis(settings.max_backoff_ms),
            },
            serialize_per_requester: settings.serialize_per_requester,
        }
    }
}

fn default_balance_timeout_ms() -> u64 {
    15_000
}

fn default_charge_timeout_ms() -> u64 {
    90_000
}

fn default_balance_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    2_000
}
