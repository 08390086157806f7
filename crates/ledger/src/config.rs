//! Ledger configuration

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Budget for acquiring all account locks of one operation
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Allocation cycles over which an envelope is expected to reach its target
    #[serde(default = "default_target_horizon_cycles")]
    pub target_horizon_cycles: u32,

    /// Band around the proportional target treated as on target (percent)
    #[serde(default = "default_on_target_band_pct")]
    pub on_target_band_pct: u32,

    /// Accepted deviation of the percentage sum from 100
    #[serde(default = "default_percentage_tolerance")]
    pub percentage_tolerance: Decimal,

    /// How long a keyed request's receipt is kept for replays (seconds)
    #[serde(default = "default_idempotency_ttl_secs")]
    pub idempotency_ttl_secs: u64,
}

fn default_lock_timeout_ms() -> u64 {
    1_000
}

fn default_target_horizon_cycles() -> u32 {
    12
}

fn default_on_target_band_pct() -> u32 {
    5
}

fn default_percentage_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

fn default_idempotency_ttl_secs() -> u64 {
    24 * 60 * 60
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            target_horizon_cycles: default_target_horizon_cycles(),
            on_target_band_pct: default_on_target_band_pct(),
            percentage_tolerance: default_percentage_tolerance(),
            idempotency_ttl_secs: default_idempotency_ttl_secs(),
        }
    }
}
