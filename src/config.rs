// 7.0 config.rs: engine knobs and named constants. the accounting ratios are
// protocol constants, not tunables; only observability settings vary by
// environment.

use serde::{Deserialize, Serialize};

/// Deposit fee is amount / FEE_DIVISOR, integer floor. 1000 = 0.1%.
pub const DEPOSIT_FEE_DIVISOR: u64 = 1_000;

/// Fixed-point scale of the pool's reward-per-share accumulator.
pub const REWARD_PRECISION: u128 = 1_000_000_000_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Echo every emitted event to stdout.
    pub verbose: bool,
    /// Audit log retention cap.
    pub max_events: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            max_events: 10_000,
        }
    }
}

impl EngineConfig {
    pub fn verbose() -> Self {
        Self {
            verbose: true,
            ..Self::default()
        }
    }
}

/// Per-deposit fee, integer floor. 2_000_000_000 lamports -> 2_000_000 fee.
pub fn deposit_fee(amount: u64) -> u64 {
    amount / DEPOSIT_FEE_DIVISOR
}
