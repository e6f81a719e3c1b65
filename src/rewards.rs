// 4.0 rewards.rs: time-based reward distribution over LP shares. a global
// per-share accumulator advances lazily whenever share state is touched; each
// position carries a snapshot of the accumulator and settles the difference
// into pending rewards before its share count changes.

use crate::config::REWARD_PRECISION;
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RewardSchedule {
    /// Reward minor units streamed per second across the whole supply.
    pub tokens_per_interval: u64,
    pub last_distribution_time: Timestamp,
    /// Monotone accumulator, scaled by REWARD_PRECISION.
    pub reward_per_share: u128,
    pub total_deposited: u64,
    pub total_claimed: u64,
}

impl RewardSchedule {
    /// Advance the accumulator to `now`. With no supply there is nothing to
    /// spread, so only the clock moves.
    pub fn accrue(&mut self, lp_supply: u64, now: Timestamp) {
        let elapsed = now.seconds_since(self.last_distribution_time);
        self.last_distribution_time = now;

        if lp_supply == 0 || elapsed == 0 || self.tokens_per_interval == 0 {
            return;
        }

        let streamed = self.tokens_per_interval as u128 * elapsed as u128;
        self.reward_per_share += streamed * REWARD_PRECISION / lp_supply as u128;
    }

    /// Reward owed to a position since its last snapshot, floored to whole
    /// minor units. The caller stores the returned snapshot.
    pub fn settle(&self, lp_balance: u64, snapshot: u128) -> (u64, u128) {
        let delta = self.reward_per_share.saturating_sub(snapshot);
        let owed = lp_balance as u128 * delta / REWARD_PRECISION;
        (owed.min(u64::MAX as u128) as u64, self.reward_per_share)
    }
}
