// 9.0: every committed state change produces an event. used for audit trails and
// state reconstruction; the EventPayload enum lists all event types across both
// engines.

use crate::types::{AssetKind, FeedId, Identity, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // pool events
    PoolInitialized { admin: Identity },
    LiquidityAdded { user: Identity, asset: AssetKind, gross: u64, fee: u64, shares_minted: u64 },
    LiquidityRemoved { user: Identity, asset: AssetKind, shares_burned: u64, amount_out: u64 },
    AdminMoved { caller: Identity, asset: AssetKind, amount: u64, into_pool: bool },
    PoolSeeded { caller: Identity, asset: AssetKind, amount: u64 },
    PoolFeesClaimed { sol: u64, usdc: u64 },
    RewardsFunded { amount: u64, tokens_per_interval: u64 },
    RewardsClaimed { user: Identity, amount: u64 },
    PoolClosed,

    // margin events
    VaultInitialized { admin: Identity },
    MarginDeposited { owner: Identity, asset: AssetKind, amount: u64 },
    WithdrawalRequested { owner: Identity, sol: u64, usdc: u64 },
    WithdrawalCancelled { owner: Identity },
    WithdrawalExecuted { owner: Identity, sol_paid: u64, usdc_paid: u64, pnl: i64 },
    AccountLiquidated { owner: Identity, asset: AssetKind, amount: u64 },
    MarginFeesClaimed { sol: u64, usdc: u64 },
    FeedRebound { feed: FeedId },

    // shared
    AuthorityAdded { identity: Identity },
    AuthorityRemoved { identity: Identity },
    UserStateClosed { owner: Identity, forced: bool },
}

/// Append-only audit log with a retention cap. Oldest entries drop first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<Event>,
    next_id: u64,
    max_events: usize,
    pub verbose: bool,
}

impl EventLog {
    pub fn new(max_events: usize, verbose: bool) -> Self {
        Self {
            events: Vec::new(),
            next_id: 1,
            max_events,
            verbose,
        }
    }

    pub fn emit(&mut self, timestamp: Timestamp, payload: EventPayload) {
        let event = Event {
            id: EventId(self.next_id),
            timestamp,
            payload,
        };
        self.next_id += 1;

        if self.verbose {
            println!("[Event {}] {:?}", event.id.0, event.payload);
        }

        self.events.push(event);
        if self.events.len() > self.max_events {
            let drain = self.events.len() - self.max_events;
            self.events.drain(0..drain);
        }
    }

    pub fn all(&self) -> &[Event] {
        &self.events
    }

    pub fn recent(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_caps_retention() {
        let mut log = EventLog::new(2, false);
        for i in 0..4u64 {
            log.emit(
                Timestamp::from_secs(i as i64),
                EventPayload::AuthorityAdded { identity: Identity(i) },
            );
        }
        assert_eq!(log.all().len(), 2);
        // ids keep counting even after older events drop
        assert_eq!(log.all()[0].id, EventId(3));
        assert_eq!(log.recent(1)[0].id, EventId(4));
    }
}
