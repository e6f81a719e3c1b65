// 3.0 custody.rs: the token-custody transfer primitive. every balance the system
// touches lives in a slot: engine vaults, reward vaults, and user wallets alike.
// a transfer is an atomic debit/credit pair; a batch is validated against
// projected balances in full before any entry is applied, so a failing batch
// leaves the ledger untouched.

use crate::types::SlotId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CustodyError {
    #[error("Insufficient funds in slot {slot:?}: requested {requested}, available {available}")]
    InsufficientFunds {
        slot: SlotId,
        requested: u64,
        available: u64,
    },

    #[error("Balance overflow in slot {0:?}")]
    BalanceOverflow(SlotId),
}

/// One custody movement. Batches of these commit atomically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: SlotId,
    pub to: SlotId,
    pub amount: u64,
}

impl Transfer {
    pub fn new(from: SlotId, to: SlotId, amount: u64) -> Self {
        Self { from, to, amount }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustodyLedger {
    balances: HashMap<SlotId, u64>,
}

impl CustodyLedger {
    pub fn new() -> Self {
        Self { balances: HashMap::new() }
    }

    /// Balance of a slot. Unknown slots read as zero.
    pub fn balance(&self, slot: SlotId) -> u64 {
        self.balances.get(&slot).copied().unwrap_or(0)
    }

    /// Mint into a slot. Used for seeding external wallets in tests and
    /// simulations; engine code only moves existing balances.
    pub fn credit(&mut self, slot: SlotId, amount: u64) -> Result<(), CustodyError> {
        let balance = self.balances.entry(slot).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(CustodyError::BalanceOverflow(slot))?;
        Ok(())
    }

    /// Atomic single transfer.
    pub fn transfer(&mut self, from: SlotId, to: SlotId, amount: u64) -> Result<(), CustodyError> {
        self.execute_batch(&[Transfer::new(from, to, amount)])
    }

    /// Validate every entry against projected balances, then apply all of them.
    /// Either the whole batch lands or none of it does.
    pub fn execute_batch(&mut self, transfers: &[Transfer]) -> Result<(), CustodyError> {
        let mut projected: HashMap<SlotId, u64> = HashMap::new();

        for t in transfers {
            let from_balance = *projected
                .entry(t.from)
                .or_insert_with(|| self.balance(t.from));
            if from_balance < t.amount {
                return Err(CustodyError::InsufficientFunds {
                    slot: t.from,
                    requested: t.amount,
                    available: from_balance,
                });
            }
            projected.insert(t.from, from_balance - t.amount);

            let to_balance = *projected.entry(t.to).or_insert_with(|| self.balance(t.to));
            let credited = to_balance
                .checked_add(t.amount)
                .ok_or(CustodyError::BalanceOverflow(t.to))?;
            projected.insert(t.to, credited);
        }

        for (slot, balance) in projected {
            self.balances.insert(slot, balance);
        }
        Ok(())
    }

    /// Whether `slot` could fund every debit in `transfers` given current state.
    /// Used by planning code that must reject before any mutation happens.
    pub fn can_execute(&self, transfers: &[Transfer]) -> bool {
        let mut probe = self.clone();
        probe.execute_batch(transfers).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger_with(slot: SlotId, amount: u64) -> CustodyLedger {
        let mut ledger = CustodyLedger::new();
        ledger.credit(slot, amount).unwrap();
        ledger
    }

    #[test]
    fn transfer_moves_balance() {
        let a = SlotId(1);
        let b = SlotId(2);
        let mut ledger = ledger_with(a, 1_000);

        ledger.transfer(a, b, 400).unwrap();
        assert_eq!(ledger.balance(a), 600);
        assert_eq!(ledger.balance(b), 400);
    }

    #[test]
    fn overdraw_fails_and_leaves_state() {
        let a = SlotId(1);
        let b = SlotId(2);
        let mut ledger = ledger_with(a, 100);

        let err = ledger.transfer(a, b, 101).unwrap_err();
        assert!(matches!(err, CustodyError::InsufficientFunds { .. }));
        assert_eq!(ledger.balance(a), 100);
        assert_eq!(ledger.balance(b), 0);
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let a = SlotId(1);
        let b = SlotId(2);
        let c = SlotId(3);
        let mut ledger = ledger_with(a, 100);

        // second entry overdraws b even though the first funds it partially
        let batch = [Transfer::new(a, b, 50), Transfer::new(b, c, 60)];
        assert!(ledger.execute_batch(&batch).is_err());
        assert_eq!(ledger.balance(a), 100);
        assert_eq!(ledger.balance(b), 0);
        assert_eq!(ledger.balance(c), 0);
    }

    #[test]
    fn batch_sees_earlier_credits() {
        let a = SlotId(1);
        let b = SlotId(2);
        let c = SlotId(3);
        let mut ledger = ledger_with(a, 100);

        // b starts empty but the first leg funds the second
        let batch = [Transfer::new(a, b, 60), Transfer::new(b, c, 60)];
        ledger.execute_batch(&batch).unwrap();
        assert_eq!(ledger.balance(a), 40);
        assert_eq!(ledger.balance(b), 0);
        assert_eq!(ledger.balance(c), 60);
    }
}
