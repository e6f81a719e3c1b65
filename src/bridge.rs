// 6.0 bridge.rs: the settlement bridge between the margin engine and the pool.
// the margin engine never holds a PoolEngine directly; it receives a
// `&mut dyn LiquidityPool` per call, so settlement can be exercised against a
// fake pool and the two engines stay independently testable.

use crate::custody::CustodyLedger;
use crate::pool::{PoolEngine, PoolError};
use crate::types::{AssetKind, Identity, SlotId, Timestamp};

/// Capability surface the margin engine needs from a pool: privileged custody
/// movement in and out of the pool vaults, plus the probes settlement planning
/// uses before committing anything.
pub trait LiquidityPool {
    /// Whether `caller` may drive privileged pool custody movement.
    fn is_settlement_authority(&self, caller: Identity) -> bool;

    /// Current custody balance of the pool vault for `asset`.
    fn vault_balance(&self, custody: &CustodyLedger, asset: AssetKind) -> u64;

    /// Pull `amount` from `from` into the pool vault. Fails `Unauthorized`
    /// for callers outside the pool's admin/authority set.
    fn settle_in(
        &mut self,
        custody: &mut CustodyLedger,
        caller: Identity,
        from: SlotId,
        asset: AssetKind,
        amount: u64,
        now: Timestamp,
    ) -> Result<(), PoolError>;

    /// Push `amount` from the pool vault to `to`. Fails `InsufficientFunds`
    /// when the vault cannot cover it.
    fn settle_out(
        &mut self,
        custody: &mut CustodyLedger,
        caller: Identity,
        to: SlotId,
        asset: AssetKind,
        amount: u64,
        now: Timestamp,
    ) -> Result<(), PoolError>;
}

impl LiquidityPool for PoolEngine {
    fn is_settlement_authority(&self, caller: Identity) -> bool {
        self.state()
            .map(|s| s.admin == caller || s.authorities.contains(caller))
            .unwrap_or(false)
    }

    fn vault_balance(&self, custody: &CustodyLedger, asset: AssetKind) -> u64 {
        self.state()
            .map(|s| custody.balance(s.vault(asset)))
            .unwrap_or(0)
    }

    fn settle_in(
        &mut self,
        custody: &mut CustodyLedger,
        caller: Identity,
        from: SlotId,
        asset: AssetKind,
        amount: u64,
        now: Timestamp,
    ) -> Result<(), PoolError> {
        self.admin_deposit(custody, caller, from, asset, amount, now)
    }

    fn settle_out(
        &mut self,
        custody: &mut CustodyLedger,
        caller: Identity,
        to: SlotId,
        asset: AssetKind,
        amount: u64,
        now: Timestamp,
    ) -> Result<(), PoolError> {
        self.admin_withdraw(custody, caller, to, asset, amount, now)
    }
}

/// Pool stand-in for settlement tests: two bare vault slots and a flat
/// authority list, no shares, no fees.
#[derive(Debug, Clone)]
pub struct FakePool {
    pub sol_vault: SlotId,
    pub usdc_vault: SlotId,
    pub authorities: Vec<Identity>,
}

impl FakePool {
    pub fn new(sol_vault: SlotId, usdc_vault: SlotId) -> Self {
        Self {
            sol_vault,
            usdc_vault,
            authorities: Vec::new(),
        }
    }

    pub fn with_authority(mut self, id: Identity) -> Self {
        self.authorities.push(id);
        self
    }

    fn vault(&self, asset: AssetKind) -> SlotId {
        match asset {
            AssetKind::Sol => self.sol_vault,
            AssetKind::Usdc => self.usdc_vault,
        }
    }
}

impl LiquidityPool for FakePool {
    fn is_settlement_authority(&self, caller: Identity) -> bool {
        self.authorities.contains(&caller)
    }

    fn vault_balance(&self, custody: &CustodyLedger, asset: AssetKind) -> u64 {
        custody.balance(self.vault(asset))
    }

    fn settle_in(
        &mut self,
        custody: &mut CustodyLedger,
        caller: Identity,
        from: SlotId,
        asset: AssetKind,
        amount: u64,
        _now: Timestamp,
    ) -> Result<(), PoolError> {
        if !self.is_settlement_authority(caller) {
            return Err(PoolError::Unauthorized);
        }
        custody.transfer(from, self.vault(asset), amount)?;
        Ok(())
    }

    fn settle_out(
        &mut self,
        custody: &mut CustodyLedger,
        caller: Identity,
        to: SlotId,
        asset: AssetKind,
        amount: u64,
        _now: Timestamp,
    ) -> Result<(), PoolError> {
        if !self.is_settlement_authority(caller) {
            return Err(PoolError::Unauthorized);
        }
        let vault = self.vault(asset);
        let available = custody.balance(vault);
        if amount > available {
            return Err(PoolError::InsufficientFunds {
                requested: amount,
                available,
            });
        }
        custody.transfer(vault, to, amount)?;
        Ok(())
    }
}
