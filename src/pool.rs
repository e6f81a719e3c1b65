// 5.0 pool.rs: pool liquidity engine. owns the singleton PoolState and the
// per-depositor positions; mints and burns LP shares, collects the deposit fee,
// and streams time-based rewards. deposits are valued in USDC minor units: the
// SOL leg goes through the oracle, the USDC leg is 1:1.
//
// every operation validates all guards before its first mutation, so a failing
// call leaves pool state, positions, and custody untouched.

use crate::authority::{AuthorityError, AuthoritySet};
use crate::config::{deposit_fee, EngineConfig};
use crate::custody::{CustodyError, CustodyLedger, Transfer};
use crate::events::{Event, EventLog, EventPayload};
use crate::oracle::{sol_value_in_usdc, PriceOracle};
use crate::rewards::RewardSchedule;
use crate::types::{AssetKind, FeedId, Identity, SlotId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("Pool already initialized")]
    AlreadyInitialized,

    #[error("Pool not initialized")]
    NotInitialized,

    #[error("Caller is not admin or authority")]
    Unauthorized,

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: u64, available: u64 },

    #[error("No LP tokens and no pending rewards")]
    NoLpTokens,

    #[error("Account not empty")]
    AccountNotEmpty,

    #[error("No position for {0:?}")]
    UnknownPosition(Identity),

    #[error("Stale or mismatched oracle feed {0:?}")]
    StaleOrMismatchedOracleFeed(FeedId),

    #[error("Arithmetic overflow")]
    MathOverflow,

    #[error(transparent)]
    Authority(#[from] AuthorityError),

    #[error(transparent)]
    Custody(#[from] CustodyError),
}

/// Custody and oracle wiring fixed at initialize time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoolBinding {
    pub sol_vault: SlotId,
    pub usdc_vault: SlotId,
    pub reward_vault: SlotId,
    pub feed: FeedId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolState {
    pub admin: Identity,
    pub authorities: AuthoritySet,
    pub binding: PoolBinding,
    /// Outstanding LP shares (share mint supply analog).
    pub lp_supply: u64,
    /// Net-of-fee running deposit totals.
    pub sol_deposited: u64,
    pub usdc_deposited: u64,
    pub accumulated_sol_fees: u64,
    pub accumulated_usdc_fees: u64,
    pub rewards: RewardSchedule,
}

impl PoolState {
    fn is_privileged(&self, id: Identity) -> bool {
        self.admin == id || self.authorities.contains(id)
    }

    pub fn vault(&self, asset: AssetKind) -> SlotId {
        match asset {
            AssetKind::Sol => self.binding.sol_vault,
            AssetKind::Usdc => self.binding.usdc_vault,
        }
    }

    fn deposited(&self, asset: AssetKind) -> u64 {
        match asset {
            AssetKind::Sol => self.sol_deposited,
            AssetKind::Usdc => self.usdc_deposited,
        }
    }

    fn deposited_mut(&mut self, asset: AssetKind) -> &mut u64 {
        match asset {
            AssetKind::Sol => &mut self.sol_deposited,
            AssetKind::Usdc => &mut self.usdc_deposited,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserPoolPosition {
    pub lp_balance: u64,
    pub pending_rewards: u64,
    pub reward_snapshot: u128,
}

#[derive(Debug)]
pub struct PoolEngine {
    state: Option<PoolState>,
    positions: HashMap<Identity, UserPoolPosition>,
    log: EventLog,
}

impl PoolEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            state: None,
            positions: HashMap::new(),
            log: EventLog::new(config.max_events, config.verbose),
        }
    }

    pub fn state(&self) -> Option<&PoolState> {
        self.state.as_ref()
    }

    pub fn position(&self, user: Identity) -> Option<&UserPoolPosition> {
        self.positions.get(&user)
    }

    pub fn events(&self) -> &[Event] {
        self.log.all()
    }

    fn state_mut(&mut self) -> Result<&mut PoolState, PoolError> {
        self.state.as_mut().ok_or(PoolError::NotInitialized)
    }

    fn state_ref(&self) -> Result<&PoolState, PoolError> {
        self.state.as_ref().ok_or(PoolError::NotInitialized)
    }

    /// Reject a feed id that differs from the one bound at initialize, and
    /// read the current price through it.
    fn read_bound_price(
        &self,
        oracle: &dyn PriceOracle,
        presented: FeedId,
    ) -> Result<i128, PoolError> {
        let bound = self.state_ref()?.binding.feed;
        if presented != bound {
            return Err(PoolError::StaleOrMismatchedOracleFeed(presented));
        }
        let point = oracle
            .read_price(bound)
            .ok_or(PoolError::StaleOrMismatchedOracleFeed(bound))?;
        Ok(point.price)
    }

    /// Total pool valuation in USDC minor units at `price`.
    fn total_valuation(&self, price: i128) -> Result<u64, PoolError> {
        let state = self.state_ref()?;
        sol_value_in_usdc(state.sol_deposited, price)
            .checked_add(state.usdc_deposited)
            .ok_or(PoolError::MathOverflow)
    }

    /// Lazy reward accrual plus settlement of one position. Runs at the top of
    /// every mutation that touches shares, after all guards have passed.
    fn accrue_and_settle(&mut self, user: Identity, now: Timestamp) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        state.rewards.accrue(state.lp_supply, now);

        let position = self.positions.entry(user).or_default();
        let (owed, snapshot) = state
            .rewards
            .settle(position.lp_balance, position.reward_snapshot);
        position.pending_rewards = position.pending_rewards.saturating_add(owed);
        position.reward_snapshot = snapshot;
    }

    // ------------------------------------------------------------------
    // lifecycle
    // ------------------------------------------------------------------

    pub fn initialize(
        &mut self,
        admin: Identity,
        binding: PoolBinding,
        now: Timestamp,
    ) -> Result<(), PoolError> {
        if self.state.is_some() {
            return Err(PoolError::AlreadyInitialized);
        }
        self.state = Some(PoolState {
            admin,
            authorities: AuthoritySet::new(),
            binding,
            lp_supply: 0,
            sol_deposited: 0,
            usdc_deposited: 0,
            accumulated_sol_fees: 0,
            accumulated_usdc_fees: 0,
            rewards: RewardSchedule {
                last_distribution_time: now,
                ..Default::default()
            },
        });
        self.log.emit(now, EventPayload::PoolInitialized { admin });
        Ok(())
    }

    pub fn add_authority(
        &mut self,
        caller: Identity,
        identity: Identity,
        now: Timestamp,
    ) -> Result<(), PoolError> {
        let state = self.state_mut()?;
        if state.admin != caller {
            return Err(PoolError::Unauthorized);
        }
        state.authorities.add(identity)?;
        self.log.emit(now, EventPayload::AuthorityAdded { identity });
        Ok(())
    }

    pub fn remove_authority(
        &mut self,
        caller: Identity,
        identity: Identity,
        now: Timestamp,
    ) -> Result<(), PoolError> {
        let state = self.state_mut()?;
        if state.admin != caller {
            return Err(PoolError::Unauthorized);
        }
        state.authorities.remove(identity)?;
        self.log.emit(now, EventPayload::AuthorityRemoved { identity });
        Ok(())
    }

    // ------------------------------------------------------------------
    // liquidity provision
    // ------------------------------------------------------------------

    /// Deposit `amount` gross. A 0.1% fee (integer floor) accrues to the fee
    /// counter; the net remainder is valued through the oracle and minted as
    /// LP shares. Returns shares minted.
    #[allow(clippy::too_many_arguments)]
    pub fn deposit(
        &mut self,
        custody: &mut CustodyLedger,
        oracle: &dyn PriceOracle,
        user: Identity,
        user_wallet: SlotId,
        asset: AssetKind,
        amount: u64,
        feed: FeedId,
        now: Timestamp,
    ) -> Result<u64, PoolError> {
        let price = self.read_bound_price(oracle, feed)?;
        if amount == 0 {
            return Err(PoolError::InvalidAmount);
        }
        let wallet_balance = custody.balance(user_wallet);
        if wallet_balance < amount {
            return Err(PoolError::InsufficientFunds {
                requested: amount,
                available: wallet_balance,
            });
        }

        let fee = deposit_fee(amount);
        let net = amount - fee;
        let net_value = match asset {
            AssetKind::Sol => sol_value_in_usdc(net, price),
            AssetKind::Usdc => net,
        };
        // valuation snapshot before this deposit lands
        let valuation = self.total_valuation(price)?;
        let state = self.state_ref()?;
        let shares = if state.lp_supply == 0 {
            net_value
        } else {
            let minted =
                net_value as u128 * state.lp_supply as u128 / (valuation as u128).max(1);
            u64::try_from(minted).map_err(|_| PoolError::MathOverflow)?
        };
        let vault = state.vault(asset);

        // all guards passed; commit
        self.accrue_and_settle(user, now);
        custody.transfer(user_wallet, vault, amount)?;

        let state = self.state_mut()?;
        *state.deposited_mut(asset) = state
            .deposited(asset)
            .checked_add(net)
            .ok_or(PoolError::MathOverflow)?;
        let fees = match asset {
            AssetKind::Sol => &mut state.accumulated_sol_fees,
            AssetKind::Usdc => &mut state.accumulated_usdc_fees,
        };
        *fees = fees.checked_add(fee).ok_or(PoolError::MathOverflow)?;
        state.lp_supply = state
            .lp_supply
            .checked_add(shares)
            .ok_or(PoolError::MathOverflow)?;

        let position = self.positions.entry(user).or_default();
        position.lp_balance += shares;

        self.log.emit(
            now,
            EventPayload::LiquidityAdded {
                user,
                asset,
                gross: amount,
                fee,
                shares_minted: shares,
            },
        );
        Ok(shares)
    }

    /// Burn `lp_amount` shares for a pro-rata cut of the vault's custody
    /// balance in `asset`. Returns the amount paid out.
    #[allow(clippy::too_many_arguments)]
    pub fn withdraw(
        &mut self,
        custody: &mut CustodyLedger,
        oracle: &dyn PriceOracle,
        user: Identity,
        user_wallet: SlotId,
        asset: AssetKind,
        lp_amount: u64,
        feed: FeedId,
        now: Timestamp,
    ) -> Result<u64, PoolError> {
        // share pricing is valuation-sensitive: the feed binding is checked
        // even though the pro-rata payout itself needs no conversion
        self.read_bound_price(oracle, feed)?;
        if lp_amount == 0 {
            return Err(PoolError::InvalidAmount);
        }
        let lp_balance = self
            .positions
            .get(&user)
            .map(|p| p.lp_balance)
            .unwrap_or(0);
        if lp_amount > lp_balance {
            return Err(PoolError::InsufficientFunds {
                requested: lp_amount,
                available: lp_balance,
            });
        }

        let state = self.state_ref()?;
        let vault = state.vault(asset);
        let vault_balance = custody.balance(vault);
        // lp_supply >= lp_balance >= lp_amount > 0
        let amount_out =
            (lp_amount as u128 * vault_balance as u128 / state.lp_supply as u128) as u64;

        self.accrue_and_settle(user, now);
        custody.transfer(vault, user_wallet, amount_out)?;

        let state = self.state_mut()?;
        state.lp_supply -= lp_amount;
        *state.deposited_mut(asset) = state.deposited(asset).saturating_sub(amount_out);

        let position = self
            .positions
            .get_mut(&user)
            .ok_or(PoolError::UnknownPosition(user))?;
        position.lp_balance -= lp_amount;

        self.log.emit(
            now,
            EventPayload::LiquidityRemoved {
                user,
                asset,
                shares_burned: lp_amount,
                amount_out,
            },
        );
        Ok(amount_out)
    }

    // ------------------------------------------------------------------
    // privileged custody movement (settlement bridge surface)
    // ------------------------------------------------------------------

    /// Move funds into the pool vault with no share effect. Deposited counters
    /// track the movement so pool valuation absorbs it.
    pub fn admin_deposit(
        &mut self,
        custody: &mut CustodyLedger,
        caller: Identity,
        from: SlotId,
        asset: AssetKind,
        amount: u64,
        now: Timestamp,
    ) -> Result<(), PoolError> {
        let state = self.state_ref()?;
        if !state.is_privileged(caller) {
            return Err(PoolError::Unauthorized);
        }
        let vault = state.vault(asset);
        custody.transfer(from, vault, amount)?;

        let state = self.state_mut()?;
        *state.deposited_mut(asset) = state
            .deposited(asset)
            .checked_add(amount)
            .ok_or(PoolError::MathOverflow)?;

        self.log.emit(
            now,
            EventPayload::AdminMoved { caller, asset, amount, into_pool: true },
        );
        Ok(())
    }

    /// Move funds out of the pool vault with no share effect.
    pub fn admin_withdraw(
        &mut self,
        custody: &mut CustodyLedger,
        caller: Identity,
        to: SlotId,
        asset: AssetKind,
        amount: u64,
        now: Timestamp,
    ) -> Result<(), PoolError> {
        let state = self.state_ref()?;
        if !state.is_privileged(caller) {
            return Err(PoolError::Unauthorized);
        }
        let vault = state.vault(asset);
        let available = custody.balance(vault);
        if amount > available {
            return Err(PoolError::InsufficientFunds { requested: amount, available });
        }
        custody.transfer(vault, to, amount)?;

        let state = self.state_mut()?;
        *state.deposited_mut(asset) = state.deposited(asset).saturating_sub(amount);

        self.log.emit(
            now,
            EventPayload::AdminMoved { caller, asset, amount, into_pool: false },
        );
        Ok(())
    }

    /// Admin-only custody top-up with no share or fee effect (pool seeding).
    pub fn direct_deposit(
        &mut self,
        custody: &mut CustodyLedger,
        caller: Identity,
        from: SlotId,
        asset: AssetKind,
        amount: u64,
        now: Timestamp,
    ) -> Result<(), PoolError> {
        let state = self.state_ref()?;
        if state.admin != caller {
            return Err(PoolError::Unauthorized);
        }
        custody.transfer(from, state.vault(asset), amount)?;
        self.log.emit(now, EventPayload::PoolSeeded { caller, asset, amount });
        Ok(())
    }

    // ------------------------------------------------------------------
    // fees and rewards
    // ------------------------------------------------------------------

    /// Sweep both fee counters to the admin's wallets. No-op when both are
    /// already zero.
    pub fn claim_fees(
        &mut self,
        custody: &mut CustodyLedger,
        caller: Identity,
        admin_sol_wallet: SlotId,
        admin_usdc_wallet: SlotId,
        now: Timestamp,
    ) -> Result<(), PoolError> {
        let state = self.state_ref()?;
        if state.admin != caller {
            return Err(PoolError::Unauthorized);
        }
        let sol = state.accumulated_sol_fees;
        let usdc = state.accumulated_usdc_fees;
        if sol == 0 && usdc == 0 {
            return Ok(());
        }

        let batch = [
            Transfer::new(state.binding.sol_vault, admin_sol_wallet, sol),
            Transfer::new(state.binding.usdc_vault, admin_usdc_wallet, usdc),
        ];
        custody.execute_batch(&batch)?;

        let state = self.state_mut()?;
        state.accumulated_sol_fees = 0;
        state.accumulated_usdc_fees = 0;

        self.log.emit(now, EventPayload::PoolFeesClaimed { sol, usdc });
        Ok(())
    }

    /// Fund the reward vault and set the streaming rate. A rate of zero keeps
    /// the current rate and just tops the vault up.
    #[allow(clippy::too_many_arguments)]
    pub fn start_rewards(
        &mut self,
        custody: &mut CustodyLedger,
        caller: Identity,
        admin_wallet: SlotId,
        deposit_amount: u64,
        rate_per_second: u64,
        now: Timestamp,
    ) -> Result<(), PoolError> {
        let state = self.state_ref()?;
        if state.admin != caller {
            return Err(PoolError::Unauthorized);
        }
        let wallet_balance = custody.balance(admin_wallet);
        if wallet_balance < deposit_amount {
            return Err(PoolError::InsufficientFunds {
                requested: deposit_amount,
                available: wallet_balance,
            });
        }
        let reward_vault = state.binding.reward_vault;

        // settle the stream at the old rate up to now before switching
        let lp_supply = state.lp_supply;
        let state = self.state_mut()?;
        state.rewards.accrue(lp_supply, now);

        custody.transfer(admin_wallet, reward_vault, deposit_amount)?;

        let state = self.state_mut()?;
        state.rewards.total_deposited = state
            .rewards
            .total_deposited
            .checked_add(deposit_amount)
            .ok_or(PoolError::MathOverflow)?;
        if rate_per_second != 0 {
            state.rewards.tokens_per_interval = rate_per_second;
        }
        state.rewards.last_distribution_time = now;
        let tokens_per_interval = state.rewards.tokens_per_interval;

        self.log.emit(
            now,
            EventPayload::RewardsFunded { amount: deposit_amount, tokens_per_interval },
        );
        Ok(())
    }

    /// Settle and pay out the caller's pending rewards, clamped to what the
    /// reward vault still holds. Returns the amount sent.
    pub fn claim_rewards(
        &mut self,
        custody: &mut CustodyLedger,
        user: Identity,
        user_wallet: SlotId,
        now: Timestamp,
    ) -> Result<u64, PoolError> {
        let state = self.state_ref()?;
        let reward_vault = state.binding.reward_vault;
        let position = self.positions.get(&user);
        let lp_balance = position.map(|p| p.lp_balance).unwrap_or(0);
        let settled_pending = position.map(|p| p.pending_rewards).unwrap_or(0);
        if lp_balance == 0 && settled_pending == 0 {
            return Err(PoolError::NoLpTokens);
        }

        self.accrue_and_settle(user, now);

        let position = self
            .positions
            .get_mut(&user)
            .ok_or(PoolError::UnknownPosition(user))?;
        let pay = position.pending_rewards.min(custody.balance(reward_vault));
        if pay > 0 {
            custody.transfer(reward_vault, user_wallet, pay)?;
        }
        position.pending_rewards = 0;

        let state = self.state_mut()?;
        state.rewards.total_claimed = state
            .rewards
            .total_claimed
            .checked_add(pay)
            .ok_or(PoolError::MathOverflow)?;

        self.log.emit(now, EventPayload::RewardsClaimed { user, amount: pay });
        Ok(pay)
    }

    // ------------------------------------------------------------------
    // teardown
    // ------------------------------------------------------------------

    /// Tear down an empty pool. Fails `AccountNotEmpty` while any shares,
    /// deposits, fees, or positions remain.
    pub fn close_pool(&mut self, caller: Identity, now: Timestamp) -> Result<(), PoolError> {
        let state = self.state_ref()?;
        if state.admin != caller {
            return Err(PoolError::Unauthorized);
        }
        let empty = state.lp_supply == 0
            && state.sol_deposited == 0
            && state.usdc_deposited == 0
            && state.accumulated_sol_fees == 0
            && state.accumulated_usdc_fees == 0
            && self.positions.is_empty();
        if !empty {
            return Err(PoolError::AccountNotEmpty);
        }
        self.state = None;
        self.log.emit(now, EventPayload::PoolClosed);
        Ok(())
    }

    pub fn close_user_state(
        &mut self,
        caller: Identity,
        owner: Identity,
        now: Timestamp,
    ) -> Result<(), PoolError> {
        let state = self.state_ref()?;
        if state.admin != caller {
            return Err(PoolError::Unauthorized);
        }
        let position = self
            .positions
            .get(&owner)
            .ok_or(PoolError::UnknownPosition(owner))?;
        if position.lp_balance != 0 || position.pending_rewards != 0 {
            return Err(PoolError::AccountNotEmpty);
        }
        self.positions.remove(&owner);
        self.log
            .emit(now, EventPayload::UserStateClosed { owner, forced: false });
        Ok(())
    }

    pub fn force_close_user_state(
        &mut self,
        caller: Identity,
        owner: Identity,
        now: Timestamp,
    ) -> Result<(), PoolError> {
        let state = self.state_ref()?;
        if state.admin != caller {
            return Err(PoolError::Unauthorized);
        }
        self.positions
            .remove(&owner)
            .ok_or(PoolError::UnknownPosition(owner))?;
        self.log
            .emit(now, EventPayload::UserStateClosed { owner, forced: true });
        Ok(())
    }
}
