// 7.0 margin.rs: margin custody accounting. per-user SOL/USDC margin balances,
// timelocked withdrawal requests, and the settlement paths that cross into the
// pool through the LiquidityPool bridge. deposits are permissionless; execution
// and liquidation are authority-only.

use crate::authority::{AuthorityError, AuthoritySet};
use crate::bridge::LiquidityPool;
use crate::config::EngineConfig;
use crate::custody::{CustodyError, CustodyLedger, Transfer};
use crate::events::{Event, EventLog, EventPayload};
use crate::oracle::PriceOracle;
use crate::settlement::{plan_withdrawal, LegParams, SettlementError};
use crate::types::{AssetKind, FeedId, Identity, SlotId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Seconds a withdrawal request must age before an authority may execute it.
pub const DEFAULT_WITHDRAWAL_TIMELOCK_SECS: i64 = 3_600;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MarginError {
    #[error("Vault already initialized")]
    AlreadyInitialized,

    #[error("Vault not initialized")]
    NotInitialized,

    #[error("Caller may not act on this account")]
    Unauthorized,

    #[error("Caller may not execute settlement")]
    UnauthorizedExecution,

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Custody slot does not match the vault")]
    InvalidCustody,

    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: u64, available: u64 },

    #[error("A withdrawal request is already pending")]
    ExistingWithdrawalRequest,

    #[error("No withdrawal request is pending")]
    NoPendingWithdrawal,

    #[error("Withdrawal timelock has not elapsed")]
    TimelockNotElapsed,

    #[error("Account not empty")]
    AccountNotEmpty,

    #[error("No margin account for {0:?}")]
    UnknownAccount(Identity),

    #[error("Stale or mismatched oracle feed {0:?}")]
    StaleOrMismatchedOracleFeed(FeedId),

    #[error("Arithmetic overflow")]
    MathOverflow,

    #[error(transparent)]
    Authority(#[from] AuthorityError),

    #[error(transparent)]
    Custody(#[from] CustodyError),

    #[error(transparent)]
    Pool(#[from] crate::pool::PoolError),

    #[error(transparent)]
    Settlement(#[from] SettlementError),
}

/// Custody and oracle wiring fixed at initialize time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarginBinding {
    pub sol_vault: SlotId,
    pub usdc_vault: SlotId,
    pub feed: FeedId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginVault {
    pub admin: Identity,
    pub authorities: AuthoritySet,
    pub binding: MarginBinding,
    pub timelock_secs: i64,
    pub accumulated_sol_fees: u64,
    pub accumulated_usdc_fees: u64,
}

impl MarginVault {
    pub fn vault(&self, asset: AssetKind) -> SlotId {
        match asset {
            AssetKind::Sol => self.binding.sol_vault,
            AssetKind::Usdc => self.binding.usdc_vault,
        }
    }

    fn is_privileged(&self, id: Identity) -> bool {
        self.admin == id || self.authorities.contains(id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarginAccount {
    pub sol_balance: u64,
    pub usdc_balance: u64,
    pub pending_sol_withdrawal: u64,
    pub pending_usdc_withdrawal: u64,
    pub last_withdrawal_request: Timestamp,
}

impl MarginAccount {
    pub fn balance(&self, asset: AssetKind) -> u64 {
        match asset {
            AssetKind::Sol => self.sol_balance,
            AssetKind::Usdc => self.usdc_balance,
        }
    }

    pub fn has_pending_withdrawal(&self) -> bool {
        self.pending_sol_withdrawal != 0 || self.pending_usdc_withdrawal != 0
    }

    fn clear_pending(&mut self) {
        self.pending_sol_withdrawal = 0;
        self.pending_usdc_withdrawal = 0;
    }
}

/// Authority-supplied settlement terms for one execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionParams {
    /// Realized PnL in USDC minor units, positive in the account's favor.
    pub pnl: i64,
    pub locked_sol: u64,
    pub locked_usdc: u64,
    pub sol_fee: u64,
    pub usdc_fee: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawalOutcome {
    pub sol_paid: u64,
    pub usdc_paid: u64,
    pub pnl: i64,
}

#[derive(Debug)]
pub struct MarginEngine {
    vault: Option<MarginVault>,
    accounts: HashMap<Identity, MarginAccount>,
    log: EventLog,
}

impl MarginEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            vault: None,
            accounts: HashMap::new(),
            log: EventLog::new(config.max_events, config.verbose),
        }
    }

    pub fn vault(&self) -> Option<&MarginVault> {
        self.vault.as_ref()
    }

    pub fn account(&self, owner: Identity) -> Option<&MarginAccount> {
        self.accounts.get(&owner)
    }

    pub fn events(&self) -> &[Event] {
        self.log.all()
    }

    fn vault_ref(&self) -> Result<&MarginVault, MarginError> {
        self.vault.as_ref().ok_or(MarginError::NotInitialized)
    }

    fn vault_mut(&mut self) -> Result<&mut MarginVault, MarginError> {
        self.vault.as_mut().ok_or(MarginError::NotInitialized)
    }

    fn account_ref(&self, owner: Identity) -> Result<&MarginAccount, MarginError> {
        self.accounts
            .get(&owner)
            .ok_or(MarginError::UnknownAccount(owner))
    }

    fn check_feed(&self, oracle: &dyn PriceOracle, presented: FeedId) -> Result<i128, MarginError> {
        let bound = self.vault_ref()?.binding.feed;
        if presented != bound {
            return Err(MarginError::StaleOrMismatchedOracleFeed(presented));
        }
        let point = oracle
            .read_price(bound)
            .ok_or(MarginError::StaleOrMismatchedOracleFeed(bound))?;
        Ok(point.price)
    }

    // ------------------------------------------------------------------
    // lifecycle
    // ------------------------------------------------------------------

    pub fn initialize(
        &mut self,
        admin: Identity,
        binding: MarginBinding,
        timelock_secs: i64,
        now: Timestamp,
    ) -> Result<(), MarginError> {
        if self.vault.is_some() {
            return Err(MarginError::AlreadyInitialized);
        }
        self.vault = Some(MarginVault {
            admin,
            authorities: AuthoritySet::new(),
            binding,
            timelock_secs,
            accumulated_sol_fees: 0,
            accumulated_usdc_fees: 0,
        });
        self.log.emit(now, EventPayload::VaultInitialized { admin });
        Ok(())
    }

    pub fn add_authority(
        &mut self,
        caller: Identity,
        identity: Identity,
        now: Timestamp,
    ) -> Result<(), MarginError> {
        let vault = self.vault_mut()?;
        if vault.admin != caller {
            return Err(MarginError::Unauthorized);
        }
        vault.authorities.add(identity)?;
        self.log.emit(now, EventPayload::AuthorityAdded { identity });
        Ok(())
    }

    pub fn remove_authority(
        &mut self,
        caller: Identity,
        identity: Identity,
        now: Timestamp,
    ) -> Result<(), MarginError> {
        let vault = self.vault_mut()?;
        if vault.admin != caller {
            return Err(MarginError::Unauthorized);
        }
        vault.authorities.remove(identity)?;
        self.log.emit(now, EventPayload::AuthorityRemoved { identity });
        Ok(())
    }

    /// Rotate the bound oracle feed. Recovery path for a feed that has gone
    /// dead; valuation-sensitive operations check against the new binding
    /// from the next call on.
    pub fn update_feed_binding(
        &mut self,
        caller: Identity,
        new_feed: FeedId,
        now: Timestamp,
    ) -> Result<(), MarginError> {
        let vault = self.vault_mut()?;
        if !vault.is_privileged(caller) {
            return Err(MarginError::Unauthorized);
        }
        vault.binding.feed = new_feed;
        self.log.emit(now, EventPayload::FeedRebound { feed: new_feed });
        Ok(())
    }

    // ------------------------------------------------------------------
    // deposits and requests
    // ------------------------------------------------------------------

    /// Deposit margin. The caller must name the vault slot it believes it is
    /// paying into; a mismatch is rejected rather than silently redirected.
    #[allow(clippy::too_many_arguments)]
    pub fn deposit(
        &mut self,
        custody: &mut CustodyLedger,
        owner: Identity,
        from_wallet: SlotId,
        claimed_vault: SlotId,
        asset: AssetKind,
        amount: u64,
        now: Timestamp,
    ) -> Result<(), MarginError> {
        let vault = self.vault_ref()?;
        if amount == 0 {
            return Err(MarginError::InvalidAmount);
        }
        let expected = vault.vault(asset);
        if claimed_vault != expected {
            return Err(MarginError::InvalidCustody);
        }
        let wallet_balance = custody.balance(from_wallet);
        if wallet_balance < amount {
            return Err(MarginError::InsufficientFunds {
                requested: amount,
                available: wallet_balance,
            });
        }

        custody.transfer(from_wallet, expected, amount)?;

        let account = self.accounts.entry(owner).or_default();
        let balance = match asset {
            AssetKind::Sol => &mut account.sol_balance,
            AssetKind::Usdc => &mut account.usdc_balance,
        };
        *balance = balance
            .checked_add(amount)
            .ok_or(MarginError::MathOverflow)?;

        self.log
            .emit(now, EventPayload::MarginDeposited { owner, asset, amount });
        Ok(())
    }

    /// File a withdrawal request and start the timelock. Requesting (0, 0)
    /// clears any pending request instead.
    pub fn request_withdrawal(
        &mut self,
        owner: Identity,
        sol: u64,
        usdc: u64,
        now: Timestamp,
    ) -> Result<(), MarginError> {
        self.vault_ref()?;
        let account = self
            .accounts
            .get_mut(&owner)
            .ok_or(MarginError::UnknownAccount(owner))?;

        if sol == 0 && usdc == 0 {
            account.clear_pending();
            self.log.emit(now, EventPayload::WithdrawalCancelled { owner });
            return Ok(());
        }
        if account.has_pending_withdrawal() {
            return Err(MarginError::ExistingWithdrawalRequest);
        }

        account.pending_sol_withdrawal = sol;
        account.pending_usdc_withdrawal = usdc;
        account.last_withdrawal_request = now;

        self.log
            .emit(now, EventPayload::WithdrawalRequested { owner, sol, usdc });
        Ok(())
    }

    /// Drop a pending request. The owner or any authority may cancel.
    pub fn cancel_withdrawal(
        &mut self,
        caller: Identity,
        owner: Identity,
        now: Timestamp,
    ) -> Result<(), MarginError> {
        let vault = self.vault_ref()?;
        if caller != owner && !vault.is_privileged(caller) {
            return Err(MarginError::Unauthorized);
        }
        let account = self
            .accounts
            .get_mut(&owner)
            .ok_or(MarginError::UnknownAccount(owner))?;
        account.clear_pending();
        self.log.emit(now, EventPayload::WithdrawalCancelled { owner });
        Ok(())
    }

    // ------------------------------------------------------------------
    // settlement
    // ------------------------------------------------------------------

    /// Execute a matured withdrawal request: settle fees and PnL against the
    /// pool, then pay out what the account can cover. Validation runs over a
    /// full plan before the first movement, so a rejected execution leaves
    /// every balance untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn execute_withdrawal(
        &mut self,
        custody: &mut CustodyLedger,
        pool: &mut dyn LiquidityPool,
        oracle: &dyn PriceOracle,
        caller: Identity,
        owner: Identity,
        sol_wallet: SlotId,
        usdc_wallet: SlotId,
        params: ExecutionParams,
        feed: FeedId,
        now: Timestamp,
    ) -> Result<WithdrawalOutcome, MarginError> {
        let vault = self.vault_ref()?;
        if !vault.is_privileged(caller) || !pool.is_settlement_authority(caller) {
            return Err(MarginError::UnauthorizedExecution);
        }
        let account = self.account_ref(owner)?;
        if !account.has_pending_withdrawal() {
            return Err(MarginError::NoPendingWithdrawal);
        }
        let matured = account.last_withdrawal_request.plus_secs(vault.timelock_secs);
        if now < matured {
            return Err(MarginError::TimelockNotElapsed);
        }
        let price = self.check_feed(oracle, feed)?;

        let vault = self.vault_ref()?;
        let account = self.account_ref(owner)?;
        let sol_vault = vault.binding.sol_vault;
        let usdc_vault = vault.binding.usdc_vault;
        let plan = plan_withdrawal(
            LegParams {
                asset: AssetKind::Sol,
                balance: account.sol_balance,
                pending: account.pending_sol_withdrawal,
                locked: params.locked_sol,
                fee: params.sol_fee,
                vault_custody: custody.balance(sol_vault),
                pool_custody: pool.vault_balance(custody, AssetKind::Sol),
            },
            LegParams {
                asset: AssetKind::Usdc,
                balance: account.usdc_balance,
                pending: account.pending_usdc_withdrawal,
                locked: params.locked_usdc,
                fee: params.usdc_fee,
                vault_custody: custody.balance(usdc_vault),
                pool_custody: pool.vault_balance(custody, AssetKind::Usdc),
            },
            params.pnl,
            price,
        )?;

        // plan validated; commit pool legs first so the vault can cover payouts
        for (leg, vault_slot, wallet) in [
            (&plan.sol, sol_vault, sol_wallet),
            (&plan.usdc, usdc_vault, usdc_wallet),
        ] {
            let inflow = leg.pool_outflow();
            if inflow > 0 {
                pool.settle_out(custody, caller, vault_slot, leg.asset, inflow, now)?;
            }
            if leg.pnl_debit > 0 {
                pool.settle_in(custody, caller, vault_slot, leg.asset, leg.pnl_debit, now)?;
            }
            if leg.payout > 0 {
                custody.execute_batch(&[Transfer::new(vault_slot, wallet, leg.payout)])?;
            }
        }

        let vault = self.vault_mut()?;
        vault.accumulated_sol_fees = vault
            .accumulated_sol_fees
            .checked_add(plan.sol.fee)
            .ok_or(MarginError::MathOverflow)?;
        vault.accumulated_usdc_fees = vault
            .accumulated_usdc_fees
            .checked_add(plan.usdc.fee)
            .ok_or(MarginError::MathOverflow)?;

        let account = self
            .accounts
            .get_mut(&owner)
            .ok_or(MarginError::UnknownAccount(owner))?;
        account.sol_balance = plan.sol.balance_after;
        account.usdc_balance = plan.usdc.balance_after;
        account.clear_pending();

        let outcome = WithdrawalOutcome {
            sol_paid: plan.sol.payout,
            usdc_paid: plan.usdc.payout,
            pnl: plan.pnl,
        };
        self.log.emit(
            now,
            EventPayload::WithdrawalExecuted {
                owner,
                sol_paid: outcome.sol_paid,
                usdc_paid: outcome.usdc_paid,
                pnl: outcome.pnl,
            },
        );
        Ok(outcome)
    }

    /// Seize the account's whole balance in `asset` into the pool. Liquidation
    /// is unconditional once authorized; the margin engine holds no position
    /// data, so solvency is the caller's judgment. Clears any pending request.
    /// Returns the amount seized.
    #[allow(clippy::too_many_arguments)]
    pub fn liquidate(
        &mut self,
        custody: &mut CustodyLedger,
        pool: &mut dyn LiquidityPool,
        oracle: &dyn PriceOracle,
        caller: Identity,
        owner: Identity,
        asset: AssetKind,
        feed: FeedId,
        now: Timestamp,
    ) -> Result<u64, MarginError> {
        let vault = self.vault_ref()?;
        // owners cannot self-liquidate even while holding authority
        if caller == owner || !vault.is_privileged(caller) || !pool.is_settlement_authority(caller)
        {
            return Err(MarginError::UnauthorizedExecution);
        }
        self.check_feed(oracle, feed)?;

        let account = self.account_ref(owner)?;
        let amount = account.balance(asset);
        if amount == 0 {
            return Ok(0);
        }
        let vault_slot = self.vault_ref()?.vault(asset);

        pool.settle_in(custody, caller, vault_slot, asset, amount, now)?;

        let account = self
            .accounts
            .get_mut(&owner)
            .ok_or(MarginError::UnknownAccount(owner))?;
        match asset {
            AssetKind::Sol => account.sol_balance = 0,
            AssetKind::Usdc => account.usdc_balance = 0,
        }
        account.clear_pending();

        self.log
            .emit(now, EventPayload::AccountLiquidated { owner, asset, amount });
        Ok(amount)
    }

    // ------------------------------------------------------------------
    // fees and teardown
    // ------------------------------------------------------------------

    /// Sweep accumulated withdrawal fees to the admin's wallets. No-op when
    /// both counters are zero.
    pub fn claim_fees(
        &mut self,
        custody: &mut CustodyLedger,
        caller: Identity,
        admin_sol_wallet: SlotId,
        admin_usdc_wallet: SlotId,
        now: Timestamp,
    ) -> Result<(), MarginError> {
        let vault = self.vault_ref()?;
        if !vault.is_privileged(caller) {
            return Err(MarginError::UnauthorizedExecution);
        }
        let sol = vault.accumulated_sol_fees;
        let usdc = vault.accumulated_usdc_fees;
        if sol == 0 && usdc == 0 {
            return Ok(());
        }

        let batch = [
            Transfer::new(vault.binding.sol_vault, admin_sol_wallet, sol),
            Transfer::new(vault.binding.usdc_vault, admin_usdc_wallet, usdc),
        ];
        custody.execute_batch(&batch)?;

        let vault = self.vault_mut()?;
        vault.accumulated_sol_fees = 0;
        vault.accumulated_usdc_fees = 0;

        self.log.emit(now, EventPayload::MarginFeesClaimed { sol, usdc });
        Ok(())
    }

    pub fn close_account(
        &mut self,
        caller: Identity,
        owner: Identity,
        now: Timestamp,
    ) -> Result<(), MarginError> {
        let vault = self.vault_ref()?;
        if vault.admin != caller {
            return Err(MarginError::Unauthorized);
        }
        let account = self.account_ref(owner)?;
        if account.sol_balance != 0
            || account.usdc_balance != 0
            || account.has_pending_withdrawal()
        {
            return Err(MarginError::AccountNotEmpty);
        }
        self.accounts.remove(&owner);
        self.log
            .emit(now, EventPayload::UserStateClosed { owner, forced: false });
        Ok(())
    }

    pub fn force_close_account(
        &mut self,
        caller: Identity,
        owner: Identity,
        now: Timestamp,
    ) -> Result<(), MarginError> {
        let vault = self.vault_ref()?;
        if vault.admin != caller {
            return Err(MarginError::Unauthorized);
        }
        self.accounts
            .remove(&owner)
            .ok_or(MarginError::UnknownAccount(owner))?;
        self.log
            .emit(now, EventPayload::UserStateClosed { owner, forced: true });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::FakePool;
    use crate::oracle::{StaticOracle, PRICE_SCALE};

    const ADMIN: Identity = Identity(1);
    const KEEPER: Identity = Identity(2);
    const BOB: Identity = Identity(3);
    const BOB_SOL: SlotId = SlotId(100);
    const BOB_USDC: SlotId = SlotId(101);
    const FEED: FeedId = FeedId(7);

    fn binding() -> MarginBinding {
        MarginBinding {
            sol_vault: SlotId(20),
            usdc_vault: SlotId(21),
            feed: FEED,
        }
    }

    fn setup() -> (MarginEngine, CustodyLedger, StaticOracle, FakePool) {
        let mut margin = MarginEngine::new(EngineConfig::default());
        margin
            .initialize(ADMIN, binding(), DEFAULT_WITHDRAWAL_TIMELOCK_SECS, Timestamp::from_secs(0))
            .unwrap();
        margin
            .add_authority(ADMIN, KEEPER, Timestamp::from_secs(0))
            .unwrap();

        let mut custody = CustodyLedger::new();
        custody.credit(BOB_SOL, 10_000_000_000).unwrap();
        custody.credit(BOB_USDC, 1_000_000_000).unwrap();
        // pool side liquidity
        custody.credit(SlotId(30), 100_000_000_000).unwrap();
        custody.credit(SlotId(31), 100_000_000_000).unwrap();

        let mut oracle = StaticOracle::new();
        oracle.set_price(FEED, 150 * PRICE_SCALE as i128, Timestamp::from_secs(0));

        let pool = FakePool::new(SlotId(30), SlotId(31)).with_authority(KEEPER);
        (margin, custody, oracle, pool)
    }

    fn deposit_usdc(margin: &mut MarginEngine, custody: &mut CustodyLedger, amount: u64) {
        margin
            .deposit(
                custody,
                BOB,
                BOB_USDC,
                binding().usdc_vault,
                AssetKind::Usdc,
                amount,
                Timestamp::from_secs(0),
            )
            .unwrap();
    }

    #[test]
    fn deposit_rejects_wrong_custody_slot() {
        let (mut margin, mut custody, _, _) = setup();
        let err = margin
            .deposit(
                &mut custody,
                BOB,
                BOB_USDC,
                SlotId(999),
                AssetKind::Usdc,
                1_000,
                Timestamp::from_secs(0),
            )
            .unwrap_err();
        assert_eq!(err, MarginError::InvalidCustody);

        let err = margin
            .deposit(
                &mut custody,
                BOB,
                BOB_USDC,
                binding().usdc_vault,
                AssetKind::Usdc,
                0,
                Timestamp::from_secs(0),
            )
            .unwrap_err();
        assert_eq!(err, MarginError::InvalidAmount);
    }

    #[test]
    fn request_then_double_request_fails() {
        let (mut margin, mut custody, _, _) = setup();
        deposit_usdc(&mut margin, &mut custody, 100_000_000);

        margin
            .request_withdrawal(BOB, 0, 50_000_000, Timestamp::from_secs(10))
            .unwrap();
        assert_eq!(
            margin.request_withdrawal(BOB, 0, 1, Timestamp::from_secs(11)),
            Err(MarginError::ExistingWithdrawalRequest)
        );

        // (0, 0) clears the slot and a new request can land
        margin
            .request_withdrawal(BOB, 0, 0, Timestamp::from_secs(12))
            .unwrap();
        margin
            .request_withdrawal(BOB, 0, 30_000_000, Timestamp::from_secs(13))
            .unwrap();
        let account = margin.account(BOB).unwrap();
        assert_eq!(account.pending_usdc_withdrawal, 30_000_000);
        assert_eq!(account.last_withdrawal_request, Timestamp::from_secs(13));
    }

    #[test]
    fn cancel_requires_owner_or_authority() {
        let (mut margin, mut custody, _, _) = setup();
        deposit_usdc(&mut margin, &mut custody, 100_000_000);
        margin
            .request_withdrawal(BOB, 0, 50_000_000, Timestamp::from_secs(10))
            .unwrap();

        assert_eq!(
            margin.cancel_withdrawal(Identity(99), BOB, Timestamp::from_secs(11)),
            Err(MarginError::Unauthorized)
        );
        margin
            .cancel_withdrawal(KEEPER, BOB, Timestamp::from_secs(11))
            .unwrap();
        assert!(!margin.account(BOB).unwrap().has_pending_withdrawal());
    }

    #[test]
    fn execute_respects_timelock_and_pending() {
        let (mut margin, mut custody, oracle, mut pool) = setup();
        deposit_usdc(&mut margin, &mut custody, 100_000_000);

        // nothing pending
        let err = margin
            .execute_withdrawal(
                &mut custody,
                &mut pool,
                &oracle,
                KEEPER,
                BOB,
                BOB_SOL,
                BOB_USDC,
                ExecutionParams::default(),
                FEED,
                Timestamp::from_secs(10),
            )
            .unwrap_err();
        assert_eq!(err, MarginError::NoPendingWithdrawal);

        margin
            .request_withdrawal(BOB, 0, 50_000_000, Timestamp::from_secs(10))
            .unwrap();

        // too early
        let err = margin
            .execute_withdrawal(
                &mut custody,
                &mut pool,
                &oracle,
                KEEPER,
                BOB,
                BOB_SOL,
                BOB_USDC,
                ExecutionParams::default(),
                FEED,
                Timestamp::from_secs(10 + DEFAULT_WITHDRAWAL_TIMELOCK_SECS - 1),
            )
            .unwrap_err();
        assert_eq!(err, MarginError::TimelockNotElapsed);

        let outcome = margin
            .execute_withdrawal(
                &mut custody,
                &mut pool,
                &oracle,
                KEEPER,
                BOB,
                BOB_SOL,
                BOB_USDC,
                ExecutionParams::default(),
                FEED,
                Timestamp::from_secs(10 + DEFAULT_WITHDRAWAL_TIMELOCK_SECS),
            )
            .unwrap();
        assert_eq!(outcome.usdc_paid, 50_000_000);
        assert_eq!(custody.balance(BOB_USDC), 950_000_000);
        let account = margin.account(BOB).unwrap();
        assert_eq!(account.usdc_balance, 50_000_000);
        assert!(!account.has_pending_withdrawal());
    }

    #[test]
    fn execute_requires_authority_on_both_sides() {
        let (mut margin, mut custody, oracle, mut pool) = setup();
        deposit_usdc(&mut margin, &mut custody, 100_000_000);
        margin
            .request_withdrawal(BOB, 0, 1_000, Timestamp::from_secs(0))
            .unwrap();

        // BOB is not a settlement authority
        let err = margin
            .execute_withdrawal(
                &mut custody,
                &mut pool,
                &oracle,
                BOB,
                BOB,
                BOB_SOL,
                BOB_USDC,
                ExecutionParams::default(),
                FEED,
                Timestamp::from_secs(999_999),
            )
            .unwrap_err();
        assert_eq!(err, MarginError::UnauthorizedExecution);

        // ADMIN is privileged on the margin side but the pool does not know it
        let err = margin
            .execute_withdrawal(
                &mut custody,
                &mut pool,
                &oracle,
                ADMIN,
                BOB,
                BOB_SOL,
                BOB_USDC,
                ExecutionParams::default(),
                FEED,
                Timestamp::from_secs(999_999),
            )
            .unwrap_err();
        assert_eq!(err, MarginError::UnauthorizedExecution);
    }

    #[test]
    fn execute_settles_fees_and_loss_into_pool() {
        let (mut margin, mut custody, oracle, mut pool) = setup();
        deposit_usdc(&mut margin, &mut custody, 100_000_000);
        margin
            .request_withdrawal(BOB, 0, 100_000_000, Timestamp::from_secs(0))
            .unwrap();

        let params = ExecutionParams {
            pnl: -20_000_000,
            usdc_fee: 1_000_000,
            ..Default::default()
        };
        let outcome = margin
            .execute_withdrawal(
                &mut custody,
                &mut pool,
                &oracle,
                KEEPER,
                BOB,
                BOB_SOL,
                BOB_USDC,
                params,
                FEED,
                Timestamp::from_secs(999_999),
            )
            .unwrap();

        // 100 - 1 fee - 20 loss = 79 available and paid
        assert_eq!(outcome.usdc_paid, 79_000_000);
        assert_eq!(margin.account(BOB).unwrap().usdc_balance, 0);
        assert_eq!(margin.vault().unwrap().accumulated_usdc_fees, 1_000_000);
        // loss landed in the pool vault
        assert_eq!(custody.balance(SlotId(31)), 100_000_000_000 + 20_000_000);
        // fee stays in the margin vault custody
        assert_eq!(custody.balance(binding().usdc_vault), 1_000_000);
    }

    #[test]
    fn execute_pulls_profit_from_pool() {
        let (mut margin, mut custody, oracle, mut pool) = setup();
        deposit_usdc(&mut margin, &mut custody, 100_000_000);
        margin
            .request_withdrawal(BOB, 0, 130_000_000, Timestamp::from_secs(0))
            .unwrap();

        let params = ExecutionParams {
            pnl: 30_000_000,
            ..Default::default()
        };
        let outcome = margin
            .execute_withdrawal(
                &mut custody,
                &mut pool,
                &oracle,
                KEEPER,
                BOB,
                BOB_SOL,
                BOB_USDC,
                params,
                FEED,
                Timestamp::from_secs(999_999),
            )
            .unwrap();

        assert_eq!(outcome.usdc_paid, 130_000_000);
        assert_eq!(custody.balance(BOB_USDC), 900_000_000 + 130_000_000);
        assert_eq!(custody.balance(SlotId(31)), 100_000_000_000 - 30_000_000);
    }

    #[test]
    fn liquidation_seizes_into_pool_and_clears_pending() {
        let (mut margin, mut custody, oracle, mut pool) = setup();
        deposit_usdc(&mut margin, &mut custody, 100_000_000);
        margin
            .request_withdrawal(BOB, 0, 50_000_000, Timestamp::from_secs(0))
            .unwrap();

        let seized = margin
            .liquidate(
                &mut custody,
                &mut pool,
                &oracle,
                KEEPER,
                BOB,
                AssetKind::Usdc,
                FEED,
                Timestamp::from_secs(5),
            )
            .unwrap();
        assert_eq!(seized, 100_000_000);

        let account = margin.account(BOB).unwrap();
        assert_eq!(account.usdc_balance, 0);
        assert!(!account.has_pending_withdrawal());
        assert_eq!(custody.balance(SlotId(31)), 100_000_000_000 + 100_000_000);
        assert_eq!(custody.balance(binding().usdc_vault), 0);

        // empty leg liquidates as a no-op
        let seized = margin
            .liquidate(
                &mut custody,
                &mut pool,
                &oracle,
                KEEPER,
                BOB,
                AssetKind::Sol,
                FEED,
                Timestamp::from_secs(6),
            )
            .unwrap();
        assert_eq!(seized, 0);
    }

    #[test]
    fn owner_cannot_self_liquidate() {
        let (mut margin, mut custody, oracle, mut pool) = setup();
        deposit_usdc(&mut margin, &mut custody, 100_000_000);
        // even with authority, the owner may not liquidate itself
        margin
            .add_authority(ADMIN, BOB, Timestamp::from_secs(0))
            .unwrap();

        let err = margin
            .liquidate(
                &mut custody,
                &mut pool,
                &oracle,
                BOB,
                BOB,
                AssetKind::Usdc,
                FEED,
                Timestamp::from_secs(5),
            )
            .unwrap_err();
        assert_eq!(err, MarginError::UnauthorizedExecution);
    }

    #[test]
    fn liquidation_checks_feed_binding() {
        let (mut margin, mut custody, oracle, mut pool) = setup();
        deposit_usdc(&mut margin, &mut custody, 100_000_000);

        let err = margin
            .liquidate(
                &mut custody,
                &mut pool,
                &oracle,
                KEEPER,
                BOB,
                AssetKind::Usdc,
                FeedId(999),
                Timestamp::from_secs(5),
            )
            .unwrap_err();
        assert_eq!(err, MarginError::StaleOrMismatchedOracleFeed(FeedId(999)));
    }

    #[test]
    fn feed_binding_can_be_rotated() {
        let (mut margin, mut custody, mut oracle, mut pool) = setup();
        deposit_usdc(&mut margin, &mut custody, 100_000_000);

        let new_feed = FeedId(8);
        assert_eq!(
            margin.update_feed_binding(BOB, new_feed, Timestamp::from_secs(1)),
            Err(MarginError::Unauthorized)
        );
        margin
            .update_feed_binding(KEEPER, new_feed, Timestamp::from_secs(1))
            .unwrap();
        assert_eq!(margin.vault().unwrap().binding.feed, new_feed);

        oracle.set_price(new_feed, 150 * PRICE_SCALE as i128, Timestamp::from_secs(1));

        // the original feed no longer passes the identity check
        let err = margin
            .liquidate(
                &mut custody,
                &mut pool,
                &oracle,
                KEEPER,
                BOB,
                AssetKind::Usdc,
                FEED,
                Timestamp::from_secs(2),
            )
            .unwrap_err();
        assert_eq!(err, MarginError::StaleOrMismatchedOracleFeed(FEED));

        // the rotated feed does
        let seized = margin
            .liquidate(
                &mut custody,
                &mut pool,
                &oracle,
                KEEPER,
                BOB,
                AssetKind::Usdc,
                new_feed,
                Timestamp::from_secs(3),
            )
            .unwrap();
        assert_eq!(seized, 100_000_000);
    }

    #[test]
    fn withdrawal_fees_accumulate_across_executions() {
        let (mut margin, mut custody, oracle, mut pool) = setup();
        deposit_usdc(&mut margin, &mut custody, 400_000_000);

        for (t, fee) in [(0i64, 1_000_000u64), (10_000, 2_500_000)] {
            margin
                .request_withdrawal(BOB, 0, 50_000_000, Timestamp::from_secs(t))
                .unwrap();
            margin
                .execute_withdrawal(
                    &mut custody,
                    &mut pool,
                    &oracle,
                    KEEPER,
                    BOB,
                    BOB_SOL,
                    BOB_USDC,
                    ExecutionParams { usdc_fee: fee, ..Default::default() },
                    FEED,
                    Timestamp::from_secs(t + DEFAULT_WITHDRAWAL_TIMELOCK_SECS),
                )
                .unwrap();
        }

        assert_eq!(margin.vault().unwrap().accumulated_usdc_fees, 3_500_000);
        assert_eq!(margin.vault().unwrap().accumulated_sol_fees, 0);
        // fees never left vault custody: 400M in, two 50M payouts out
        assert_eq!(custody.balance(binding().usdc_vault), 300_000_000);
        assert_eq!(margin.account(BOB).unwrap().usdc_balance, 296_500_000);
    }

    #[test]
    fn close_account_requires_empty() {
        let (mut margin, mut custody, _, _) = setup();
        deposit_usdc(&mut margin, &mut custody, 100_000_000);

        assert_eq!(
            margin.close_account(ADMIN, BOB, Timestamp::from_secs(1)),
            Err(MarginError::AccountNotEmpty)
        );
        margin
            .force_close_account(ADMIN, BOB, Timestamp::from_secs(1))
            .unwrap();
        assert!(margin.account(BOB).is_none());
        assert_eq!(
            margin.close_account(ADMIN, BOB, Timestamp::from_secs(2)),
            Err(MarginError::UnknownAccount(BOB))
        );
    }
}
