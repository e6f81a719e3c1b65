// 8.0 settlement.rs: pure planning for withdrawal execution. everything here is
// arithmetic over snapshots; no ledger or engine state is touched. the margin
// engine builds a plan, and only a plan that validated in full gets committed,
// so a rejected execution has no partial effect.
//
// per-leg commit order the plan is validated against:
//   1. pool vault -> margin vault   (pnl credit + custody rebalance)
//   2. margin vault -> pool vault   (pnl debit)
//   3. margin vault -> owner wallet (payout)

use crate::oracle::{sol_value_in_usdc, usdc_value_in_sol};
use crate::types::AssetKind;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SettlementError {
    #[error("Insufficient {asset} margin: requested {requested}, available {available}")]
    InsufficientFunds {
        asset: AssetKind,
        requested: u64,
        available: u64,
    },

    #[error("Pool cannot cover {asset} settlement: requested {requested}, available {available}")]
    PoolShort {
        asset: AssetKind,
        requested: u64,
        available: u64,
    },

    #[error("Arithmetic overflow")]
    MathOverflow,
}

/// Snapshot of one asset leg at planning time.
#[derive(Debug, Clone, Copy)]
pub struct LegParams {
    pub asset: AssetKind,
    /// Account margin balance in asset minor units.
    pub balance: u64,
    /// Pending withdrawal request for this leg.
    pub pending: u64,
    /// Portion of the balance locked against open exposure.
    pub locked: u64,
    /// Withdrawal fee owed, settled into the vault fee counter.
    pub fee: u64,
    /// Custody currently sitting in the margin vault slot.
    pub vault_custody: u64,
    /// Custody currently sitting in the pool vault slot.
    pub pool_custody: u64,
}

/// Committed movements for one leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegPlan {
    pub asset: AssetKind,
    pub fee: u64,
    /// PnL paid into the margin account from the pool.
    pub pnl_credit: u64,
    /// PnL taken from the margin account into the pool.
    pub pnl_debit: u64,
    /// Paid from the margin vault to the owner's wallet.
    pub payout: u64,
    /// Extra custody pulled from the pool so the vault can cover the leg.
    pub rebalance: u64,
    /// Margin balance once the leg commits.
    pub balance_after: u64,
}

impl LegPlan {
    /// Total the pool vault must fund for this leg.
    pub fn pool_outflow(&self) -> u64 {
        self.pnl_credit + self.rebalance
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawalPlan {
    pub sol: LegPlan,
    pub usdc: LegPlan,
    pub pnl: i64,
}

/// Split a PnL magnitude (USDC minor units) across the two legs in proportion
/// to their oracle valuation. The SOL share comes back in lamports. With no
/// margin value on either side the whole amount lands on the USDC leg.
pub fn allocate_pnl(amount: u64, sol_balance: u64, usdc_balance: u64, price: i128) -> (u64, u64) {
    let sol_value = sol_value_in_usdc(sol_balance, price);
    let total = sol_value as u128 + usdc_balance as u128;
    if total == 0 {
        return (0, amount);
    }
    let sol_share = (amount as u128 * sol_value as u128 / total) as u64;
    let usdc_share = amount - sol_share;
    (usdc_value_in_sol(sol_share, price), usdc_share)
}

fn plan_leg(p: LegParams, credit: u64, debit: u64) -> Result<LegPlan, SettlementError> {
    if p.balance < p.fee {
        return Err(SettlementError::InsufficientFunds {
            asset: p.asset,
            requested: p.fee,
            available: p.balance,
        });
    }
    let after_fee = p.balance - p.fee;

    let adjusted = (after_fee as u128 + credit as u128)
        .checked_sub(debit as u128)
        .ok_or(SettlementError::MathOverflow)?;
    let adjusted = u64::try_from(adjusted).map_err(|_| SettlementError::MathOverflow)?;

    let available = adjusted.saturating_sub(p.locked);
    let payout = p.pending.min(available);
    let balance_after = adjusted - payout;

    // the fee never leaves the vault slot; only debit and payout do
    let have = p.vault_custody as u128 + credit as u128;
    let need = debit as u128 + payout as u128;
    let rebalance = need.saturating_sub(have) as u64;

    Ok(LegPlan {
        asset: p.asset,
        fee: p.fee,
        pnl_credit: credit,
        pnl_debit: debit,
        payout,
        rebalance,
        balance_after,
    })
}

/// Build and validate the full two-leg plan. `pnl` is in USDC minor units,
/// positive in the account's favor. Losses are capped at the post-fee balance
/// of each leg.
pub fn plan_withdrawal(
    sol: LegParams,
    usdc: LegParams,
    pnl: i64,
    price: i128,
) -> Result<WithdrawalPlan, SettlementError> {
    let sol_after_fee = sol.balance.saturating_sub(sol.fee);
    let usdc_after_fee = usdc.balance.saturating_sub(usdc.fee);

    let (mut sol_credit, mut usdc_credit) = (0u64, 0u64);
    let (mut sol_debit, mut usdc_debit) = (0u64, 0u64);
    if pnl > 0 {
        let (s, u) = allocate_pnl(pnl as u64, sol_after_fee, usdc_after_fee, price);
        sol_credit = s;
        usdc_credit = u;
    } else if pnl < 0 {
        let (s, u) = allocate_pnl(pnl.unsigned_abs(), sol_after_fee, usdc_after_fee, price);
        sol_debit = s.min(sol_after_fee);
        usdc_debit = u.min(usdc_after_fee);
    }

    let sol_plan = plan_leg(sol, sol_credit, sol_debit)?;
    let usdc_plan = plan_leg(usdc, usdc_credit, usdc_debit)?;

    for (plan, params) in [(&sol_plan, &sol), (&usdc_plan, &usdc)] {
        let outflow = plan.pool_outflow();
        if outflow > params.pool_custody {
            return Err(SettlementError::PoolShort {
                asset: params.asset,
                requested: outflow,
                available: params.pool_custody,
            });
        }
    }

    Ok(WithdrawalPlan {
        sol: sol_plan,
        usdc: usdc_plan,
        pnl,
    })
}
