// vaults-core: dual-vault ledger for pooled liquidity and margin custody.
// custody-first architecture: every balance movement goes through the ledger
// and either commits in full or not at all. all computation is deterministic
// with no external I/O; time is an explicit parameter everywhere.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: Identity, SlotId, FeedId, AssetKind, Timestamp
//   1.2  authority.rs: fixed-capacity authority allow-list
//   2.x  oracle.rs: PriceOracle trait, feed binding, SOL/USDC valuation
//   3.x  custody.rs: slot ledger, atomic transfer batches
//   4.x  rewards.rs: lazy per-share reward accumulator
//   5.x  pool.rs: LP share mint/burn, deposit fee, reward stream
//   6.x  bridge.rs: LiquidityPool capability between engines
//   7.x  margin.rs: margin balances, timelocked withdrawals, liquidation
//   7.0  config.rs: protocol constants and engine knobs
//   8.x  settlement.rs: pure withdrawal planning (fees, PnL, rebalance)
//   9.x  events.rs: state transition events for audit

pub mod authority;
pub mod bridge;
pub mod config;
pub mod custody;
pub mod events;
pub mod margin;
pub mod oracle;
pub mod pool;
pub mod rewards;
pub mod settlement;
pub mod types;

pub use authority::{AuthorityError, AuthoritySet, MAX_AUTHORITIES};
pub use bridge::{FakePool, LiquidityPool};
pub use config::{deposit_fee, EngineConfig, DEPOSIT_FEE_DIVISOR, REWARD_PRECISION};
pub use custody::{CustodyError, CustodyLedger, Transfer};
pub use events::{Event, EventId, EventLog, EventPayload};
pub use margin::{
    ExecutionParams, MarginAccount, MarginBinding, MarginEngine, MarginError, MarginVault,
    WithdrawalOutcome, DEFAULT_WITHDRAWAL_TIMELOCK_SECS,
};
pub use oracle::{
    sol_value_in_usdc, usdc_value_in_sol, PriceOracle, PricePoint, StaticOracle, PRICE_DECIMALS,
    PRICE_SCALE,
};
pub use pool::{PoolBinding, PoolEngine, PoolError, PoolState, UserPoolPosition};
pub use rewards::RewardSchedule;
pub use settlement::{
    allocate_pnl, plan_withdrawal, LegParams, LegPlan, SettlementError, WithdrawalPlan,
};
pub use types::{AssetKind, FeedId, Identity, SlotId, Timestamp};
