//! Dual-Vault Ledger Simulation.
//!
//! Walks the pool and margin engines through their full lifecycle: LP
//! deposits and fees, reward streaming, timelocked withdrawals, PnL
//! settlement across the bridge, and liquidation.

use vaults_core::*;

const ADMIN: Identity = Identity(1);
const KEEPER: Identity = Identity(2);
const ALICE: Identity = Identity(10);
const BOB: Identity = Identity(11);

const POOL_SOL_VAULT: SlotId = SlotId(100);
const POOL_USDC_VAULT: SlotId = SlotId(101);
const REWARD_VAULT: SlotId = SlotId(102);
const MARGIN_SOL_VAULT: SlotId = SlotId(110);
const MARGIN_USDC_VAULT: SlotId = SlotId(111);

const SOL_USD: FeedId = FeedId(1);

fn main() {
    println!("Dual-Vault Ledger Simulation");
    println!("Pool Liquidity + Margin Custody, Full Lifecycle\n");

    scenario_1_pool_lifecycle();
    scenario_2_reward_stream();
    scenario_3_timelocked_withdrawal();
    scenario_4_pnl_settlement();
    scenario_5_liquidation();

    println!("\nAll simulations completed successfully.");
}

struct World {
    pool: PoolEngine,
    margin: MarginEngine,
    custody: CustodyLedger,
    oracle: StaticOracle,
}

fn world() -> World {
    let now = Timestamp::from_secs(0);

    let mut pool = PoolEngine::new(EngineConfig::default());
    pool.initialize(
        ADMIN,
        PoolBinding {
            sol_vault: POOL_SOL_VAULT,
            usdc_vault: POOL_USDC_VAULT,
            reward_vault: REWARD_VAULT,
            feed: SOL_USD,
        },
        now,
    )
    .unwrap();
    pool.add_authority(ADMIN, KEEPER, now).unwrap();

    let mut margin = MarginEngine::new(EngineConfig::default());
    margin
        .initialize(
            ADMIN,
            MarginBinding {
                sol_vault: MARGIN_SOL_VAULT,
                usdc_vault: MARGIN_USDC_VAULT,
                feed: SOL_USD,
            },
            DEFAULT_WITHDRAWAL_TIMELOCK_SECS,
            now,
        )
        .unwrap();
    margin.add_authority(ADMIN, KEEPER, now).unwrap();

    let mut custody = CustodyLedger::new();
    // 100 SOL / 10_000 USDC per user wallet, generous admin float
    custody.credit(wallet(ALICE, AssetKind::Sol), 100_000_000_000).unwrap();
    custody.credit(wallet(ALICE, AssetKind::Usdc), 10_000_000_000).unwrap();
    custody.credit(wallet(BOB, AssetKind::Sol), 100_000_000_000).unwrap();
    custody.credit(wallet(BOB, AssetKind::Usdc), 10_000_000_000).unwrap();
    custody.credit(wallet(ADMIN, AssetKind::Sol), 1_000_000_000_000).unwrap();
    custody.credit(wallet(ADMIN, AssetKind::Usdc), 1_000_000_000_000).unwrap();

    let mut oracle = StaticOracle::new();
    // $150 per SOL
    oracle.set_price(SOL_USD, 150 * PRICE_SCALE as i128, now);

    World { pool, margin, custody, oracle }
}

fn wallet(id: Identity, asset: AssetKind) -> SlotId {
    match asset {
        AssetKind::Sol => SlotId(1_000 + id.0),
        AssetKind::Usdc => SlotId(2_000 + id.0),
    }
}

fn fmt_amount(amount: u64, asset: AssetKind) -> String {
    let scale = 10u64.pow(asset.decimals());
    format!("{}.{:0width$} {}", amount / scale, amount % scale, asset, width = asset.decimals() as usize)
}

/// LP deposit with fee, share minting, pro-rata withdrawal.
fn scenario_1_pool_lifecycle() {
    println!("Scenario 1: Pool Lifecycle\n");

    let World { mut pool, mut custody, oracle, .. } = world();
    let now = Timestamp::from_secs(10);

    let shares = pool
        .deposit(
            &mut custody,
            &oracle,
            ALICE,
            wallet(ALICE, AssetKind::Sol),
            AssetKind::Sol,
            2_000_000_000,
            SOL_USD,
            now,
        )
        .unwrap();
    println!("  Alice deposits {}", fmt_amount(2_000_000_000, AssetKind::Sol));
    println!("  Minted {} shares, fee {}", shares, fmt_amount(2_000_000, AssetKind::Sol));

    pool.deposit(
        &mut custody,
        &oracle,
        BOB,
        wallet(BOB, AssetKind::Usdc),
        AssetKind::Usdc,
        200_000_000,
        SOL_USD,
        now,
    )
    .unwrap();
    println!("  Bob deposits {}", fmt_amount(200_000_000, AssetKind::Usdc));

    let state = pool.state().unwrap();
    println!(
        "  Pool: {} shares outstanding, fees {} SOL / {} USDC",
        state.lp_supply, state.accumulated_sol_fees, state.accumulated_usdc_fees
    );

    let out = pool
        .withdraw(
            &mut custody,
            &oracle,
            ALICE,
            wallet(ALICE, AssetKind::Sol),
            AssetKind::Sol,
            shares / 2,
            SOL_USD,
            now.plus_secs(60),
        )
        .unwrap();
    println!("  Alice burns half her shares for {}", fmt_amount(out, AssetKind::Sol));

    pool.claim_fees(
        &mut custody,
        ADMIN,
        wallet(ADMIN, AssetKind::Sol),
        wallet(ADMIN, AssetKind::Usdc),
        now.plus_secs(61),
    )
    .unwrap();
    println!("  Admin sweeps accumulated fees\n");
}

/// Reward streaming across two LPs.
fn scenario_2_reward_stream() {
    println!("Scenario 2: Reward Stream\n");

    let World { mut pool, mut custody, oracle, .. } = world();
    let t0 = Timestamp::from_secs(0);

    pool.deposit(
        &mut custody,
        &oracle,
        ALICE,
        wallet(ALICE, AssetKind::Usdc),
        AssetKind::Usdc,
        300_000_000,
        SOL_USD,
        t0,
    )
    .unwrap();
    pool.deposit(
        &mut custody,
        &oracle,
        BOB,
        wallet(BOB, AssetKind::Usdc),
        AssetKind::Usdc,
        100_000_000,
        SOL_USD,
        t0,
    )
    .unwrap();
    println!("  Alice holds 3x Bob's stake");

    pool.start_rewards(
        &mut custody,
        ADMIN,
        wallet(ADMIN, AssetKind::Usdc),
        10_000_000_000,
        100_000,
        t0,
    )
    .unwrap();
    println!("  Rewards funded: 10_000 USDC at 0.1 USDC/sec");

    let t1 = t0.plus_secs(1_000);
    let alice_paid = pool
        .claim_rewards(&mut custody, ALICE, wallet(ALICE, AssetKind::Usdc), t1)
        .unwrap();
    let bob_paid = pool
        .claim_rewards(&mut custody, BOB, wallet(BOB, AssetKind::Usdc), t1)
        .unwrap();
    println!(
        "  After 1000s: Alice claims {}, Bob claims {}\n",
        fmt_amount(alice_paid, AssetKind::Usdc),
        fmt_amount(bob_paid, AssetKind::Usdc)
    );
}

/// Margin deposit, request, timelock, execution.
fn scenario_3_timelocked_withdrawal() {
    println!("Scenario 3: Timelocked Withdrawal\n");

    let World { mut pool, mut margin, mut custody, oracle } = world();
    let t0 = Timestamp::from_secs(0);

    margin
        .deposit(
            &mut custody,
            BOB,
            wallet(BOB, AssetKind::Usdc),
            MARGIN_USDC_VAULT,
            AssetKind::Usdc,
            500_000_000,
            t0,
        )
        .unwrap();
    println!("  Bob deposits {} margin", fmt_amount(500_000_000, AssetKind::Usdc));

    margin.request_withdrawal(BOB, 0, 200_000_000, t0).unwrap();
    println!("  Bob requests {} back", fmt_amount(200_000_000, AssetKind::Usdc));

    let too_early = margin.execute_withdrawal(
        &mut custody,
        &mut pool,
        &oracle,
        KEEPER,
        BOB,
        wallet(BOB, AssetKind::Sol),
        wallet(BOB, AssetKind::Usdc),
        ExecutionParams::default(),
        SOL_USD,
        t0.plus_secs(60),
    );
    println!("  Keeper executes after 60s: {:?}", too_early.unwrap_err());

    let outcome = margin
        .execute_withdrawal(
            &mut custody,
            &mut pool,
            &oracle,
            KEEPER,
            BOB,
            wallet(BOB, AssetKind::Sol),
            wallet(BOB, AssetKind::Usdc),
            ExecutionParams::default(),
            SOL_USD,
            t0.plus_secs(DEFAULT_WITHDRAWAL_TIMELOCK_SECS),
        )
        .unwrap();
    println!(
        "  Keeper executes after timelock: paid {}\n",
        fmt_amount(outcome.usdc_paid, AssetKind::Usdc)
    );
}

/// Realized loss flows from margin custody into the pool.
fn scenario_4_pnl_settlement() {
    println!("Scenario 4: PnL Settlement\n");

    let World { mut pool, mut margin, mut custody, oracle } = world();
    let t0 = Timestamp::from_secs(0);

    // seed pool liquidity so profit settlement has something to draw on
    pool.deposit(
        &mut custody,
        &oracle,
        ALICE,
        wallet(ALICE, AssetKind::Usdc),
        AssetKind::Usdc,
        5_000_000_000,
        SOL_USD,
        t0,
    )
    .unwrap();

    margin
        .deposit(
            &mut custody,
            BOB,
            wallet(BOB, AssetKind::Usdc),
            MARGIN_USDC_VAULT,
            AssetKind::Usdc,
            1_000_000_000,
            t0,
        )
        .unwrap();
    margin.request_withdrawal(BOB, 0, 1_000_000_000, t0).unwrap();

    let params = ExecutionParams {
        pnl: -150_000_000,
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
            wallet(BOB, AssetKind::Sol),
            wallet(BOB, AssetKind::Usdc),
            params,
            SOL_USD,
            t0.plus_secs(DEFAULT_WITHDRAWAL_TIMELOCK_SECS),
        )
        .unwrap();
    println!(
        "  Bob closes with a {} loss and a {} fee",
        fmt_amount(150_000_000, AssetKind::Usdc),
        fmt_amount(1_000_000, AssetKind::Usdc)
    );
    println!("  Paid out {}", fmt_amount(outcome.usdc_paid, AssetKind::Usdc));
    println!(
        "  Pool USDC custody now {}\n",
        fmt_amount(custody.balance(POOL_USDC_VAULT), AssetKind::Usdc)
    );
}

/// Unconditional liquidation seizes margin into the pool.
fn scenario_5_liquidation() {
    println!("Scenario 5: Liquidation\n");

    let World { mut pool, mut margin, mut custody, oracle } = world();
    let t0 = Timestamp::from_secs(0);

    margin
        .deposit(
            &mut custody,
            ALICE,
            wallet(ALICE, AssetKind::Sol),
            MARGIN_SOL_VAULT,
            AssetKind::Sol,
            3_000_000_000,
            t0,
        )
        .unwrap();
    margin.request_withdrawal(ALICE, 3_000_000_000, 0, t0).unwrap();
    println!(
        "  Alice holds {} margin with a withdrawal pending",
        fmt_amount(3_000_000_000, AssetKind::Sol)
    );

    let seized = margin
        .liquidate(
            &mut custody,
            &mut pool,
            &oracle,
            KEEPER,
            ALICE,
            AssetKind::Sol,
            SOL_USD,
            t0.plus_secs(5),
        )
        .unwrap();
    println!("  Keeper liquidates: {} seized into the pool", fmt_amount(seized, AssetKind::Sol));

    let account = margin.account(ALICE).unwrap();
    println!(
        "  Account now: balance {}, pending cleared: {}",
        account.sol_balance,
        !account.has_pending_withdrawal()
    );
    println!(
        "  Pool SOL custody {}\n",
        fmt_amount(custody.balance(POOL_SOL_VAULT), AssetKind::Sol)
    );
}
