//! Margin Lending Core Simulation.
//!
//! Walks the full engine lifecycle: pool funding, fixed-term borrowing,
//! leveraged trading, rollover past term, and a liquidation after a price drop.

use lending_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const USDC: TokenId = TokenId(1);
const WETH: TokenId = TokenId(2);
const POOL: PoolId = PoolId(1);

const ADMIN: AccountId = AccountId(0);
const LENDER: AccountId = AccountId(10);
const BORROWER: AccountId = AccountId(20);
const KEEPER: AccountId = AccountId(30);
const LIQUIDATOR: AccountId = AccountId(40);

fn main() {
    println!("Margin Lending Core Engine Simulation");
    println!("Single Pool, USDC Lending, WETH Collateral\n");

    scenario_1_rate_curve();
    scenario_2_fixed_term_borrow();
    scenario_3_leveraged_trade();
    scenario_4_rollover();
    scenario_5_liquidation();

    println!("\nAll simulations completed successfully.");
}

type SimEngine = LendingEngine<FixedPriceOracle, IndexSwapper<FixedPriceOracle>>;

fn setup() -> SimEngine {
    let mut oracle = FixedPriceOracle::new(USDC);
    oracle.set_rate(WETH, USDC, ExchangeRate::new_unchecked(dec!(2000)));
    let swapper = IndexSwapper::new(oracle.clone());

    let config = EngineConfig {
        rollover_base_reward: Amount::new_unchecked(dec!(0.01)),
        ..EngineConfig::default()
    };
    let mut engine = LendingEngine::new(config, oracle, swapper).expect("valid config");

    engine
        .register_pool(ADMIN, POOL, USDC)
        .expect("pool registration");
    engine
        .set_demand_curve(ADMIN, POOL, demand_curve())
        .expect("curve");

    engine.fund_account(LENDER, USDC, Amount::new_unchecked(dec!(1_000_000))).unwrap();
    engine
        .supply_liquidity(LENDER, POOL, Amount::new_unchecked(dec!(1_000_000)))
        .expect("supply");
    engine
}

fn demand_curve() -> DemandCurveConfig {
    let r = |v| Ratio::new_unchecked(v);
    DemandCurveConfig {
        base_rate: r(dec!(0.01)),
        rate_multiplier: r(dec!(0.2025)),
        low_util_base_rate: r(dec!(0.01)),
        low_util_rate_multiplier: r(dec!(0.2025)),
        target_level: r(dec!(0.80)),
        kink_level: r(dec!(0.90)),
        max_scale_rate: r(dec!(1.00)),
    }
}

fn set_price(engine: &mut SimEngine, rate: Decimal) {
    let rate = ExchangeRate::new_unchecked(rate);
    engine.oracle_mut().set_rate(WETH, USDC, rate);
    engine.swapper_mut().oracle.set_rate(WETH, USDC, rate);
}

/// The kinked rate curve at a sweep of utilization levels.
fn scenario_1_rate_curve() {
    println!("Scenario 1: Demand Curve Sweep\n");

    let curve = demand_curve();
    for util in [dec!(0), dec!(0.40), dec!(0.80), dec!(0.85), dec!(0.90), dec!(0.95), dec!(1.0)] {
        let rate = curve.borrow_rate(Ratio::new_unchecked(util)).unwrap();
        println!("  utilization {:>5}% -> borrow rate {}", util * dec!(100), rate);
    }
    println!();
}

/// A 28-day borrow: interest is pre-funded out of the principal, consumed as
/// days pass, and the unconsumed remainder refunds at close.
fn scenario_2_fixed_term_borrow() {
    println!("Scenario 2: Fixed-Term Borrow Lifecycle\n");

    let mut engine = setup();
    let params = engine
        .create_loan_params(
            ADMIN,
            USDC,
            WETH,
            Ratio::new_unchecked(dec!(0.50)),
            Ratio::new_unchecked(dec!(0.15)),
            28 * SECONDS_PER_DAY,
        )
        .unwrap();

    engine.fund_account(BORROWER, WETH, Amount::new_unchecked(dec!(10))).unwrap();
    let open = engine
        .open_borrow(
            BORROWER,
            POOL,
            params,
            Amount::new_unchecked(dec!(10_000)),
            CollateralPayment::token(WETH, Amount::new_unchecked(dec!(8))),
            BORROWER,
        )
        .unwrap();

    println!("  Borrower posts 8 WETH, borrows 10,000 USDC");
    println!("  disbursed: {} USDC (escrow {} held back)", open.disbursed, open.interest_deposit);
    println!("  interest/day: {} USDC, start margin: {}", open.interest_owed_per_day, open.start_margin);

    engine.advance_days(14);
    engine.fund_account(BORROWER, USDC, Amount::new_unchecked(dec!(11_000))).unwrap();
    let close = engine
        .close_with_deposit(BORROWER, open.loan_id, Amount::new_unchecked(dec!(10_000)), BORROWER)
        .unwrap();

    println!("\n  Day 14: full repayment");
    println!("  escrow refund: {} USDC, close fee: {} USDC", close.interest_refund, close.fee_paid);
    println!("  collateral returned: {} WETH", close.collateral_returned);
    println!("  pool supply now: {} USDC\n", engine.pool(POOL).unwrap().total_supply);
}

/// 4x long on WETH: borrowed USDC is swapped into extra WETH collateral.
fn scenario_3_leveraged_trade() {
    println!("Scenario 3: Leveraged Trade\n");

    let mut engine = setup();
    let params = engine
        .create_loan_params(
            ADMIN,
            USDC,
            WETH,
            Ratio::new_unchecked(dec!(0.25)),
            Ratio::new_unchecked(dec!(0.15)),
            0, // open-ended
        )
        .unwrap();

    engine.fund_account(BORROWER, WETH, Amount::new_unchecked(dec!(2))).unwrap();
    let open = engine
        .open_trade(
            BORROWER,
            POOL,
            params,
            dec!(4),
            CollateralPayment::token(WETH, Amount::new_unchecked(dec!(2))),
        )
        .unwrap();

    println!("  Borrower posts 2 WETH at $2000, opens 4x long");
    println!("  principal: {} USDC, total collateral: {} WETH", open.principal, open.collateral);

    set_price(&mut engine, dec!(2400));
    let (margin, _) = engine.current_margin(open.loan_id).unwrap();
    println!("\n  WETH rallies to $2400, margin now {:.4}", margin);

    let close = engine
        .close_with_swap(BORROWER, open.loan_id, open.collateral, true, BORROWER)
        .unwrap();
    println!("  full close: repaid {} USDC, {} WETH returned", close.loan_close_amount, close.collateral_returned);
    println!("  borrower WETH balance: {}\n", engine.balance_of(Holder::Account(BORROWER), WETH));
}

/// Past-term loan rolled by a keeper: overdue interest is collected from
/// collateral and the term extends by exactly one period.
fn scenario_4_rollover() {
    println!("Scenario 4: Rollover Past Term\n");

    let mut engine = setup();
    let params = engine
        .create_loan_params(
            ADMIN,
            USDC,
            WETH,
            Ratio::new_unchecked(dec!(0.50)),
            Ratio::new_unchecked(dec!(0.15)),
            28 * SECONDS_PER_DAY,
        )
        .unwrap();

    engine.fund_account(BORROWER, WETH, Amount::new_unchecked(dec!(10))).unwrap();
    let open = engine
        .open_borrow(
            BORROWER,
            POOL,
            params,
            Amount::new_unchecked(dec!(10_000)),
            CollateralPayment::token(WETH, Amount::new_unchecked(dec!(8))),
            BORROWER,
        )
        .unwrap();
    let end_before = engine.loan(open.loan_id).unwrap().end_timestamp.unwrap();

    engine.advance_days(29); // one day overdue
    let rolled = engine.rollover(KEEPER, open.loan_id).unwrap();

    println!("  Loan opened for 28 days, keeper rolls it on day 29");
    println!("  interest settled: {} USDC (fee {} USDC)", rolled.interest_settled, rolled.lending_fee);
    println!("  collateral swapped: {} WETH, keeper reward: {} WETH", rolled.collateral_swapped, rolled.caller_reward);
    println!(
        "  end moved {} -> {} (exactly one term)\n",
        end_before, rolled.new_end_timestamp
    );
}

/// Price drop pushes a 4x position below maintenance; a partial liquidation
/// restores margin to maintenance + buffer.
fn scenario_5_liquidation() {
    println!("Scenario 5: Liquidation After Price Drop\n");

    let mut engine = setup();
    let params = engine
        .create_loan_params(
            ADMIN,
            USDC,
            WETH,
            Ratio::new_unchecked(dec!(0.25)),
            Ratio::new_unchecked(dec!(0.15)),
            0,
        )
        .unwrap();

    engine.fund_account(BORROWER, WETH, Amount::new_unchecked(dec!(2))).unwrap();
    let open = engine
        .open_trade(
            BORROWER,
            POOL,
            params,
            dec!(4),
            CollateralPayment::token(WETH, Amount::new_unchecked(dec!(2))),
        )
        .unwrap();
    println!("  4x long: {} USDC principal, {} WETH collateral", open.principal, open.collateral);

    set_price(&mut engine, dec!(1700));
    let (margin, _) = engine.current_margin(open.loan_id).unwrap();
    println!("  WETH drops to $1700, margin {:.4} (maintenance 15%)", margin);

    engine.fund_account(LIQUIDATOR, USDC, Amount::new_unchecked(dec!(50_000))).unwrap();
    let liq = engine
        .liquidate(LIQUIDATOR, open.loan_id, Amount::zero())
        .unwrap();

    println!("\n  liquidated {} USDC of principal, seized {} WETH", liq.loan_close_amount, liq.collateral_seized);
    match liq.margin_after {
        Some(after) => println!("  margin restored {:.4} -> {:.4}", liq.margin_before, after),
        None => println!("  position fully closed"),
    }
}
