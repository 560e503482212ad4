//! Conservation and atomicity invariants.
//!
//! Tokens enter the system only through fund_account; every operation after
//! that moves value between holders without minting or burning, and a failed
//! operation moves nothing at all.

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

type TestEngine = LendingEngine<FixedPriceOracle, IndexSwapper<FixedPriceOracle>>;

fn curve() -> DemandCurveConfig {
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

fn engine() -> TestEngine {
    let mut oracle = FixedPriceOracle::new(USDC);
    oracle.set_rate(WETH, USDC, ExchangeRate::new_unchecked(dec!(2000)));
    let swapper = IndexSwapper::new(oracle.clone());

    let config = EngineConfig {
        rollover_base_reward: Amount::new_unchecked(dec!(0.01)),
        ..EngineConfig::default()
    };
    let mut engine = LendingEngine::new(config, oracle, swapper).unwrap();
    engine.register_pool(ADMIN, POOL, USDC).unwrap();
    engine.set_demand_curve(ADMIN, POOL, curve()).unwrap();

    engine.fund_account(LENDER, USDC, Amount::new_unchecked(dec!(1_000_000))).unwrap();
    engine
        .supply_liquidity(LENDER, POOL, Amount::new_unchecked(dec!(1_000_000)))
        .unwrap();
    engine
}

fn term_params(engine: &mut TestEngine) -> LoanParamsId {
    engine
        .create_loan_params(
            ADMIN,
            USDC,
            WETH,
            Ratio::new_unchecked(dec!(0.50)),
            Ratio::new_unchecked(dec!(0.15)),
            28 * SECONDS_PER_DAY,
        )
        .unwrap()
}

fn trade_params(engine: &mut TestEngine) -> LoanParamsId {
    engine
        .create_loan_params(
            ADMIN,
            USDC,
            WETH,
            Ratio::new_unchecked(dec!(0.25)),
            Ratio::new_unchecked(dec!(0.15)),
            0,
        )
        .unwrap()
}

fn set_price(engine: &mut TestEngine, rate: Decimal) {
    let rate = ExchangeRate::new_unchecked(rate);
    engine.oracle_mut().set_rate(WETH, USDC, rate);
    engine.swapper_mut().oracle.set_rate(WETH, USDC, rate);
}

/// Total USDC is conserved across a full borrow lifecycle. The swap-free path
/// never touches WETH totals either.
#[test]
fn deposit_lifecycle_conserves_tokens() {
    let mut engine = engine();
    let params = term_params(&mut engine);

    engine.fund_account(BORROWER, WETH, Amount::new_unchecked(dec!(8))).unwrap();
    engine.fund_account(BORROWER, USDC, Amount::new_unchecked(dec!(11_000))).unwrap();
    let usdc_total = engine.total_in_system(USDC);
    let weth_total = engine.total_in_system(WETH);

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
    assert_eq!(engine.total_in_system(USDC), usdc_total);
    assert_eq!(engine.total_in_system(WETH), weth_total);

    engine.advance_days(14);
    engine
        .close_with_deposit(
            BORROWER,
            open.loan_id,
            Amount::new_unchecked(dec!(10_000)),
            BORROWER,
        )
        .unwrap();
    assert_eq!(engine.total_in_system(USDC), usdc_total);
    assert_eq!(engine.total_in_system(WETH), weth_total);
}

/// Interest consumed by the borrower ends up split exactly between pool
/// supply growth and the lending-fee vault.
#[test]
fn consumed_interest_splits_between_pool_and_vault() {
    let mut engine = engine();
    let params = term_params(&mut engine);

    engine.fund_account(BORROWER, WETH, Amount::new_unchecked(dec!(8))).unwrap();
    engine.fund_account(BORROWER, USDC, Amount::new_unchecked(dec!(11_000))).unwrap();
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

    let supply_before = engine.pool(POOL).unwrap().total_supply;

    engine.advance_days(14);
    engine
        .close_with_deposit(
            BORROWER,
            open.loan_id,
            Amount::new_unchecked(dec!(10_000)),
            BORROWER,
        )
        .unwrap();

    let consumed = open.interest_owed_per_day.value() * dec!(14);
    let fee = engine.fees().held(FeeKind::Lending, USDC);
    let supply_growth =
        engine.pool(POOL).unwrap().total_supply.value() - supply_before.value();

    // 10% lending fee, remainder to depositors
    assert_eq!(fee.value() + supply_growth, consumed);
    assert_eq!(fee.value(), lending_core::math::mul_floor(consumed, dec!(0.10)).unwrap());
    // the lender can now withdraw more than they put in
    assert!(engine.pool(POOL).unwrap().total_supply.value() > dec!(1_000_000));
}

/// A swap that cannot meet its floor fails the whole operation: every balance,
/// the loan record, and the pool aggregates come back untouched.
#[test]
fn failed_swap_leaves_no_trace() {
    let mut engine = engine();
    let params = trade_params(&mut engine);

    engine.fund_account(BORROWER, WETH, Amount::new_unchecked(dec!(2))).unwrap();

    // spread wider than the engine's slippage budget: the fill misses min_dest
    engine.swapper_mut().spread = dec!(0.02);

    let usdc_total = engine.total_in_system(USDC);
    let weth_borrower = engine.balance_of(Holder::Account(BORROWER), WETH);
    let pool_before = engine.pool(POOL).unwrap().clone();
    let events_before = engine.events().len();

    let err = engine.open_trade(
        BORROWER,
        POOL,
        params,
        dec!(4),
        CollateralPayment::token(WETH, Amount::new_unchecked(dec!(2))),
    );
    assert!(matches!(err, Err(LendingError::Swap(_))));

    assert_eq!(engine.total_in_system(USDC), usdc_total);
    assert_eq!(engine.balance_of(Holder::Account(BORROWER), WETH), weth_borrower);
    assert_eq!(engine.pool(POOL).unwrap(), &pool_before);
    assert_eq!(engine.events().len(), events_before);
    assert_eq!(engine.ledger().loans().count(), 0);
}

/// Same atomicity for a close: the loan survives a failed swap intact.
#[test]
fn failed_close_swap_restores_loan() {
    let mut engine = engine();
    let params = trade_params(&mut engine);

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

    let loan_before = engine.loan(open.loan_id).unwrap().clone();
    let pool_before = engine.pool(POOL).unwrap().clone();

    engine.swapper_mut().spread = dec!(0.02);
    let err = engine.close_with_swap(BORROWER, open.loan_id, open.collateral, true, BORROWER);
    assert!(matches!(err, Err(LendingError::Swap(_))));

    assert_eq!(engine.loan(open.loan_id).unwrap(), &loan_before);
    assert_eq!(engine.pool(POOL).unwrap(), &pool_before);
}

/// A rejected increase undoes the interest settlement it ran first: escrow,
/// fee vault, pool supply, and the event log all come back untouched.
#[test]
fn rejected_increase_leaves_no_trace() {
    let mut engine = engine();
    let params = term_params(&mut engine);

    engine.fund_account(BORROWER, WETH, Amount::new_unchecked(dec!(8))).unwrap();
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

    // let half the escrow become consumable, then ask for far more principal
    // than the collateral supports
    engine.advance_days(14);
    let escrow_before = engine.loan(open.loan_id).unwrap().interest_deposit_remaining;
    let vault_before = engine.balance_of(Holder::FeeVault, USDC);
    let pool_before = engine.pool(POOL).unwrap().clone();
    let events_before = engine.events().len();

    let err = engine.increase_loan(
        BORROWER,
        open.loan_id,
        Amount::new_unchecked(dec!(50_000)),
        CollateralPayment::default(),
        BORROWER,
    );
    assert!(matches!(
        err,
        Err(LendingError::InsufficientCollateral { .. })
    ));

    assert_eq!(
        engine.loan(open.loan_id).unwrap().interest_deposit_remaining,
        escrow_before
    );
    assert_eq!(engine.balance_of(Holder::FeeVault, USDC), vault_before);
    assert_eq!(engine.pool(POOL).unwrap(), &pool_before);
    assert_eq!(engine.events().len(), events_before);
}

/// Every fee the engine charges lands in the vault and is withdrawable,
/// holder balance and accumulator in agreement.
#[test]
fn fee_vault_matches_accumulator() {
    let mut engine = engine();
    let term = term_params(&mut engine);
    let trade = trade_params(&mut engine);

    engine.fund_account(BORROWER, WETH, Amount::new_unchecked(dec!(12))).unwrap();
    engine.fund_account(BORROWER, USDC, Amount::new_unchecked(dec!(20_000))).unwrap();

    let open = engine
        .open_borrow(
            BORROWER,
            POOL,
            term,
            Amount::new_unchecked(dec!(10_000)),
            CollateralPayment::token(WETH, Amount::new_unchecked(dec!(8))),
            BORROWER,
        )
        .unwrap();
    engine
        .open_trade(
            BORROWER,
            POOL,
            trade,
            dec!(4),
            CollateralPayment::token(WETH, Amount::new_unchecked(dec!(2))),
        )
        .unwrap();
    engine.advance_days(14);
    engine
        .close_with_deposit(
            BORROWER,
            open.loan_id,
            Amount::new_unchecked(dec!(10_000)),
            BORROWER,
        )
        .unwrap();

    for token in [USDC, WETH] {
        assert_eq!(
            engine.balance_of(Holder::FeeVault, token),
            engine.fees().total_held(token),
            "vault and accumulator disagree for {token:?}"
        );
    }
}

/// active is true exactly while principal is positive, across every path that
/// takes principal to zero.
#[test]
fn active_flag_tracks_principal() {
    let mut engine = engine();
    let params = trade_params(&mut engine);

    engine.fund_account(BORROWER, WETH, Amount::new_unchecked(dec!(4))).unwrap();
    engine.fund_account(LIQUIDATOR, USDC, Amount::new_unchecked(dec!(100_000))).unwrap();

    // path one: full close by swap
    let a = engine
        .open_trade(
            BORROWER,
            POOL,
            params,
            dec!(4),
            CollateralPayment::token(WETH, Amount::new_unchecked(dec!(2))),
        )
        .unwrap();
    engine
        .close_with_swap(BORROWER, a.loan_id, a.collateral, true, BORROWER)
        .unwrap();

    // path two: full liquidation
    let b = engine
        .open_trade(
            BORROWER,
            POOL,
            params,
            dec!(4),
            CollateralPayment::token(WETH, Amount::new_unchecked(dec!(2))),
        )
        .unwrap();
    set_price(&mut engine, dec!(1500));
    engine
        .liquidate(LIQUIDATOR, b.loan_id, Amount::zero())
        .unwrap();

    for loan in engine.ledger().loans() {
        assert_eq!(loan.active, !loan.principal.is_zero());
        if !loan.active {
            assert!(loan.end_timestamp.unwrap() <= engine.time());
        }
    }
}

/// Rollover never changes the total token supply; it only reshuffles
/// collateral into interest, fees, and the keeper reward.
#[test]
fn rollover_conserves_tokens() {
    let mut engine = engine();
    let params = term_params(&mut engine);

    engine.fund_account(BORROWER, WETH, Amount::new_unchecked(dec!(8))).unwrap();
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

    engine.advance_days(29);
    let usdc_total = engine.total_in_system(USDC);
    let weth_total = engine.total_in_system(WETH);

    engine.rollover(KEEPER, open.loan_id).unwrap();

    // the swap mints USDC from WETH at the index rate, inside the same sheet
    assert!(engine.total_in_system(USDC) >= usdc_total);
    assert!(engine.total_in_system(WETH) < weth_total);
    // and the keeper reward is real, spendable collateral
    assert_eq!(
        engine.balance_of(Holder::Account(KEEPER), WETH).value(),
        dec!(0.01)
    );
}

/// Utilization climbs as principal leaves the pool and falls back on repayment.
#[test]
fn utilization_tracks_borrowing() {
    let mut engine = engine();
    let params = term_params(&mut engine);

    assert!(engine.pool(POOL).unwrap().utilization().is_zero());

    engine.fund_account(BORROWER, WETH, Amount::new_unchecked(dec!(80))).unwrap();
    let open = engine
        .open_borrow(
            BORROWER,
            POOL,
            params,
            Amount::new_unchecked(dec!(100_000)),
            CollateralPayment::token(WETH, Amount::new_unchecked(dec!(80))),
            BORROWER,
        )
        .unwrap();
    assert_eq!(engine.pool(POOL).unwrap().utilization().value(), dec!(0.1));

    engine.fund_account(BORROWER, USDC, Amount::new_unchecked(dec!(110_000))).unwrap();
    engine
        .close_with_deposit(
            BORROWER,
            open.loan_id,
            Amount::new_unchecked(dec!(100_000)),
            BORROWER,
        )
        .unwrap();
    assert!(engine.pool(POOL).unwrap().total_borrowed.is_zero());
}
