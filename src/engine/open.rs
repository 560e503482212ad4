// 14.2: opening and growing positions. three entry points share one
// validation path:
//   open_borrow   - principal out to the receiver, interest pre-funded from it
//   open_trade    - leveraged position, borrowed principal swapped into
//                   additional collateral
//   increase_loan - more principal and/or collateral on a live loan
//
// the required-collateral rule is the same everywhere: collateral value at the
// oracle rate must cover principal * (1 + minInitialMargin), rounded against
// the borrower.

use crate::balances::Holder;
use crate::config::Operation;
use crate::events::{EventPayload, LoanIncreasedEvent, LoanOpenedEvent};
use crate::fees::FeeKind;
use crate::loan::{Loan, LoanParams};
use crate::math;
use crate::oracle::PriceOracle;
use crate::swap::SwapExecutor;
use crate::types::{
    AccountId, Amount, ExchangeRate, LoanId, LoanParamsId, PoolId, Ratio, Timestamp, TokenId,
    DAYS_PER_YEAR,
};
use rust_decimal::Decimal;

use super::core::LendingEngine;
use super::phase::{OpPhase, Phase};
use super::results::{IncreaseResult, LendingError, OpenResult};

/// Collateral attached to an open or increase call. Exactly one of native
/// value or a token amount; sending both is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollateralPayment {
    pub value: Amount,
    pub token: Option<(TokenId, Amount)>,
}

impl CollateralPayment {
    pub fn value(amount: Amount) -> Self {
        Self {
            value: amount,
            token: None,
        }
    }

    pub fn token(token: TokenId, amount: Amount) -> Self {
        Self {
            value: Amount::zero(),
            token: Some((token, amount)),
        }
    }
}

impl<O: PriceOracle, S: SwapExecutor> LendingEngine<O, S> {
    pub fn open_borrow(
        &mut self,
        caller: AccountId,
        pool_id: PoolId,
        params_id: LoanParamsId,
        principal: Amount,
        payment: CollateralPayment,
        receiver: AccountId,
    ) -> Result<OpenResult, LendingError> {
        let mut phase = OpPhase::start();
        self.ensure_not_paused(Operation::Open)?;
        let now = self.current_time;

        let params = self.resolve_open_params(pool_id, params_id)?;
        if principal.is_zero() {
            return Err(LendingError::ZeroPrincipal);
        }
        let sent = self.resolve_payment(&payment, params.collateral_token)?;

        self.oracle
            .check_price_disagreement(params.collateral_token, params.loan_token)?;
        let exch = self
            .oracle
            .query_rate(params.collateral_token, params.loan_token)?;
        // rate is read at the utilization before this loan lands
        let annual_rate = self.pool(pool_id)?.borrow_rate()?;

        let fee = Amount::new_unchecked(math::mul_floor(
            sent.value(),
            self.config.borrowing_fee_pct.value(),
        )?);
        let net_collateral = Amount::new_unchecked(math::checked_sub(sent.value(), fee.value())?);

        let required = Amount::new_unchecked(math::mul_div_ceil(
            principal.value(),
            Decimal::ONE + params.min_initial_margin.value(),
            exch.value(),
        )?);
        if net_collateral < required {
            return Err(LendingError::InsufficientCollateral {
                required,
                provided: net_collateral,
            });
        }

        let owed_per_day = Amount::new_unchecked(math::mul_div_floor(
            principal.value(),
            annual_rate.value(),
            Decimal::new(DAYS_PER_YEAR, 0),
        )?);
        let (end_timestamp, deposit) = interest_schedule(&params, owed_per_day, now)?;

        // the escrow is carved out of the principal; a loan too small to fund
        // its own interest disburses nothing
        let disbursed = math::checked_sub(principal.value(), deposit.value())
            .map(Amount::new_unchecked)
            .map_err(|_| LendingError::ZeroPrincipal)?;

        let available = self.pool(pool_id)?.available();
        if available < principal {
            return Err(LendingError::InsufficientLiquidity {
                requested: principal,
                available,
            });
        }
        phase.advance(Phase::Validated);

        // effects: a single debit of the caller, then internal credits
        self.balances
            .debit(Holder::Account(caller), params.collateral_token, sent)?;
        self.balances
            .credit(Holder::Pool(pool_id), params.collateral_token, net_collateral)?;
        self.balances
            .credit(Holder::FeeVault, params.collateral_token, fee)?;
        self.fees
            .credit(FeeKind::Borrowing, params.collateral_token, fee)?;
        self.balances.transfer(
            Holder::Pool(pool_id),
            Holder::Account(receiver),
            params.loan_token,
            disbursed,
        )?;

        self.pool_mut(pool_id)?.add_borrowed(principal)?;
        if let Some(interest) = self.ledger.interest_data_mut(pool_id) {
            interest.on_principal_added(now, principal, owed_per_day)?;
        }

        let start_margin = initial_margin(net_collateral, exch, principal)?;
        let loan_id = self.ledger.next_loan_id();
        self.ledger.insert_loan(Loan {
            id: loan_id,
            loan_params_id: params.id,
            pool: pool_id,
            borrower: caller,
            principal,
            collateral: net_collateral,
            interest_owed_per_day: owed_per_day,
            interest_deposit_total: deposit,
            interest_deposit_remaining: deposit,
            start_timestamp: now,
            interest_paid_through: now,
            end_timestamp,
            start_rate: exch,
            start_margin,
            active: true,
        });
        phase.advance(Phase::StateUpdated);

        self.emit_event(EventPayload::LoanOpened(LoanOpenedEvent {
            loan_id,
            pool: pool_id,
            borrower: caller,
            principal,
            collateral: net_collateral,
            entry_rate: exch,
            leverage: Decimal::ZERO,
            start_margin,
            interest_owed_per_day: owed_per_day,
            fee_paid: fee,
            is_trade: false,
        }));
        phase.advance(Phase::Committed);
        debug_assert!(phase.is_committed());

        Ok(OpenResult {
            loan_id,
            principal,
            collateral: net_collateral,
            start_rate: exch,
            start_margin,
            leverage: Decimal::ZERO,
            interest_owed_per_day: owed_per_day,
            interest_deposit: deposit,
            fee_paid: fee,
            disbursed,
        })
    }

    pub fn open_trade(
        &mut self,
        caller: AccountId,
        pool_id: PoolId,
        params_id: LoanParamsId,
        leverage: Decimal,
        payment: CollateralPayment,
    ) -> Result<OpenResult, LendingError> {
        let mut phase = OpPhase::start();
        self.ensure_not_paused(Operation::Open)?;
        let now = self.current_time;

        let params = self.resolve_open_params(pool_id, params_id)?;
        let start_margin =
            Ratio::from_leverage(leverage).ok_or(LendingError::InvalidLeverage(leverage))?;
        if start_margin < params.min_initial_margin {
            return Err(LendingError::InitialMarginTooLow {
                requested: start_margin,
                minimum: params.min_initial_margin,
            });
        }
        let sent = self.resolve_payment(&payment, params.collateral_token)?;

        self.oracle
            .check_price_disagreement(params.collateral_token, params.loan_token)?;
        let exch = self
            .oracle
            .query_rate(params.collateral_token, params.loan_token)?;
        let back_rate = self
            .oracle
            .query_rate(params.loan_token, params.collateral_token)?;
        let annual_rate = self.pool(pool_id)?.borrow_rate()?;

        let fee = Amount::new_unchecked(math::mul_floor(
            sent.value(),
            self.config.trading_fee_pct.value(),
        )?);
        let net_collateral = Amount::new_unchecked(math::checked_sub(sent.value(), fee.value())?);

        // principal = equity * rate * leverage, floored against the borrower
        let equity_value = math::mul_floor(net_collateral.value(), exch.value())?;
        let principal = Amount::new_unchecked(math::mul_floor(equity_value, leverage)?);
        if principal.is_zero() {
            return Err(LendingError::ZeroPrincipal);
        }

        let owed_per_day = Amount::new_unchecked(math::mul_div_floor(
            principal.value(),
            annual_rate.value(),
            Decimal::new(DAYS_PER_YEAR, 0),
        )?);
        let (end_timestamp, deposit) = interest_schedule(&params, owed_per_day, now)?;

        let swap_amount = math::checked_sub(principal.value(), deposit.value())
            .map(Amount::new_unchecked)
            .map_err(|_| LendingError::ZeroPrincipal)?;
        let expected_dest = math::mul_floor(swap_amount.value(), back_rate.value())?;
        let min_dest = Amount::new_unchecked(math::mul_floor(
            expected_dest,
            Decimal::ONE - self.config.max_swap_slippage_pct.value(),
        )?);

        let available = self.pool(pool_id)?.available();
        if available < principal {
            return Err(LendingError::InsufficientLiquidity {
                requested: principal,
                available,
            });
        }
        phase.advance(Phase::Validated);

        let checkpoint = self.checkpoint(None, pool_id)?;

        self.balances
            .debit(Holder::Account(caller), params.collateral_token, sent)?;
        self.balances
            .credit(Holder::Pool(pool_id), params.collateral_token, net_collateral)?;
        self.balances
            .credit(Holder::FeeVault, params.collateral_token, fee)?;
        self.fees
            .credit(FeeKind::Trading, params.collateral_token, fee)?;

        self.pool_mut(pool_id)?.add_borrowed(principal)?;
        if let Some(interest) = self.ledger.interest_data_mut(pool_id) {
            interest.on_principal_added(now, principal, owed_per_day)?;
        }
        // swap source leaves the pool before the call goes out
        self.balances
            .debit(Holder::Pool(pool_id), params.loan_token, swap_amount)?;
        phase.advance(Phase::StateUpdated);

        phase.advance(Phase::ExternalCallIssued);
        let proceeds = match self.swapper.swap(
            params.loan_token,
            params.collateral_token,
            swap_amount,
            min_dest,
        ) {
            Ok(proceeds) => proceeds,
            Err(err) => {
                self.restore(checkpoint);
                return Err(err.into());
            }
        };
        self.balances
            .credit(Holder::Pool(pool_id), params.collateral_token, proceeds)?;

        let total_collateral =
            Amount::new_unchecked(math::checked_add(net_collateral.value(), proceeds.value())?);

        let loan_id = self.ledger.next_loan_id();
        self.ledger.insert_loan(Loan {
            id: loan_id,
            loan_params_id: params.id,
            pool: pool_id,
            borrower: caller,
            principal,
            collateral: total_collateral,
            interest_owed_per_day: owed_per_day,
            interest_deposit_total: deposit,
            interest_deposit_remaining: deposit,
            start_timestamp: now,
            interest_paid_through: now,
            end_timestamp,
            start_rate: exch,
            start_margin,
            active: true,
        });

        self.emit_event(EventPayload::LoanOpened(LoanOpenedEvent {
            loan_id,
            pool: pool_id,
            borrower: caller,
            principal,
            collateral: total_collateral,
            entry_rate: exch,
            leverage,
            start_margin,
            interest_owed_per_day: owed_per_day,
            fee_paid: fee,
            is_trade: true,
        }));
        phase.advance(Phase::Committed);
        debug_assert!(phase.is_committed());

        Ok(OpenResult {
            loan_id,
            principal,
            collateral: total_collateral,
            start_rate: exch,
            start_margin,
            leverage,
            interest_owed_per_day: owed_per_day,
            interest_deposit: deposit,
            fee_paid: fee,
            disbursed: Amount::zero(),
        })
    }

    pub fn increase_loan(
        &mut self,
        caller: AccountId,
        loan_id: LoanId,
        principal_add: Amount,
        payment: CollateralPayment,
        receiver: AccountId,
    ) -> Result<IncreaseResult, LendingError> {
        self.ensure_not_paused(Operation::Open)?;

        let loan = self.loan(loan_id)?;
        if !loan.active {
            return Err(LendingError::LoanNotActive(loan_id));
        }
        // the borrower, or the party that configured the loan acting on the
        // borrower's behalf
        let params_owner = self
            .ledger
            .get_params(loan.loan_params_id)
            .ok_or(LendingError::UnknownLoanParams(loan.loan_params_id))?
            .owner;
        if caller != loan.borrower && caller != params_owner {
            return Err(LendingError::Unauthorized { caller });
        }
        let pool_id = loan.pool;

        // interest settles inside; a rejection past this point must undo it
        let checkpoint = self.checkpoint(Some(loan_id), pool_id)?;
        match self.increase_loan_inner(caller, loan_id, principal_add, payment, receiver) {
            Ok(result) => Ok(result),
            Err(err) => {
                self.restore(checkpoint);
                Err(err)
            }
        }
    }

    fn increase_loan_inner(
        &mut self,
        caller: AccountId,
        loan_id: LoanId,
        principal_add: Amount,
        payment: CollateralPayment,
        receiver: AccountId,
    ) -> Result<IncreaseResult, LendingError> {
        let mut phase = OpPhase::start();
        let now = self.current_time;

        let loan = self.loan(loan_id)?.clone();
        let params = self
            .ledger
            .get_params(loan.loan_params_id)
            .ok_or(LendingError::UnknownLoanParams(loan.loan_params_id))?
            .clone();
        let pool_id = loan.pool;

        let sent = self.resolve_payment(&payment, params.collateral_token)?;
        if principal_add.is_zero() && sent.is_zero() {
            return Err(LendingError::ZeroPrincipal);
        }

        // bring the escrow current before the per-day rate changes
        self.settle_loan_interest(loan_id)?;
        let loan = self.loan(loan_id)?.clone();

        self.oracle
            .check_price_disagreement(params.collateral_token, params.loan_token)?;
        let exch = self
            .oracle
            .query_rate(params.collateral_token, params.loan_token)?;
        let annual_rate = self.pool(pool_id)?.borrow_rate()?;

        let fee = Amount::new_unchecked(math::mul_floor(
            sent.value(),
            self.config.borrowing_fee_pct.value(),
        )?);
        let net_collateral = Amount::new_unchecked(math::checked_sub(sent.value(), fee.value())?);

        let owed_add = Amount::new_unchecked(math::mul_div_floor(
            principal_add.value(),
            annual_rate.value(),
            Decimal::new(DAYS_PER_YEAR, 0),
        )?);
        let deposit_add = match loan.end_timestamp {
            Some(end) => {
                Amount::new_unchecked(math::mul_floor(owed_add.value(), now.days_until(end))?)
            }
            None => Amount::zero(),
        };
        let disbursed = math::checked_sub(principal_add.value(), deposit_add.value())
            .map(Amount::new_unchecked)
            .map_err(|_| LendingError::ZeroPrincipal)?;

        let new_principal =
            Amount::new_unchecked(math::checked_add(loan.principal.value(), principal_add.value())?);
        let new_collateral =
            Amount::new_unchecked(math::checked_add(loan.collateral.value(), net_collateral.value())?);

        // the grown position must meet the initial margin bar, not just maintenance
        let required = Amount::new_unchecked(math::mul_div_ceil(
            new_principal.value(),
            Decimal::ONE + params.min_initial_margin.value(),
            exch.value(),
        )?);
        if new_collateral < required {
            return Err(LendingError::InsufficientCollateral {
                required,
                provided: new_collateral,
            });
        }

        if !principal_add.is_zero() {
            let available = self.pool(pool_id)?.available();
            if available < principal_add {
                return Err(LendingError::InsufficientLiquidity {
                    requested: principal_add,
                    available,
                });
            }
        }
        phase.advance(Phase::Validated);

        self.balances
            .debit(Holder::Account(caller), params.collateral_token, sent)?;
        self.balances
            .credit(Holder::Pool(pool_id), params.collateral_token, net_collateral)?;
        self.balances
            .credit(Holder::FeeVault, params.collateral_token, fee)?;
        self.fees
            .credit(FeeKind::Borrowing, params.collateral_token, fee)?;
        self.balances.transfer(
            Holder::Pool(pool_id),
            Holder::Account(receiver),
            params.loan_token,
            disbursed,
        )?;

        self.pool_mut(pool_id)?.add_borrowed(principal_add)?;
        if let Some(interest) = self.ledger.interest_data_mut(pool_id) {
            interest.on_principal_added(now, principal_add, owed_add)?;
        }

        let record = self.loan_mut(loan_id)?;
        record.principal = new_principal;
        record.collateral = new_collateral;
        record.interest_owed_per_day =
            Amount::new_unchecked(math::checked_add(record.interest_owed_per_day.value(), owed_add.value())?);
        record.interest_deposit_total = Amount::new_unchecked(math::checked_add(
            record.interest_deposit_total.value(),
            deposit_add.value(),
        )?);
        record.interest_deposit_remaining = Amount::new_unchecked(math::checked_add(
            record.interest_deposit_remaining.value(),
            deposit_add.value(),
        )?);
        phase.advance(Phase::StateUpdated);

        self.emit_event(EventPayload::LoanIncreased(LoanIncreasedEvent {
            loan_id,
            principal_added: principal_add,
            collateral_added: net_collateral,
            new_principal,
            new_collateral,
        }));
        phase.advance(Phase::Committed);
        debug_assert!(phase.is_committed());

        Ok(IncreaseResult {
            loan_id,
            principal_added: principal_add,
            collateral_added: net_collateral,
            new_principal,
            new_collateral,
            fee_paid: fee,
            disbursed,
        })
    }

    // shared open-path validation

    fn resolve_open_params(
        &self,
        pool_id: PoolId,
        params_id: LoanParamsId,
    ) -> Result<LoanParams, LendingError> {
        let params = self
            .ledger
            .get_params(params_id)
            .ok_or(LendingError::UnknownLoanParams(params_id))?;
        if !params.active {
            return Err(LendingError::InactiveLoanParams(params_id));
        }
        let pool = self.pool(pool_id)?;
        if params.loan_token != pool.loan_token {
            return Err(LendingError::PoolTokenMismatch {
                pool: pool.loan_token,
                params: params.loan_token,
            });
        }
        Ok(params.clone())
    }

    fn resolve_payment(
        &self,
        payment: &CollateralPayment,
        expected: TokenId,
    ) -> Result<Amount, LendingError> {
        match payment.token {
            Some((token, amount)) if !amount.is_zero() => {
                if !payment.value.is_zero() {
                    return Err(LendingError::ValueTokenMismatch);
                }
                if token != expected {
                    return Err(LendingError::UnsupportedCollateral(token));
                }
                Ok(amount)
            }
            _ => {
                if !payment.value.is_zero() && self.config.native_token != expected {
                    return Err(LendingError::UnsupportedCollateral(self.config.native_token));
                }
                Ok(payment.value)
            }
        }
    }
}

fn interest_schedule(
    params: &LoanParams,
    owed_per_day: Amount,
    now: Timestamp,
) -> Result<(Option<Timestamp>, Amount), LendingError> {
    if params.is_torque() {
        // open-ended loans escrow nothing; accrued interest is charged at close
        return Ok((None, Amount::zero()));
    }
    let end = now.plus_secs(params.max_loan_term_secs);
    let deposit = Amount::new_unchecked(math::mul_floor(owed_per_day.value(), params.term_days())?);
    Ok((Some(end), deposit))
}

// margin the borrow actually opened at; never below the minimum because the
// collateral check already passed
fn initial_margin(
    collateral: Amount,
    rate: ExchangeRate,
    principal: Amount,
) -> Result<Ratio, LendingError> {
    let value = math::mul_floor(collateral.value(), rate.value())?;
    let margin = math::checked_sub(value, principal.value())?
        .checked_div(principal.value())
        .ok_or(crate::math::MathError::DivisionByZero)?;
    Ok(Ratio::new_unchecked(margin))
}
