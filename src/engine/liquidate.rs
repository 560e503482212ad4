// 14.5: liquidation. callable by anyone once margin is at or below maintenance.
// the liquidator repays part of the principal in loan tokens and is paid
// collateral at a discount; partial liquidations close just enough to lift the
// margin back to maintenance plus the configured buffer, so one liquidation
// always terminates the distress instead of nibbling forever.
//
// solving margin(P - L, C - L*(1+i)/rate) = d for the close amount L gives
//   L = ((1 + d) * P - C * rate) / (d - i)
// with d = maintenance + buffer and i the incentive. config validation
// guarantees d > i, so the divisor is positive.

use crate::balances::Holder;
use crate::config::Operation;
use crate::events::{EventPayload, LoanLiquidatedEvent};
use crate::math;
use crate::oracle::PriceOracle;
use crate::swap::SwapExecutor;
use crate::types::{AccountId, Amount, ExchangeRate, LoanId, Ratio};
use rust_decimal::Decimal;

use super::core::LendingEngine;
use super::phase::{OpPhase, Phase};
use super::results::{LendingError, LiquidationResult};

impl<O: PriceOracle, S: SwapExecutor> LendingEngine<O, S> {
    /// Liquidate up to `close_requested` of the loan's principal. Zero means
    /// "as much as the margin math allows".
    pub fn liquidate(
        &mut self,
        liquidator: AccountId,
        loan_id: LoanId,
        close_requested: Amount,
    ) -> Result<LiquidationResult, LendingError> {
        self.ensure_not_paused(Operation::Liquidate)?;

        let loan = self.loan(loan_id)?;
        if !loan.active {
            return Err(LendingError::LoanNotActive(loan_id));
        }
        let pool_id = loan.pool;

        let checkpoint = self.checkpoint(Some(loan_id), pool_id)?;
        match self.liquidate_inner(liquidator, loan_id, close_requested) {
            Ok(result) => Ok(result),
            Err(err) => {
                self.restore(checkpoint);
                Err(err)
            }
        }
    }

    fn liquidate_inner(
        &mut self,
        liquidator: AccountId,
        loan_id: LoanId,
        close_requested: Amount,
    ) -> Result<LiquidationResult, LendingError> {
        let mut phase = OpPhase::start();

        self.settle_loan_interest(loan_id)?;

        let loan = self.loan(loan_id)?.clone();
        let params = self
            .ledger
            .get_params(loan.loan_params_id)
            .ok_or(LendingError::UnknownLoanParams(loan.loan_params_id))?
            .clone();
        let pool_id = loan.pool;

        self.oracle
            .check_price_disagreement(params.collateral_token, params.loan_token)?;
        let (margin_before, rate) = self.oracle.current_margin(
            params.loan_token,
            params.collateral_token,
            loan.principal,
            loan.collateral,
        )?;
        if margin_before > params.maintenance_margin.value() {
            return Err(LendingError::HealthyPosition {
                current_margin: margin_before,
                maintenance_margin: params.maintenance_margin,
            });
        }

        let desired = Ratio::new_unchecked(
            params.maintenance_margin.value() + self.config.liquidation_margin_buffer.value(),
        );
        let incentive = self.config.liquidation_incentive_pct;

        let (max_liquidatable, max_seizable) =
            liquidation_amounts(&loan, rate, desired, incentive)?;

        let close_amount = if close_requested.is_zero() {
            max_liquidatable
        } else {
            close_requested.min(max_liquidatable)
        };
        if close_amount.is_zero() {
            return Err(LendingError::NothingToClose(loan_id));
        }
        let full_close = close_amount == loan.principal;

        // seizure scales pro rata with the slice actually closed
        let seized = if close_amount == max_liquidatable {
            max_seizable
        } else {
            Amount::new_unchecked(math::mul_div_floor(
                max_seizable.value(),
                close_amount.value(),
                max_liquidatable.value(),
            )?)
        };
        let seized = seized.min(loan.collateral);

        let refund = if full_close {
            loan.interest_deposit_remaining
        } else {
            Amount::new_unchecked(math::mul_div_floor(
                loan.interest_deposit_remaining.value(),
                close_amount.value(),
                loan.principal.value(),
            )?)
        };
        phase.advance(Phase::Validated);

        // liquidator repays principal, pool releases discounted collateral
        self.balances
            .debit(Holder::Account(liquidator), params.loan_token, close_amount)?;
        self.balances
            .credit(Holder::Pool(pool_id), params.loan_token, close_amount)?;
        self.balances.transfer(
            Holder::Pool(pool_id),
            Holder::Account(liquidator),
            params.collateral_token,
            seized,
        )?;
        if !refund.is_zero() {
            self.balances.transfer(
                Holder::Pool(pool_id),
                Holder::Account(loan.borrower),
                params.loan_token,
                refund,
            )?;
        }
        // a fully liquidated borrower keeps whatever collateral the seizure left
        if full_close {
            let leftover = Amount::new_unchecked(math::checked_sub(
                loan.collateral.value(),
                seized.value(),
            )?);
            if !leftover.is_zero() {
                self.balances.transfer(
                    Holder::Pool(pool_id),
                    Holder::Account(loan.borrower),
                    params.collateral_token,
                    leftover,
                )?;
            }
        }

        let collateral_used = if full_close { loan.collateral } else { seized };
        let margin_after =
            self.apply_close(loan_id, close_amount, collateral_used, refund, full_close, rate)?;
        phase.advance(Phase::StateUpdated);

        self.emit_event(EventPayload::LoanLiquidated(LoanLiquidatedEvent {
            loan_id,
            liquidator,
            loan_close_amount: close_amount,
            collateral_seized: seized,
            margin_before,
            fully_closed: full_close,
        }));
        phase.advance(Phase::Committed);
        debug_assert!(phase.is_committed());

        Ok(LiquidationResult {
            loan_id,
            loan_close_amount: close_amount,
            collateral_seized: seized,
            margin_before,
            margin_after,
            fully_closed: full_close,
        })
    }
}

/// How much principal may be closed and how much collateral that seizes.
/// Both clamp to the loan's own limits; a position too far gone for the
/// restoring formula is closed whole.
fn liquidation_amounts(
    loan: &crate::loan::Loan,
    rate: ExchangeRate,
    desired: Ratio,
    incentive: Ratio,
) -> Result<(Amount, Amount), LendingError> {
    let principal = loan.principal.value();
    let collateral_value = loan
        .collateral
        .value()
        .checked_mul(rate.value())
        .ok_or(crate::math::MathError::Overflow)?;

    let divisor = desired.value() - incentive.value();
    let numerator = (Decimal::ONE + desired.value())
        .checked_mul(principal)
        .ok_or(crate::math::MathError::Overflow)?
        - collateral_value;

    let raw = numerator
        .checked_div(divisor)
        .ok_or(crate::math::MathError::DivisionByZero)?;
    let max_liquidatable = Amount::new_unchecked(
        math::ceil_amount(raw).clamp(Decimal::ZERO, principal),
    );

    // collateral paid out per unit closed carries the incentive premium
    let seizable = math::mul_div_floor(
        max_liquidatable.value(),
        Decimal::ONE + incentive.value(),
        rate.value(),
    )?;
    let max_seizable = Amount::new_unchecked(seizable).min(loan.collateral);

    Ok((max_liquidatable, max_seizable))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loan::Loan;
    use crate::types::{AccountId, LoanParamsId, PoolId, Timestamp};
    use rust_decimal_macros::dec;

    fn distressed_loan(principal: Decimal, collateral: Decimal) -> Loan {
        Loan {
            id: LoanId(1),
            loan_params_id: LoanParamsId(0),
            pool: PoolId(1),
            borrower: AccountId(2),
            principal: Amount::new_unchecked(principal),
            collateral: Amount::new_unchecked(collateral),
            interest_owed_per_day: Amount::zero(),
            interest_deposit_total: Amount::zero(),
            interest_deposit_remaining: Amount::zero(),
            start_timestamp: Timestamp::from_secs(0),
            interest_paid_through: Timestamp::from_secs(0),
            end_timestamp: None,
            start_rate: ExchangeRate::new_unchecked(dec!(1)),
            start_margin: Ratio::new_unchecked(dec!(0.5)),
            active: true,
        }
    }

    #[test]
    fn partial_liquidation_restores_target_margin() {
        // margin = (110 - 100) / 100 = 10%, below 15% maintenance
        let loan = distressed_loan(dec!(100), dec!(110));
        let rate = ExchangeRate::new_unchecked(dec!(1));
        let desired = Ratio::new_unchecked(dec!(0.25)); // 15% + 10% buffer
        let incentive = Ratio::new_unchecked(dec!(0.05));

        let (close, seized) = liquidation_amounts(&loan, rate, desired, incentive).unwrap();

        // L = (1.25 * 100 - 110) / 0.20 = 75
        assert_eq!(close.value(), dec!(75));
        // seizes 75 * 1.05 = 78.75 collateral
        assert_eq!(seized.value(), dec!(78.75));

        // check the post-liquidation margin really is the target
        let new_principal = dec!(100) - close.value();
        let new_collateral = dec!(110) - seized.value();
        let margin = (new_collateral - new_principal) / new_principal;
        assert_eq!(margin, dec!(0.25));
    }

    #[test]
    fn deeply_underwater_closes_whole_loan() {
        // collateral value below principal: nothing restores the margin
        let loan = distressed_loan(dec!(100), dec!(90));
        let rate = ExchangeRate::new_unchecked(dec!(1));
        let desired = Ratio::new_unchecked(dec!(0.25));
        let incentive = Ratio::new_unchecked(dec!(0.05));

        let (close, seized) = liquidation_amounts(&loan, rate, desired, incentive).unwrap();

        assert_eq!(close.value(), dec!(100)); // clamped to full principal
        assert_eq!(seized.value(), dec!(90)); // everything there is
    }

    #[test]
    fn healthy_position_yields_zero_liquidatable() {
        let loan = distressed_loan(dec!(100), dec!(200));
        let rate = ExchangeRate::new_unchecked(dec!(1));
        let desired = Ratio::new_unchecked(dec!(0.25));
        let incentive = Ratio::new_unchecked(dec!(0.05));

        let (close, _) = liquidation_amounts(&loan, rate, desired, incentive).unwrap();
        assert!(close.is_zero());
    }
}
