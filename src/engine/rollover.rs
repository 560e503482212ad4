// 14.3: rollover. a fixed-term loan nearing or past its end gets exactly one
// more term: overdue interest is collected by swapping a slice of collateral,
// the escrow is topped back up to cover the new end, and whoever called gets a
// small collateral reward for doing the bookkeeping. callable by anyone.

use crate::balances::Holder;
use crate::config::Operation;
use crate::events::{EventPayload, InterestSettledEvent, LoanRolledOverEvent};
use crate::fees::FeeKind;
use crate::math;
use crate::oracle::PriceOracle;
use crate::swap::SwapExecutor;
use crate::types::{AccountId, Amount, LoanId};
use rust_decimal::Decimal;

use super::core::LendingEngine;
use super::phase::{OpPhase, Phase};
use super::results::{LendingError, RolloverResult};

impl<O: PriceOracle, S: SwapExecutor> LendingEngine<O, S> {
    pub fn rollover(
        &mut self,
        caller: AccountId,
        loan_id: LoanId,
    ) -> Result<RolloverResult, LendingError> {
        self.ensure_not_paused(Operation::Rollover)?;
        let now = self.current_time;

        let loan = self.loan(loan_id)?;
        if !loan.active {
            return Err(LendingError::LoanNotActive(loan_id));
        }
        // open-ended loans have no term to extend
        let Some(end) = loan.end_timestamp else {
            return Err(LendingError::NothingToRollover(loan_id));
        };
        if now < end.plus_secs(-self.config.rollover_grace_secs) {
            return Err(LendingError::NothingToRollover(loan_id));
        }
        let pool_id = loan.pool;

        let checkpoint = self.checkpoint(Some(loan_id), pool_id)?;
        match self.rollover_inner(caller, loan_id) {
            Ok(result) => Ok(result),
            Err(err) => {
                self.restore(checkpoint);
                Err(err)
            }
        }
    }

    // everything after the checkpoint; any error here is rolled back whole
    fn rollover_inner(
        &mut self,
        caller: AccountId,
        loan_id: LoanId,
    ) -> Result<RolloverResult, LendingError> {
        let mut phase = OpPhase::start();
        let now = self.current_time;

        let escrow_settlement = self.settle_loan_interest(loan_id)?;

        let loan = self.loan(loan_id)?.clone();
        let params = self
            .ledger
            .get_params(loan.loan_params_id)
            .ok_or(LendingError::UnknownLoanParams(loan.loan_params_id))?
            .clone();
        let pool_id = loan.pool;
        let end = loan
            .end_timestamp
            .ok_or(LendingError::NothingToRollover(loan_id))?;

        self.oracle
            .check_price_disagreement(params.collateral_token, params.loan_token)?;
        let exch = self
            .oracle
            .query_rate(params.collateral_token, params.loan_token)?;

        // interest for days already past end, owed by the borrower, rounds up
        let back_interest = Amount::new_unchecked(math::mul_ceil(
            loan.interest_owed_per_day.value(),
            loan.overdue_days(now),
        )?);

        // exactly one term, anchored to the old end rather than to now
        let new_end = end.plus_secs(params.max_loan_term_secs);
        let required_escrow = Amount::new_unchecked(math::mul_floor(
            loan.interest_owed_per_day.value(),
            now.days_until(new_end),
        )?);
        let top_up = Amount::new_unchecked(math::saturating_sub(
            required_escrow.value(),
            loan.interest_deposit_remaining.value(),
        ));

        let swap_need = Amount::new_unchecked(math::checked_add(
            back_interest.value(),
            top_up.value(),
        )?);
        if swap_need.is_zero() && !loan.is_expired(now) {
            return Err(LendingError::NothingToRollover(loan_id));
        }
        phase.advance(Phase::Validated);

        // collateral funds the swap, grossed up so an executor inside the
        // slippage budget still delivers the full need
        let source_needed = if swap_need.is_zero() {
            Amount::zero()
        } else {
            let effective_rate = exch.value()
                * (Decimal::ONE - self.config.max_swap_slippage_pct.value());
            Amount::new_unchecked(math::div_ceil(swap_need.value(), effective_rate)?)
        };
        if source_needed > loan.collateral {
            return Err(LendingError::InsufficientCollateral {
                required: source_needed,
                provided: loan.collateral,
            });
        }
        let remaining = math::checked_sub(loan.collateral.value(), source_needed.value())?;
        let reward = self
            .config
            .rollover_base_reward
            .min(Amount::new_unchecked(remaining));

        if !source_needed.is_zero() {
            self.balances
                .debit(Holder::Pool(pool_id), params.collateral_token, source_needed)?;
        }
        phase.advance(Phase::StateUpdated);

        let proceeds = if source_needed.is_zero() {
            Amount::zero()
        } else {
            phase.advance(Phase::ExternalCallIssued);
            self.swapper.swap(
                params.collateral_token,
                params.loan_token,
                source_needed,
                swap_need,
            )?
        };
        if !proceeds.is_zero() {
            self.balances
                .credit(Holder::Pool(pool_id), params.loan_token, swap_need)?;
            // overshoot beyond the need goes back to the borrower
            let excess = Amount::new_unchecked(math::saturating_sub(
                proceeds.value(),
                swap_need.value(),
            ));
            self.balances
                .credit(Holder::Account(loan.borrower), params.loan_token, excess)?;
        }

        // the back-interest slice settles to the lender like any other interest
        let back_settlement = if back_interest.is_zero() {
            None
        } else {
            let interest = self
                .ledger
                .interest_data_mut(pool_id)
                .ok_or(LendingError::PoolNotFound(pool_id))?;
            interest.accrue(now)?;
            let settlement = interest.settle(back_interest)?;
            self.pool_mut(pool_id)?.credit_interest(settlement.net_to_lender)?;
            self.balances.transfer(
                Holder::Pool(pool_id),
                Holder::FeeVault,
                params.loan_token,
                settlement.lending_fee,
            )?;
            self.fees
                .credit(FeeKind::Lending, params.loan_token, settlement.lending_fee)?;
            Some(settlement)
        };

        if !reward.is_zero() {
            self.balances.transfer(
                Holder::Pool(pool_id),
                Holder::Account(caller),
                params.collateral_token,
                reward,
            )?;
        }

        let record = self.loan_mut(loan_id)?;
        record.collateral = Amount::new_unchecked(math::checked_sub(
            record.collateral.value(),
            math::checked_add(source_needed.value(), reward.value())?,
        )?);
        record.interest_deposit_remaining = Amount::new_unchecked(math::checked_add(
            record.interest_deposit_remaining.value(),
            top_up.value(),
        )?);
        record.interest_deposit_total = Amount::new_unchecked(math::checked_add(
            record.interest_deposit_total.value(),
            top_up.value(),
        )?);
        record.end_timestamp = Some(new_end);

        if let Some(settlement) = back_settlement {
            self.emit_event(EventPayload::InterestSettled(InterestSettledEvent {
                pool: pool_id,
                loan_id,
                gross: settlement.gross,
                net_to_lender: settlement.net_to_lender,
                lending_fee: settlement.lending_fee,
            }));
        }

        let interest_settled = Amount::new_unchecked(math::checked_add(
            escrow_settlement.gross.value(),
            back_interest.value(),
        )?);
        let lending_fee = Amount::new_unchecked(math::checked_add(
            escrow_settlement.lending_fee.value(),
            back_settlement.map_or(Amount::zero(), |s| s.lending_fee).value(),
        )?);

        self.emit_event(EventPayload::LoanRolledOver(LoanRolledOverEvent {
            loan_id,
            caller,
            interest_settled,
            collateral_swapped: source_needed,
            caller_reward: reward,
            new_end_timestamp: new_end,
        }));
        phase.advance(Phase::Committed);
        debug_assert!(phase.is_committed());

        Ok(RolloverResult {
            loan_id,
            interest_settled,
            lending_fee,
            collateral_swapped: source_needed,
            caller_reward: reward,
            new_end_timestamp: new_end,
        })
    }
}
