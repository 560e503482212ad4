// 14.4: closing positions. two funding paths:
//   close_with_swap    - repay out of collateral; the return flag picks whether
//                        the leftover comes back as collateral or loan tokens
//   close_with_deposit - repay in loan tokens from the caller's balance
// both settle escrowed interest first, refund the unconsumed escrow pro rata,
// charge accrued interest on open-ended loans, scale interest_owed_per_day with
// the surviving principal, and retire the record when principal hits zero.

use crate::balances::Holder;
use crate::config::Operation;
use crate::events::{EventPayload, LoanClosedEvent};
use crate::fees::FeeKind;
use crate::math;
use crate::oracle::PriceOracle;
use crate::swap::SwapExecutor;
use crate::types::{AccountId, Amount, ExchangeRate, LoanId};
use rust_decimal::Decimal;

use super::core::LendingEngine;
use super::phase::{OpPhase, Phase};
use super::results::{CloseResult, LendingError};

impl<O: PriceOracle, S: SwapExecutor> LendingEngine<O, S> {
    /// Close by swapping `swap_amount` of collateral into the loan token.
    /// `swap_amount` at or above the whole collateral means a full close.
    /// With `return_token_is_collateral`, the repayment is pro rata to the
    /// slice, only as much collateral as it needs is swapped, and the rest of
    /// the slice comes back in collateral. Without it, the whole slice is
    /// swapped and the proceeds repay principal, capped at the outstanding
    /// principal; only what exceeds the debt comes back in loan tokens.
    pub fn close_with_swap(
        &mut self,
        caller: AccountId,
        loan_id: LoanId,
        swap_amount: Amount,
        return_token_is_collateral: bool,
        receiver: AccountId,
    ) -> Result<CloseResult, LendingError> {
        self.ensure_not_paused(Operation::Close)?;

        let loan = self.loan(loan_id)?;
        if !loan.active {
            return Err(LendingError::LoanNotActive(loan_id));
        }
        if caller != loan.borrower {
            return Err(LendingError::Unauthorized { caller });
        }
        if swap_amount.is_zero() {
            return Err(LendingError::NothingToClose(loan_id));
        }
        let pool_id = loan.pool;

        let checkpoint = self.checkpoint(Some(loan_id), pool_id)?;
        let result = if return_token_is_collateral {
            self.close_swap_collateral_inner(loan_id, swap_amount, caller, receiver)
        } else {
            self.close_swap_proceeds_inner(loan_id, swap_amount, caller, receiver)
        };
        match result {
            Ok(result) => Ok(result),
            Err(err) => {
                self.restore(checkpoint);
                Err(err)
            }
        }
    }

    // the return-collateral mode: the slice fixes the repayment pro rata and
    // only the collateral the repayment needs is swapped
    fn close_swap_collateral_inner(
        &mut self,
        loan_id: LoanId,
        swap_amount: Amount,
        caller: AccountId,
        receiver: AccountId,
    ) -> Result<CloseResult, LendingError> {
        let mut phase = OpPhase::start();
        let now = self.current_time;

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
        let exch = self
            .oracle
            .query_rate(params.collateral_token, params.loan_token)?;

        let swap_amount = swap_amount.min(loan.collateral);
        let full_close = swap_amount == loan.collateral;
        let close_amount = if full_close {
            loan.principal
        } else {
            Amount::new_unchecked(math::mul_div_floor(
                loan.principal.value(),
                swap_amount.value(),
                loan.collateral.value(),
            )?)
        };
        if close_amount.is_zero() {
            return Err(LendingError::NothingToClose(loan_id));
        }

        // unconsumed escrow comes back pro rata and offsets the repayment
        let refund = if full_close {
            loan.interest_deposit_remaining
        } else {
            Amount::new_unchecked(math::mul_div_floor(
                loan.interest_deposit_remaining.value(),
                close_amount.value(),
                loan.principal.value(),
            )?)
        };
        let repay_needed =
            Amount::new_unchecked(math::checked_sub(close_amount.value(), refund.value())?);
        let fee = Amount::new_unchecked(math::mul_floor(
            repay_needed.value(),
            self.config.trading_fee_pct.value(),
        )?);
        // open-ended loans pay their accrued interest out of the swap as well
        let open_interest = loan.open_interest_due(now)?;
        let required_dest = Amount::new_unchecked(math::checked_add(
            math::checked_add(repay_needed.value(), fee.value())?,
            open_interest.value(),
        )?);

        let source_needed = if required_dest.is_zero() {
            Amount::zero()
        } else {
            let effective_rate =
                exch.value() * (Decimal::ONE - self.config.max_swap_slippage_pct.value());
            Amount::new_unchecked(math::div_ceil(required_dest.value(), effective_rate)?)
        };
        if source_needed > swap_amount {
            return Err(LendingError::InsufficientCollateral {
                required: source_needed,
                provided: swap_amount,
            });
        }
        phase.advance(Phase::Validated);

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
                required_dest,
            )?
        };

        // repayment, fee, and open interest stay at the pool; overshoot
        // beyond the need is surplus for the receiver
        let surplus = Amount::new_unchecked(math::saturating_sub(
            proceeds.value(),
            required_dest.value(),
        ));
        if !proceeds.is_zero() {
            self.balances
                .credit(Holder::Pool(pool_id), params.loan_token, required_dest)?;
        }
        if !surplus.is_zero() {
            self.balances
                .credit(Holder::Account(receiver), params.loan_token, surplus)?;
        }
        if !fee.is_zero() {
            self.balances.transfer(
                Holder::Pool(pool_id),
                Holder::FeeVault,
                params.loan_token,
                fee,
            )?;
            self.fees
                .credit(FeeKind::Trading, params.loan_token, fee)?;
        }
        if !refund.is_zero() {
            // escrow release, paid from tokens already held at the pool
            self.balances.transfer(
                Holder::Pool(pool_id),
                Holder::Account(loan.borrower),
                params.loan_token,
                refund,
            )?;
        }
        self.settle_open_interest(loan_id, open_interest)?;

        // unswapped collateral in the slice goes back to the receiver
        let collateral_returned =
            Amount::new_unchecked(math::checked_sub(swap_amount.value(), source_needed.value())?);
        if !collateral_returned.is_zero() {
            self.balances.transfer(
                Holder::Pool(pool_id),
                Holder::Account(receiver),
                params.collateral_token,
                collateral_returned,
            )?;
        }

        let current_margin =
            self.apply_close(loan_id, close_amount, swap_amount, refund, full_close, exch)?;

        self.emit_event(EventPayload::LoanClosed(LoanClosedEvent {
            loan_id,
            caller,
            receiver,
            loan_close_amount: close_amount,
            collateral_used: swap_amount,
            interest_refund: refund,
            fee_paid: fee,
            current_margin,
            fully_closed: full_close,
        }));
        phase.advance(Phase::Committed);
        debug_assert!(phase.is_committed());

        Ok(CloseResult {
            loan_id,
            loan_close_amount: close_amount,
            collateral_used: swap_amount,
            collateral_returned,
            proceeds_to_receiver: surplus,
            interest_refund: refund,
            interest_charged: open_interest,
            fee_paid: fee,
            current_margin,
            fully_closed: full_close,
        })
    }

    // the proceeds mode: the whole slice is swapped and whatever it fetches
    // repays principal, capped at the outstanding principal
    fn close_swap_proceeds_inner(
        &mut self,
        loan_id: LoanId,
        swap_amount: Amount,
        caller: AccountId,
        receiver: AccountId,
    ) -> Result<CloseResult, LendingError> {
        let mut phase = OpPhase::start();
        let now = self.current_time;

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
        let exch = self
            .oracle
            .query_rate(params.collateral_token, params.loan_token)?;

        let swap_amount = swap_amount.min(loan.collateral);
        let full_slice = swap_amount == loan.collateral;
        let open_interest = loan.open_interest_due(now)?;
        // the executor must at least beat the slippage budget on the index rate
        let min_dest = Amount::new_unchecked(math::mul_floor(
            math::mul_floor(swap_amount.value(), exch.value())?,
            Decimal::ONE - self.config.max_swap_slippage_pct.value(),
        )?);
        phase.advance(Phase::Validated);

        self.balances
            .debit(Holder::Pool(pool_id), params.collateral_token, swap_amount)?;
        phase.advance(Phase::StateUpdated);

        phase.advance(Phase::ExternalCallIssued);
        let proceeds = self.swapper.swap(
            params.collateral_token,
            params.loan_token,
            swap_amount,
            min_dest,
        )?;

        // whatever is left after the accrued interest buys principal reduction,
        // fee included; floors keep the spend inside the proceeds
        let budget = Amount::new_unchecked(math::saturating_sub(
            proceeds.value(),
            open_interest.value(),
        ));
        let repay_budget = math::div_floor(
            budget.value(),
            Decimal::ONE + self.config.trading_fee_pct.value(),
        )?;
        // a full close needs the principal net of the escrow refund
        let repay_full =
            math::checked_sub(loan.principal.value(), loan.interest_deposit_remaining.value())?;

        let (close_amount, refund) = if repay_budget >= repay_full || full_slice {
            // proceeds cover the whole debt, or the whole collateral went into
            // the swap and the loan retires regardless
            (loan.principal, loan.interest_deposit_remaining)
        } else {
            let close = Amount::new_unchecked(math::mul_div_floor(
                repay_budget,
                loan.principal.value(),
                repay_full,
            )?);
            // the refund rounds up so the net repayment stays inside the budget
            let refund = Amount::new_unchecked(math::mul_div_ceil(
                loan.interest_deposit_remaining.value(),
                close.value(),
                loan.principal.value(),
            )?)
            .min(loan.interest_deposit_remaining);
            (close, refund)
        };
        if close_amount.is_zero() {
            return Err(LendingError::NothingToClose(loan_id));
        }
        let full_close = close_amount == loan.principal;
        let repay_needed =
            Amount::new_unchecked(math::checked_sub(close_amount.value(), refund.value())?);
        let fee = Amount::new_unchecked(math::mul_floor(
            repay_needed.value(),
            self.config.trading_fee_pct.value(),
        )?);

        // an underwater full-slice close can fall short; the repayment is
        // served first, then the interest, then the fee, and the pool eats
        // whatever the proceeds could not cover
        let mut remaining = proceeds;
        let repay_collected = repay_needed.min(remaining);
        remaining = Amount::new_unchecked(math::checked_sub(
            remaining.value(),
            repay_collected.value(),
        )?);
        let interest_collected = open_interest.min(remaining);
        remaining = Amount::new_unchecked(math::checked_sub(
            remaining.value(),
            interest_collected.value(),
        )?);
        let fee_collected = fee.min(remaining);
        let surplus =
            Amount::new_unchecked(math::checked_sub(remaining.value(), fee_collected.value())?);

        let pool_credit = Amount::new_unchecked(math::checked_add(
            repay_collected.value(),
            interest_collected.value(),
        )?);
        if !pool_credit.is_zero() {
            self.balances
                .credit(Holder::Pool(pool_id), params.loan_token, pool_credit)?;
        }
        if !fee_collected.is_zero() {
            self.balances
                .credit(Holder::FeeVault, params.loan_token, fee_collected)?;
            self.fees
                .credit(FeeKind::Trading, params.loan_token, fee_collected)?;
        }
        if !surplus.is_zero() {
            self.balances
                .credit(Holder::Account(receiver), params.loan_token, surplus)?;
        }
        if !refund.is_zero() {
            self.balances.transfer(
                Holder::Pool(pool_id),
                Holder::Account(loan.borrower),
                params.loan_token,
                refund,
            )?;
        }
        self.settle_open_interest(loan_id, interest_collected)?;

        // a full close on a partial slice frees the unswapped collateral
        let collateral_used = if full_close { loan.collateral } else { swap_amount };
        let collateral_returned = Amount::new_unchecked(math::checked_sub(
            collateral_used.value(),
            swap_amount.value(),
        )?);
        if !collateral_returned.is_zero() {
            self.balances.transfer(
                Holder::Pool(pool_id),
                Holder::Account(receiver),
                params.collateral_token,
                collateral_returned,
            )?;
        }

        let current_margin = self.apply_close(
            loan_id,
            close_amount,
            collateral_used,
            refund,
            full_close,
            exch,
        )?;

        self.emit_event(EventPayload::LoanClosed(LoanClosedEvent {
            loan_id,
            caller,
            receiver,
            loan_close_amount: close_amount,
            collateral_used,
            interest_refund: refund,
            fee_paid: fee_collected,
            current_margin,
            fully_closed: full_close,
        }));
        phase.advance(Phase::Committed);
        debug_assert!(phase.is_committed());

        Ok(CloseResult {
            loan_id,
            loan_close_amount: close_amount,
            collateral_used,
            collateral_returned,
            proceeds_to_receiver: surplus,
            interest_refund: refund,
            interest_charged: interest_collected,
            fee_paid: fee_collected,
            current_margin,
            fully_closed: full_close,
        })
    }

    /// Close by repaying loan tokens directly. `repay` above the outstanding
    /// principal is clamped; freed collateral goes to the receiver.
    pub fn close_with_deposit(
        &mut self,
        caller: AccountId,
        loan_id: LoanId,
        repay: Amount,
        receiver: AccountId,
    ) -> Result<CloseResult, LendingError> {
        self.ensure_not_paused(Operation::Close)?;

        let loan = self.loan(loan_id)?;
        if !loan.active {
            return Err(LendingError::LoanNotActive(loan_id));
        }
        if caller != loan.borrower {
            return Err(LendingError::Unauthorized { caller });
        }
        if repay.is_zero() {
            return Err(LendingError::ZeroRepayAmount);
        }
        let pool_id = loan.pool;

        let checkpoint = self.checkpoint(Some(loan_id), pool_id)?;
        match self.close_with_deposit_inner(loan_id, repay, caller, receiver) {
            Ok(result) => Ok(result),
            Err(err) => {
                self.restore(checkpoint);
                Err(err)
            }
        }
    }

    fn close_with_deposit_inner(
        &mut self,
        loan_id: LoanId,
        repay: Amount,
        caller: AccountId,
        receiver: AccountId,
    ) -> Result<CloseResult, LendingError> {
        let mut phase = OpPhase::start();
        let now = self.current_time;

        self.settle_loan_interest(loan_id)?;

        let loan = self.loan(loan_id)?.clone();
        let params = self
            .ledger
            .get_params(loan.loan_params_id)
            .ok_or(LendingError::UnknownLoanParams(loan.loan_params_id))?
            .clone();
        let pool_id = loan.pool;

        let exch = self
            .oracle
            .query_rate(params.collateral_token, params.loan_token)?;

        let close_amount = repay.min(loan.principal);
        let full_close = close_amount == loan.principal;
        if close_amount.is_zero() {
            return Err(LendingError::NothingToClose(loan_id));
        }

        let refund = if full_close {
            loan.interest_deposit_remaining
        } else {
            Amount::new_unchecked(math::mul_div_floor(
                loan.interest_deposit_remaining.value(),
                close_amount.value(),
                loan.principal.value(),
            )?)
        };
        let fee = Amount::new_unchecked(math::mul_floor(
            math::checked_sub(close_amount.value(), refund.value())?,
            self.config.trading_fee_pct.value(),
        )?);
        // accrued interest on open-ended loans is paid alongside the repayment
        let open_interest = loan.open_interest_due(now)?;

        let collateral_returned = if full_close {
            loan.collateral
        } else {
            Amount::new_unchecked(math::mul_div_floor(
                loan.collateral.value(),
                close_amount.value(),
                loan.principal.value(),
            )?)
        };
        phase.advance(Phase::Validated);

        // one debit of the caller, then internal movement only
        let caller_pays = Amount::new_unchecked(math::checked_add(
            math::checked_add(close_amount.value(), fee.value())?,
            open_interest.value(),
        )?);
        self.balances
            .debit(Holder::Account(caller), params.loan_token, caller_pays)?;
        self.balances.credit(
            Holder::Pool(pool_id),
            params.loan_token,
            Amount::new_unchecked(math::checked_add(
                close_amount.value(),
                open_interest.value(),
            )?),
        )?;
        self.balances.credit(Holder::FeeVault, params.loan_token, fee)?;
        self.fees
            .credit(FeeKind::Trading, params.loan_token, fee)?;
        if !refund.is_zero() {
            self.balances.transfer(
                Holder::Pool(pool_id),
                Holder::Account(loan.borrower),
                params.loan_token,
                refund,
            )?;
        }
        if !collateral_returned.is_zero() {
            self.balances.transfer(
                Holder::Pool(pool_id),
                Holder::Account(receiver),
                params.collateral_token,
                collateral_returned,
            )?;
        }
        self.settle_open_interest(loan_id, open_interest)?;

        let current_margin = self.apply_close(
            loan_id,
            close_amount,
            collateral_returned,
            refund,
            full_close,
            exch,
        )?;
        phase.advance(Phase::StateUpdated);

        self.emit_event(EventPayload::LoanClosed(LoanClosedEvent {
            loan_id,
            caller,
            receiver,
            loan_close_amount: close_amount,
            collateral_used: collateral_returned,
            interest_refund: refund,
            fee_paid: fee,
            current_margin,
            fully_closed: full_close,
        }));
        phase.advance(Phase::Committed);
        debug_assert!(phase.is_committed());

        Ok(CloseResult {
            loan_id,
            loan_close_amount: close_amount,
            collateral_used: collateral_returned,
            collateral_returned,
            proceeds_to_receiver: Amount::zero(),
            interest_refund: refund,
            interest_charged: open_interest,
            fee_paid: fee,
            current_margin,
            fully_closed: full_close,
        })
    }

    /// Shared ledger mutation for every principal reduction: shrink the loan,
    /// scale its per-day interest, sync the pool aggregates, and retire the
    /// record on full close. Returns the post-close margin.
    pub(super) fn apply_close(
        &mut self,
        loan_id: LoanId,
        close_amount: Amount,
        collateral_used: Amount,
        refund: Amount,
        full_close: bool,
        rate: ExchangeRate,
    ) -> Result<Option<Decimal>, LendingError> {
        let now = self.current_time;
        let loan = self.loan(loan_id)?.clone();
        let pool_id = loan.pool;
        let loan_token = self.pool(pool_id)?.loan_token;

        let new_principal =
            Amount::new_unchecked(math::checked_sub(loan.principal.value(), close_amount.value())?);
        let new_owed = if loan.principal.is_zero() || full_close {
            Amount::zero()
        } else {
            Amount::new_unchecked(math::mul_div_floor(
                loan.interest_owed_per_day.value(),
                new_principal.value(),
                loan.principal.value(),
            )?)
        };
        let owed_delta = Amount::new_unchecked(math::saturating_sub(
            loan.interest_owed_per_day.value(),
            new_owed.value(),
        ));

        if let Some(interest) = self.ledger.interest_data_mut(pool_id) {
            interest.on_principal_removed(now, close_amount, owed_delta)?;
        }
        self.pool_mut(pool_id)?.remove_borrowed(close_amount)?;

        // rounding can strand dust in the escrow on a full close; flush it
        let mut residual_escrow = Amount::zero();
        if full_close {
            residual_escrow = Amount::new_unchecked(math::saturating_sub(
                loan.interest_deposit_remaining.value(),
                refund.value(),
            ));
            if !residual_escrow.is_zero() {
                self.balances.transfer(
                    Holder::Pool(pool_id),
                    Holder::Account(loan.borrower),
                    loan_token,
                    residual_escrow,
                )?;
            }
        }

        let record = self.loan_mut(loan_id)?;
        record.principal = new_principal;
        record.collateral = Amount::new_unchecked(math::checked_sub(
            record.collateral.value(),
            collateral_used.value(),
        )?);
        record.interest_owed_per_day = new_owed;
        record.interest_deposit_remaining = Amount::new_unchecked(math::saturating_sub(
            record.interest_deposit_remaining.value(),
            math::checked_add(refund.value(), residual_escrow.value())?,
        ));

        if full_close {
            record.active = false;
            // retiring never pushes the end into the future
            record.end_timestamp = Some(match record.end_timestamp {
                Some(end) if end < now => end,
                _ => now,
            });
            debug_assert!(record.principal.is_zero());
            return Ok(None);
        }
        Ok(record.margin_at_rate(rate))
    }
}
