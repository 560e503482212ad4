// 14.1: engine state and shared plumbing. the engine owns the ledger, the pool
// registry, the balance sheet, the fee accumulator, and the event log; the
// oracle and swap executor are injected collaborators behind traits.
//
// time is explicit. nothing here reads a clock; the caller sets or advances
// `current_time` and every operation stamps against it.

use crate::balances::{BalanceSheet, Holder};
use crate::config::{EngineConfig, Operation};
use crate::events::{Event, EventId, EventPayload, InterestSettledEvent, LiquidityEvent};
use crate::fees::{FeeAccumulator, FeeKind};
use crate::interest::{InterestSettlement, LenderInterestData};
use crate::ledger::LoanLedger;
use crate::loan::Loan;
use crate::math;
use crate::oracle::PriceOracle;
use crate::pool::PoolState;
use crate::swap::SwapExecutor;
use crate::types::{AccountId, Amount, ExchangeRate, LoanId, PoolId, Timestamp, TokenId, SECONDS_PER_DAY};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::results::LendingError;

pub struct LendingEngine<O, S> {
    pub(super) config: EngineConfig,
    pub(super) ledger: LoanLedger,
    pub(super) pools: HashMap<PoolId, PoolState>,
    pub(super) balances: BalanceSheet,
    pub(super) fees: FeeAccumulator,
    pub(super) oracle: O,
    pub(super) swapper: S,
    pub(super) events: Vec<Event>,
    pub(super) next_event_id: u64,
    pub(super) current_time: Timestamp,
}

/// Serializable view of engine state, for dumps and offline inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub timestamp: Timestamp,
    pub loans: Vec<Loan>,
    pub pools: Vec<PoolState>,
}

/// Everything a mutating operation may have touched before its external call.
/// Restoring puts the engine back exactly as captured, event log included.
pub(super) struct Checkpoint {
    loan: Option<Loan>,
    pool: PoolState,
    interest: Option<LenderInterestData>,
    balances: BalanceSheet,
    fees: FeeAccumulator,
    events_len: usize,
    next_event_id: u64,
}

impl<O: PriceOracle, S: SwapExecutor> LendingEngine<O, S> {
    pub fn new(config: EngineConfig, oracle: O, swapper: S) -> Result<Self, LendingError> {
        config.validate()?;
        Ok(Self {
            config,
            ledger: LoanLedger::new(),
            pools: HashMap::new(),
            balances: BalanceSheet::new(),
            fees: FeeAccumulator::new(),
            oracle,
            swapper,
            events: Vec::new(),
            next_event_id: 1,
            current_time: Timestamp::from_secs(0),
        })
    }

    // time control

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn set_time(&mut self, time: Timestamp) {
        debug_assert!(time >= self.current_time, "time went backwards");
        self.current_time = time;
    }

    pub fn advance_secs(&mut self, secs: i64) {
        self.current_time = self.current_time.plus_secs(secs);
    }

    pub fn advance_days(&mut self, days: i64) {
        self.advance_secs(days * SECONDS_PER_DAY);
    }

    // accessors

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    pub fn swapper_mut(&mut self) -> &mut S {
        &mut self.swapper
    }

    pub fn ledger(&self) -> &LoanLedger {
        &self.ledger
    }

    pub fn fees(&self) -> &FeeAccumulator {
        &self.fees
    }

    pub fn pool(&self, id: PoolId) -> Result<&PoolState, LendingError> {
        self.pools.get(&id).ok_or(LendingError::PoolNotFound(id))
    }

    pub(super) fn pool_mut(&mut self, id: PoolId) -> Result<&mut PoolState, LendingError> {
        self.pools.get_mut(&id).ok_or(LendingError::PoolNotFound(id))
    }

    pub fn loan(&self, id: LoanId) -> Result<&Loan, LendingError> {
        self.ledger.get_loan(id).ok_or(LendingError::LoanNotFound(id))
    }

    pub(super) fn loan_mut(&mut self, id: LoanId) -> Result<&mut Loan, LendingError> {
        self.ledger
            .get_loan_mut(id)
            .ok_or(LendingError::LoanNotFound(id))
    }

    pub fn balance_of(&self, holder: Holder, token: TokenId) -> Amount {
        self.balances.balance_of(holder, token)
    }

    /// Total of a token across all holders; fixed between external deposits.
    pub fn total_in_system(&self, token: TokenId) -> Amount {
        self.balances.total_of(token)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// The last `n` events, oldest first.
    pub fn recent_events(&self, n: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(n);
        &self.events[start..]
    }

    /// Interest the pool's loans have accrued but not yet settled, as of now.
    /// Read-only; settlement happens inside the mutating operations.
    pub fn accrued_interest(&self, pool_id: PoolId) -> Result<Amount, LendingError> {
        let interest = self
            .ledger
            .interest_data(pool_id)
            .ok_or(LendingError::PoolNotFound(pool_id))?;
        let pending = math::mul_floor(
            interest.interest_owed_per_day.value(),
            interest.interest_paid_date.days_until(self.current_time),
        )?;
        Ok(Amount::new_unchecked(math::checked_add(
            interest.interest_unpaid.value(),
            pending,
        )?))
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            timestamp: self.current_time,
            loans: self.ledger.loans().cloned().collect(),
            pools: self.pools.values().cloned().collect(),
        }
    }

    /// Signed margin of a loan at current oracle prices, plus the rate used.
    pub fn current_margin(&self, loan_id: LoanId) -> Result<(Decimal, ExchangeRate), LendingError> {
        let loan = self.loan(loan_id)?;
        let params = self
            .ledger
            .get_params(loan.loan_params_id)
            .ok_or(LendingError::UnknownLoanParams(loan.loan_params_id))?;
        Ok(self.oracle.current_margin(
            params.loan_token,
            params.collateral_token,
            loan.principal,
            loan.collateral,
        )?)
    }

    // funding and liquidity

    /// External deposit onto the balance sheet. Tokens enter the system only
    /// through here; everything else is internal movement.
    pub fn fund_account(
        &mut self,
        account: AccountId,
        token: TokenId,
        amount: Amount,
    ) -> Result<(), LendingError> {
        self.balances.credit(Holder::Account(account), token, amount)?;
        Ok(())
    }

    pub fn supply_liquidity(
        &mut self,
        caller: AccountId,
        pool_id: PoolId,
        amount: Amount,
    ) -> Result<(), LendingError> {
        self.ensure_not_paused(Operation::Supply)?;
        let token = self.pool(pool_id)?.loan_token;

        self.balances
            .transfer(Holder::Account(caller), Holder::Pool(pool_id), token, amount)?;
        self.pool_mut(pool_id)?.add_supply(amount)?;

        let new_supply = self.pool(pool_id)?.total_supply;
        self.emit_event(EventPayload::LiquiditySupplied(LiquidityEvent {
            pool: pool_id,
            lender: caller,
            amount,
            new_supply,
        }));
        Ok(())
    }

    pub fn withdraw_liquidity(
        &mut self,
        caller: AccountId,
        pool_id: PoolId,
        amount: Amount,
    ) -> Result<Amount, LendingError> {
        self.ensure_not_paused(Operation::Supply)?;
        let pool = self.pool(pool_id)?;
        let token = pool.loan_token;
        let available = pool.available();

        // lent-out liquidity cannot leave until loans repay
        let out = amount.min(available);
        if out.is_zero() {
            return Err(LendingError::InsufficientLiquidity {
                requested: amount,
                available,
            });
        }

        self.pool_mut(pool_id)?.remove_supply(out)?;
        self.balances
            .transfer(Holder::Pool(pool_id), Holder::Account(caller), token, out)?;

        let new_supply = self.pool(pool_id)?.total_supply;
        self.emit_event(EventPayload::LiquidityWithdrawn(LiquidityEvent {
            pool: pool_id,
            lender: caller,
            amount: out,
            new_supply,
        }));
        Ok(out)
    }

    // shared operation plumbing

    pub(super) fn ensure_not_paused(&self, op: Operation) -> Result<(), LendingError> {
        if self.config.paused.is_paused(op) {
            return Err(LendingError::OperationPaused(op));
        }
        Ok(())
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(EventId(self.next_event_id), self.current_time, payload);
        self.next_event_id += 1;
        if self.config.verbose {
            println!("[{}] {:?}", event.timestamp, event.payload);
        }
        if self.events.len() >= self.config.max_events {
            self.events.remove(0);
        }
        self.events.push(event);
    }

    /// Settle the interest the escrow has earned since the last touch: the
    /// consumed slice splits into the protocol's lending fee and pool income.
    /// Loans past end stop consuming once the escrow expectation hits zero;
    /// overdue interest is collected at rollover instead.
    pub(super) fn settle_loan_interest(
        &mut self,
        loan_id: LoanId,
    ) -> Result<InterestSettlement, LendingError> {
        let now = self.current_time;
        let loan = self.loan(loan_id)?;
        let pool_id = loan.pool;
        let loan_token = self.pool(pool_id)?.loan_token;

        let expected = loan.expected_deposit_remaining(now)?;
        let consumed = Amount::new_unchecked(math::checked_sub(
            loan.interest_deposit_remaining.value(),
            expected.value(),
        )?);
        if consumed.is_zero() {
            return Ok(InterestSettlement {
                gross: Amount::zero(),
                net_to_lender: Amount::zero(),
                lending_fee: Amount::zero(),
            });
        }

        let interest = self
            .ledger
            .interest_data_mut(pool_id)
            .ok_or(LendingError::PoolNotFound(pool_id))?;
        interest.accrue(now)?;
        let settlement = interest.settle(consumed)?;

        // escrowed tokens already sit at the pool; the net slice becomes
        // depositor liquidity, the fee slice moves to the vault
        self.pool_mut(pool_id)?.credit_interest(settlement.net_to_lender)?;
        self.balances.transfer(
            Holder::Pool(pool_id),
            Holder::FeeVault,
            loan_token,
            settlement.lending_fee,
        )?;
        self.fees
            .credit(FeeKind::Lending, loan_token, settlement.lending_fee)?;

        self.loan_mut(loan_id)?.interest_deposit_remaining = expected;

        self.emit_event(EventPayload::InterestSettled(InterestSettledEvent {
            pool: pool_id,
            loan_id,
            gross: settlement.gross,
            net_to_lender: settlement.net_to_lender,
            lending_fee: settlement.lending_fee,
        }));
        Ok(settlement)
    }

    /// Settle interest charged on an open-ended loan. The gross amount must
    /// already sit at the pool in loan tokens; this splits off the lending fee,
    /// grows depositor liquidity by the rest, and marks the loan charged
    /// through now. Fixed-term loans never come through here.
    pub(super) fn settle_open_interest(
        &mut self,
        loan_id: LoanId,
        gross: Amount,
    ) -> Result<(), LendingError> {
        if gross.is_zero() {
            return Ok(());
        }
        let now = self.current_time;
        let loan = self.loan(loan_id)?;
        let pool_id = loan.pool;
        let loan_token = self.pool(pool_id)?.loan_token;

        let interest = self
            .ledger
            .interest_data_mut(pool_id)
            .ok_or(LendingError::PoolNotFound(pool_id))?;
        interest.accrue(now)?;
        let settlement = interest.settle(gross)?;

        self.pool_mut(pool_id)?.credit_interest(settlement.net_to_lender)?;
        self.balances.transfer(
            Holder::Pool(pool_id),
            Holder::FeeVault,
            loan_token,
            settlement.lending_fee,
        )?;
        self.fees
            .credit(FeeKind::Lending, loan_token, settlement.lending_fee)?;
        self.loan_mut(loan_id)?.interest_paid_through = now;

        self.emit_event(EventPayload::InterestSettled(InterestSettledEvent {
            pool: pool_id,
            loan_id,
            gross: settlement.gross,
            net_to_lender: settlement.net_to_lender,
            lending_fee: settlement.lending_fee,
        }));
        Ok(())
    }

    pub(super) fn checkpoint(
        &self,
        loan_id: Option<LoanId>,
        pool_id: PoolId,
    ) -> Result<Checkpoint, LendingError> {
        Ok(Checkpoint {
            loan: loan_id.and_then(|id| self.ledger.get_loan(id)).cloned(),
            pool: self.pool(pool_id)?.clone(),
            interest: self.ledger.interest_data(pool_id).cloned(),
            balances: self.balances.clone(),
            fees: self.fees.clone(),
            events_len: self.events.len(),
            next_event_id: self.next_event_id,
        })
    }

    /// Undo everything back to the checkpoint. Called when the external swap
    /// fails after state was written; the operation then returns the swap error
    /// with the engine exactly as it was.
    pub(super) fn restore(&mut self, checkpoint: Checkpoint) {
        if let Some(loan) = checkpoint.loan {
            self.ledger.insert_loan(loan);
        }
        let pool_id = checkpoint.pool.id;
        self.pools.insert(pool_id, checkpoint.pool);
        if let Some(interest) = checkpoint.interest {
            self.ledger.set_interest_data(pool_id, interest);
        }
        self.balances = checkpoint.balances;
        self.fees = checkpoint.fees;
        self.events.truncate(checkpoint.events_len);
        self.next_event_id = checkpoint.next_event_id;
    }
}
