// 14.6: privileged surface. pool registration, rate curves, loan params,
// pause switches, fee withdrawal. everything here checks the caller against
// the configured authority before touching state.

use crate::balances::Holder;
use crate::config::Operation;
use crate::curve::DemandCurveConfig;
use crate::events::{
    CurveSetEvent, EventPayload, FeesWithdrawnEvent, LoanParamsCreatedEvent,
    LoanParamsDisabledEvent, OperationPausedEvent, PoolRegisteredEvent,
};
use crate::fees::FeeKind;
use crate::interest::LenderInterestData;
use crate::loan::LoanParams;
use crate::oracle::PriceOracle;
use crate::pool::PoolState;
use crate::swap::SwapExecutor;
use crate::types::{AccountId, Amount, LoanParamsId, PoolId, Ratio, TokenId};

use super::core::LendingEngine;
use super::results::LendingError;

impl<O: PriceOracle, S: SwapExecutor> LendingEngine<O, S> {
    fn ensure_admin(&self, caller: AccountId) -> Result<(), LendingError> {
        if caller != self.config.admin {
            return Err(LendingError::Unauthorized { caller });
        }
        Ok(())
    }

    pub fn register_pool(
        &mut self,
        caller: AccountId,
        pool_id: PoolId,
        loan_token: TokenId,
    ) -> Result<(), LendingError> {
        self.ensure_admin(caller)?;
        if self.pools.contains_key(&pool_id) {
            return Err(LendingError::PoolAlreadyRegistered(pool_id));
        }
        self.pools.insert(pool_id, PoolState::new(pool_id, loan_token));
        // the lending-fee split is snapshotted into the pool's interest record
        self.ledger.init_interest_data(
            pool_id,
            LenderInterestData::new(self.config.lending_fee_pct, self.current_time),
        );
        self.emit_event(EventPayload::PoolRegistered(PoolRegisteredEvent {
            pool: pool_id,
            loan_token,
        }));
        Ok(())
    }

    pub fn set_demand_curve(
        &mut self,
        caller: AccountId,
        pool_id: PoolId,
        curve: DemandCurveConfig,
    ) -> Result<(), LendingError> {
        self.ensure_admin(caller)?;
        curve.validate()?;
        let pool = self.pool_mut(pool_id)?;
        pool.curve = Some(curve.clone());
        self.emit_event(EventPayload::CurveSet(CurveSetEvent {
            pool: pool_id,
            base_rate: curve.base_rate,
            rate_multiplier: curve.rate_multiplier,
            kink_level: curve.kink_level,
            max_scale_rate: curve.max_scale_rate,
        }));
        Ok(())
    }

    /// Register a loan configuration. Content-addressed: submitting the same
    /// params twice returns the same id without clobbering the stored record.
    pub fn create_loan_params(
        &mut self,
        caller: AccountId,
        loan_token: TokenId,
        collateral_token: TokenId,
        min_initial_margin: Ratio,
        maintenance_margin: Ratio,
        max_loan_term_secs: i64,
    ) -> Result<LoanParamsId, LendingError> {
        let params = LoanParams::new(
            caller,
            loan_token,
            collateral_token,
            min_initial_margin,
            maintenance_margin,
            max_loan_term_secs,
        );
        let fresh = self.ledger.get_params(params.id).is_none();
        let id = self.ledger.register_params(params);
        if fresh {
            self.emit_event(EventPayload::LoanParamsCreated(LoanParamsCreatedEvent {
                params_id: id,
                owner: caller,
                loan_token,
                collateral_token,
                min_initial_margin,
                maintenance_margin,
            }));
        }
        Ok(id)
    }

    /// Disable, never delete. Live loans keep resolving disabled params; only
    /// new opens are blocked. The owner or the admin may disable.
    pub fn disable_loan_params(
        &mut self,
        caller: AccountId,
        params_id: LoanParamsId,
    ) -> Result<(), LendingError> {
        let admin = self.config.admin;
        let params = self
            .ledger
            .get_params_mut(params_id)
            .ok_or(LendingError::UnknownLoanParams(params_id))?;
        if caller != params.owner && caller != admin {
            return Err(LendingError::Unauthorized { caller });
        }
        params.active = false;
        self.emit_event(EventPayload::LoanParamsDisabled(LoanParamsDisabledEvent {
            params_id,
        }));
        Ok(())
    }

    pub fn pause(&mut self, caller: AccountId, op: Operation) -> Result<(), LendingError> {
        self.ensure_admin(caller)?;
        self.config.paused.set(op, true);
        self.emit_event(EventPayload::OperationPaused(OperationPausedEvent {
            operation: op,
        }));
        Ok(())
    }

    pub fn resume(&mut self, caller: AccountId, op: Operation) -> Result<(), LendingError> {
        self.ensure_admin(caller)?;
        self.config.paused.set(op, false);
        self.emit_event(EventPayload::OperationResumed(OperationPausedEvent {
            operation: op,
        }));
        Ok(())
    }

    /// Drain one fee bucket for one token to the receiver. Only the configured
    /// fee controller may call.
    pub fn withdraw_fees(
        &mut self,
        caller: AccountId,
        kind: FeeKind,
        token: TokenId,
        receiver: AccountId,
    ) -> Result<Amount, LendingError> {
        if caller != self.config.fee_controller {
            return Err(LendingError::Unauthorized { caller });
        }
        let amount = self.fees.take(kind, token);
        if !amount.is_zero() {
            self.balances
                .transfer(Holder::FeeVault, Holder::Account(receiver), token, amount)?;
        }
        self.emit_event(EventPayload::FeesWithdrawn(FeesWithdrawnEvent {
            kind,
            token,
            amount,
            receiver,
        }));
        Ok(amount)
    }
}
