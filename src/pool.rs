// 6.0: lending pool funds. the pool is the lender of record for every loan it
// backs; this tracks only the totals the rate curve and solvency checks need.
// the depositor share token itself is an external concern.

use crate::curve::{CurveError, DemandCurveConfig};
use crate::math::{self, MathError};
use crate::types::{Amount, PoolId, Ratio, TokenId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("no demand curve configured for pool {0:?}")]
    CurveNotSet(PoolId),

    #[error(transparent)]
    Curve(#[from] CurveError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    pub id: PoolId,
    pub loan_token: TokenId,
    /// liquidity supplied by depositors plus retained interest income
    pub total_supply: Amount,
    /// principal currently lent out
    pub total_borrowed: Amount,
    /// unset until the administrator configures it; borrowing is impossible before
    pub curve: Option<DemandCurveConfig>,
}

impl PoolState {
    pub fn new(id: PoolId, loan_token: TokenId) -> Self {
        Self {
            id,
            loan_token,
            total_supply: Amount::zero(),
            total_borrowed: Amount::zero(),
            curve: None,
        }
    }

    /// Fraction of supplied liquidity currently lent out. Can exceed 100% after
    /// lender-side losses; an empty pool reads as zero.
    pub fn utilization(&self) -> Ratio {
        if self.total_supply.is_zero() {
            return Ratio::zero();
        }
        Ratio::new_unchecked(self.total_borrowed.value() / self.total_supply.value())
    }

    /// Liquidity not currently lent out.
    pub fn available(&self) -> Amount {
        Amount::new_unchecked(math::saturating_sub(
            self.total_supply.value(),
            self.total_borrowed.value(),
        ))
    }

    /// Per-annum borrow rate at the current utilization.
    pub fn borrow_rate(&self) -> Result<Ratio, PoolError> {
        let curve = self.curve.as_ref().ok_or(PoolError::CurveNotSet(self.id))?;
        Ok(curve.borrow_rate(self.utilization())?)
    }

    pub fn add_supply(&mut self, amount: Amount) -> Result<(), MathError> {
        self.total_supply = Amount::new_unchecked(math::checked_add(
            self.total_supply.value(),
            amount.value(),
        )?);
        Ok(())
    }

    pub fn remove_supply(&mut self, amount: Amount) -> Result<(), MathError> {
        self.total_supply = Amount::new_unchecked(math::checked_sub(
            self.total_supply.value(),
            amount.value(),
        )?);
        Ok(())
    }

    pub fn add_borrowed(&mut self, amount: Amount) -> Result<(), MathError> {
        self.total_borrowed = Amount::new_unchecked(math::checked_add(
            self.total_borrowed.value(),
            amount.value(),
        )?);
        Ok(())
    }

    pub fn remove_borrowed(&mut self, amount: Amount) -> Result<(), MathError> {
        self.total_borrowed = Amount::new_unchecked(math::checked_sub(
            self.total_borrowed.value(),
            amount.value(),
        )?);
        Ok(())
    }

    /// Interest income retained by the pool grows depositor liquidity.
    pub fn credit_interest(&mut self, amount: Amount) -> Result<(), MathError> {
        self.add_supply(amount)
    }
}
