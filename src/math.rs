// 2.0: fixed-point percentage arithmetic. every one of the five loan operations
// (open, increase, rollover, close, liquidate) computes margins, fees, and interest
// through these helpers so the formulas cannot drift apart.
//
// rounding convention: results are quantized to AMOUNT_DP decimal places with an
// explicit direction. ledger amounts owed BY a user round up, amounts paid TO a
// user round down. overflow and division by zero abort the whole operation.

use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

// quantization for ledger amounts. 18 places matches the usual token wei scale.
pub const AMOUNT_DP: u32 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MathError {
    #[error("arithmetic overflow")]
    Overflow,

    #[error("division by zero")]
    DivisionByZero,

    #[error("result would be negative")]
    Negative,
}

pub fn floor_amount(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(AMOUNT_DP, RoundingStrategy::ToNegativeInfinity)
}

pub fn ceil_amount(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(AMOUNT_DP, RoundingStrategy::ToPositiveInfinity)
}

/// `a * b`, floored.
pub fn mul_floor(a: Decimal, b: Decimal) -> Result<Decimal, MathError> {
    let product = a.checked_mul(b).ok_or(MathError::Overflow)?;
    Ok(floor_amount(product))
}

/// `a * b`, ceiled.
pub fn mul_ceil(a: Decimal, b: Decimal) -> Result<Decimal, MathError> {
    let product = a.checked_mul(b).ok_or(MathError::Overflow)?;
    Ok(ceil_amount(product))
}

/// `a / b`, floored.
pub fn div_floor(a: Decimal, b: Decimal) -> Result<Decimal, MathError> {
    if b.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let quotient = a.checked_div(b).ok_or(MathError::Overflow)?;
    Ok(floor_amount(quotient))
}

/// `a / b`, ceiled.
pub fn div_ceil(a: Decimal, b: Decimal) -> Result<Decimal, MathError> {
    if b.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let quotient = a.checked_div(b).ok_or(MathError::Overflow)?;
    Ok(ceil_amount(quotient))
}

/// `a * b / c`, floored. the workhorse for pro-rata splits
/// (`principal * swap_amount / collateral` and friends).
pub fn mul_div_floor(a: Decimal, b: Decimal, c: Decimal) -> Result<Decimal, MathError> {
    if c.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let product = a.checked_mul(b).ok_or(MathError::Overflow)?;
    let quotient = product.checked_div(c).ok_or(MathError::Overflow)?;
    Ok(floor_amount(quotient))
}

/// `a * b / c`, ceiled. used where the result is an obligation on the caller.
pub fn mul_div_ceil(a: Decimal, b: Decimal, c: Decimal) -> Result<Decimal, MathError> {
    if c.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let product = a.checked_mul(b).ok_or(MathError::Overflow)?;
    let quotient = product.checked_div(c).ok_or(MathError::Overflow)?;
    Ok(ceil_amount(quotient))
}

pub fn checked_add(a: Decimal, b: Decimal) -> Result<Decimal, MathError> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

/// `a - b`, erroring instead of going negative. used for every ledger decrement.
pub fn checked_sub(a: Decimal, b: Decimal) -> Result<Decimal, MathError> {
    let diff = a.checked_sub(b).ok_or(MathError::Overflow)?;
    if diff < Decimal::ZERO {
        return Err(MathError::Negative);
    }
    Ok(diff)
}

/// `max(a - b, 0)`. only for aggregate counters that tolerate rounding drift,
/// never for balances.
pub fn saturating_sub(a: Decimal, b: Decimal) -> Decimal {
    (a - b).max(Decimal::ZERO)
}
