// 8.0: price oracle seam. the engine only ever talks to the PriceOracle trait;
// margin math is defined here once, as default methods over query_rate, so every
// operation sees the same formula. FixedPriceOracle is the deterministic double
// used by tests and the sim.

use crate::math::MathError;
use crate::types::{Amount, ExchangeRate, Ratio, TokenId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
    // the field cannot be called `source`: thiserror reserves that name for
    // the error cause
    #[error("no rate known for pair {src:?} -> {dest:?}")]
    UnknownPair { src: TokenId, dest: TokenId },

    #[error("pricing is globally paused")]
    PricingPaused,

    #[error("price sources disagree beyond tolerance: primary {primary}, secondary {secondary}")]
    PriceDisagreement { primary: Decimal, secondary: Decimal },

    #[error(transparent)]
    Math(#[from] MathError),
}

pub trait PriceOracle {
    /// Exchange rate: units of `dest` per unit of `source`.
    fn query_rate(&self, source: TokenId, dest: TokenId) -> Result<ExchangeRate, OracleError>;

    /// Fails when rates disagree beyond tolerance or pricing is paused.
    fn check_price_disagreement(&self, source: TokenId, dest: TokenId) -> Result<(), OracleError>;

    /// The token all values are quoted in for `amount_in_reference`.
    fn reference_token(&self) -> TokenId;

    /// Value of `amount` of `token` in the reference token.
    fn amount_in_reference(&self, token: TokenId, amount: Amount) -> Result<Amount, OracleError> {
        if token == self.reference_token() {
            return Ok(amount);
        }
        let rate = self.query_rate(token, self.reference_token())?;
        Ok(Amount::new_unchecked(amount.value() * rate.value()))
    }

    /// Signed margin of a position plus the collateral → loan rate it was
    /// computed at. Zero principal reads as infinitely safe.
    fn current_margin(
        &self,
        loan_token: TokenId,
        collateral_token: TokenId,
        principal: Amount,
        collateral: Amount,
    ) -> Result<(Decimal, ExchangeRate), OracleError> {
        let rate = self.query_rate(collateral_token, loan_token)?;
        if principal.is_zero() {
            return Ok((Decimal::MAX, rate));
        }
        let collateral_value = collateral.value() * rate.value();
        let margin = (collateral_value - principal.value()) / principal.value();
        Ok((margin, rate))
    }

    fn should_liquidate(
        &self,
        loan_token: TokenId,
        collateral_token: TokenId,
        principal: Amount,
        collateral: Amount,
        maintenance_margin: Ratio,
    ) -> Result<bool, OracleError> {
        let (margin, _) = self.current_margin(loan_token, collateral_token, principal, collateral)?;
        Ok(margin <= maintenance_margin.value())
    }
}

// 8.1: fixed-rate oracle double. rates are set explicitly per pair (the inverse
// is derived), a secondary source can be installed to exercise the disagreement
// path, and the whole thing can be paused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedPriceOracle {
    rates: HashMap<(TokenId, TokenId), Decimal>,
    secondary_rates: HashMap<(TokenId, TokenId), Decimal>,
    /// max relative deviation between primary and secondary before queries fail
    pub disagreement_tolerance: Decimal,
    pub paused: bool,
    reference: TokenId,
}

impl FixedPriceOracle {
    pub fn new(reference: TokenId) -> Self {
        Self {
            rates: HashMap::new(),
            secondary_rates: HashMap::new(),
            disagreement_tolerance: Decimal::new(5, 2), // 5%
            paused: false,
            reference,
        }
    }

    /// Set the pair rate and its inverse.
    pub fn set_rate(&mut self, source: TokenId, dest: TokenId, rate: ExchangeRate) {
        self.rates.insert((source, dest), rate.value());
        self.rates.insert((dest, source), Decimal::ONE / rate.value());
    }

    pub fn set_secondary_rate(&mut self, source: TokenId, dest: TokenId, rate: ExchangeRate) {
        self.secondary_rates.insert((source, dest), rate.value());
        self.secondary_rates
            .insert((dest, source), Decimal::ONE / rate.value());
    }

    pub fn clear_secondary(&mut self) {
        self.secondary_rates.clear();
    }
}

impl PriceOracle for FixedPriceOracle {
    fn query_rate(&self, source: TokenId, dest: TokenId) -> Result<ExchangeRate, OracleError> {
        if self.paused {
            return Err(OracleError::PricingPaused);
        }
        if source == dest {
            return Ok(ExchangeRate::new_unchecked(Decimal::ONE));
        }
        let rate = self
            .rates
            .get(&(source, dest))
            .copied()
            .ok_or(OracleError::UnknownPair { src: source, dest })?;
        Ok(ExchangeRate::new_unchecked(rate))
    }

    fn check_price_disagreement(&self, source: TokenId, dest: TokenId) -> Result<(), OracleError> {
        if self.paused {
            return Err(OracleError::PricingPaused);
        }
        let primary = self.query_rate(source, dest)?.value();
        let Some(secondary) = self.secondary_rates.get(&(source, dest)).copied() else {
            return Ok(());
        };
        let deviation = ((primary - secondary) / primary).abs();
        if deviation > self.disagreement_tolerance {
            return Err(OracleError::PriceDisagreement { primary, secondary });
        }
        Ok(())
    }

    fn reference_token(&self) -> TokenId {
        self.reference
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const USD: TokenId = TokenId(1);
    const ETH: TokenId = TokenId(2);

    fn oracle() -> FixedPriceOracle {
        let mut oracle = FixedPriceOracle::new(USD);
        oracle.set_rate(ETH, USD, ExchangeRate::new_unchecked(dec!(2000)));
        oracle
    }

    #[test]
    fn rate_and_inverse() {
        let oracle = oracle();
        assert_eq!(oracle.query_rate(ETH, USD).unwrap().value(), dec!(2000));
        assert_eq!(oracle.query_rate(USD, ETH).unwrap().value(), dec!(0.0005));
    }

    #[test]
    fn unknown_pair_fails() {
        let oracle = oracle();
        let err = oracle.query_rate(ETH, TokenId(99));
        assert!(matches!(err, Err(OracleError::UnknownPair { .. })));
    }

    #[test]
    fn current_margin_formula() {
        let oracle = oracle();
        // 1 ETH collateral at $2000 against 1000 USD principal → 100% margin
        let (margin, rate) = oracle
            .current_margin(USD, ETH, Amount::new_unchecked(dec!(1000)), Amount::new_unchecked(dec!(1)))
            .unwrap();
        assert_eq!(margin, dec!(1));
        assert_eq!(rate.value(), dec!(2000));
    }

    #[test]
    fn zero_principal_is_infinitely_safe() {
        let oracle = oracle();
        let (margin, _) = oracle
            .current_margin(USD, ETH, Amount::zero(), Amount::new_unchecked(dec!(1)))
            .unwrap();
        assert_eq!(margin, Decimal::MAX);
    }

    #[test]
    fn should_liquidate_threshold() {
        let mut oracle = oracle();
        let maintenance = Ratio::new_unchecked(dec!(0.15));
        let principal = Amount::new_unchecked(dec!(1000));
        let collateral = Amount::new_unchecked(dec!(1));

        // 100% margin → healthy
        assert!(!oracle
            .should_liquidate(USD, ETH, principal, collateral, maintenance)
            .unwrap());

        // price collapse to $1150 → margin exactly 15% → liquidatable
        oracle.set_rate(ETH, USD, ExchangeRate::new_unchecked(dec!(1150)));
        assert!(oracle
            .should_liquidate(USD, ETH, principal, collateral, maintenance)
            .unwrap());
    }

    #[test]
    fn pause_blocks_queries() {
        let mut oracle = oracle();
        oracle.paused = true;
        assert_eq!(oracle.query_rate(ETH, USD), Err(OracleError::PricingPaused));
        assert_eq!(oracle.check_price_disagreement(ETH, USD), Err(OracleError::PricingPaused));
    }

    #[test]
    fn disagreement_beyond_tolerance_fails() {
        let mut oracle = oracle();
        oracle.set_secondary_rate(ETH, USD, ExchangeRate::new_unchecked(dec!(1800))); // 10% off
        assert!(matches!(
            oracle.check_price_disagreement(ETH, USD),
            Err(OracleError::PriceDisagreement { .. })
        ));

        oracle.set_secondary_rate(ETH, USD, ExchangeRate::new_unchecked(dec!(1980))); // 1% off
        assert!(oracle.check_price_disagreement(ETH, USD).is_ok());
    }
}
