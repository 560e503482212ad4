// 9.0: swap executor seam. the engine hands over a source amount and a floor on
// what must come back; an executor that cannot meet the floor fails the whole
// operation rather than under-delivering. IndexSwapper is the deterministic
// double: it fills at the oracle index rate minus a configurable spread.

use crate::math::{self, MathError};
use crate::oracle::{OracleError, PriceOracle};
use crate::types::{Amount, TokenId};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SwapError {
    #[error("slippage exceeded: swap returned {received}, minimum was {minimum}")]
    SlippageExceeded { received: Amount, minimum: Amount },

    // `src`, not `source`: thiserror reserves that field name for the cause
    #[error("no market for pair {src:?} -> {dest:?}")]
    NoMarket { src: TokenId, dest: TokenId },

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Math(#[from] MathError),
}

pub trait SwapExecutor {
    /// Swap `source_amount` of `source` into `dest`. Returns the destination
    /// amount received, which is never below `min_dest`.
    fn swap(
        &mut self,
        source: TokenId,
        dest: TokenId,
        source_amount: Amount,
        min_dest: Amount,
    ) -> Result<Amount, SwapError>;
}

/// Fills at the oracle rate with a spread haircut. Spread above the caller's
/// slippage budget surfaces as SlippageExceeded, which is exactly what the
/// close/rollover paths need to exercise.
#[derive(Debug, Clone)]
pub struct IndexSwapper<O> {
    pub oracle: O,
    /// fraction of the fill lost to spread, e.g. 0.003 = 30 bps
    pub spread: Decimal,
}

impl<O: PriceOracle> IndexSwapper<O> {
    pub fn new(oracle: O) -> Self {
        Self {
            oracle,
            spread: Decimal::ZERO,
        }
    }

    pub fn with_spread(oracle: O, spread: Decimal) -> Self {
        Self { oracle, spread }
    }
}

impl<O: PriceOracle> SwapExecutor for IndexSwapper<O> {
    fn swap(
        &mut self,
        source: TokenId,
        dest: TokenId,
        source_amount: Amount,
        min_dest: Amount,
    ) -> Result<Amount, SwapError> {
        let rate = self
            .oracle
            .query_rate(source, dest)
            .map_err(|_| SwapError::NoMarket { src: source, dest })?;

        let gross = math::mul_floor(source_amount.value(), rate.value())?;
        let haircut = math::mul_ceil(gross, self.spread)?;
        let received = Amount::new_unchecked(math::saturating_sub(gross, haircut));

        if received < min_dest {
            return Err(SwapError::SlippageExceeded {
                received,
                minimum: min_dest,
            });
        }
        Ok(received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::FixedPriceOracle;
    use crate::types::ExchangeRate;
    use rust_decimal_macros::dec;

    const USD: TokenId = TokenId(1);
    const ETH: TokenId = TokenId(2);

    fn swapper(spread: Decimal) -> IndexSwapper<FixedPriceOracle> {
        let mut oracle = FixedPriceOracle::new(USD);
        oracle.set_rate(ETH, USD, ExchangeRate::new_unchecked(dec!(2000)));
        IndexSwapper::with_spread(oracle, spread)
    }

    #[test]
    fn fills_at_index_rate() {
        let mut swapper = swapper(dec!(0));
        let received = swapper
            .swap(ETH, USD, Amount::new_unchecked(dec!(2)), Amount::zero())
            .unwrap();
        assert_eq!(received.value(), dec!(4000));
    }

    #[test]
    fn spread_reduces_fill() {
        let mut swapper = swapper(dec!(0.01));
        let received = swapper
            .swap(ETH, USD, Amount::new_unchecked(dec!(1)), Amount::zero())
            .unwrap();
        assert_eq!(received.value(), dec!(1980));
    }

    #[test]
    fn under_delivery_fails() {
        let mut swapper = swapper(dec!(0.01));
        let err = swapper.swap(
            ETH,
            USD,
            Amount::new_unchecked(dec!(1)),
            Amount::new_unchecked(dec!(2000)), // demands the full index fill
        );
        assert!(matches!(err, Err(SwapError::SlippageExceeded { .. })));
    }

    #[test]
    fn unknown_pair_is_no_market() {
        let mut swapper = swapper(dec!(0));
        let err = swapper.swap(ETH, TokenId(99), Amount::new_unchecked(dec!(1)), Amount::zero());
        assert!(matches!(err, Err(SwapError::NoMarket { .. })));
    }
}
