// 3.0: utilization-driven interest rate curve. three segments: a shallow
// low-utilization line up to target_level, a linear bridge from target to
// kink_level, and a steep scale from the kink toward max_scale_rate.
// pure math, no state. an invalid curve is rejected when it is set, never
// silently clamped at read time.

use crate::math::{self, MathError};
use crate::types::Ratio;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CurveError {
    #[error("base rate plus multiplier exceeds 100% ({base} + {multiplier})")]
    RateSumExceedsLimit { base: Ratio, multiplier: Ratio },

    #[error("utilization levels must satisfy 0 < target < kink <= 100%")]
    BadLevelOrdering,

    #[error("max scale rate {max} is below the rate at the kink {kink_rate}")]
    MaxBelowKinkRate { max: Ratio, kink_rate: Ratio },

    #[error("curve math failed: {0}")]
    Math(#[from] MathError),
}

/// Per-pool demand curve parameters. All values are fractions (1 = 100%).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandCurveConfig {
    pub base_rate: Ratio,
    pub rate_multiplier: Ratio,
    pub low_util_base_rate: Ratio,
    pub low_util_rate_multiplier: Ratio,
    pub target_level: Ratio,
    pub kink_level: Ratio,
    pub max_scale_rate: Ratio,
}

impl DemandCurveConfig {
    /// Write-time validation. A curve that could imply an effective rate above
    /// 100% before the max-scale segment is rejected outright.
    pub fn validate(&self) -> Result<(), CurveError> {
        let one = Decimal::ONE;

        if self.base_rate.value() + self.rate_multiplier.value() > one {
            return Err(CurveError::RateSumExceedsLimit {
                base: self.base_rate,
                multiplier: self.rate_multiplier,
            });
        }
        if self.low_util_base_rate.value() + self.low_util_rate_multiplier.value() > one {
            return Err(CurveError::RateSumExceedsLimit {
                base: self.low_util_base_rate,
                multiplier: self.low_util_rate_multiplier,
            });
        }

        if self.target_level.is_zero()
            || self.target_level.value() >= self.kink_level.value()
            || self.kink_level.value() > one
        {
            return Err(CurveError::BadLevelOrdering);
        }

        let kink_rate = self.rate_at_kink();
        if self.max_scale_rate.value() < kink_rate.value() {
            return Err(CurveError::MaxBelowKinkRate {
                max: self.max_scale_rate,
                kink_rate,
            });
        }

        Ok(())
    }

    // rate where the bridge segment ends
    fn rate_at_kink(&self) -> Ratio {
        Ratio::new_unchecked(self.base_rate.value() + self.rate_multiplier.value())
    }

    // rate where the low-utilization segment ends (utilization == target)
    fn rate_at_target(&self) -> Ratio {
        Ratio::new_unchecked(self.low_util_base_rate.value() + self.low_util_rate_multiplier.value())
    }

    /// Current per-annum borrow rate for the given utilization fraction.
    /// Never negative, never above `max_scale_rate`.
    pub fn borrow_rate(&self, utilization: Ratio) -> Result<Ratio, CurveError> {
        let util = utilization.value();
        let target = self.target_level.value();
        let kink = self.kink_level.value();
        let max = self.max_scale_rate.value();

        let rate = if util < target {
            let slope = math::mul_div_floor(
                self.low_util_rate_multiplier.value(),
                util,
                target,
            )?;
            self.low_util_base_rate.value() + slope
        } else if util < kink {
            let start = self.rate_at_target().value();
            let end = self.rate_at_kink().value();
            let progress = math::mul_div_floor(end - start, util - target, kink - target)?;
            start + progress
        } else if kink >= Decimal::ONE {
            // kink at full utilization: past it there is no runway to scale over
            max
        } else {
            let start = self.rate_at_kink().value();
            // utilization can exceed 100% when borrowed principal outlives supply;
            // the scale segment saturates at max either way
            let over = (util - kink).min(Decimal::ONE - kink);
            let climb = math::mul_div_floor(max - start, over, Decimal::ONE - kink)?;
            start + climb
        };

        Ok(Ratio::new_unchecked(rate.clamp(Decimal::ZERO, max)))
    }
}
