// 5.0: per-pool aggregate interest accounting. one record per lending pool,
// summed across that pool's active loans. mutated by every operation that
// changes a loan's interest_owed_per_day or settles interest; never deleted.

use crate::math::{self, MathError};
use crate::types::{Amount, Ratio, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LenderInterestData {
    /// cumulative interest paid out to the pool, net of the lending fee
    pub interest_paid: Amount,
    /// last time accrual ran
    pub interest_paid_date: Timestamp,
    /// sum of interest_owed_per_day across the pool's active loans
    pub interest_owed_per_day: Amount,
    /// accrued but not yet settled
    pub interest_unpaid: Amount,
    /// lending fee taken from settled interest, snapshotted at pool registration
    pub interest_fee_pct: Ratio,
    /// sum of principal across the pool's active loans
    pub principal_total: Amount,
}

/// Outcome of settling a gross interest amount: the lender's net share and the
/// protocol's lending-fee cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterestSettlement {
    pub gross: Amount,
    pub net_to_lender: Amount,
    pub lending_fee: Amount,
}

impl LenderInterestData {
    pub fn new(interest_fee_pct: Ratio, now: Timestamp) -> Self {
        Self {
            interest_paid: Amount::zero(),
            interest_paid_date: now,
            interest_owed_per_day: Amount::zero(),
            interest_unpaid: Amount::zero(),
            interest_fee_pct,
            principal_total: Amount::zero(),
        }
    }

    /// Roll unpaid interest forward to `now` at the current per-day sum.
    pub fn accrue(&mut self, now: Timestamp) -> Result<(), MathError> {
        let days = self.interest_paid_date.days_until(now);
        if days.is_zero() {
            return Ok(());
        }
        let accrued = math::mul_floor(self.interest_owed_per_day.value(), days)?;
        self.interest_unpaid = Amount::new_unchecked(math::checked_add(
            self.interest_unpaid.value(),
            accrued,
        )?);
        self.interest_paid_date = now;
        Ok(())
    }

    /// A loan was opened or increased: fold its deltas into the aggregates.
    /// Accrues first so the old per-day sum applies to the elapsed window.
    pub fn on_principal_added(
        &mut self,
        now: Timestamp,
        principal_delta: Amount,
        owed_per_day_delta: Amount,
    ) -> Result<(), MathError> {
        self.accrue(now)?;
        self.principal_total = Amount::new_unchecked(math::checked_add(
            self.principal_total.value(),
            principal_delta.value(),
        )?);
        self.interest_owed_per_day = Amount::new_unchecked(math::checked_add(
            self.interest_owed_per_day.value(),
            owed_per_day_delta.value(),
        )?);
        Ok(())
    }

    /// A loan was reduced (close or liquidation). Aggregate decrements saturate:
    /// per-loan floor rounding can leave the sums a hair above the true total.
    pub fn on_principal_removed(
        &mut self,
        now: Timestamp,
        principal_delta: Amount,
        owed_per_day_delta: Amount,
    ) -> Result<(), MathError> {
        self.accrue(now)?;
        self.principal_total = Amount::new_unchecked(math::saturating_sub(
            self.principal_total.value(),
            principal_delta.value(),
        ));
        self.interest_owed_per_day = Amount::new_unchecked(math::saturating_sub(
            self.interest_owed_per_day.value(),
            owed_per_day_delta.value(),
        ));
        Ok(())
    }

    /// Settle a gross interest amount to the lender, net of the lending fee.
    /// The fee floors in the protocol's favor.
    pub fn settle(&mut self, gross: Amount) -> Result<InterestSettlement, MathError> {
        let fee = math::mul_floor(gross.value(), self.interest_fee_pct.value())?;
        let net = math::checked_sub(gross.value(), fee)?;

        self.interest_paid = Amount::new_unchecked(math::checked_add(
            self.interest_paid.value(),
            net,
        )?);
        self.interest_unpaid =
            Amount::new_unchecked(math::saturating_sub(self.interest_unpaid.value(), gross.value()));

        Ok(InterestSettlement {
            gross,
            net_to_lender: Amount::new_unchecked(net),
            lending_fee: Amount::new_unchecked(fee),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SECONDS_PER_DAY;
    use rust_decimal_macros::dec;

    fn a(v: rust_decimal::Decimal) -> Amount {
        Amount::new_unchecked(v)
    }

    fn fresh() -> LenderInterestData {
        LenderInterestData::new(Ratio::new_unchecked(dec!(0.10)), Timestamp::from_secs(0))
    }

    #[test]
    fn accrual_tracks_elapsed_days() {
        let mut data = fresh();
        data.interest_owed_per_day = a(dec!(2));

        data.accrue(Timestamp::from_secs(3 * SECONDS_PER_DAY)).unwrap();
        assert_eq!(data.interest_unpaid.value(), dec!(6));
        assert_eq!(data.interest_paid_date.as_secs(), 3 * SECONDS_PER_DAY);

        // accruing again at the same instant adds nothing
        data.accrue(Timestamp::from_secs(3 * SECONDS_PER_DAY)).unwrap();
        assert_eq!(data.interest_unpaid.value(), dec!(6));
    }

    #[test]
    fn principal_add_accrues_at_old_rate_first() {
        let mut data = fresh();
        data.interest_owed_per_day = a(dec!(1));

        // two days at 1/day, then the pool doubles its per-day sum
        data.on_principal_added(
            Timestamp::from_secs(2 * SECONDS_PER_DAY),
            a(dec!(100)),
            a(dec!(1)),
        )
        .unwrap();

        assert_eq!(data.interest_unpaid.value(), dec!(2));
        assert_eq!(data.interest_owed_per_day.value(), dec!(2));
        assert_eq!(data.principal_total.value(), dec!(100));
    }

    #[test]
    fn settlement_splits_lending_fee() {
        let mut data = fresh();
        data.interest_unpaid = a(dec!(10));

        let settlement = data.settle(a(dec!(10))).unwrap();

        assert_eq!(settlement.lending_fee.value(), dec!(1)); // 10% fee
        assert_eq!(settlement.net_to_lender.value(), dec!(9));
        assert_eq!(data.interest_paid.value(), dec!(9));
        assert!(data.interest_unpaid.is_zero());
    }

    #[test]
    fn removal_saturates_instead_of_underflowing() {
        let mut data = fresh();
        data.principal_total = a(dec!(5));
        data.interest_owed_per_day = a(dec!(0.1));

        data.on_principal_removed(Timestamp::from_secs(0), a(dec!(6)), a(dec!(0.2)))
            .unwrap();

        assert!(data.principal_total.is_zero());
        assert!(data.interest_owed_per_day.is_zero());
    }
}
