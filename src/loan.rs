// 4.0: loan records. LoanParams is the reusable configuration (content-addressed),
// Loan is one open or historical position against it.
// margin formula: (collateral_value_in_loan_token - principal) / principal.

use crate::math::{self, MathError};
use crate::types::{
    AccountId, Amount, ExchangeRate, LoanId, LoanParamsId, PoolId, Ratio, Timestamp, TokenId,
    SECONDS_PER_DAY,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Reusable loan configuration. Created by the configuring authority, disabled
/// (never deleted) by the same authority. `active = false` only blocks new
/// loans; live loans keep resolving their params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanParams {
    pub id: LoanParamsId,
    pub active: bool,
    pub owner: AccountId,
    pub loan_token: TokenId,
    pub collateral_token: TokenId,
    pub min_initial_margin: Ratio,
    pub maintenance_margin: Ratio,
    /// zero means open-ended ("torque") loans with no fixed term
    pub max_loan_term_secs: i64,
}

impl LoanParams {
    pub fn new(
        owner: AccountId,
        loan_token: TokenId,
        collateral_token: TokenId,
        min_initial_margin: Ratio,
        maintenance_margin: Ratio,
        max_loan_term_secs: i64,
    ) -> Self {
        let id = params_id(
            owner,
            loan_token,
            collateral_token,
            min_initial_margin,
            maintenance_margin,
            max_loan_term_secs,
        );
        Self {
            id,
            active: true,
            owner,
            loan_token,
            collateral_token,
            min_initial_margin,
            maintenance_margin,
            max_loan_term_secs,
        }
    }

    pub fn is_torque(&self) -> bool {
        self.max_loan_term_secs == 0
    }

    pub fn term_days(&self) -> Decimal {
        Decimal::new(self.max_loan_term_secs, 0) / Decimal::new(SECONDS_PER_DAY, 0)
    }
}

// deterministic id from the configuration content. the same params always hash
// to the same id, so re-registering is a no-op rather than a duplicate.
pub fn params_id(
    owner: AccountId,
    loan_token: TokenId,
    collateral_token: TokenId,
    min_initial_margin: Ratio,
    maintenance_margin: Ratio,
    max_loan_term_secs: i64,
) -> LoanParamsId {
    let mut hasher = DefaultHasher::new();
    owner.hash(&mut hasher);
    loan_token.hash(&mut hasher);
    collateral_token.hash(&mut hasher);
    min_initial_margin.value().hash(&mut hasher);
    maintenance_margin.value().hash(&mut hasher);
    max_loan_term_secs.hash(&mut hasher);
    LoanParamsId(hasher.finish())
}

// 4.1: one position. principal is owed in loan token units, collateral is held
// in collateral token units. active is true exactly while principal > 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub loan_params_id: LoanParamsId,
    /// the lending pool is the lender of record
    pub pool: PoolId,
    pub borrower: AccountId,
    pub principal: Amount,
    pub collateral: Amount,
    pub interest_owed_per_day: Amount,
    pub interest_deposit_total: Amount,
    pub interest_deposit_remaining: Amount,
    pub start_timestamp: Timestamp,
    /// how far open-ended interest has been charged; fixed-term loans settle
    /// through the escrow instead and never read this
    pub interest_paid_through: Timestamp,
    /// None for open-ended (torque) loans
    pub end_timestamp: Option<Timestamp>,
    /// collateral → loan rate at open
    pub start_rate: ExchangeRate,
    /// initial margin at open (reciprocal of leverage for trades)
    pub start_margin: Ratio,
    pub active: bool,
}

impl Loan {
    /// Margin at the given collateral → loan rate. Signed: an underwater
    /// position has negative margin. None when principal is zero.
    pub fn margin_at_rate(&self, rate: ExchangeRate) -> Option<Decimal> {
        if self.principal.is_zero() {
            return None;
        }
        let collateral_value = self.collateral.value() * rate.value();
        Some((collateral_value - self.principal.value()) / self.principal.value())
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        matches!(self.end_timestamp, Some(end) if now > end)
    }

    /// Fractional days past end_timestamp; zero while within term or open-ended.
    pub fn overdue_days(&self, now: Timestamp) -> Decimal {
        match self.end_timestamp {
            Some(end) => end.days_until(now),
            None => Decimal::ZERO,
        }
    }

    /// Interest an open-ended loan owes since it was last charged, rounded up
    /// against the borrower. Fixed-term loans owe nothing here: their interest
    /// lives in the escrow.
    pub fn open_interest_due(&self, now: Timestamp) -> Result<Amount, MathError> {
        if self.end_timestamp.is_some() {
            return Ok(Amount::zero());
        }
        let due = math::mul_ceil(
            self.interest_owed_per_day.value(),
            self.interest_paid_through.days_until(now),
        )?;
        Ok(Amount::new_unchecked(due))
    }

    /// What the interest escrow should hold at `now`: one day of interest per
    /// remaining term day, floored. Open-ended loans escrow nothing.
    pub fn expected_deposit_remaining(&self, now: Timestamp) -> Result<Amount, MathError> {
        let Some(end) = self.end_timestamp else {
            return Ok(Amount::zero());
        };
        let days_left = now.days_until(end);
        let expected = math::mul_floor(self.interest_owed_per_day.value(), days_left)?;
        // never above what is actually escrowed
        Ok(Amount::new_unchecked(
            expected.min(self.interest_deposit_remaining.value()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_params() -> LoanParams {
        LoanParams::new(
            AccountId(1),
            TokenId(10),
            TokenId(20),
            Ratio::new_unchecked(dec!(0.5)),
            Ratio::new_unchecked(dec!(0.15)),
            28 * SECONDS_PER_DAY,
        )
    }

    fn test_loan() -> Loan {
        Loan {
            id: LoanId(1),
            loan_params_id: test_params().id,
            pool: PoolId(1),
            borrower: AccountId(2),
            principal: Amount::new_unchecked(dec!(100)),
            collateral: Amount::new_unchecked(dec!(75)),
            interest_owed_per_day: Amount::new_unchecked(dec!(0.01)),
            interest_deposit_total: Amount::new_unchecked(dec!(0.28)),
            interest_deposit_remaining: Amount::new_unchecked(dec!(0.28)),
            start_timestamp: Timestamp::from_secs(0),
            interest_paid_through: Timestamp::from_secs(0),
            end_timestamp: Some(Timestamp::from_secs(28 * SECONDS_PER_DAY)),
            start_rate: ExchangeRate::new_unchecked(dec!(2)),
            start_margin: Ratio::new_unchecked(dec!(0.5)),
            active: true,
        }
    }

    #[test]
    fn params_id_is_content_addressed() {
        let a = test_params();
        let b = test_params();
        assert_eq!(a.id, b.id);

        let c = LoanParams::new(
            AccountId(1),
            TokenId(10),
            TokenId(20),
            Ratio::new_unchecked(dec!(0.5)),
            Ratio::new_unchecked(dec!(0.15)),
            14 * SECONDS_PER_DAY, // different term
        );
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn torque_params_have_no_term() {
        let params = LoanParams::new(
            AccountId(1),
            TokenId(10),
            TokenId(20),
            Ratio::new_unchecked(dec!(0.5)),
            Ratio::new_unchecked(dec!(0.15)),
            0,
        );
        assert!(params.is_torque());
        assert_eq!(params.term_days(), dec!(0));
    }

    #[test]
    fn margin_at_rate_signed() {
        let loan = test_loan();

        // 75 collateral * 2 = 150 value against 100 principal → 50% margin
        let margin = loan.margin_at_rate(ExchangeRate::new_unchecked(dec!(2))).unwrap();
        assert_eq!(margin, dec!(0.5));

        // rate collapse: 75 * 1 = 75 value → -25% margin
        let margin = loan.margin_at_rate(ExchangeRate::new_unchecked(dec!(1))).unwrap();
        assert_eq!(margin, dec!(-0.25));
    }

    #[test]
    fn margin_undefined_for_zero_principal() {
        let mut loan = test_loan();
        loan.principal = Amount::zero();
        assert!(loan.margin_at_rate(ExchangeRate::new_unchecked(dec!(2))).is_none());
    }

    #[test]
    fn expiry_and_overdue() {
        let loan = test_loan();
        let end = loan.end_timestamp.unwrap();

        assert!(!loan.is_expired(end));
        assert!(loan.is_expired(end.plus_secs(1)));

        let two_days_late = end.plus_secs(2 * SECONDS_PER_DAY);
        assert_eq!(loan.overdue_days(two_days_late), dec!(2));
    }

    #[test]
    fn open_interest_accrues_only_without_a_term() {
        let mut loan = test_loan();
        let ten_days = Timestamp::from_secs(10 * SECONDS_PER_DAY);

        // fixed-term: the escrow carries the interest, nothing owed here
        assert!(loan.open_interest_due(ten_days).unwrap().is_zero());

        loan.end_timestamp = None;
        assert_eq!(loan.open_interest_due(ten_days).unwrap().value(), dec!(0.1));

        // a fresh charge mark resets the clock
        loan.interest_paid_through = ten_days;
        assert!(loan.open_interest_due(ten_days).unwrap().is_zero());
    }

    #[test]
    fn expected_deposit_decays_with_time() {
        let loan = test_loan();

        // halfway through the term, half the deposit should remain
        let halfway = Timestamp::from_secs(14 * SECONDS_PER_DAY);
        let expected = loan.expected_deposit_remaining(halfway).unwrap();
        assert_eq!(expected.value(), dec!(0.14));

        // past end, nothing remains
        let late = Timestamp::from_secs(30 * SECONDS_PER_DAY);
        assert!(loan.expected_deposit_remaining(late).unwrap().is_zero());
    }
}
