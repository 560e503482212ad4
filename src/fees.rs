// 11.0: protocol fee accumulator. per-token running totals of lending, trading,
// and borrowing fees pending withdrawal by the configured fee controller.
// the engine credits these as operations execute; only the controller drains them.

use crate::math::{self, MathError};
use crate::types::{Amount, TokenId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeeKind {
    Lending,
    Trading,
    Borrowing,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeeAccumulator {
    lending: HashMap<TokenId, Amount>,
    trading: HashMap<TokenId, Amount>,
    borrowing: HashMap<TokenId, Amount>,
}

impl FeeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket(&self, kind: FeeKind) -> &HashMap<TokenId, Amount> {
        match kind {
            FeeKind::Lending => &self.lending,
            FeeKind::Trading => &self.trading,
            FeeKind::Borrowing => &self.borrowing,
        }
    }

    fn bucket_mut(&mut self, kind: FeeKind) -> &mut HashMap<TokenId, Amount> {
        match kind {
            FeeKind::Lending => &mut self.lending,
            FeeKind::Trading => &mut self.trading,
            FeeKind::Borrowing => &mut self.borrowing,
        }
    }

    pub fn credit(&mut self, kind: FeeKind, token: TokenId, amount: Amount) -> Result<(), MathError> {
        if amount.is_zero() {
            return Ok(());
        }
        let entry = self.bucket_mut(kind).entry(token).or_insert_with(Amount::zero);
        *entry = Amount::new_unchecked(math::checked_add(entry.value(), amount.value())?);
        Ok(())
    }

    pub fn held(&self, kind: FeeKind, token: TokenId) -> Amount {
        self.bucket(kind)
            .get(&token)
            .copied()
            .unwrap_or_else(Amount::zero)
    }

    /// Zero out one bucket for one token, returning what was held.
    pub fn take(&mut self, kind: FeeKind, token: TokenId) -> Amount {
        self.bucket_mut(kind).remove(&token).unwrap_or_else(Amount::zero)
    }

    /// Total across all three buckets for a token.
    pub fn total_held(&self, token: TokenId) -> Amount {
        [FeeKind::Lending, FeeKind::Trading, FeeKind::Borrowing]
            .iter()
            .map(|kind| self.held(*kind, token))
            .sum()
    }
}
