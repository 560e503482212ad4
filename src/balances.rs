// 7.0: the token-transfer primitive. debit/credit a holder's balance by amount,
// fail on overdraft. holders are user accounts, pool vaults, or the fee vault;
// typing the holder keeps pool escrow from being confused with user funds.

use crate::math;
use crate::types::{AccountId, Amount, PoolId, TokenId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Holder {
    Account(AccountId),
    Pool(PoolId),
    FeeVault,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BalanceError {
    #[error("insufficient balance: {holder:?} holds {held} of token {token:?}, needs {needed}")]
    InsufficientBalance {
        holder: Holder,
        token: TokenId,
        held: Amount,
        needed: Amount,
    },

    #[error("balance overflow for {holder:?} token {token:?}")]
    Overflow { holder: Holder, token: TokenId },
}

/// In-memory balance sheet. The ledger is the source of truth for who owes
/// what; this is the source of truth for who holds what.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BalanceSheet {
    balances: HashMap<(Holder, TokenId), Decimal>,
}

impl BalanceSheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, holder: Holder, token: TokenId) -> Amount {
        Amount::new_unchecked(
            self.balances
                .get(&(holder, token))
                .copied()
                .unwrap_or(Decimal::ZERO),
        )
    }

    pub fn credit(
        &mut self,
        holder: Holder,
        token: TokenId,
        amount: Amount,
    ) -> Result<(), BalanceError> {
        let entry = self.balances.entry((holder, token)).or_insert(Decimal::ZERO);
        *entry = math::checked_add(*entry, amount.value())
            .map_err(|_| BalanceError::Overflow { holder, token })?;
        Ok(())
    }

    pub fn debit(
        &mut self,
        holder: Holder,
        token: TokenId,
        amount: Amount,
    ) -> Result<(), BalanceError> {
        let held = self.balance_of(holder, token);
        if held < amount {
            return Err(BalanceError::InsufficientBalance {
                holder,
                token,
                held,
                needed: amount,
            });
        }
        let entry = self.balances.entry((holder, token)).or_insert(Decimal::ZERO);
        *entry -= amount.value();
        Ok(())
    }

    /// Sum across every holder. Operations move tokens between holders but
    /// never mint or burn, so this stays fixed between external deposits.
    pub fn total_of(&self, token: TokenId) -> Amount {
        let total = self
            .balances
            .iter()
            .filter(|((_, t), _)| *t == token)
            .map(|(_, v)| *v)
            .sum();
        Amount::new_unchecked(total)
    }

    /// Debit `from` and credit `to` atomically; a failed debit moves nothing.
    pub fn transfer(
        &mut self,
        from: Holder,
        to: Holder,
        token: TokenId,
        amount: Amount,
    ) -> Result<(), BalanceError> {
        self.debit(from, token, amount)?;
        self.credit(to, token, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn a(v: Decimal) -> Amount {
        Amount::new_unchecked(v)
    }

    #[test]
    fn credit_and_debit() {
        let mut sheet = BalanceSheet::new();
        let alice = Holder::Account(AccountId(1));
        let usd = TokenId(10);

        sheet.credit(alice, usd, a(dec!(100))).unwrap();
        assert_eq!(sheet.balance_of(alice, usd).value(), dec!(100));

        sheet.debit(alice, usd, a(dec!(40))).unwrap();
        assert_eq!(sheet.balance_of(alice, usd).value(), dec!(60));
    }

    #[test]
    fn overdraft_fails_and_moves_nothing() {
        let mut sheet = BalanceSheet::new();
        let alice = Holder::Account(AccountId(1));
        let bob = Holder::Account(AccountId(2));
        let usd = TokenId(10);

        sheet.credit(alice, usd, a(dec!(10))).unwrap();

        let err = sheet.transfer(alice, bob, usd, a(dec!(20)));
        assert!(matches!(err, Err(BalanceError::InsufficientBalance { .. })));
        assert_eq!(sheet.balance_of(alice, usd).value(), dec!(10));
        assert!(sheet.balance_of(bob, usd).is_zero());
    }

    #[test]
    fn holders_are_distinct_namespaces() {
        let mut sheet = BalanceSheet::new();
        let usd = TokenId(10);

        sheet.credit(Holder::Pool(PoolId(1)), usd, a(dec!(500))).unwrap();
        sheet.credit(Holder::FeeVault, usd, a(dec!(5))).unwrap();

        assert_eq!(sheet.balance_of(Holder::Pool(PoolId(1)), usd).value(), dec!(500));
        assert_eq!(sheet.balance_of(Holder::FeeVault, usd).value(), dec!(5));
        assert!(sheet.balance_of(Holder::Account(AccountId(1)), usd).is_zero());
    }
}
