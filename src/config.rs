// 13.0 config.rs: all engine settings in one place. fees, liquidation tuning,
// rollover tuning, pause switches, privileged accounts. an explicit struct
// passed into the engine, never module-level state, so tests build isolated
// instances.

use crate::types::{AccountId, Amount, Ratio, TokenId, SECONDS_PER_DAY};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The five mutating entry points that can be paused independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Open,
    Close,
    Rollover,
    Liquidate,
    Supply,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Open => "open",
            Operation::Close => "close",
            Operation::Rollover => "rollover",
            Operation::Liquidate => "liquidate",
            Operation::Supply => "supply",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PauseFlags {
    pub open: bool,
    pub close: bool,
    pub rollover: bool,
    pub liquidate: bool,
    pub supply: bool,
}

impl PauseFlags {
    pub fn is_paused(&self, op: Operation) -> bool {
        match op {
            Operation::Open => self.open,
            Operation::Close => self.close,
            Operation::Rollover => self.rollover,
            Operation::Liquidate => self.liquidate,
            Operation::Supply => self.supply,
        }
    }

    pub fn set(&mut self, op: Operation, paused: bool) {
        match op {
            Operation::Open => self.open = paused,
            Operation::Close => self.close = paused,
            Operation::Rollover => self.rollover = paused,
            Operation::Liquidate => self.liquidate = paused,
            Operation::Supply => self.supply = paused,
        }
    }
}

// 13.1: engine configuration. percentages are fractions (1 = 100%).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// configuring authority for params, curves, and pauses
    pub admin: AccountId,
    /// only this account may withdraw accumulated fees
    pub fee_controller: AccountId,
    /// chain-native asset, accepted as collateral where params allow
    pub native_token: TokenId,

    /// taken from collateral on plain borrows
    pub borrowing_fee_pct: Ratio,
    /// taken on trade opens and on the repaid amount at close
    pub trading_fee_pct: Ratio,
    /// protocol cut of interest settled to lenders
    pub lending_fee_pct: Ratio,

    /// slippage budget for engine-initiated swaps, relative to the oracle rate
    pub max_swap_slippage_pct: Ratio,

    /// liquidator bonus on seized collateral
    pub liquidation_incentive_pct: Ratio,
    /// liquidation restores margin to maintenance + this buffer
    pub liquidation_margin_buffer: Ratio,

    /// paid to whoever performs a rollover, in collateral token units
    pub rollover_base_reward: Amount,
    /// rollover becomes callable this long before end_timestamp
    pub rollover_grace_secs: i64,

    pub paused: PauseFlags,

    /// event log bound
    pub max_events: usize,
    /// echo events to stdout
    pub verbose: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            admin: AccountId(0),
            fee_controller: AccountId(0),
            native_token: TokenId(0),
            borrowing_fee_pct: Ratio::new_unchecked(Decimal::new(9, 4)), // 0.09%
            trading_fee_pct: Ratio::new_unchecked(Decimal::new(15, 4)), // 0.15%
            lending_fee_pct: Ratio::new_unchecked(Decimal::new(10, 2)), // 10%
            max_swap_slippage_pct: Ratio::new_unchecked(Decimal::new(5, 3)), // 0.5%
            liquidation_incentive_pct: Ratio::new_unchecked(Decimal::new(5, 2)), // 5%
            liquidation_margin_buffer: Ratio::new_unchecked(Decimal::new(10, 2)), // 10%
            rollover_base_reward: Amount::zero(),
            rollover_grace_secs: SECONDS_PER_DAY,
            paused: PauseFlags::default(),
            max_events: 100_000,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("fee percentage out of range: {0}")]
    FeeOutOfRange(String),

    #[error("liquidation buffer must exceed the incentive, or partial liquidation cannot terminate")]
    BufferBelowIncentive,

    #[error("rollover grace must be non-negative")]
    NegativeGrace,
}

impl EngineConfig {
    /// Conservative mainnet-style preset: lower incentive, wider buffer.
    pub fn conservative() -> Self {
        let mut config = Self::default();
        config.liquidation_incentive_pct = Ratio::new_unchecked(Decimal::new(3, 2)); // 3%
        config.liquidation_margin_buffer = Ratio::new_unchecked(Decimal::new(15, 2)); // 15%
        config.rollover_grace_secs = 3 * SECONDS_PER_DAY;
        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, pct) in [
            ("borrowing_fee_pct", self.borrowing_fee_pct),
            ("trading_fee_pct", self.trading_fee_pct),
            ("lending_fee_pct", self.lending_fee_pct),
            ("liquidation_incentive_pct", self.liquidation_incentive_pct),
            ("max_swap_slippage_pct", self.max_swap_slippage_pct),
        ] {
            if pct.value() >= Decimal::ONE {
                return Err(ConfigError::FeeOutOfRange(format!("{name} = {pct}")));
            }
        }

        // desired margin = maintenance + buffer; the liquidation divisor is
        // (desired - incentive), which must stay positive for any maintenance >= 0
        if self.liquidation_margin_buffer.value() <= self.liquidation_incentive_pct.value() {
            return Err(ConfigError::BufferBelowIncentive);
        }

        if self.rollover_grace_secs < 0 {
            return Err(ConfigError::NegativeGrace);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_config_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn conservative_preset_valid() {
        let config = EngineConfig::conservative();
        assert!(config.validate().is_ok());
        assert_eq!(config.liquidation_incentive_pct.value(), dec!(0.03));
    }

    #[test]
    fn buffer_must_exceed_incentive() {
        let mut config = EngineConfig::default();
        config.liquidation_margin_buffer = Ratio::new_unchecked(dec!(0.05));
        config.liquidation_incentive_pct = Ratio::new_unchecked(dec!(0.05));
        assert_eq!(config.validate(), Err(ConfigError::BufferBelowIncentive));
    }

    #[test]
    fn fee_over_100_pct_rejected() {
        let mut config = EngineConfig::default();
        config.trading_fee_pct = Ratio::new_unchecked(dec!(1.5));
        assert!(matches!(config.validate(), Err(ConfigError::FeeOutOfRange(_))));
    }

    #[test]
    fn pause_flags_roundtrip() {
        let mut flags = PauseFlags::default();
        assert!(!flags.is_paused(Operation::Liquidate));

        flags.set(Operation::Liquidate, true);
        assert!(flags.is_paused(Operation::Liquidate));
        assert!(!flags.is_paused(Operation::Open));

        flags.set(Operation::Liquidate, false);
        assert!(!flags.is_paused(Operation::Liquidate));
    }

    #[test]
    fn config_serialization() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.lending_fee_pct, config.lending_fee_pct);
    }
}
