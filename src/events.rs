// 12.0: every state change produces an event. used for audit trails, state
// reconstruction, and notifying external systems. the EventPayload enum lists
// all event types.

use crate::config::Operation;
use crate::fees::FeeKind;
use crate::types::{
    AccountId, Amount, ExchangeRate, LoanId, LoanParamsId, PoolId, Ratio, Timestamp, TokenId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // configuration events
    PoolRegistered(PoolRegisteredEvent),
    CurveSet(CurveSetEvent),
    LoanParamsCreated(LoanParamsCreatedEvent),
    LoanParamsDisabled(LoanParamsDisabledEvent),
    OperationPaused(OperationPausedEvent),
    OperationResumed(OperationPausedEvent),

    // liquidity events
    LiquiditySupplied(LiquidityEvent),
    LiquidityWithdrawn(LiquidityEvent),

    // position events
    LoanOpened(LoanOpenedEvent),
    LoanIncreased(LoanIncreasedEvent),
    LoanRolledOver(LoanRolledOverEvent),
    LoanClosed(LoanClosedEvent),
    LoanLiquidated(LoanLiquidatedEvent),

    // accounting events
    InterestSettled(InterestSettledEvent),
    FeesWithdrawn(FeesWithdrawnEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolRegisteredEvent {
    pub pool: PoolId,
    pub loan_token: TokenId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurveSetEvent {
    pub pool: PoolId,
    pub base_rate: Ratio,
    pub rate_multiplier: Ratio,
    pub kink_level: Ratio,
    pub max_scale_rate: Ratio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanParamsCreatedEvent {
    pub params_id: LoanParamsId,
    pub owner: AccountId,
    pub loan_token: TokenId,
    pub collateral_token: TokenId,
    pub min_initial_margin: Ratio,
    pub maintenance_margin: Ratio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanParamsDisabledEvent {
    pub params_id: LoanParamsId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationPausedEvent {
    pub operation: Operation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityEvent {
    pub pool: PoolId,
    pub lender: AccountId,
    pub amount: Amount,
    pub new_supply: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanOpenedEvent {
    pub loan_id: LoanId,
    pub pool: PoolId,
    pub borrower: AccountId,
    pub principal: Amount,
    pub collateral: Amount,
    pub entry_rate: ExchangeRate,
    /// 1 / start_margin; reported for trades, 0 for plain borrows
    pub leverage: Decimal,
    pub start_margin: Ratio,
    pub interest_owed_per_day: Amount,
    pub fee_paid: Amount,
    pub is_trade: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanIncreasedEvent {
    pub loan_id: LoanId,
    pub principal_added: Amount,
    pub collateral_added: Amount,
    pub new_principal: Amount,
    pub new_collateral: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanRolledOverEvent {
    pub loan_id: LoanId,
    pub caller: AccountId,
    pub interest_settled: Amount,
    pub collateral_swapped: Amount,
    pub caller_reward: Amount,
    pub new_end_timestamp: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanClosedEvent {
    pub loan_id: LoanId,
    pub caller: AccountId,
    pub receiver: AccountId,
    pub loan_close_amount: Amount,
    pub collateral_used: Amount,
    pub interest_refund: Amount,
    pub fee_paid: Amount,
    /// margin after the close; None when fully closed
    pub current_margin: Option<Decimal>,
    pub fully_closed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanLiquidatedEvent {
    pub loan_id: LoanId,
    pub liquidator: AccountId,
    pub loan_close_amount: Amount,
    pub collateral_seized: Amount,
    pub margin_before: Decimal,
    pub fully_closed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterestSettledEvent {
    pub pool: PoolId,
    pub loan_id: LoanId,
    pub gross: Amount,
    pub net_to_lender: Amount,
    pub lending_fee: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeesWithdrawnEvent {
    pub kind: FeeKind,
    pub token: TokenId,
    pub amount: Amount,
    pub receiver: AccountId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn event_construction() {
        let event = Event::new(
            EventId(1),
            Timestamp::from_secs(1000),
            EventPayload::PoolRegistered(PoolRegisteredEvent {
                pool: PoolId(1),
                loan_token: TokenId(10),
            }),
        );
        assert_eq!(event.id.0, 1);
        assert_eq!(event.timestamp.as_secs(), 1000);
    }

    #[test]
    fn liquidation_event_carries_margin() {
        let event = LoanLiquidatedEvent {
            loan_id: LoanId(7),
            liquidator: AccountId(99),
            loan_close_amount: Amount::new_unchecked(dec!(50)),
            collateral_seized: Amount::new_unchecked(dec!(30)),
            margin_before: dec!(0.12),
            fully_closed: false,
        };
        assert!(event.margin_before < dec!(0.15));
    }

    #[test]
    fn events_serialize() {
        let event = Event::new(
            EventId(2),
            Timestamp::from_secs(5),
            EventPayload::FeesWithdrawn(FeesWithdrawnEvent {
                kind: FeeKind::Trading,
                token: TokenId(1),
                amount: Amount::new_unchecked(dec!(2.5)),
                receiver: AccountId(3),
            }),
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("FeesWithdrawn"));
    }
}
