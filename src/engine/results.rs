// 14.0.2: result types and the full error taxonomy for engine operations.
// every rejected operation leaves the ledger exactly as it was; these variants
// say why it was rejected.

use crate::balances::BalanceError;
use crate::config::{ConfigError, Operation};
use crate::curve::CurveError;
use crate::math::MathError;
use crate::oracle::OracleError;
use crate::pool::PoolError;
use crate::swap::SwapError;
use crate::types::{
    AccountId, Amount, ExchangeRate, LoanId, LoanParamsId, PoolId, Ratio, Timestamp, TokenId,
};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct OpenResult {
    pub loan_id: LoanId,
    pub principal: Amount,
    pub collateral: Amount,
    pub start_rate: ExchangeRate,
    pub start_margin: Ratio,
    /// 1 / start_margin for trades, zero for plain borrows
    pub leverage: Decimal,
    pub interest_owed_per_day: Amount,
    pub interest_deposit: Amount,
    pub fee_paid: Amount,
    /// loan tokens sent to the receiver (principal net of the interest deposit
    /// for borrows; zero for trades, where proceeds become collateral)
    pub disbursed: Amount,
}

#[derive(Debug, Clone)]
pub struct IncreaseResult {
    pub loan_id: LoanId,
    pub principal_added: Amount,
    pub collateral_added: Amount,
    pub new_principal: Amount,
    pub new_collateral: Amount,
    pub fee_paid: Amount,
    pub disbursed: Amount,
}

#[derive(Debug, Clone)]
pub struct RolloverResult {
    pub loan_id: LoanId,
    /// gross interest settled to the lender this rollover (escrow + back interest)
    pub interest_settled: Amount,
    pub lending_fee: Amount,
    /// collateral consumed by the interest swap
    pub collateral_swapped: Amount,
    pub caller_reward: Amount,
    pub new_end_timestamp: Timestamp,
}

#[derive(Debug, Clone)]
pub struct CloseResult {
    pub loan_id: LoanId,
    pub loan_close_amount: Amount,
    /// collateral consumed (swapped or released) by this close
    pub collateral_used: Amount,
    /// collateral handed back to the receiver
    pub collateral_returned: Amount,
    /// surplus loan-token proceeds handed to the receiver
    pub proceeds_to_receiver: Amount,
    pub interest_refund: Amount,
    /// accrued interest collected on open-ended loans; zero for fixed-term
    /// loans, which pay through the escrow instead
    pub interest_charged: Amount,
    pub fee_paid: Amount,
    /// margin after the close; None once fully closed
    pub current_margin: Option<Decimal>,
    pub fully_closed: bool,
}

#[derive(Debug, Clone)]
pub struct LiquidationResult {
    pub loan_id: LoanId,
    pub loan_close_amount: Amount,
    pub collateral_seized: Amount,
    pub margin_before: Decimal,
    pub margin_after: Option<Decimal>,
    pub fully_closed: bool,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LendingError {
    // configuration
    #[error("pool {0:?} not found")]
    PoolNotFound(PoolId),

    #[error("pool {0:?} already registered")]
    PoolAlreadyRegistered(PoolId),

    #[error("loan params {0:?} not found")]
    UnknownLoanParams(LoanParamsId),

    #[error("loan params {0:?} are disabled")]
    InactiveLoanParams(LoanParamsId),

    #[error("params lend {params:?} but pool lends {pool:?}")]
    PoolTokenMismatch { pool: TokenId, params: TokenId },

    // authorization
    #[error("caller {caller:?} is not authorized for this operation")]
    Unauthorized { caller: AccountId },

    #[error("{0:?} operations are paused")]
    OperationPaused(Operation),

    // solvency
    #[error("loan {0:?} not found")]
    LoanNotFound(LoanId),

    #[error("loan {0:?} is not active")]
    LoanNotActive(LoanId),

    #[error("principal must be non-zero")]
    ZeroPrincipal,

    #[error("repay amount must be non-zero")]
    ZeroRepayAmount,

    #[error("insufficient collateral: required {required}, provided {provided}")]
    InsufficientCollateral { required: Amount, provided: Amount },

    #[error("token {0:?} is not accepted as collateral here")]
    UnsupportedCollateral(TokenId),

    #[error("sent both native value and token collateral")]
    ValueTokenMismatch,

    #[error("initial margin {requested} is below the minimum {minimum}")]
    InitialMarginTooLow { requested: Ratio, minimum: Ratio },

    #[error("leverage must be at least 1, got {0}")]
    InvalidLeverage(Decimal),

    #[error("insufficient pool liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity { requested: Amount, available: Amount },

    #[error("nothing to close on loan {0:?}")]
    NothingToClose(LoanId),

    #[error("nothing to roll over on loan {0:?}")]
    NothingToRollover(LoanId),

    #[error("position is healthy: margin {current_margin} above maintenance {maintenance_margin}")]
    HealthyPosition {
        current_margin: Decimal,
        maintenance_margin: Ratio,
    },

    // external collaborators and arithmetic, propagated unchanged
    #[error(transparent)]
    Math(#[from] MathError),

    #[error(transparent)]
    Curve(#[from] CurveError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Swap(#[from] SwapError),

    #[error(transparent)]
    Balance(#[from] BalanceError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
