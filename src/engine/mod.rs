// 14.0: the engine. one struct owns all mutable state; each operation lives in
// its own file. the split:
//   core.rs      - state, time, liquidity, interest settlement, checkpoints
//   open.rs      - open_borrow / open_trade / increase_loan
//   rollover.rs  - rollover
//   close.rs     - close_with_swap / close_with_deposit
//   liquidate.rs - liquidate
//   admin.rs     - pools, curves, params, pauses, fee withdrawal
//   results.rs   - per-operation results and the error taxonomy
//   phase.rs     - validate/update/external-call/commit ordering tripwire

mod admin;
mod close;
mod core;
mod liquidate;
mod open;
mod phase;
mod results;
mod rollover;

pub use self::core::{EngineSnapshot, LendingEngine};
pub use self::open::CollateralPayment;
pub use self::results::{
    CloseResult, IncreaseResult, LendingError, LiquidationResult, OpenResult, RolloverResult,
};
