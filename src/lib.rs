// lending-core: margin lending engine.
// ledger-first architecture: every token is accounted for before any
// operation commits. all computation is deterministic with no external I/O;
// prices and swaps come in through trait seams.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: TokenId, Amount, Ratio, ExchangeRate, Timestamp
//   2.x  math.rs: fixed-point helpers with explicit rounding direction
//   3.x  curve.rs: kinked utilization -> borrow rate curve
//   4.x  loan.rs: LoanParams (content-addressed) and Loan records
//   5.x  interest.rs: per-pool lender interest aggregates
//   6.x  pool.rs: pool supply/borrowed totals and utilization
//   7.x  balances.rs: holder x token balance sheet
//   8.x  oracle.rs: PriceOracle seam + fixed-rate test double
//   9.x  swap.rs: SwapExecutor seam + index-rate test double
//   10.x ledger.rs: authoritative loan/params/interest store
//   11.x fees.rs: lending/trading/borrowing fee accumulator
//   12.x events.rs: state transition events for audit
//   13.x config.rs: fees, liquidation tuning, pauses, presets
//   14.x engine/: the five operations plus liquidity and admin

// accounting modules
pub mod balances;
pub mod fees;
pub mod interest;
pub mod ledger;
pub mod loan;
pub mod math;
pub mod pool;
pub mod types;

// market modules
pub mod curve;
pub mod oracle;
pub mod swap;

// integration modules
pub mod config;
pub mod engine;
pub mod events;

// re exports for convenience
pub use balances::*;
pub use config::*;
pub use curve::*;
pub use engine::*;
pub use events::*;
pub use fees::*;
pub use interest::*;
pub use ledger::*;
pub use loan::*;
pub use oracle::*;
pub use pool::*;
pub use swap::*;
pub use types::*;
