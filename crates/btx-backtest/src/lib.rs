//! btx-backtest
//!
//! Drives a compiled strategy bar by bar over a price series (§4.4), then
//! orchestrates a full strategy run across one or more symbols with equal
//! capital allocation, optional walk-forward train/test splitting, and
//! equity-curve merging/reconstruction (§4.5).

mod driver;
mod orchestrator;

pub use driver::{run, DriverError};
pub use orchestrator::{
    needs_legacy_reconstruction, reconstruct_equity_curve_from_trades, run_strategy,
    OrchestratorResult, SymbolRun,
};
