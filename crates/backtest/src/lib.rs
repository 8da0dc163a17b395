//! Deterministic historical replay of the rope-line strategy.

pub mod data;
pub mod report;
pub mod runner;

pub use data::{load_bars, read_bars};
pub use report::{BacktestReport, EquityPoint, Metrics, RejectedOrder, SignalRecord, Trade};
pub use runner::BacktestRunner;
