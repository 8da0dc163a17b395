pub mod config;
pub mod error;
pub mod exchange;
pub mod shutdown;
pub mod types;

pub use config::{BacktestSettings, Config, PairConfig, RateConfig, StrategyParams};
pub use error::{Error, RateWindow, Result};
pub use exchange::ExecutionSink;
pub use shutdown::StopFlag;
pub use types::*;
