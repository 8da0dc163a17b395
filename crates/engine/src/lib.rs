pub mod executor;
pub mod guard;
pub mod lifecycle;
pub mod pipeline;

pub use executor::OrderExecutor;
pub use guard::{Clock, ExecutionGuard, GuardStats, ManualClock};
pub use lifecycle::{Engine, EngineHandle};
pub use pipeline::{BarOutcome, SymbolPipeline};
