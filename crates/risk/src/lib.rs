pub mod manager;

pub use manager::{OpenPosition, Position, PositionManager, RiskConfig};
