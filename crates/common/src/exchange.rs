use async_trait::async_trait;

use crate::{Fill, OrderRequest, Result};

/// Abstraction over the execution venue.
///
/// `PaperClient` implements this for simulation. A live exchange adapter
/// implements the same trait outside this workspace.
///
/// Only `OrderExecutor` in `crates/engine` should hold a reference to a
/// `dyn ExecutionSink`. Every order must pass the `ExecutionGuard` before
/// reaching it.
#[async_trait]
pub trait ExecutionSink: Send + Sync {
    /// Submit a normalized order and return the fill confirmation.
    async fn submit_order(&self, order: &OrderRequest) -> Result<Fill>;

    /// Get the latest price for a symbol.
    async fn current_price(&self, symbol: &str) -> Result<f64>;
}
