use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use common::{Error, ExecutionSink, Fill, OrderRequest, OrderSide, Result};

/// Simulated execution venue for paper trading.
///
/// Fills at the latest known price with fractional slippage. Nothing ever
/// leaves the process.
pub struct PaperClient {
    /// Quote-currency balance; buys debit it, sells credit it.
    balance: Arc<RwLock<f64>>,
    /// Signed net size per symbol: positive long, negative short.
    holdings: Arc<RwLock<HashMap<String, f64>>>,
    /// Latest known price per symbol, updated via `update_price`.
    prices: Arc<RwLock<HashMap<String, f64>>>,
    /// Fraction of price, e.g. `0.001` for 0.1%.
    slippage: f64,
}

impl PaperClient {
    pub fn new(initial_balance: f64, slippage: f64) -> Self {
        info!(balance = initial_balance, slippage, "PaperClient initialized");
        Self {
            balance: Arc::new(RwLock::new(initial_balance)),
            holdings: Arc::new(RwLock::new(HashMap::new())),
            prices: Arc::new(RwLock::new(HashMap::new())),
            slippage,
        }
    }

    /// Update the latest price for a symbol (called by the market replay loop).
    pub async fn update_price(&self, symbol: &str, price: f64) {
        self.prices.write().await.insert(symbol.to_string(), price);
    }

    pub async fn balance(&self) -> f64 {
        *self.balance.read().await
    }

    /// Signed net size held in `symbol`.
    pub async fn net_position(&self, symbol: &str) -> f64 {
        self.holdings.read().await.get(symbol).copied().unwrap_or(0.0)
    }
}

#[async_trait]
impl ExecutionSink for PaperClient {
    async fn submit_order(&self, order: &OrderRequest) -> Result<Fill> {
        let mid_price = self.current_price(&order.symbol).await.map_err(|_| {
            Error::Exchange(format!(
                "PaperClient has no price for '{}'. Ensure market events are flowing.",
                order.symbol
            ))
        })?;

        let fill_price = order.side.slipped(mid_price, self.slippage);
        let notional = fill_price * order.size;

        debug!(
            symbol = %order.symbol,
            side = %order.side,
            mid = mid_price,
            fill = fill_price,
            size = order.size,
            "Paper fill simulated"
        );

        {
            let mut balance = self.balance.write().await;
            let mut holdings = self.holdings.write().await;
            let held = holdings.entry(order.symbol.clone()).or_insert(0.0);
            match order.side {
                OrderSide::Buy => {
                    *balance -= notional;
                    *held += order.size;
                }
                OrderSide::Sell => {
                    *balance += notional;
                    *held -= order.size;
                }
            }
        }

        Ok(Fill {
            order_id: Uuid::new_v4().to_string(),
            symbol: order.symbol.clone(),
            side: order.side,
            fill_price,
            size: order.size,
            reason: order.reason,
            timestamp: Utc::now(),
        })
    }

    async fn current_price(&self, symbol: &str) -> Result<f64> {
        self.prices
            .read()
            .await
            .get(symbol)
            .copied()
            .ok_or_else(|| Error::Exchange(format!("No price available for {symbol}")))
    }
}
