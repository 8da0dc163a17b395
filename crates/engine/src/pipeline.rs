use chrono::{DateTime, Utc};
use tracing::{debug, info};

use common::{Bar, Error, OrderRequest, PairConfig, PositionSide, Signal, StrategyParams};
use risk::{Position, PositionManager, RiskConfig};
use strategy::{RopeStrategy, Strategy};

/// What one closed bar produced for a symbol.
#[derive(Debug, Default)]
pub struct BarOutcome {
    /// Present whenever the indicator window was ready.
    pub signal: Option<Signal>,
    /// A stop-loss or take-profit exit fired on this bar's close, so the
    /// signal was not applied.
    pub suppressed: bool,
    /// Orders in submission order: threshold exits, or the signal's orders.
    pub orders: Vec<OrderRequest>,
    /// Window condition (`InsufficientData` or `DataDiscontinuity`).
    pub error: Option<Error>,
}

/// Strategy plus position state for a single symbol.
///
/// Owned by exactly one task (live) or by the backtest loop, so nothing in
/// here needs synchronization. Orders come back as proposals: the owner
/// runs them through the execution guard in order, hands each admitted one
/// back to `confirm`, and drops the rest of the batch after a rejection.
pub struct SymbolPipeline {
    strategy: Box<dyn Strategy>,
    positions: PositionManager,
}

impl SymbolPipeline {
    pub fn new(pair: &PairConfig, params: &StrategyParams) -> Self {
        Self::with_strategy(
            Box::new(RopeStrategy::new(pair.symbol.clone(), params)),
            PositionManager::new(pair, RiskConfig::from(params)),
        )
    }

    pub fn with_strategy(strategy: Box<dyn Strategy>, positions: PositionManager) -> Self {
        Self {
            strategy,
            positions,
        }
    }

    pub fn symbol(&self) -> &str {
        self.positions.symbol()
    }

    pub fn position(&self) -> &Position {
        self.positions.position()
    }

    pub fn side(&self) -> PositionSide {
        self.positions.side()
    }

    /// Price update between bars: threshold exits only.
    pub fn on_tick(&self, price: f64, at: DateTime<Utc>) -> Vec<OrderRequest> {
        self.positions.on_price_tick(price, at)
    }

    /// Commit an admitted order to the position.
    pub fn confirm(&mut self, order: &OrderRequest) {
        self.positions.confirm(order);
    }

    /// Closed bar. The close is checked against the exit thresholds first;
    /// if an exit fires, the bar's signal is still evaluated against a flat
    /// position but dropped.
    pub fn on_bar(&mut self, bar: &Bar) -> BarOutcome {
        let exits = self.positions.on_price_tick(bar.close, bar.timestamp);
        let side = if exits.is_empty() {
            self.positions.side()
        } else {
            PositionSide::Flat
        };

        let signal = match self.strategy.on_bar(bar, side) {
            Ok(signal) => signal,
            Err(e) => {
                debug!(symbol = %bar.symbol, ts = %bar.timestamp, error = %e, "No signal for bar");
                return BarOutcome {
                    orders: exits,
                    error: Some(e),
                    ..BarOutcome::default()
                };
            }
        };

        if !exits.is_empty() {
            if !signal.is_none() {
                info!(
                    symbol = %bar.symbol,
                    action = %signal.action,
                    "Signal dropped — threshold exit took priority"
                );
            }
            return BarOutcome {
                signal: Some(signal),
                suppressed: true,
                orders: exits,
                error: None,
            };
        }

        let orders = self.positions.apply(&signal);
        BarOutcome {
            signal: Some(signal),
            suppressed: false,
            orders,
            error: None,
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
