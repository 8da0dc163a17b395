use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use common::{
    OrderReason, OrderRequest, OrderSide, PairConfig, PositionSide, Signal, SignalAction,
    StrategyParams,
};

/// Exit thresholds applied to every open position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Maximum loss on a single position before auto-close (e.g. 0.02 = 2%).
    pub stop_loss_pct: f64,
    /// Target gain on a single position before auto-close (e.g. 0.05 = 5%).
    pub take_profit_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: 0.02,
            take_profit_pct: 0.05,
        }
    }
}

impl From<&StrategyParams> for RiskConfig {
    fn from(params: &StrategyParams) -> Self {
        Self {
            stop_loss_pct: params.stop_loss_pct,
            take_profit_pct: params.take_profit_pct,
        }
    }
}

/// An open position's entry and its derived exit levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub entry_price: f64,
    pub size: f64,
    pub opened_at: DateTime<Utc>,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
}

/// The one position record a symbol has. Starts `Flat`, never removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Position {
    Flat,
    Long(OpenPosition),
    Short(OpenPosition),
}

impl Position {
    pub fn side(&self) -> PositionSide {
        match self {
            Position::Flat => PositionSide::Flat,
            Position::Long(_) => PositionSide::Long,
            Position::Short(_) => PositionSide::Short,
        }
    }

    pub fn open(&self) -> Option<&OpenPosition> {
        match self {
            Position::Flat => None,
            Position::Long(open) | Position::Short(open) => Some(open),
        }
    }
}

/// Owns the position for one symbol and turns signals and price ticks into
/// order requests.
///
/// Planning and committing are separate: `apply` and `on_price_tick` only
/// propose orders, and the position moves when the caller hands an order
/// back through `confirm` after the execution guard admitted it. A rejected
/// order therefore leaves the position as it was, and the next price still
/// past a threshold proposes the same exit again.
///
/// Threshold exits have priority: the caller must run `on_price_tick`
/// before `apply` for the same instant and drop the signal when the tick
/// proposed orders.
#[derive(Debug, Clone)]
pub struct PositionManager {
    symbol: String,
    order_size: f64,
    config: RiskConfig,
    position: Position,
}

impl PositionManager {
    pub fn new(pair: &PairConfig, config: RiskConfig) -> Self {
        Self {
            symbol: pair.symbol.clone(),
            order_size: pair.order_size,
            config,
            position: Position::Flat,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn side(&self) -> PositionSide {
        self.position.side()
    }

    /// Orders a signal calls for. A flip yields the closing order followed
    /// by the opening order; the opening order must not be confirmed unless
    /// the close was.
    ///
    /// Panics when asked to open onto an already open position of the same
    /// side: the transition table never produces that, so it is a defect.
    pub fn apply(&self, signal: &Signal) -> Vec<OrderRequest> {
        debug_assert_eq!(signal.symbol, self.symbol);
        let at = signal.timestamp;
        let price = signal.price;

        match (signal.action, &self.position) {
            (SignalAction::None, _) => Vec::new(),

            (SignalAction::OpenLong, Position::Long(_))
            | (SignalAction::OpenShort, Position::Short(_)) => panic!(
                "position invariant violated on {}: {} while already {}",
                self.symbol,
                signal.action,
                self.side()
            ),

            (SignalAction::OpenLong, Position::Flat) => vec![self.entry(OrderSide::Buy, price, at)],
            (SignalAction::OpenShort, Position::Flat) => vec![self.entry(OrderSide::Sell, price, at)],
            (SignalAction::OpenLong, Position::Short(open)) => vec![
                self.exit(OrderSide::Buy, open, OrderReason::Flip, price, at),
                self.entry(OrderSide::Buy, price, at),
            ],
            (SignalAction::OpenShort, Position::Long(open)) => vec![
                self.exit(OrderSide::Sell, open, OrderReason::Flip, price, at),
                self.entry(OrderSide::Sell, price, at),
            ],

            (SignalAction::CloseLong, Position::Long(open)) => {
                vec![self.exit(OrderSide::Sell, open, OrderReason::TakeProfit, price, at)]
            }
            (SignalAction::CloseShort, Position::Short(open)) => {
                vec![self.exit(OrderSide::Buy, open, OrderReason::TakeProfit, price, at)]
            }
            (SignalAction::CloseLong | SignalAction::CloseShort, _) => {
                warn!(
                    symbol = %self.symbol,
                    action = %signal.action,
                    position = %self.side(),
                    "Close signal does not match position — ignored"
                );
                Vec::new()
            }
        }
    }

    /// Check stop-loss then take-profit against `price`. A breach proposes
    /// closing the whole position.
    pub fn on_price_tick(&self, price: f64, at: DateTime<Utc>) -> Vec<OrderRequest> {
        let (side, open, reason) = match &self.position {
            Position::Flat => return Vec::new(),
            Position::Long(open) => {
                let reason = if price <= open.stop_loss_price {
                    OrderReason::StopLoss
                } else if price >= open.take_profit_price {
                    OrderReason::TakeProfit
                } else {
                    return Vec::new();
                };
                (OrderSide::Sell, open, reason)
            }
            Position::Short(open) => {
                let reason = if price >= open.stop_loss_price {
                    OrderReason::StopLoss
                } else if price <= open.take_profit_price {
                    OrderReason::TakeProfit
                } else {
                    return Vec::new();
                };
                (OrderSide::Buy, open, reason)
            }
        };

        info!(symbol = %self.symbol, price, reason = %reason, "Exit threshold breached");
        vec![self.exit(side, open, reason, price, at)]
    }

    /// Commit an order proposed by this manager once it has been admitted.
    /// Pass the order as proposed, not the normalized copy, so exit levels
    /// derive from the signal price.
    ///
    /// Panics on an entry while a position is open: flips confirm their
    /// close first, so this is a caller defect.
    pub fn confirm(&mut self, order: &OrderRequest) {
        debug_assert_eq!(order.symbol, self.symbol);

        if order.reason.is_close() {
            match std::mem::replace(&mut self.position, Position::Flat) {
                Position::Flat => {
                    warn!(symbol = %self.symbol, reason = %order.reason, "Close confirmed while flat — ignored");
                }
                Position::Long(open) | Position::Short(open) => {
                    info!(
                        symbol = %self.symbol,
                        reason = %order.reason,
                        entry = open.entry_price,
                        exit = order.price,
                        size = open.size,
                        "Position closed"
                    );
                }
            }
            return;
        }

        if !matches!(self.position, Position::Flat) {
            panic!(
                "position invariant violated on {}: {} entry confirmed while {}",
                self.symbol,
                order.side,
                self.side()
            );
        }

        let sl = self.config.stop_loss_pct;
        let tp = self.config.take_profit_pct;
        let price = order.price;
        self.position = match order.side {
            OrderSide::Buy => Position::Long(OpenPosition {
                entry_price: price,
                size: order.size,
                opened_at: order.timestamp,
                stop_loss_price: price * (1.0 - sl),
                take_profit_price: price * (1.0 + tp),
            }),
            OrderSide::Sell => Position::Short(OpenPosition {
                entry_price: price,
                size: order.size,
                opened_at: order.timestamp,
                stop_loss_price: price * (1.0 + sl),
                take_profit_price: price * (1.0 - tp),
            }),
        };

        info!(
            symbol = %self.symbol,
            side = %self.side(),
            entry = price,
            size = order.size,
            "Position opened"
        );
    }

    fn entry(&self, side: OrderSide, price: f64, at: DateTime<Utc>) -> OrderRequest {
        OrderRequest {
            symbol: self.symbol.clone(),
            side,
            price,
            size: self.order_size,
            reason: OrderReason::Entry,
            timestamp: at,
        }
    }

    fn exit(
        &self,
        side: OrderSide,
        open: &OpenPosition,
        reason: OrderReason,
        price: f64,
        at: DateTime<Utc>,
    ) -> OrderRequest {
        OrderRequest {
            symbol: self.symbol.clone(),
            side,
            price,
            size: open.size,
            reason,
            timestamp: at,
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
