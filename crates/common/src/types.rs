use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Live market data event from the exchange feed.
/// Emitted on every kline update for the configured timeframe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketEvent {
    pub symbol: String,
    /// Latest close price of the current candle.
    pub price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    /// True when the candle has closed (finalized). Only closed candles feed
    /// the indicators; open ones are price ticks for stop/target checks.
    pub is_candle_closed: bool,
    pub timestamp: DateTime<Utc>,
}

impl MarketEvent {
    /// The finalized bar carried by this event, if the candle has closed.
    pub fn closed_bar(&self) -> Option<Bar> {
        self.is_candle_closed.then(|| Bar {
            symbol: self.symbol.clone(),
            timestamp: self.timestamp,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.price,
            volume: self.volume,
        })
    }
}

impl From<&Bar> for MarketEvent {
    fn from(bar: &Bar) -> Self {
        Self {
            symbol: bar.symbol.clone(),
            price: bar.close,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            volume: bar.volume,
            is_candle_closed: true,
            timestamp: bar.timestamp,
        }
    }
}

/// One closed candle. Timestamps are the candle open time and strictly
/// increase by one timeframe interval on a contiguous feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Candle interval the strategy runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
}

impl Timeframe {
    /// Distance between consecutive bar timestamps.
    pub fn interval(self) -> Duration {
        match self {
            Timeframe::M15 => Duration::minutes(15),
            Timeframe::H1 => Duration::hours(1),
            Timeframe::H4 => Duration::hours(4),
        }
    }

    /// How often a live feed should poll for a fresh candle.
    pub fn refresh_interval(self) -> std::time::Duration {
        match self {
            Timeframe::M15 => std::time::Duration::from_secs(60),
            Timeframe::H1 => std::time::Duration::from_secs(300),
            Timeframe::H4 => std::time::Duration::from_secs(600),
        }
    }
}

impl FromStr for Timeframe {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "15m" => Ok(Timeframe::M15),
            "1h" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            other => Err(Error::Config(format!(
                "timeframe must be one of 15m, 1h, 4h; got '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Timeframe::M15 => write!(f, "15m"),
            Timeframe::H1 => write!(f, "1h"),
            Timeframe::H4 => write!(f, "4h"),
        }
    }
}

/// Side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Fill price after slippage: buys pay more, sells receive less.
    pub fn slipped(self, price: f64, slippage: f64) -> f64 {
        match self {
            OrderSide::Buy => price * (1.0 + slippage),
            OrderSide::Sell => price * (1.0 - slippage),
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Direction of the single position held per symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Flat,
    Long,
    Short,
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionSide::Flat => write!(f, "flat"),
            PositionSide::Long => write!(f, "long"),
            PositionSide::Short => write!(f, "short"),
        }
    }
}

/// Position transition requested by the signal generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalAction {
    None,
    OpenLong,
    CloseLong,
    OpenShort,
    CloseShort,
}

impl std::fmt::Display for SignalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalAction::None => write!(f, "NONE"),
            SignalAction::OpenLong => write!(f, "OPEN_LONG"),
            SignalAction::CloseLong => write!(f, "CLOSE_LONG"),
            SignalAction::OpenShort => write!(f, "OPEN_SHORT"),
            SignalAction::CloseShort => write!(f, "CLOSE_SHORT"),
        }
    }
}

/// Signal emitted by the generator for one closed bar, passed to the
/// position manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    /// Close of the bar that produced the signal.
    pub price: f64,
    pub action: SignalAction,
}

impl Signal {
    pub fn none(symbol: impl Into<String>, timestamp: DateTime<Utc>, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            price,
            action: SignalAction::None,
        }
    }

    pub fn is_none(&self) -> bool {
        self.action == SignalAction::None
    }
}

/// Why an order was generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderReason {
    Entry,
    StopLoss,
    TakeProfit,
    /// Closing leg of a reversal; the opening leg is an `Entry`.
    Flip,
}

impl OrderReason {
    /// Whether the order reduces an existing position.
    pub fn is_close(self) -> bool {
        !matches!(self, OrderReason::Entry)
    }
}

impl std::fmt::Display for OrderReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderReason::Entry => write!(f, "entry"),
            OrderReason::StopLoss => write!(f, "stop-loss"),
            OrderReason::TakeProfit => write!(f, "take-profit"),
            OrderReason::Flip => write!(f, "flip"),
        }
    }
}

/// An order produced by the position manager. Only the execution guard may
/// turn it into something an exchange sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub price: f64,
    pub size: f64,
    pub reason: OrderReason,
    pub timestamp: DateTime<Utc>,
}

/// Confirmation of a filled order returned by the execution sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub fill_price: f64,
    pub size: f64,
    pub reason: OrderReason,
    pub timestamp: DateTime<Utc>,
}

/// Whether the bot is replaying history or simulating live execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Backtest,
    Paper,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Backtest => write!(f, "backtest"),
            RunMode::Paper => write!(f, "paper"),
        }
    }
}

/// Current state of the trading engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Stopped,
    Running,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Running => write!(f, "running"),
        }
    }
}

/// Events emitted by the order executor.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    OrderFilled(Fill),
    /// The guard refused the order before it reached the sink.
    OrderRejected { order: OrderRequest, reason: String },
    /// The sink accepted the request but failed to execute it.
    OrderFailed { order: OrderRequest, error: String },
}
