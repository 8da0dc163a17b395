use chrono::{DateTime, Utc};
use tracing::{debug, info};

use common::{PositionSide, Signal, SignalAction};

use crate::indicators::IndicatorSnapshot;

/// Trend direction taken from the sign of MBI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    /// MBI exactly zero: exits only, no entries.
    Flat,
}

impl Trend {
    pub fn from_mbi(mbi: f64) -> Self {
        if mbi > 0.0 {
            Trend::Up
        } else if mbi < 0.0 {
            Trend::Down
        } else {
            Trend::Flat
        }
    }
}

/// How the close moved relative to the rope line between two bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cross {
    Up,
    Down,
    None,
}

impl Cross {
    pub fn detect(prev_close: f64, prev_rope: f64, close: f64, rope: f64) -> Self {
        if prev_close <= prev_rope && close > rope {
            Cross::Up
        } else if prev_close >= prev_rope && close < rope {
            Cross::Down
        } else {
            Cross::None
        }
    }
}

/// The fixed transition table. Opening against an open position is a flip:
/// the position manager closes it before opening the new side.
pub fn transition(trend: Trend, cross: Cross, side: PositionSide) -> SignalAction {
    use PositionSide::{Flat, Long, Short};

    match (trend, cross, side) {
        (_, Cross::None, _) => SignalAction::None,

        (Trend::Up, Cross::Up, Flat | Short) => SignalAction::OpenLong,
        (Trend::Up, Cross::Up, Long) => SignalAction::None,
        (Trend::Up, Cross::Down, Long) => SignalAction::CloseLong,
        (Trend::Up, Cross::Down, Flat | Short) => SignalAction::None,

        (Trend::Down, Cross::Down, Flat | Long) => SignalAction::OpenShort,
        (Trend::Down, Cross::Down, Short) => SignalAction::None,
        (Trend::Down, Cross::Up, Short) => SignalAction::CloseShort,
        (Trend::Down, Cross::Up, Flat | Long) => SignalAction::None,

        (Trend::Flat, Cross::Down, Long) => SignalAction::CloseLong,
        (Trend::Flat, Cross::Up, Short) => SignalAction::CloseShort,
        (Trend::Flat, Cross::Up | Cross::Down, _) => SignalAction::None,
    }
}

/// Turns snapshots into at most one signal per closed bar.
///
/// Carries the previous close and rope midline to detect crossings, and the
/// timestamp of the last evaluated bar so a repeated bar never re-signals.
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    symbol: String,
    prev: Option<(f64, f64)>,
    last_evaluated: Option<DateTime<Utc>>,
}

impl SignalGenerator {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            prev: None,
            last_evaluated: None,
        }
    }

    /// Forget the carried close/rope pair. Called whenever the indicator
    /// window is not ready, so the first ready bar only seeds the pair.
    pub fn reset(&mut self) {
        self.prev = None;
    }

    pub fn evaluate(&mut self, snapshot: &IndicatorSnapshot, side: PositionSide) -> Signal {
        if let Some(last) = self.last_evaluated {
            if snapshot.timestamp <= last {
                debug!(
                    symbol = %self.symbol,
                    ts = %snapshot.timestamp,
                    "Bar already evaluated — skipping"
                );
                return Signal::none(&self.symbol, snapshot.timestamp, snapshot.close);
            }
        }
        self.last_evaluated = Some(snapshot.timestamp);

        let cross = match self.prev.replace((snapshot.close, snapshot.rope_mid)) {
            Some((prev_close, prev_rope)) => {
                Cross::detect(prev_close, prev_rope, snapshot.close, snapshot.rope_mid)
            }
            None => Cross::None,
        };
        let trend = Trend::from_mbi(snapshot.mbi);
        let action = transition(trend, cross, side);

        if action != SignalAction::None {
            info!(
                symbol = %self.symbol,
                ts = %snapshot.timestamp,
                action = %action,
                position = %side,
                close = snapshot.close,
                rope = snapshot.rope_mid,
                mbi = snapshot.mbi,
                "Signal generated"
            );
        }

        Signal {
            symbol: self.symbol.clone(),
            timestamp: snapshot.timestamp,
            price: snapshot.close,
            action,
        }
    }
}
