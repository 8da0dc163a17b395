pub mod rope;
pub mod sma;

pub use rope::RopeIndicator;
pub use sma::SmaIndicator;

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use common::{Bar, Error, Result, StrategyParams};

/// Indicator values for one closed bar. Only produced once the window is
/// full, so every field is defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub ma_short: f64,
    pub ma_long: f64,
    /// `ma_short - ma_long`.
    pub mbo: f64,
    /// `mbo[t] - mbo[t-1]`.
    pub mbi: f64,
    pub rope_mid: f64,
}

/// Rolling per-symbol window feeding the MBO/MBI and rope indicators.
///
/// Holds `max(ma_long, rope) + 1` bars, the extra bar giving the previous
/// MBO for the MBI difference. Bars must arrive one interval apart:
/// a stale or duplicate timestamp is refused without touching the window,
/// and a gap throws the window away and starts over from the new bar.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    symbol: String,
    ma_short: SmaIndicator,
    ma_long: SmaIndicator,
    rope: RopeIndicator,
    interval: Duration,
    capacity: usize,
    closes: VecDeque<f64>,
    highs: VecDeque<f64>,
    lows: VecDeque<f64>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl IndicatorEngine {
    pub fn new(symbol: impl Into<String>, params: &StrategyParams) -> Self {
        let capacity = params.warmup_bars();
        Self {
            symbol: symbol.into(),
            ma_short: SmaIndicator::new(params.ma_short_period),
            ma_long: SmaIndicator::new(params.ma_long_period),
            rope: RopeIndicator::new(params.rope_period),
            interval: params.timeframe.interval(),
            capacity,
            closes: VecDeque::with_capacity(capacity + 1),
            highs: VecDeque::with_capacity(capacity + 1),
            lows: VecDeque::with_capacity(capacity + 1),
            last_timestamp: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Number of bars currently held.
    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    /// Bars required before `update` yields a snapshot.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Absorb one closed bar and recompute.
    ///
    /// Errors:
    /// - `DataDiscontinuity` when the bar is stale (window unchanged) or
    ///   arrives after a gap (window restarted from this bar).
    /// - `InsufficientData` while the window is still filling.
    pub fn update(&mut self, bar: &Bar) -> Result<IndicatorSnapshot> {
        if let Some(last) = self.last_timestamp {
            let expected = last + self.interval;
            if bar.timestamp <= last {
                warn!(
                    symbol = %self.symbol,
                    last = %last,
                    got = %bar.timestamp,
                    "Stale bar refused"
                );
                return Err(self.discontinuity(expected, bar.timestamp));
            }
            if bar.timestamp != expected {
                warn!(
                    symbol = %self.symbol,
                    expected = %expected,
                    got = %bar.timestamp,
                    dropped = self.closes.len(),
                    "Bar gap detected — discarding indicator window"
                );
                self.clear();
                self.push(bar);
                return Err(self.discontinuity(expected, bar.timestamp));
            }
        }

        self.push(bar);

        if self.closes.len() < self.capacity {
            return Err(Error::InsufficientData {
                symbol: self.symbol.clone(),
                have: self.closes.len(),
                need: self.capacity,
            });
        }

        let snapshot = self.compute(bar);
        debug!(
            symbol = %self.symbol,
            ts = %snapshot.timestamp,
            mbo = snapshot.mbo,
            mbi = snapshot.mbi,
            rope = snapshot.rope_mid,
            close = snapshot.close,
            "Indicators updated"
        );
        Ok(snapshot)
    }

    fn push(&mut self, bar: &Bar) {
        self.closes.push_back(bar.close);
        self.highs.push_back(bar.high);
        self.lows.push_back(bar.low);
        if self.closes.len() > self.capacity {
            self.closes.pop_front();
            self.highs.pop_front();
            self.lows.pop_front();
        }
        self.last_timestamp = Some(bar.timestamp);
    }

    fn clear(&mut self) {
        self.closes.clear();
        self.highs.clear();
        self.lows.clear();
        self.last_timestamp = None;
    }

    fn discontinuity(&self, expected: DateTime<Utc>, got: DateTime<Utc>) -> Error {
        Error::DataDiscontinuity {
            symbol: self.symbol.clone(),
            expected,
            got,
        }
    }

    // Only called with a full window, so every indicator has enough data.
    fn compute(&mut self, bar: &Bar) -> IndicatorSnapshot {
        let closes: &[f64] = self.closes.make_contiguous();
        let previous = &closes[..closes.len() - 1];

        let ma_short = self.ma_short.compute(closes).unwrap_or(f64::NAN);
        let ma_long = self.ma_long.compute(closes).unwrap_or(f64::NAN);
        let mbo = ma_short - ma_long;
        let prev_mbo = self.ma_short.compute(previous).unwrap_or(f64::NAN)
            - self.ma_long.compute(previous).unwrap_or(f64::NAN);

        let highs: &[f64] = self.highs.make_contiguous();
        let lows: &[f64] = self.lows.make_contiguous();
        let rope_mid = self.rope.compute(highs, lows).unwrap_or(f64::NAN);

        IndicatorSnapshot {
            timestamp: bar.timestamp,
            close: bar.close,
            ma_short,
            ma_long,
            mbo,
            mbi: mbo - prev_mbo,
            rope_mid,
        }
    }
}
