//! Gate in front of every order submission.
//!
//! Normalizes price and size to the exchange increments, enforces the shared
//! per-second and per-minute budgets, and refuses everything once the stop
//! flag is raised. Live callers wait on the tokio timer through
//! [`ExecutionGuard::submit_async`]; backtests wait on a [`ManualClock`] so
//! the limiter replays in simulated time.

pub mod precision;
pub mod rate_limit;

pub use rate_limit::{Admission, RateLimiter};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use common::{Error, OrderRequest, PairConfig, RateConfig, RateWindow, Result, StopFlag};

/// Time source used while waiting for a rate-limit slot.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Block until `deadline`. Returns immediately if it already passed.
    fn sleep_until(&self, deadline: DateTime<Utc>);
}

/// Simulated clock driven by bar timestamps. Sleeping just moves it forward.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Jump to `at`; never moves backwards.
    pub fn set(&self, at: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        if at > *now {
            *now = at;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sleep_until(&self, deadline: DateTime<Utc>) {
        self.set(deadline);
    }
}

/// Running totals of guard decisions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GuardStats {
    pub admitted: u64,
    /// Times an order was told to wait for the next slot.
    pub delayed: u64,
    pub rejected: u64,
}

#[derive(Debug, Default)]
struct Counters {
    admitted: AtomicU64,
    delayed: AtomicU64,
    rejected: AtomicU64,
}

/// Shared by every symbol task; all methods take `&self`.
#[derive(Debug)]
pub struct ExecutionGuard {
    pairs: HashMap<String, PairConfig>,
    limiter: RateLimiter,
    max_wait: Duration,
    stop: StopFlag,
    counters: Counters,
}

impl ExecutionGuard {
    pub fn new(
        pairs: impl IntoIterator<Item = PairConfig>,
        rate: &RateConfig,
        stop: StopFlag,
    ) -> Self {
        Self {
            pairs: pairs.into_iter().map(|p| (p.symbol.clone(), p)).collect(),
            limiter: RateLimiter::new(rate),
            max_wait: max_wait(rate.max_wait_ms),
            stop,
            counters: Counters::default(),
        }
    }

    pub fn stats(&self) -> GuardStats {
        GuardStats {
            admitted: self.counters.admitted.load(Ordering::Relaxed),
            delayed: self.counters.delayed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_raised()
    }

    /// Fails with `ShuttingDown` once the stop flag is raised.
    pub fn ensure_running(&self) -> Result<()> {
        if self.stop.is_raised() {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(Error::ShuttingDown);
        }
        Ok(())
    }

    /// Round price to the symbol's tick and size to its precision.
    ///
    /// Errors with `InvalidPrecision` when the rounded size is zero or below
    /// the minimum order size, and `UnknownSymbol` for an unconfigured pair.
    pub fn normalize(&self, order: &OrderRequest) -> Result<OrderRequest> {
        let result = self.normalize_inner(order);
        if result.is_err() {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    fn normalize_inner(&self, order: &OrderRequest) -> Result<OrderRequest> {
        let pair = self
            .pairs
            .get(&order.symbol)
            .ok_or_else(|| Error::UnknownSymbol(order.symbol.clone()))?;

        let size = precision::round_size(order.size, pair.size_precision);
        if size <= 0.0 || size < pair.min_order_size {
            warn!(
                symbol = %order.symbol,
                requested = order.size,
                rounded = size,
                min = pair.min_order_size,
                "Order size below exchange minimum"
            );
            return Err(Error::InvalidPrecision {
                symbol: order.symbol.clone(),
                size,
                min: pair.min_order_size,
            });
        }

        let price = precision::round_price(order.price, pair.tick_size);
        if price != order.price || size != order.size {
            debug!(
                symbol = %order.symbol,
                price_in = order.price,
                price_out = price,
                size_in = order.size,
                size_out = size,
                "Order normalized"
            );
        }

        Ok(OrderRequest {
            price,
            size,
            ..order.clone()
        })
    }

    /// One admission attempt for an order first presented at `started`.
    ///
    /// `Ok(None)` means admitted; `Ok(Some(t))` means retry at `t`, which is
    /// still inside the wait budget. Anything past the budget, or a spent
    /// per-minute cap, is `RateLimitExceeded`.
    pub fn admit(
        &self,
        symbol: &str,
        started: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let (retry_at, window) = match self.limiter.try_acquire(now) {
            Admission::Granted => {
                self.counters.admitted.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
            Admission::RetryAt(at) => (at, RateWindow::PerSecond),
            Admission::Exhausted { until } => (until, RateWindow::PerMinute),
        };

        if window == RateWindow::PerMinute || retry_at - started > self.max_wait {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(symbol, window = %window, "Rate limit exceeded — order rejected");
            return Err(Error::RateLimitExceeded {
                symbol: symbol.to_string(),
                window,
            });
        }

        self.counters.delayed.fetch_add(1, Ordering::Relaxed);
        debug!(symbol, retry_at = %retry_at, "Rate limit reached — deferring order");
        Ok(Some(retry_at))
    }

    /// Normalize, then wait on `clock` until the limiter admits the order.
    /// Only for simulated clocks; live callers use [`Self::submit_async`].
    pub fn submit(&self, order: &OrderRequest, clock: &dyn Clock) -> Result<OrderRequest> {
        self.ensure_running()?;
        let normalized = self.normalize(order)?;
        let started = clock.now();
        while let Some(retry_at) = self.admit(&normalized.symbol, started, clock.now())? {
            clock.sleep_until(retry_at);
            self.ensure_running()?;
        }
        Ok(normalized)
    }

    /// [`Self::submit`] on the wall clock, yielding to the runtime while a
    /// deferred order waits for its slot.
    pub async fn submit_async(&self, order: &OrderRequest) -> Result<OrderRequest> {
        self.ensure_running()?;
        let normalized = self.normalize(order)?;
        let started = Utc::now();
        while let Some(retry_at) = self.admit(&normalized.symbol, started, Utc::now())? {
            if let Ok(wait) = (retry_at - Utc::now()).to_std() {
                tokio::time::sleep(wait).await;
            }
            self.ensure_running()?;
        }
        Ok(normalized)
    }
}

/// Saturates instead of wrapping for budgets beyond `i64` milliseconds.
fn max_wait(ms: u64) -> Duration {
    i64::try_from(ms)
        .ok()
        .and_then(Duration::try_milliseconds)
        .unwrap_or(Duration::MAX)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
