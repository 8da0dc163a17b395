use chrono::{DateTime, Duration, TimeZone, Utc};

use common::{
    Bar, Error, OrderReason, OrderRequest, OrderSide, PairConfig, PositionSide, RateConfig,
    RateWindow, StopFlag, StrategyParams, Timeframe,
};
use engine::{Clock, ExecutionGuard, ManualClock, SymbolPipeline};

fn params() -> StrategyParams {
    StrategyParams {
        ma_short_period: 2,
        ma_long_period: 4,
        rope_period: 3,
        timeframe: Timeframe::M15,
        ..StrategyParams::default()
    }
}

fn btc() -> PairConfig {
    PairConfig {
        contract_id: "10000001".into(),
        symbol: "BTCUSDT".into(),
        position_size: 1000.0,
        leverage: 5,
        order_size: 0.01,
        tick_size: 0.1,
        size_precision: 3,
        min_order_size: 0.001,
    }
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

fn bar(i: i64, close: f64) -> Bar {
    Bar {
        symbol: "BTCUSDT".into(),
        timestamp: start() + Duration::minutes(15 * i),
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 10.0,
    }
}

/// Admit orders in sequence, confirming each admitted one and dropping the
/// rest of the batch at the first rejection.
fn submit(
    pipeline: &mut SymbolPipeline,
    guard: &ExecutionGuard,
    clock: &ManualClock,
    orders: Vec<OrderRequest>,
) -> (Vec<OrderRequest>, Option<Error>) {
    let mut admitted = Vec::new();
    for order in orders {
        match guard.submit(&order, clock) {
            Ok(normalized) => {
                pipeline.confirm(&order);
                admitted.push(normalized);
            }
            Err(e) => return (admitted, Some(e)),
        }
    }
    (admitted, None)
}

/// One order per minute, with the long opened on the warm-up's last bar.
fn opened_long() -> (SymbolPipeline, ExecutionGuard, ManualClock) {
    let rate = RateConfig {
        max_requests_per_second: 10,
        max_orders_per_minute: 1,
        max_wait_ms: 3000,
    };
    let guard = ExecutionGuard::new([btc()], &rate, StopFlag::new());
    let clock = ManualClock::new(start());
    let mut pipeline = SymbolPipeline::new(&btc(), &params());

    let mut entries = Vec::new();
    for (i, close) in [110.0, 108.0, 106.0, 104.0, 102.0, 110.0].iter().enumerate() {
        let b = bar(i as i64, *close);
        clock.set(b.timestamp);
        let orders = pipeline.on_bar(&b).orders;
        let (admitted, err) = submit(&mut pipeline, &guard, &clock, orders);
        assert!(err.is_none());
        entries.extend(admitted);
    }
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].reason, OrderReason::Entry);
    assert_eq!(pipeline.side(), PositionSide::Long);

    (pipeline, guard, clock)
}

#[test]
fn rate_limited_stop_loss_keeps_the_position_open() {
    let (mut pipeline, guard, clock) = opened_long();
    let entry_at = clock.now();

    // Same minute as the entry: the stop-loss close is over the cap.
    clock.set(entry_at + Duration::seconds(10));
    let orders = pipeline.on_tick(100.0, clock.now());
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].reason, OrderReason::StopLoss);

    let (admitted, err) = submit(&mut pipeline, &guard, &clock, orders);
    assert!(admitted.is_empty());
    assert!(matches!(
        err,
        Some(Error::RateLimitExceeded {
            window: RateWindow::PerMinute,
            ..
        })
    ));
    assert_eq!(pipeline.side(), PositionSide::Long);

    // Once the minute rolls, the next tick still below the stop retries the close.
    clock.set(entry_at + Duration::minutes(2));
    let orders = pipeline.on_tick(99.5, clock.now());
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].reason, OrderReason::StopLoss);
    assert_eq!(orders[0].size, 0.01);

    let (admitted, err) = submit(&mut pipeline, &guard, &clock, orders);
    assert!(err.is_none());
    assert_eq!(admitted.len(), 1);
    assert_eq!(pipeline.side(), PositionSide::Flat);

    clock.set(entry_at + Duration::minutes(4));
    assert!(pipeline.on_tick(95.0, clock.now()).is_empty());

    let stats = guard.stats();
    assert_eq!(stats.admitted, 2);
    assert_eq!(stats.rejected, 1);
}

#[test]
fn rate_limited_entry_opens_nothing() {
    let rate = RateConfig {
        max_requests_per_second: 10,
        max_orders_per_minute: 1,
        max_wait_ms: 3000,
    };
    let guard = ExecutionGuard::new([btc()], &rate, StopFlag::new());
    let clock = ManualClock::new(start());
    let mut pipeline = SymbolPipeline::new(&btc(), &params());

    // Spend the minute's budget before the entry bar.
    let last = bar(5, 110.0);
    clock.set(last.timestamp);
    let spent = OrderRequest {
        symbol: "BTCUSDT".into(),
        side: OrderSide::Sell,
        price: 100.0,
        size: 0.01,
        reason: OrderReason::Entry,
        timestamp: last.timestamp,
    };
    guard.submit(&spent, &clock).unwrap();

    for (i, close) in [110.0, 108.0, 106.0, 104.0, 102.0].iter().enumerate() {
        let out = pipeline.on_bar(&bar(i as i64, *close));
        assert!(out.orders.is_empty());
    }
    let orders = pipeline.on_bar(&last).orders;
    assert_eq!(orders.len(), 1);

    let (admitted, err) = submit(&mut pipeline, &guard, &clock, orders);
    assert!(admitted.is_empty());
    assert!(err.is_some());
    assert_eq!(pipeline.side(), PositionSide::Flat);
    assert!(pipeline.on_tick(100.0, clock.now()).is_empty());
}
