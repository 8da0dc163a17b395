use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use common::{Error, OrderReason, OrderRequest, OrderSide, PairConfig, RateConfig, StopFlag};
use engine::guard::precision::round_price;
use engine::{ExecutionGuard, ManualClock};

fn pair(tick_size: f64, size_precision: u32) -> PairConfig {
    PairConfig {
        contract_id: "p".into(),
        symbol: "TESTUSDT".into(),
        position_size: 1000.0,
        leverage: 1,
        order_size: 1.0,
        tick_size,
        size_precision,
        min_order_size: 0.001,
    }
}

fn order(price: f64, size: f64) -> OrderRequest {
    OrderRequest {
        symbol: "TESTUSDT".into(),
        side: OrderSide::Buy,
        price,
        size,
        reason: OrderReason::Entry,
        timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    }
}

proptest! {
    /// Normalized size is never more than half a unit above the request,
    /// and the price lands on the tick grid within half a tick.
    #[test]
    fn normalization_never_over_orders(
        price in 0.5f64..100_000.0,
        size in 0.001f64..50.0,
        tick in prop::sample::select(vec![0.01, 0.1, 0.5, 1.0]),
        precision in 1u32..6,
    ) {
        let guard = ExecutionGuard::new([pair(tick, precision)], &RateConfig::default(), StopFlag::new());
        let unit = 10f64.powi(-(precision as i32));

        match guard.normalize(&order(price, size)) {
            Ok(out) => {
                prop_assert!(out.size <= size + unit / 2.0 + 1e-9);
                prop_assert!(out.size >= size - unit / 2.0 - 1e-9);
                prop_assert!(out.size >= 0.001);

                prop_assert!((out.price - price).abs() <= tick / 2.0 + 1e-6);
                let ticks = out.price / tick;
                prop_assert!((ticks - ticks.round()).abs() < 1e-6);
                prop_assert_eq!(out.price, round_price(out.price, tick));
            }
            Err(Error::InvalidPrecision { size: rounded, .. }) => {
                prop_assert!(rounded < 0.001);
            }
            Err(e) => prop_assert!(false, "unexpected error: {}", e),
        }
    }

    /// Admissions in any one second never exceed the per-second budget.
    #[test]
    fn per_second_budget_is_never_exceeded(
        budget in 1u32..20,
        burst in 1usize..60,
    ) {
        let rate = RateConfig {
            max_requests_per_second: budget,
            max_orders_per_minute: 10_000,
            max_wait_ms: 0,
        };
        let guard = ExecutionGuard::new([pair(0.1, 3)], &rate, StopFlag::new());
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());

        let admitted = (0..burst)
            .filter(|_| guard.submit(&order(100.0, 1.0), &clock).is_ok())
            .count();
        prop_assert_eq!(admitted, burst.min(budget as usize));
        prop_assert_eq!(guard.stats().rejected as usize, burst - admitted);
    }
}
