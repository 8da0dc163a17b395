use proptest::prelude::*;

use backtest::{read_bars, BacktestRunner};
use common::{BacktestSettings, PositionSide, RateConfig, SignalAction};
use strategy::TradingFileConfig;

const CONFIG: &str = r#"
[strategy]
ma_short_period = 3
ma_long_period = 8
rope_period = 5
stop_loss_pct = 0.02
take_profit_pct = 0.05
slippage = 0.001
timeframe = "15m"

[backtest]
initial_capital = 5000.0
commission = 0.0004

[[pair]]
contract_id = "10000001"
symbol = "BTCUSDT"
position_size = 1000.0
leverage = 5
order_size = 0.01
tick_size = 0.1
size_precision = 3
"#;

/// Deterministic pseudo-random walk rendered as CSV with epoch-ms stamps.
fn walk_csv(seed: u64, bars: usize) -> String {
    let mut state = seed;
    let mut price = 30_000.0_f64;
    let mut csv = String::from("timestamp,open,high,low,close,volume\n");
    for i in 0..bars {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let step = ((state >> 33) as f64 / (1u64 << 31) as f64 - 0.5) * 0.02;
        let open = price;
        price *= 1.0 + step;
        let ts = 1_704_067_200_000_i64 + i as i64 * 15 * 60 * 1000;
        csv.push_str(&format!(
            "{ts},{open},{},{},{price},1.0\n",
            open.max(price) * 1.001,
            open.min(price) * 0.999
        ));
    }
    csv
}

fn runner() -> BacktestRunner {
    let config = TradingFileConfig::from_toml_str(CONFIG).unwrap();
    BacktestRunner::from_config(&config, "BTCUSDT").unwrap()
}

#[test]
fn csv_replay_is_byte_identical_across_runs() {
    let bars = read_bars(walk_csv(7, 600).as_bytes(), "BTCUSDT").unwrap();
    let first = serde_json::to_string(&runner().run(&bars)).unwrap();
    let second = serde_json::to_string(&runner().run(&bars)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn report_uses_file_settings() {
    let bars = read_bars(walk_csv(11, 200).as_bytes(), "BTCUSDT").unwrap();
    let report = runner().run(&bars);
    assert_eq!(report.initial_capital, 5000.0);
    assert_eq!(report.bars, 200);
    assert_eq!(report.discontinuities, 0);
    for trade in &report.trades {
        let expected = (trade.entry_price + trade.exit_price) * trade.size * 0.0004;
        assert!((trade.commission - expected).abs() < 1e-9);
    }
}

#[test]
fn unknown_symbol_is_refused() {
    let config = TradingFileConfig::from_toml_str(CONFIG).unwrap();
    assert!(BacktestRunner::from_config(&config, "ETHUSDT").is_err());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Whatever the path: one equity point per bar, trades never overlap,
    /// every trade lasts at least zero time, and capital ends at initial
    /// plus realized PnL.
    #[test]
    fn ledger_stays_consistent(seed in any::<u64>(), len in 20usize..400) {
        let bars = read_bars(walk_csv(seed, len).as_bytes(), "BTCUSDT").unwrap();
        let report = runner().run(&bars);

        prop_assert_eq!(report.equity_curve.len(), len);
        for pair in report.trades.windows(2) {
            prop_assert!(pair[0].exit_time <= pair[1].entry_time);
        }
        for trade in &report.trades {
            prop_assert!(trade.exit_time >= trade.entry_time);
            prop_assert!(trade.side != PositionSide::Flat);
        }
        let realized: f64 = report.trades.iter().map(|t| t.pnl).sum();
        prop_assert!((report.metrics.final_capital - (5000.0 + realized)).abs() < 1e-6);
        prop_assert!(report.signals.iter().all(|s| s.action != SignalAction::None));
    }
}

#[test]
fn tight_rate_budget_still_replays_deterministically() {
    let config = TradingFileConfig::from_toml_str(CONFIG).unwrap();
    let pair = config.pair("BTCUSDT").unwrap().clone();
    let rate = RateConfig {
        max_requests_per_second: 1,
        max_orders_per_minute: 1,
        max_wait_ms: 0,
    };
    let r = BacktestRunner::new(pair, config.strategy.clone(), rate, BacktestSettings::default());
    let bars = read_bars(walk_csv(3, 500).as_bytes(), "BTCUSDT").unwrap();

    let a = r.run(&bars);
    let b = r.run(&bars);
    assert_eq!(a, b);
    assert_eq!(a.guard.rejected as usize, a.rejected_orders.len());
}
