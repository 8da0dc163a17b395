use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use common::{
    Bar, BacktestSettings, Error, OrderReason, OrderRequest, OrderSide, PairConfig,
    PositionSide, RateConfig, Result, StopFlag, StrategyParams,
};
use engine::{ExecutionGuard, ManualClock, SymbolPipeline};
use strategy::TradingFileConfig;

use crate::report::{BacktestReport, EquityPoint, Metrics, RejectedOrder, SignalRecord, Trade};

/// Replays bars for one symbol through the live pipeline and guard.
///
/// The guard runs on a [`ManualClock`] pinned to bar timestamps, so nothing
/// from the wall clock reaches the result.
#[derive(Debug, Clone)]
pub struct BacktestRunner {
    pair: PairConfig,
    params: StrategyParams,
    rate: RateConfig,
    settings: BacktestSettings,
}

impl BacktestRunner {
    pub fn new(
        pair: PairConfig,
        params: StrategyParams,
        rate: RateConfig,
        settings: BacktestSettings,
    ) -> Self {
        Self {
            pair,
            params,
            rate,
            settings,
        }
    }

    pub fn from_config(config: &TradingFileConfig, symbol: &str) -> Result<Self> {
        let pair = config
            .pair(symbol)
            .cloned()
            .ok_or_else(|| Error::UnknownSymbol(symbol.to_string()))?;
        Ok(Self::new(
            pair,
            config.strategy.clone(),
            config.rate.clone(),
            config.backtest.clone(),
        ))
    }

    pub fn symbol(&self) -> &str {
        &self.pair.symbol
    }

    pub fn run(&self, bars: &[Bar]) -> BacktestReport {
        let symbol = self.pair.symbol.clone();
        info!(
            symbol = %symbol,
            bars = bars.len(),
            timeframe = %self.params.timeframe,
            capital = self.settings.initial_capital,
            "Backtest starting"
        );

        let mut pipeline = SymbolPipeline::new(&self.pair, &self.params);
        let guard = ExecutionGuard::new([self.pair.clone()], &self.rate, StopFlag::new());
        let clock = ManualClock::new(bars.first().map(|b| b.timestamp).unwrap_or_default());
        let mut ledger = Ledger::new(&symbol, self.settings.initial_capital, self.settings.commission);

        let mut discontinuities = 0;
        let mut signals = Vec::new();
        let mut rejected_orders = Vec::new();
        let mut equity_curve = Vec::with_capacity(bars.len());

        for bar in bars {
            clock.set(bar.timestamp);
            let outcome = pipeline.on_bar(bar);

            if matches!(outcome.error, Some(Error::DataDiscontinuity { .. })) {
                discontinuities += 1;
            }
            if let Some(signal) = outcome.signal.filter(|s| !s.is_none()) {
                signals.push(SignalRecord {
                    timestamp: signal.timestamp,
                    action: signal.action,
                    price: signal.price,
                    suppressed: outcome.suppressed,
                });
            }

            // A flip's entry only goes out if its close was admitted.
            for order in outcome.orders {
                match guard.submit(&order, &clock) {
                    Ok(admitted) => {
                        pipeline.confirm(&order);
                        let fill_price = admitted.side.slipped(admitted.price, self.params.slippage);
                        ledger.fill(&admitted, fill_price);
                    }
                    Err(e) => {
                        warn!(
                            symbol = %symbol,
                            reason = %order.reason,
                            error = %e,
                            "Backtest order rejected — position unchanged"
                        );
                        rejected_orders.push(RejectedOrder {
                            order,
                            reason: e.to_string(),
                        });
                        break;
                    }
                }
            }

            let unrealized = ledger.unrealized(bar.close);
            equity_curve.push(EquityPoint {
                timestamp: bar.timestamp,
                capital: ledger.capital,
                unrealized_pnl: unrealized,
                equity: ledger.capital + unrealized,
            });
        }

        let metrics = Metrics::compute(
            &ledger.trades,
            &equity_curve,
            self.settings.initial_capital,
            ledger.capital,
        );
        info!(
            symbol = %symbol,
            trades = metrics.total_trades,
            win_rate_pct = metrics.win_rate_pct,
            total_pnl = metrics.total_pnl,
            max_drawdown_pct = metrics.max_drawdown_pct,
            sharpe = metrics.sharpe_ratio,
            "Backtest finished"
        );

        BacktestReport {
            symbol,
            initial_capital: self.settings.initial_capital,
            bars: bars.len(),
            discontinuities,
            signals,
            trades: ledger.trades,
            equity_curve,
            rejected_orders,
            guard: guard.stats(),
            metrics,
        }
    }
}

#[derive(Debug, Clone)]
struct OpenTrade {
    side: PositionSide,
    entry_price: f64,
    size: f64,
    entry_time: DateTime<Utc>,
}

/// Books fills into round trips. Only admitted orders reach it, and the
/// pipeline's position moves on the same admissions, so the two stay in step.
#[derive(Debug)]
struct Ledger {
    symbol: String,
    capital: f64,
    commission: f64,
    open: Option<OpenTrade>,
    trades: Vec<Trade>,
}

impl Ledger {
    fn new(symbol: &str, capital: f64, commission: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            capital,
            commission,
            open: None,
            trades: Vec::new(),
        }
    }

    fn fill(&mut self, order: &OrderRequest, fill_price: f64) {
        if order.reason.is_close() {
            debug_assert!(self.open.is_some(), "close fill with no booked trade");
            if let Some(open) = self.open.take() {
                self.settle(open, fill_price, order.timestamp, order.reason);
            }
            return;
        }

        debug_assert!(self.open.is_none(), "entry fill over a booked trade");
        self.open = Some(OpenTrade {
            side: match order.side {
                OrderSide::Buy => PositionSide::Long,
                OrderSide::Sell => PositionSide::Short,
            },
            entry_price: fill_price,
            size: order.size,
            entry_time: order.timestamp,
        });
    }

    fn settle(&mut self, open: OpenTrade, exit_price: f64, at: DateTime<Utc>, reason: OrderReason) {
        let gross = match open.side {
            PositionSide::Short => (open.entry_price - exit_price) * open.size,
            _ => (exit_price - open.entry_price) * open.size,
        };
        let commission = (open.entry_price + exit_price) * open.size * self.commission;
        let pnl = gross - commission;
        self.capital += pnl;

        debug!(
            symbol = %self.symbol,
            side = %open.side,
            entry = open.entry_price,
            exit = exit_price,
            pnl,
            reason = %reason,
            "Trade closed"
        );

        self.trades.push(Trade {
            symbol: self.symbol.clone(),
            side: open.side,
            entry_price: open.entry_price,
            exit_price,
            size: open.size,
            pnl,
            pnl_pct: pnl * 100.0 / (open.entry_price * open.size),
            commission,
            entry_time: open.entry_time,
            exit_time: at,
            duration_hours: (at - open.entry_time).num_seconds() as f64 / 3600.0,
            exit_reason: reason,
        });
    }

    fn unrealized(&self, mark: f64) -> f64 {
        match &self.open {
            Some(open) if open.side == PositionSide::Short => (open.entry_price - mark) * open.size,
            Some(open) => (mark - open.entry_price) * open.size,
            None => 0.0,
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use common::{SignalAction, Timeframe};

    const SLIPPAGE: f64 = 0.001;

    fn pair() -> PairConfig {
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

    fn params(take_profit_pct: f64) -> StrategyParams {
        StrategyParams {
            ma_short_period: 2,
            ma_long_period: 4,
            rope_period: 3,
            stop_loss_pct: 0.02,
            take_profit_pct,
            slippage: SLIPPAGE,
            timeframe: Timeframe::M15,
        }
    }

    fn runner(take_profit_pct: f64) -> BacktestRunner {
        BacktestRunner::new(
            pair(),
            params(take_profit_pct),
            RateConfig::default(),
            BacktestSettings::default(),
        )
    }

    fn bars(closes: &[f64]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                symbol: "BTCUSDT".into(),
                timestamp: start + Duration::minutes(15 * i as i64),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 10.0,
            })
            .collect()
    }

    // Warm-up that ends in an upcross with rising MBI: OpenLong at 110 on bar 5.
    const ENTRY: [f64; 6] = [110.0, 108.0, 106.0, 104.0, 102.0, 110.0];

    #[test]
    fn stop_loss_closes_long_with_slipped_fills() {
        let mut closes = ENTRY.to_vec();
        closes.push(107.0);
        let report = runner(0.05).run(&bars(&closes));

        assert_eq!(report.signals[0].action, SignalAction::OpenLong);
        assert_eq!(report.trades.len(), 1);
        let trade = &report.trades[0];
        assert_eq!(trade.exit_reason, OrderReason::StopLoss);
        assert_eq!(trade.side, PositionSide::Long);

        let entry = 110.0 * (1.0 + SLIPPAGE);
        let exit = 107.0 * (1.0 - SLIPPAGE);
        assert!((trade.entry_price - entry).abs() < 1e-9);
        assert!((trade.exit_price - exit).abs() < 1e-9);
        assert!((trade.pnl - (exit - entry) * 0.01).abs() < 1e-9);
        assert!(trade.pnl < 0.0);
    }

    #[test]
    fn long_closed_on_rope_downcross_books_slipped_pnl() {
        // Rises to 116 above the rope, then drops through it while MBI turns
        // negative: the long is closed (and flipped short) at 113.
        let mut closes = ENTRY.to_vec();
        closes.extend([112.0, 114.0, 116.0, 113.0]);
        let report = runner(0.5).run(&bars(&closes));

        let actions: Vec<_> = report.signals.iter().map(|s| s.action).collect();
        assert_eq!(actions, vec![SignalAction::OpenLong, SignalAction::OpenShort]);

        assert_eq!(report.trades.len(), 1);
        let trade = &report.trades[0];
        assert_eq!(trade.exit_reason, OrderReason::Flip);
        let entry = 110.0 * (1.0 + SLIPPAGE);
        let exit = 113.0 * (1.0 - SLIPPAGE);
        assert!((trade.pnl - (exit - entry) * 0.01).abs() < 1e-9);
        assert!(trade.pnl > 0.0);
        assert!((trade.duration_hours - 1.0).abs() < 1e-12);

        // Short still open and marked to the last close.
        let last = report.equity_curve.last().unwrap();
        assert!((last.capital - (10_000.0 + trade.pnl)).abs() < 1e-9);
        assert_eq!(last.unrealized_pnl, (113.0 * (1.0 - SLIPPAGE) - 113.0) * 0.01);
    }

    #[test]
    fn rope_exit_without_flip_books_take_profit_with_slipped_pnl() {
        // Jumps to 128, then falls back through the rope to 118 while MBI is
        // still +0.5: a plain CloseLong, no short opened.
        let mut closes = ENTRY.to_vec();
        closes.extend([128.0, 118.0]);
        let report = runner(0.5).run(&bars(&closes));

        let actions: Vec<_> = report.signals.iter().map(|s| s.action).collect();
        assert_eq!(actions, vec![SignalAction::OpenLong, SignalAction::CloseLong]);

        assert_eq!(report.trades.len(), 1);
        let trade = &report.trades[0];
        assert_eq!(trade.side, PositionSide::Long);
        assert_eq!(trade.exit_reason, OrderReason::TakeProfit);
        let entry = 110.0 * (1.0 + SLIPPAGE);
        let exit = 118.0 * (1.0 - SLIPPAGE);
        assert!((trade.entry_price - entry).abs() < 1e-9);
        assert!((trade.exit_price - exit).abs() < 1e-9);
        assert!((trade.pnl - (exit - entry) * 0.01).abs() < 1e-9);
        assert!(trade.pnl > 0.0);

        let last = report.equity_curve.last().unwrap();
        assert_eq!(last.unrealized_pnl, 0.0);
        assert!((last.capital - (10_000.0 + trade.pnl)).abs() < 1e-9);
    }

    #[test]
    fn flip_with_rejected_entry_ends_flat() {
        let mut closes = ENTRY.to_vec();
        closes.extend([112.0, 114.0, 116.0, 113.0]);
        let mut r = runner(0.5);
        r.rate.max_orders_per_minute = 1;
        let report = r.run(&bars(&closes));

        // The flip's close fits the minute; its entry does not.
        assert_eq!(report.trades.len(), 1);
        assert_eq!(report.trades[0].exit_reason, OrderReason::Flip);
        assert_eq!(report.rejected_orders.len(), 1);
        assert_eq!(report.rejected_orders[0].order.reason, OrderReason::Entry);
        assert_eq!(report.rejected_orders[0].order.side, OrderSide::Sell);

        let last = report.equity_curve.last().unwrap();
        assert_eq!(last.unrealized_pnl, 0.0);
        assert_eq!(report.guard.admitted, 2);
    }

    #[test]
    fn commission_is_charged_on_both_legs() {
        let mut closes = ENTRY.to_vec();
        closes.push(107.0);
        let mut r = runner(0.05);
        r.settings.commission = 0.001;
        let report = r.run(&bars(&closes));

        let trade = &report.trades[0];
        let expected = (trade.entry_price + trade.exit_price) * 0.01 * 0.001;
        assert!((trade.commission - expected).abs() < 1e-12);
    }

    #[test]
    fn identical_input_gives_identical_report() {
        let closes: Vec<f64> = (0..300)
            .map(|i| 100.0 + 10.0 * (i as f64 / 7.0).sin() + (i % 5) as f64)
            .collect();
        let input = bars(&closes);
        let a = runner(0.05).run(&input);
        let b = runner(0.05).run(&input);
        assert!(!a.signals.is_empty());
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn gaps_are_counted_and_rewarm() {
        let mut input = bars(&[100.0; 10]);
        input.remove(6);
        let report = runner(0.05).run(&input);
        assert_eq!(report.discontinuities, 1);
        assert_eq!(report.equity_curve.len(), 9);
    }

    #[test]
    fn undersized_orders_are_reported_not_booked() {
        let mut tiny = pair();
        tiny.order_size = 0.0003;
        let r = BacktestRunner::new(tiny, params(0.05), RateConfig::default(), BacktestSettings::default());
        let report = r.run(&bars(&ENTRY));

        assert_eq!(report.rejected_orders.len(), 1);
        assert!(report.rejected_orders[0].reason.contains("Invalid precision"));
        assert!(report.trades.is_empty());
        assert_eq!(report.guard.rejected, 1);
    }
}
