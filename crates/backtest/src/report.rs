use chrono::{DateTime, Utc};
use serde::Serialize;

use common::{OrderReason, OrderRequest, PositionSide, SignalAction};
use engine::GuardStats;

/// A closed round trip. Prices are fill prices, slippage included.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    /// Net of commission.
    pub pnl: f64,
    pub pnl_pct: f64,
    pub commission: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub duration_hours: f64,
    pub exit_reason: OrderReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub capital: f64,
    pub unrealized_pnl: f64,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalRecord {
    pub timestamp: DateTime<Utc>,
    pub action: SignalAction,
    pub price: f64,
    /// A threshold exit on the same bar took priority.
    pub suppressed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedOrder {
    pub order: OrderRequest,
    pub reason: String,
}

/// Summary statistics. Percentages are in percent, not fractions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate_pct: f64,
    pub total_pnl: f64,
    pub total_return_pct: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    /// `|avg_win / avg_loss|`, zero without losing trades.
    pub profit_factor: f64,
    pub max_drawdown_pct: f64,
    pub sharpe_ratio: f64,
    pub final_capital: f64,
}

impl Metrics {
    pub fn compute(
        trades: &[Trade],
        equity_curve: &[EquityPoint],
        initial_capital: f64,
        final_capital: f64,
    ) -> Self {
        let wins: Vec<f64> = trades.iter().map(|t| t.pnl).filter(|p| *p > 0.0).collect();
        let losses: Vec<f64> = trades.iter().map(|t| t.pnl).filter(|p| *p <= 0.0).collect();
        let total_pnl: f64 = trades.iter().map(|t| t.pnl).sum();

        let avg_win = mean(&wins);
        let avg_loss = mean(&losses);
        let equity: Vec<f64> = equity_curve.iter().map(|p| p.equity).collect();

        Self {
            total_trades: trades.len(),
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            win_rate_pct: if trades.is_empty() {
                0.0
            } else {
                wins.len() as f64 * 100.0 / trades.len() as f64
            },
            total_pnl,
            total_return_pct: if initial_capital > 0.0 {
                total_pnl * 100.0 / initial_capital
            } else {
                0.0
            },
            avg_win,
            avg_loss,
            profit_factor: if avg_loss != 0.0 {
                (avg_win / avg_loss).abs()
            } else {
                0.0
            },
            max_drawdown_pct: max_drawdown(&equity) * 100.0,
            sharpe_ratio: sharpe_ratio(&equity),
            final_capital,
        }
    }
}

/// Everything one backtest run produced. Serializes to stable JSON, so two
/// runs over the same input compare byte for byte.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestReport {
    pub symbol: String,
    pub initial_capital: f64,
    pub bars: usize,
    /// Stale, duplicate, or gapped bars reported by the indicator window.
    pub discontinuities: usize,
    pub signals: Vec<SignalRecord>,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub rejected_orders: Vec<RejectedOrder>,
    pub guard: GuardStats,
    pub metrics: Metrics,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Largest peak-to-trough decline as a positive fraction (0.15 = 15%).
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0_f64;
    for &eq in equity {
        peak = peak.max(eq);
        if peak > 0.0 {
            worst = worst.max((peak - eq) / peak);
        }
    }
    worst
}

/// Mean over sample standard deviation of per-bar returns, scaled by √252.
/// Zero with fewer than two returns or flat equity.
pub fn sharpe_ratio(equity: &[f64]) -> f64 {
    let returns: Vec<f64> = equity
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect();
    if returns.len() < 2 {
        return 0.0;
    }
    let m = mean(&returns);
    let var = returns.iter().map(|r| (r - m).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    let std = var.sqrt();
    if std < 1e-15 {
        return 0.0;
    }
    m / std * 252.0_f64.sqrt()
}
