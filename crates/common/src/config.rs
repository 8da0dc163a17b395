use serde::{Deserialize, Serialize};

use crate::{Error, Result, RunMode, Timeframe};

/// Process-level configuration loaded from environment variables at startup.
/// Trading parameters live in the TOML file named by `CONFIG_PATH`.
#[derive(Debug, Clone)]
pub struct Config {
    pub run_mode: RunMode,
    /// Path to the trading config file (pairs, strategy, rate limits).
    pub config_path: String,
    /// Directory holding one `<SYMBOL>.csv` bar file per pair.
    pub data_dir: String,
    /// Paper mode publishes one bar per `timeframe.refresh_interval() / replay_speedup`.
    pub replay_speedup: u32,
}

impl Config {
    /// Load configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let run_mode = match optional_env("RUN_MODE")
            .unwrap_or_else(|| "backtest".to_string())
            .to_lowercase()
            .as_str()
        {
            "backtest" => RunMode::Backtest,
            "paper" => RunMode::Paper,
            other => {
                return Err(Error::Config(format!(
                    "RUN_MODE must be 'backtest' or 'paper', got: '{other}'"
                )))
            }
        };

        let replay_speedup = match optional_env("REPLAY_SPEEDUP") {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    Error::Config(format!("REPLAY_SPEEDUP must be a positive integer, got: '{raw}'"))
                })?,
            None => 600,
        };

        Ok(Config {
            run_mode,
            config_path: optional_env("CONFIG_PATH")
                .unwrap_or_else(|| "config/ropebot.toml".to_string()),
            data_dir: optional_env("DATA_DIR").unwrap_or_else(|| "data".to_string()),
            replay_speedup,
        })
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Exchange-facing settings for one tradable contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairConfig {
    pub contract_id: String,
    pub symbol: String,
    /// Notional allocated to the pair, in quote currency.
    pub position_size: f64,
    pub leverage: u32,
    /// Quantity sent with every entry, in base units.
    pub order_size: f64,
    /// Minimum price increment.
    pub tick_size: f64,
    /// Decimal places accepted for quantities.
    #[serde(default = "default_size_precision")]
    pub size_precision: u32,
    /// Smallest quantity the exchange accepts.
    #[serde(default = "default_min_order_size")]
    pub min_order_size: f64,
}

fn default_size_precision() -> u32 {
    3
}

fn default_min_order_size() -> f64 {
    0.001
}

impl PairConfig {
    pub fn validate(&self) -> Result<()> {
        if self.symbol.is_empty() {
            return Err(Error::Config("pair symbol must not be empty".into()));
        }
        if !(self.tick_size > 0.0) {
            return Err(Error::Config(format!(
                "{}: tick_size must be positive, got {}",
                self.symbol, self.tick_size
            )));
        }
        if !(self.order_size > 0.0) {
            return Err(Error::Config(format!(
                "{}: order_size must be positive, got {}",
                self.symbol, self.order_size
            )));
        }
        if self.min_order_size < 0.0 {
            return Err(Error::Config(format!(
                "{}: min_order_size must not be negative",
                self.symbol
            )));
        }
        if self.leverage == 0 {
            return Err(Error::Config(format!("{}: leverage must be >= 1", self.symbol)));
        }
        Ok(())
    }
}

/// Indicator and exit parameters shared by every pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    #[serde(default = "default_ma_short")]
    pub ma_short_period: usize,
    #[serde(default = "default_ma_long")]
    pub ma_long_period: usize,
    #[serde(default = "default_rope_period")]
    pub rope_period: usize,
    /// Loss fraction that force-closes a position (0.02 = 2%).
    #[serde(default = "default_stop_loss")]
    pub stop_loss_pct: f64,
    /// Gain fraction that force-closes a position (0.05 = 5%).
    #[serde(default = "default_take_profit")]
    pub take_profit_pct: f64,
    /// Fraction applied against the taker on every simulated fill.
    #[serde(default = "default_slippage")]
    pub slippage: f64,
    #[serde(default = "default_timeframe")]
    pub timeframe: Timeframe,
}

fn default_ma_short() -> usize {
    25
}

fn default_ma_long() -> usize {
    200
}

fn default_rope_period() -> usize {
    50
}

fn default_stop_loss() -> f64 {
    0.02
}

fn default_take_profit() -> f64 {
    0.05
}

fn default_slippage() -> f64 {
    0.001
}

fn default_timeframe() -> Timeframe {
    Timeframe::M15
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            ma_short_period: default_ma_short(),
            ma_long_period: default_ma_long(),
            rope_period: default_rope_period(),
            stop_loss_pct: default_stop_loss(),
            take_profit_pct: default_take_profit(),
            slippage: default_slippage(),
            timeframe: default_timeframe(),
        }
    }
}

impl StrategyParams {
    /// Bars needed before a snapshot exists: both averages and the rope
    /// window, plus one for the MBI difference.
    pub fn warmup_bars(&self) -> usize {
        self.ma_long_period.max(self.rope_period) + 1
    }

    pub fn validate(&self) -> Result<()> {
        if self.ma_short_period == 0 || self.rope_period == 0 {
            return Err(Error::Config("indicator periods must be >= 1".into()));
        }
        if self.ma_short_period >= self.ma_long_period {
            return Err(Error::Config(format!(
                "ma_short_period ({}) must be less than ma_long_period ({})",
                self.ma_short_period, self.ma_long_period
            )));
        }
        for (name, value) in [
            ("stop_loss_pct", self.stop_loss_pct),
            ("take_profit_pct", self.take_profit_pct),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(Error::Config(format!("{name} must be in (0, 1), got {value}")));
            }
        }
        if !(0.0..1.0).contains(&self.slippage) {
            return Err(Error::Config(format!(
                "slippage must be in [0, 1), got {}",
                self.slippage
            )));
        }
        Ok(())
    }
}

/// Submission budgets shared by all symbols.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateConfig {
    #[serde(default = "default_per_second")]
    pub max_requests_per_second: u32,
    #[serde(default = "default_per_minute")]
    pub max_orders_per_minute: u32,
    /// Longest an order may be held waiting for the next second window.
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
}

fn default_per_second() -> u32 {
    10
}

fn default_per_minute() -> u32 {
    100
}

fn default_max_wait_ms() -> u64 {
    3_000
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            max_requests_per_second: default_per_second(),
            max_orders_per_minute: default_per_minute(),
            max_wait_ms: default_max_wait_ms(),
        }
    }
}

impl RateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_requests_per_second == 0 || self.max_orders_per_minute == 0 {
            return Err(Error::Config("rate budgets must be >= 1".into()));
        }
        Ok(())
    }
}

/// Accounting parameters for historical replays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSettings {
    #[serde(default = "default_initial_capital")]
    pub initial_capital: f64,
    /// Fee rate charged on entry plus exit notional.
    #[serde(default)]
    pub commission: f64,
}

fn default_initial_capital() -> f64 {
    10_000.0
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            initial_capital: default_initial_capital(),
            commission: 0.0,
        }
    }
}
