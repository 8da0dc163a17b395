use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use common::{BacktestSettings, Error, PairConfig, RateConfig, Result, StrategyParams};

/// Top-level trading config file (TOML).
///
/// Example `config/ropebot.toml`:
/// ```toml
/// [strategy]
/// ma_short_period = 25
/// ma_long_period = 200
/// rope_period = 50
/// stop_loss_pct = 0.02
/// take_profit_pct = 0.05
/// slippage = 0.001
/// timeframe = "15m"
///
/// [rate]
/// max_requests_per_second = 10
/// max_orders_per_minute = 100
///
/// [[pair]]
/// contract_id = "10000001"
/// symbol = "BTCUSDT"
/// position_size = 1000.0
/// leverage = 5
/// order_size = 0.01
/// tick_size = 0.1
/// size_precision = 3
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TradingFileConfig {
    #[serde(default)]
    pub strategy: StrategyParams,
    #[serde(default)]
    pub rate: RateConfig,
    #[serde(default)]
    pub backtest: BacktestSettings,
    #[serde(rename = "pair")]
    pub pairs: Vec<PairConfig>,
}

impl TradingFileConfig {
    /// Load and validate a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read trading config at '{path}': {e}"))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.strategy.validate()?;
        self.rate.validate()?;
        if self.pairs.is_empty() {
            return Err(Error::Config("at least one [[pair]] is required".into()));
        }
        let mut seen = HashSet::new();
        for pair in &self.pairs {
            pair.validate()?;
            if !seen.insert(pair.symbol.as_str()) {
                return Err(Error::Config(format!("duplicate pair '{}'", pair.symbol)));
            }
        }
        Ok(())
    }

    pub fn pair(&self, symbol: &str) -> Option<&PairConfig> {
        self.pairs.iter().find(|p| p.symbol == symbol)
    }
}
