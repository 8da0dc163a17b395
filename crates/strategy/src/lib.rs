pub mod config;
pub mod indicators;
pub mod signal;

pub use config::TradingFileConfig;
pub use indicators::{IndicatorEngine, IndicatorSnapshot};
pub use signal::{transition, Cross, SignalGenerator, Trend};

use common::{Bar, Error, PositionSide, Result, Signal, StrategyParams};

/// All strategy implementations must satisfy this trait.
pub trait Strategy: Send {
    /// The symbol this strategy watches (e.g. "BTCUSDT").
    fn symbol(&self) -> &str;

    /// Evaluate one closed bar given the current position side.
    ///
    /// Errors are the indicator window conditions (`InsufficientData`,
    /// `DataDiscontinuity`); no signal exists for that bar.
    fn on_bar(&mut self, bar: &Bar, side: PositionSide) -> Result<Signal>;
}

/// MBO/MBI trend filter combined with rope-line crossings.
#[derive(Debug, Clone)]
pub struct RopeStrategy {
    indicators: IndicatorEngine,
    generator: SignalGenerator,
}

impl RopeStrategy {
    pub fn new(symbol: impl Into<String>, params: &StrategyParams) -> Self {
        let symbol = symbol.into();
        Self {
            indicators: IndicatorEngine::new(symbol.clone(), params),
            generator: SignalGenerator::new(symbol),
        }
    }
}

impl Strategy for RopeStrategy {
    fn symbol(&self) -> &str {
        self.indicators.symbol()
    }

    fn on_bar(&mut self, bar: &Bar, side: PositionSide) -> Result<Signal> {
        match self.indicators.update(bar) {
            Ok(snapshot) => Ok(self.generator.evaluate(&snapshot, side)),
            Err(e) => {
                if matches!(e, Error::InsufficientData { .. }) {
                    self.generator.reset();
                }
                Err(e)
            }
        }
    }
}
