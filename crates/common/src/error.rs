use chrono::{DateTime, Utc};
use thiserror::Error;

/// Which rate budget refused an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateWindow {
    PerSecond,
    PerMinute,
}

impl std::fmt::Display for RateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateWindow::PerSecond => write!(f, "per-second"),
            RateWindow::PerMinute => write!(f, "per-minute"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Insufficient data for {symbol}: {have} of {need} bars")]
    InsufficientData {
        symbol: String,
        have: usize,
        need: usize,
    },

    #[error("Data discontinuity on {symbol}: expected bar at {expected}, got {got}")]
    DataDiscontinuity {
        symbol: String,
        expected: DateTime<Utc>,
        got: DateTime<Utc>,
    },

    #[error("Invalid precision on {symbol}: size {size} normalizes below minimum {min}")]
    InvalidPrecision { symbol: String, size: f64, min: f64 },

    #[error("Rate limit exceeded on {symbol}: {window} budget exhausted")]
    RateLimitExceeded { symbol: String, window: RateWindow },

    #[error("Shutting down: order submission refused")]
    ShuttingDown,

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Exchange error: {0}")]
    Exchange(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Conditions that resolve themselves as more bars arrive or the next
    /// cycle retries; the caller logs and carries on.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::InsufficientData { .. }
                | Error::DataDiscontinuity { .. }
                | Error::InvalidPrecision { .. }
                | Error::RateLimitExceeded { .. }
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
