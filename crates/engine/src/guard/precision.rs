//! Exchange increment rounding.
//!
//! Prices snap to the nearest tick (half-up); sizes round to the configured
//! decimal places with ties going down so an order is never inflated.

// Absorbs binary representation error (0.0137 * 1000 = 13.700000000000001)
// before the rounding decision is taken.
const SNAP: f64 = 1e6;

fn snap(x: f64) -> f64 {
    (x * SNAP).round() / SNAP
}

fn round_to_decimals(x: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (x * scale).round() / scale
}

/// Number of decimal places in an increment such as `0.01` (up to 12).
pub fn decimals_of(step: f64) -> u32 {
    let mut value = step;
    let mut decimals = 0;
    while decimals < 12 && (value - value.round()).abs() > 1e-9 {
        value *= 10.0;
        decimals += 1;
    }
    decimals
}

/// Nearest multiple of `tick_size`, halves rounding up.
pub fn round_price(price: f64, tick_size: f64) -> f64 {
    let ticks = snap(price / tick_size).round();
    round_to_decimals(ticks * tick_size, decimals_of(tick_size))
}

/// `size` at `precision` decimal places, halves rounding down.
pub fn round_size(size: f64, precision: u32) -> f64 {
    let scale = 10f64.powi(precision as i32);
    let scaled = snap(size * scale);
    let floor = scaled.floor();
    let units = if scaled - floor > 0.5 { floor + 1.0 } else { floor };
    units / scale
}
