//! Volume-Weighted Average Price.
//!
//! Cumulative over the whole series: sum(typical * volume) / sum(volume),
//! where typical = (high + low + close) / 3. While cumulative volume is zero
//! the typical price itself is used.

use common::Candle;

/// Compute a cumulative VWAP series over candles (oldest first).
pub fn vwap(candles: &[Candle]) -> Vec<f64> {
    let mut out = Vec::with_capacity(candles.len());
    let mut cum_pv = 0.0;
    let mut cum_vol = 0.0;

    for c in candles {
        let typical = (c.high + c.low + c.close) / 3.0;
        cum_pv += typical * c.volume;
        cum_vol += c.volume;
        if cum_vol > 0.0 {
            out.push(cum_pv / cum_vol);
        } else {
            out.push(typical);
        }
    }

    out
}
