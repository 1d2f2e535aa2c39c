//! Average True Range.
//!
//! TR = max(high-low, |high-prev_close|, |low-prev_close|), with
//! TR[0] = high[0] - low[0] (no previous close). The TR series is smoothed
//! with an EMA seeded on the first sample, keeping output length equal to
//! input length.

use common::Candle;

use super::ema;

/// Compute an ATR series over candles (oldest first). Same length as input.
pub fn atr(candles: &[Candle], period: usize) -> Vec<f64> {
    if candles.is_empty() {
        return Vec::new();
    }

    let mut tr = Vec::with_capacity(candles.len());
    tr.push(candles[0].high - candles[0].low);

    for w in candles.windows(2) {
        let prev_close = w[0].close;
        let c = &w[1];
        let range = (c.high - c.low)
            .max((c.high - prev_close).abs())
            .max((c.low - prev_close).abs());
        tr.push(range);
    }

    ema(&tr, period)
}
