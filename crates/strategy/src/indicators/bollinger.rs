//! Bollinger Bands: rolling mean +/- k * population standard deviation.
//!
//! The window expands during warm-up like [`sma`], so all three bands are the
//! same length as the input and collapse onto the price while only one sample
//! is available.

use super::sma;

/// Upper/middle/lower band series.
#[derive(Debug, Clone)]
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Compute Bollinger Bands over close prices (oldest first).
pub fn bollinger(closes: &[f64], period: usize, k: f64) -> BollingerBands {
    let period = period.max(1);
    let middle = sma(closes, period);

    let mut upper = Vec::with_capacity(closes.len());
    let mut lower = Vec::with_capacity(closes.len());

    for i in 0..closes.len() {
        let start = (i + 1).saturating_sub(period);
        let window = &closes[start..=i];
        let mean = middle[i];
        let variance =
            window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / window.len() as f64;
        let sd = variance.sqrt();
        upper.push(mean + k * sd);
        lower.push(mean - k * sd);
    }

    BollingerBands {
        upper,
        middle,
        lower,
    }
}
