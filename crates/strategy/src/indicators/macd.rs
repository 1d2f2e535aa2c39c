//! Moving Average Convergence/Divergence.
//!
//! MACD line = EMA(fast) - EMA(slow); signal = EMA(macd_line, signal_period);
//! histogram = MACD - signal. All three series are the same length as the
//! input because the underlying EMAs are seeded with their first sample.

use super::ema;

/// MACD line, signal line and histogram series.
#[derive(Debug, Clone)]
pub struct Macd {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// Compute MACD series over close prices (oldest first).
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal_period: usize) -> Macd {
    let fast_ema = ema(closes, fast);
    let slow_ema = ema(closes, slow);

    let macd_line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();

    let signal = ema(&macd_line, signal_period);

    let histogram: Vec<f64> = macd_line
        .iter()
        .zip(&signal)
        .map(|(m, s)| m - s)
        .collect();

    Macd {
        macd: macd_line,
        signal,
        histogram,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macd_series_lengths_match_input() {
        let prices: Vec<f64> = (0..80).map(|i| 100.0 + i as f64 * 0.3).collect();
        let m = macd(&prices, 12, 26, 9);
        assert_eq!(m.macd.len(), 80);
        assert_eq!(m.signal.len(), 80);
        assert_eq!(m.histogram.len(), 80);
    }

    #[test]
    fn macd_positive_in_uptrend() {
        let prices: Vec<f64> = (0..80).map(|i| 100.0 + i as f64).collect();
        let m = macd(&prices, 12, 26, 9);
        assert!(*m.macd.last().unwrap() > 0.0);
    }

    #[test]
    fn macd_negative_in_downtrend() {
        let prices: Vec<f64> = (0..80).map(|i| 200.0 - i as f64).collect();
        let m = macd(&prices, 12, 26, 9);
        assert!(*m.macd.last().unwrap() < 0.0);
    }

    #[test]
    fn histogram_is_macd_minus_signal() {
        let prices: Vec<f64> = (0..60)
            .map(|i| 100.0 + (i as f64 * 0.5).sin() * 5.0)
            .collect();
        let m = macd(&prices, 12, 26, 9);
        for i in 0..prices.len() {
            let expected = m.macd[i] - m.signal[i];
            assert!((m.histogram[i] - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn macd_flat_series_is_zero() {
        let m = macd(&[100.0; 60], 12, 26, 9);
        assert!(m.macd.iter().all(|v| v.abs() < 1e-12));
        assert!(m.histogram.iter().all(|v| v.abs() < 1e-12));
    }
}
