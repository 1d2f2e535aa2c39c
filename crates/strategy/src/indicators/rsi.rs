//! Relative Strength Index (Wilder's smoothing).
//!
//! Same smoothing as TradingView / standard RSI. Every index before the
//! window is filled holds the neutral value 50, as does the whole series for
//! degenerate input (length <= period).

pub const NEUTRAL: f64 = 50.0;

/// Compute an RSI series over close prices (oldest first). Same length as
/// the input; indices `0..period` are the neutral 50.
pub fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let period = period.max(2);
    let n = closes.len();
    if n <= period {
        return vec![NEUTRAL; n];
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let mut out = vec![NEUTRAL; period];

    // First average gain/loss over the initial `period` changes
    let mut avg_gain = changes[..period]
        .iter()
        .filter(|&&c| c > 0.0)
        .sum::<f64>()
        / period as f64;
    let mut avg_loss = changes[..period]
        .iter()
        .filter(|&&c| c < 0.0)
        .map(|c| c.abs())
        .sum::<f64>()
        / period as f64;

    out.push(rsi_from_averages(avg_gain, avg_loss));

    // Wilder smoothing over remaining changes
    for &change in &changes[period..] {
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { change.abs() } else { 0.0 };
        avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        out.push(rsi_from_averages(avg_gain, avg_loss));
    }

    out
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            return NEUTRAL; // flat series
        }
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_degenerate_input_is_all_neutral() {
        let prices = vec![100.0; 14];
        let r = rsi(&prices, 14);
        assert_eq!(r.len(), 14);
        assert!(r.iter().all(|&v| v == NEUTRAL));
    }

    #[test]
    fn rsi_same_length_as_input() {
        let prices: Vec<f64> = (0..100).map(|i| 100.0 + (i as f64).sin()).collect();
        assert_eq!(rsi(&prices, 14).len(), 100);
    }

    #[test]
    fn rsi_warmup_indices_are_neutral() {
        let prices: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let r = rsi(&prices, 14);
        assert!(r[..14].iter().all(|&v| v == NEUTRAL));
        assert_ne!(r[14], NEUTRAL);
    }

    #[test]
    fn rsi_all_gains_approaches_100() {
        let prices: Vec<f64> = (0..20).map(|i| 10.0 + i as f64).collect();
        let r = rsi(&prices, 3);
        let last = *r.last().unwrap();
        assert!((last - 100.0).abs() < 1e-6, "Expected ~100, got {last}");
    }

    #[test]
    fn rsi_all_losses_approaches_0() {
        let prices: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        let r = rsi(&prices, 3);
        let last = *r.last().unwrap();
        assert!(last.abs() < 1e-6, "Expected ~0, got {last}");
    }

    #[test]
    fn rsi_flat_series_is_neutral() {
        let r = rsi(&[100.0; 40], 14);
        assert!(r.iter().all(|&v| v == NEUTRAL));
    }

    #[test]
    fn rsi_bounded_0_100() {
        let prices: Vec<f64> = (0..200)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 15.0)
            .collect();
        let r = rsi(&prices, 14);
        assert!(r.iter().all(|&v| (0.0..=100.0).contains(&v)));
    }
}
