//! Stochastic oscillator.
//!
//! %K = 100 * (close - lowest_low) / (highest_high - lowest_low) over the
//! trailing k_period candles (expanding during warm-up); 50 when the range
//! is zero. %D = SMA(%K, d_period).

use common::Candle;

use super::sma;

/// %K and %D series.
#[derive(Debug, Clone)]
pub struct Stochastic {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
}

/// Compute the stochastic oscillator over candles (oldest first).
pub fn stochastic(candles: &[Candle], k_period: usize, d_period: usize) -> Stochastic {
    let k_period = k_period.max(1);
    let mut k = Vec::with_capacity(candles.len());

    for i in 0..candles.len() {
        let start = (i + 1).saturating_sub(k_period);
        let window = &candles[start..=i];
        let hh = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let ll = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        let range = hh - ll;
        if range <= 0.0 {
            k.push(50.0);
        } else {
            k.push(100.0 * (candles[i].close - ll) / range);
        }
    }

    let d = sma(&k, d_period.max(1));

    Stochastic { k, d }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn make_candles(data: &[(f64, f64, f64)]) -> Vec<Candle> {
        data.iter()
            .enumerate()
            .map(|(i, &(high, low, close))| Candle {
                time: Utc.timestamp_opt(1_700_000_000 + i as i64 * 60, 0).unwrap(),
                open: close,
                high,
                low,
                close,
                volume: 100.0,
            })
            .collect()
    }

    #[test]
    fn stochastic_same_length_as_input() {
        let candles = make_candles(&[(105.0, 95.0, 100.0); 30]);
        let s = stochastic(&candles, 14, 3);
        assert_eq!(s.k.len(), 30);
        assert_eq!(s.d.len(), 30);
    }

    #[test]
    fn flat_range_reads_neutral() {
        let candles = make_candles(&[(100.0, 100.0, 100.0); 20]);
        let s = stochastic(&candles, 14, 3);
        assert!(s.k.iter().all(|&v| v == 50.0));
    }

    #[test]
    fn close_at_high_reads_100() {
        let candles = make_candles(&[(110.0, 90.0, 110.0), (110.0, 90.0, 110.0)]);
        let s = stochastic(&candles, 2, 1);
        assert!((s.k[1] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn close_at_low_reads_0() {
        let candles = make_candles(&[(110.0, 90.0, 90.0), (110.0, 90.0, 90.0)]);
        let s = stochastic(&candles, 2, 1);
        assert!(s.k[1].abs() < 1e-9);
    }

    #[test]
    fn k_bounded_0_100() {
        let candles = make_candles(
            &(0..100)
                .map(|i| {
                    let base = 100.0 + (i as f64 * 0.3).sin() * 10.0;
                    (base + 2.0, base - 2.0, base + (i as f64 * 0.7).cos())
                })
                .collect::<Vec<_>>(),
        );
        let s = stochastic(&candles, 14, 3);
        assert!(s.k.iter().all(|&v| (0.0..=100.0).contains(&v)));
    }
}
