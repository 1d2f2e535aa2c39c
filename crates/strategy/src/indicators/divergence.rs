//! Price/indicator divergence detection.
//!
//! Compares the direction of price against the direction of an indicator
//! over a trailing lookback window. Price falling while the indicator rises
//! is bullish divergence; price rising while the indicator falls is bearish.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DivergenceKind {
    Bullish,
    Bearish,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Divergence {
    pub kind: DivergenceKind,
    /// 0..=1, how pronounced the disagreement is.
    pub strength: f64,
    /// Strong enough to act on: strength > 0.5.
    pub confirmation: bool,
}

impl Divergence {
    fn none() -> Self {
        Self {
            kind: DivergenceKind::None,
            strength: 0.0,
            confirmation: false,
        }
    }
}

/// Detect divergence between `prices` and `indicator` over the trailing
/// `lookback` samples. Both series are oldest-first; only their common
/// trailing window is inspected.
pub fn detect_divergence(prices: &[f64], indicator: &[f64], lookback: usize) -> Divergence {
    let span = lookback.min(prices.len().saturating_sub(1)).min(indicator.len().saturating_sub(1));
    if span < 2 {
        return Divergence::none();
    }

    let p_window = &prices[prices.len() - span - 1..];
    let i_window = &indicator[indicator.len() - span - 1..];

    let p_first = p_window[0];
    let p_last = p_window[span];
    if p_first <= 0.0 {
        return Divergence::none();
    }
    let price_delta = (p_last - p_first) / p_first;

    let i_max = i_window.iter().copied().fold(f64::MIN, f64::max);
    let i_min = i_window.iter().copied().fold(f64::MAX, f64::min);
    let i_range = i_max - i_min;
    if i_range <= 0.0 {
        return Divergence::none();
    }
    let ind_delta = (i_window[span] - i_window[0]) / i_range;

    let kind = if price_delta < 0.0 && ind_delta > 0.0 {
        DivergenceKind::Bullish
    } else if price_delta > 0.0 && ind_delta < 0.0 {
        DivergenceKind::Bearish
    } else {
        return Divergence::none();
    };

    // Average of the (scaled) price move and the normalized indicator move
    let strength = (((price_delta.abs() * 20.0).min(1.0)) + ind_delta.abs().min(1.0)) / 2.0;

    Divergence {
        kind,
        strength,
        confirmation: strength > 0.5,
    }
}
