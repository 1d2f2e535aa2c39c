//! Swing-based market structure analysis.
//!
//! Detects swing highs/lows with a two-candle wing and classifies the bias
//! from the relationship of the most recent swings: higher highs + higher
//! lows is bullish, lower highs + lower lows is bearish, anything mixed is
//! neutral.

use common::Candle;
use serde::{Deserialize, Serialize};

const WING: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

impl std::fmt::Display for Bias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bias::Bullish => write!(f, "bullish"),
            Bias::Bearish => write!(f, "bearish"),
            Bias::Neutral => write!(f, "neutral"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketStructure {
    pub bias: Bias,
    /// 0..=10, how many recent swing pairs confirm the bias.
    pub strength: f64,
    /// 0..=1.
    pub confidence: f64,
    pub last_swing_high: Option<f64>,
    pub last_swing_low: Option<f64>,
}

impl MarketStructure {
    fn neutral() -> Self {
        Self {
            bias: Bias::Neutral,
            strength: 0.0,
            confidence: 0.3,
            last_swing_high: None,
            last_swing_low: None,
        }
    }
}

/// Analyze the swing structure of a candle window (oldest first).
pub fn analyze_structure(candles: &[Candle]) -> MarketStructure {
    let (highs, lows) = swing_points(candles);

    if highs.len() < 2 || lows.len() < 2 {
        return MarketStructure {
            last_swing_high: highs.last().copied(),
            last_swing_low: lows.last().copied(),
            ..MarketStructure::neutral()
        };
    }

    let higher_high = highs[highs.len() - 1] > highs[highs.len() - 2];
    let higher_low = lows[lows.len() - 1] > lows[lows.len() - 2];

    let bias = match (higher_high, higher_low) {
        (true, true) => Bias::Bullish,
        (false, false) => Bias::Bearish,
        _ => Bias::Neutral,
    };

    // How many of the recent swing pairs (up to 3 per series) agree with
    // the bias direction.
    let confirming = confirming_pairs(&highs, bias) + confirming_pairs(&lows, bias);
    let inspected = inspected_pairs(&highs) + inspected_pairs(&lows);
    let agreement = if inspected > 0 {
        confirming as f64 / inspected as f64
    } else {
        0.0
    };

    let (strength, confidence) = match bias {
        Bias::Neutral => (0.0, 0.3),
        _ => (10.0 * agreement, (0.3 + 0.6 * agreement).min(0.9)),
    };

    MarketStructure {
        bias,
        strength,
        confidence,
        last_swing_high: highs.last().copied(),
        last_swing_low: lows.last().copied(),
    }
}

/// Swing highs and lows, oldest first. A swing high is a candle whose high
/// exceeds the highs of the `WING` candles on each side.
fn swing_points(candles: &[Candle]) -> (Vec<f64>, Vec<f64>) {
    let mut highs = Vec::new();
    let mut lows = Vec::new();
    if candles.len() < 2 * WING + 1 {
        return (highs, lows);
    }

    for i in WING..candles.len() - WING {
        let c = &candles[i];
        let neighborhood = &candles[i - WING..=i + WING];
        if neighborhood
            .iter()
            .enumerate()
            .all(|(j, n)| j == WING || n.high < c.high)
        {
            highs.push(c.high);
        }
        if neighborhood
            .iter()
            .enumerate()
            .all(|(j, n)| j == WING || n.low > c.low)
        {
            lows.push(c.low);
        }
    }

    (highs, lows)
}

fn confirming_pairs(swings: &[f64], bias: Bias) -> usize {
    let pairs = swings.windows(2).rev().take(3);
    match bias {
        Bias::Bullish => pairs.filter(|w| w[1] > w[0]).count(),
        Bias::Bearish => pairs.filter(|w| w[1] < w[0]).count(),
        Bias::Neutral => 0,
    }
}

fn inspected_pairs(swings: &[f64]) -> usize {
    swings.len().saturating_sub(1).min(3)
}
