//! The individual analysis layers feeding the confluence score.
//!
//! Every layer produces a [`LayerScore`] bounded to its contribution range so
//! no single layer can dominate the aggregate. Derivatives-driven layers
//! return `None` when their data is unavailable; the aggregator simply omits
//! them.

use common::Candle;

use crate::indicators::{detect_divergence, ema, macd, rsi, DivergenceKind};

use super::structure::{Bias, MarketStructure};
use super::{DerivativesSnapshot, LayerScore};

pub const STRUCTURE_RANGE: f64 = 30.0;
pub const PRICE_ACTION_RANGE: f64 = 15.0;
pub const EMA_RANGE: f64 = 8.0;
pub const MOMENTUM_RANGE: f64 = 6.0;
pub const FUNDING_RANGE: f64 = 5.0;
pub const OPEN_INTEREST_RANGE: f64 = 5.0;
pub const CVD_RANGE: f64 = 10.0;
pub const FIBONACCI_RANGE: f64 = 4.0;

/// Theoretical maximum of the summed layer scores.
pub const MAX_TOTAL: f64 = 87.0;

/// Structure bias x confidence x strength/10, bounded to +-30.
pub fn structure_layer(ms: &MarketStructure) -> LayerScore {
    let direction = match ms.bias {
        Bias::Bullish => 1.0,
        Bias::Bearish => -1.0,
        Bias::Neutral => 0.0,
    };
    let score = direction * STRUCTURE_RANGE * ms.confidence * (ms.strength / 10.0);

    let mut reasons = Vec::new();
    if direction != 0.0 {
        reasons.push(format!(
            "{} structure (strength {:.1}/10)",
            ms.bias, ms.strength
        ));
    } else {
        reasons.push("no directional structure".to_string());
    }

    LayerScore::new(score.clamp(-STRUCTURE_RANGE, STRUCTURE_RANGE), reasons, ms.confidence)
}

/// Higher-highs/higher-lows counting over the last ten candles, scaled by
/// trend strength from the EMA-20 slope. Bounded to +-15.
pub fn price_action_layer(candles: &[Candle]) -> LayerScore {
    if candles.len() < 12 {
        return LayerScore::new(0.0, vec!["insufficient candles for price action".into()], 0.1);
    }

    let tail = &candles[candles.len() - 10..];
    let mut net = 0i32;
    for w in tail.windows(2) {
        if w[1].high > w[0].high {
            net += 1;
        } else if w[1].high < w[0].high {
            net -= 1;
        }
        if w[1].low > w[0].low {
            net += 1;
        } else if w[1].low < w[0].low {
            net -= 1;
        }
    }
    let net_frac = net as f64 / 18.0;

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let ema20 = ema(&closes, 20);
    let slope_base = ema20[ema20.len().saturating_sub(10)];
    let trend_strength = if slope_base > 0.0 {
        (((ema20[ema20.len() - 1] - slope_base) / slope_base).abs() * 50.0).min(1.0)
    } else {
        0.0
    };

    let score = net_frac * PRICE_ACTION_RANGE * (0.5 + 0.5 * trend_strength);

    let mut reasons = Vec::new();
    if net > 0 {
        reasons.push(format!("higher highs/lows dominate ({net:+})"));
    } else if net < 0 {
        reasons.push(format!("lower highs/lows dominate ({net:+})"));
    } else {
        reasons.push("balanced highs and lows".to_string());
    }
    if trend_strength > 0.5 {
        reasons.push("strong short-term trend".to_string());
    }

    let confidence = 0.2 + 0.5 * net_frac.abs() + 0.2 * trend_strength;
    LayerScore::new(
        score.clamp(-PRICE_ACTION_RANGE, PRICE_ACTION_RANGE),
        reasons,
        confidence,
    )
}

/// 20/50/200 EMA stacking plus price position. Bounded to +-8.
pub fn ema_layer(closes: &[f64]) -> LayerScore {
    if closes.is_empty() {
        return LayerScore::new(0.0, vec!["no closes for EMA confluence".into()], 0.1);
    }

    let e20 = *ema(closes, 20).last().expect("non-empty input");
    let e50 = *ema(closes, 50).last().expect("non-empty input");
    let e200 = *ema(closes, 200).last().expect("non-empty input");
    let price = *closes.last().expect("non-empty input");

    let mut score: f64 = 0.0;
    let mut reasons = Vec::new();
    let mut confidence = 0.3;

    if e20 > e50 && e50 > e200 {
        score += 6.0;
        confidence = 0.8;
        reasons.push("bullish EMA stack (20>50>200)".to_string());
    } else if e20 < e50 && e50 < e200 {
        score -= 6.0;
        confidence = 0.8;
        reasons.push("bearish EMA stack (20<50<200)".to_string());
    } else if e20 > e50 {
        score += 3.0;
        confidence = 0.5;
        reasons.push("short-term EMAs bullish (20>50)".to_string());
    } else if e20 < e50 {
        score -= 3.0;
        confidence = 0.5;
        reasons.push("short-term EMAs bearish (20<50)".to_string());
    }

    if price > e20 {
        score += 2.0;
        reasons.push("price above EMA-20".to_string());
    } else if price < e20 {
        score -= 2.0;
        reasons.push("price below EMA-20".to_string());
    }

    LayerScore::new(score.clamp(-EMA_RANGE, EMA_RANGE), reasons, confidence)
}

/// RSI zone, MACD cross and RSI divergence. Bounded to +-6.
pub fn momentum_layer(closes: &[f64], rsi_period: usize, divergence_lookback: usize) -> LayerScore {
    if closes.len() < 2 {
        return LayerScore::new(0.0, vec!["insufficient closes for momentum".into()], 0.1);
    }

    let mut score = 0.0;
    let mut reasons = Vec::new();
    let mut fired = 0u32;

    let rsi_series = rsi(closes, rsi_period);
    let last_rsi = *rsi_series.last().expect("non-empty input");
    if last_rsi < 30.0 {
        score += 2.0;
        fired += 1;
        reasons.push(format!("RSI oversold ({last_rsi:.1})"));
    } else if last_rsi > 70.0 {
        score -= 2.0;
        fired += 1;
        reasons.push(format!("RSI overbought ({last_rsi:.1})"));
    } else if last_rsi < 40.0 {
        score += 1.0;
        reasons.push(format!("RSI leaning oversold ({last_rsi:.1})"));
    } else if last_rsi > 60.0 {
        score -= 1.0;
        reasons.push(format!("RSI leaning overbought ({last_rsi:.1})"));
    }

    let m = macd(closes, 12, 26, 9);
    let n = m.histogram.len();
    let last_hist = m.histogram[n - 1];
    let prev_hist = m.histogram[n - 2];
    if prev_hist <= 0.0 && last_hist > 0.0 {
        score += 2.5;
        fired += 1;
        reasons.push("MACD bullish cross".to_string());
    } else if prev_hist >= 0.0 && last_hist < 0.0 {
        score -= 2.5;
        fired += 1;
        reasons.push("MACD bearish cross".to_string());
    } else if last_hist > 0.0 {
        score += 1.0;
        reasons.push("MACD momentum positive".to_string());
    } else if last_hist < 0.0 {
        score -= 1.0;
        reasons.push("MACD momentum negative".to_string());
    }

    let div = detect_divergence(closes, &rsi_series, divergence_lookback);
    match div.kind {
        DivergenceKind::Bullish => {
            score += 1.5 * div.strength;
            if div.confirmation {
                fired += 1;
                reasons.push(format!("bullish RSI divergence ({:.2})", div.strength));
            }
        }
        DivergenceKind::Bearish => {
            score -= 1.5 * div.strength;
            if div.confirmation {
                fired += 1;
                reasons.push(format!("bearish RSI divergence ({:.2})", div.strength));
            }
        }
        DivergenceKind::None => {}
    }

    let confidence = 0.25 + 0.2 * fired as f64;
    LayerScore::new(score.clamp(-MOMENTUM_RANGE, MOMENTUM_RANGE), reasons, confidence.min(0.85))
}

/// Contrarian read of funding-rate and premium extremity. Bounded to +-5.
/// `None` when the snapshot carries no funding data.
pub fn funding_layer(snapshot: &DerivativesSnapshot) -> Option<LayerScore> {
    let funding = snapshot.funding_rate?;

    // Crowded longs (positive funding) score bearish and vice versa.
    let funding_ext = (funding / 0.001).clamp(-1.0, 1.0);
    let mut score = -funding_ext * 3.0;

    let mut reasons = vec![format!("funding rate {:.4}%", funding * 100.0)];
    let mut extremity = funding_ext.abs();

    if let Some(premium) = snapshot.premium {
        let premium_ext = (premium / 0.002).clamp(-1.0, 1.0);
        score -= premium_ext * 2.0;
        extremity = extremity.max(premium_ext.abs());
        reasons.push(format!("premium {:.3}%", premium * 100.0));
    }

    if extremity > 0.8 {
        reasons.push("funding at extreme, contrarian pressure".to_string());
    }

    let confidence = 0.2 + 0.6 * extremity;
    Some(LayerScore::new(
        score.clamp(-FUNDING_RANGE, FUNDING_RANGE),
        reasons,
        confidence,
    ))
}

/// OI-change vs price-change agreement. Bounded to +-5.
/// `None` without enough open-interest history.
pub fn open_interest_layer(snapshot: &DerivativesSnapshot, closes: &[f64]) -> Option<LayerScore> {
    let oi = &snapshot.open_interest;
    if oi.len() < 2 || closes.len() < 2 {
        return None;
    }

    let span = oi.len().min(closes.len()).min(20);
    let oi_tail = &oi[oi.len() - span..];
    let px_tail = &closes[closes.len() - span..];

    if oi_tail[0] <= 0.0 || px_tail[0] <= 0.0 {
        return None;
    }
    let oi_delta = (oi_tail[span - 1] - oi_tail[0]) / oi_tail[0];
    let px_delta = (px_tail[span - 1] - px_tail[0]) / px_tail[0];

    let pressure = (oi_delta.abs() * 10.0).min(1.0);
    let corr = pct_change_correlation(oi_tail, px_tail);

    let mut reasons = vec![format!(
        "OI {} {:.2}% while price {} {:.2}%",
        if oi_delta >= 0.0 { "up" } else { "down" },
        oi_delta.abs() * 100.0,
        if px_delta >= 0.0 { "up" } else { "down" },
        px_delta.abs() * 100.0,
    )];

    let direction = px_delta.signum();
    let score = if oi_delta > 0.0 {
        // New positioning confirms the price direction
        reasons.push("rising OI confirms the move".to_string());
        direction * OPEN_INTEREST_RANGE * pressure * (0.5 + 0.5 * corr.abs())
    } else {
        // Unwinding OI fades the move
        reasons.push("falling OI fades the move".to_string());
        -direction * (OPEN_INTEREST_RANGE / 2.0) * pressure
    };

    let confidence = 0.2 + 0.4 * pressure + 0.2 * corr.abs();
    Some(LayerScore::new(
        score.clamp(-OPEN_INTEREST_RANGE, OPEN_INTEREST_RANGE),
        reasons,
        confidence,
    ))
}

/// CVD trend plus CVD/price divergence, bounded to +-10.
/// `None` without enough CVD history.
pub fn cvd_layer(snapshot: &DerivativesSnapshot, closes: &[f64]) -> Option<LayerScore> {
    let cvd = &snapshot.cvd;
    if cvd.len() < 2 || closes.len() < 2 {
        return None;
    }

    let max = cvd.iter().copied().fold(f64::MIN, f64::max);
    let min = cvd.iter().copied().fold(f64::MAX, f64::min);
    let range = max - min;
    if range <= 0.0 {
        return Some(LayerScore::new(0.0, vec!["flat CVD".into()], 0.1));
    }

    let trend = ((cvd[cvd.len() - 1] - cvd[0]) / range).clamp(-1.0, 1.0);
    let mut score = trend * 6.0;

    let mut reasons = vec![if trend > 0.0 {
        "buy volume dominating".to_string()
    } else {
        "sell volume dominating".to_string()
    }];

    let div = detect_divergence(closes, cvd, 14);
    match div.kind {
        DivergenceKind::Bullish => {
            score += 4.0 * div.strength;
            reasons.push(format!("bullish CVD divergence ({:.2})", div.strength));
        }
        DivergenceKind::Bearish => {
            score -= 4.0 * div.strength;
            reasons.push(format!("bearish CVD divergence ({:.2})", div.strength));
        }
        DivergenceKind::None => {}
    }

    let confidence = 0.3 + 0.4 * trend.abs() + 0.2 * div.strength;
    Some(LayerScore::new(score.clamp(-CVD_RANGE, CVD_RANGE), reasons, confidence))
}

/// Proximity to the nearest Fibonacci retracement of the window range.
/// Bounded to +-4.
pub fn fibonacci_layer(candles: &[Candle]) -> LayerScore {
    const RATIOS: [f64; 5] = [0.236, 0.382, 0.5, 0.618, 0.786];

    if candles.len() < 10 {
        return LayerScore::new(0.0, vec!["insufficient candles for fibonacci".into()], 0.1);
    }

    let high = candles.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let low = candles.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let range = high - low;
    let close = candles[candles.len() - 1].close;
    if range <= 0.0 {
        return LayerScore::new(0.0, vec!["no range for fibonacci".into()], 0.1);
    }

    let uptrend = close >= low + range / 2.0;
    let mut nearest_ratio = RATIOS[0];
    let mut nearest_dist = f64::MAX;
    for &r in &RATIOS {
        // Retracement levels are measured from the range extreme the trend
        // pulled away from.
        let level = if uptrend { high - range * r } else { low + range * r };
        let dist = (close - level).abs();
        if dist < nearest_dist {
            nearest_dist = dist;
            nearest_ratio = r;
        }
    }

    let proximity = 1.0 - (nearest_dist / range * 10.0).min(1.0);
    let direction = if uptrend { 1.0 } else { -1.0 };
    let score = direction * FIBONACCI_RANGE * proximity;

    let reasons = vec![format!(
        "price {:.1}% of range from {:.1}% retracement",
        nearest_dist / range * 100.0,
        nearest_ratio * 100.0,
    )];

    let confidence = 0.15 + 0.5 * proximity;
    LayerScore::new(score.clamp(-FIBONACCI_RANGE, FIBONACCI_RANGE), reasons, confidence)
}

/// Pearson correlation between per-step percentage changes of two aligned
/// series. 0 when either side is degenerate.
fn pct_change_correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 3 {
        return 0.0;
    }
    let changes = |s: &[f64]| -> Vec<f64> {
        s.windows(2)
            .map(|w| if w[0] != 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
            .collect()
    };
    let xa = changes(&a[a.len() - n..]);
    let xb = changes(&b[b.len() - n..]);

    let mean = |s: &[f64]| s.iter().sum::<f64>() / s.len() as f64;
    let ma = mean(&xa);
    let mb = mean(&xb);

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..xa.len() {
        let da = xa[i] - ma;
        let db = xb[i] - mb;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a <= 0.0 || var_b <= 0.0 {
        return 0.0;
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}
