//! Entry/stop/target generation from price, label and volatility.

use serde::{Deserialize, Serialize};

use common::Label;

/// Stop distance in ATR multiples.
const STOP_ATR: f64 = 1.5;
/// Target distances in ATR multiples, nearest first.
const TARGET_ATRS: [f64; 3] = [2.0, 3.0, 4.5];
/// Fallback volatility when no usable ATR is available: 2% of price.
const ATR_FALLBACK_PCT: f64 = 0.02;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingLevels {
    pub entry: f64,
    pub stop_loss: f64,
    /// At least one target, nearest first.
    pub take_profits: Vec<f64>,
    /// |first target - entry| / |entry - stop|.
    pub risk_reward: f64,
}

/// Derive levels for a decision at `price` using the fixed publication
/// profile: stop at 1.5 ATR, targets at 2 / 3 / 4.5 ATR. Falls back to 2% of
/// price when `atr` is unavailable or non-positive, so a constant-price
/// series still produces a usable bracket without dividing by zero.
///
/// HOLD gets a conservative long-style bracket (stop below, ascending
/// targets) so downstream consumers always receive workable levels.
pub fn generate_levels(price: f64, label: Label, atr: Option<f64>) -> TradingLevels {
    let vol = effective_atr(price, atr);

    let (stop_loss, take_profits): (f64, Vec<f64>) = match label {
        Label::Sell => (
            price + STOP_ATR * vol,
            TARGET_ATRS.iter().map(|m| price - m * vol).collect(),
        ),
        // BUY and the conservative HOLD bracket share the long shape
        Label::Buy | Label::Hold => (
            price - STOP_ATR * vol,
            TARGET_ATRS.iter().map(|m| price + m * vol).collect(),
        ),
    };

    build(price, stop_loss, take_profits)
}

/// Derive a parameterized bracket: stop at `atr_mult` ATR multiples, each
/// target at a multiple of the stop distance. This is the variant the
/// backtest engine drives with its risk model.
pub fn bracket_levels(
    entry: f64,
    label: Label,
    atr: Option<f64>,
    atr_mult: f64,
    target_rrs: &[f64],
) -> TradingLevels {
    let vol = effective_atr(entry, atr);
    let stop_distance = atr_mult * vol;

    let (stop_loss, take_profits): (f64, Vec<f64>) = match label {
        Label::Sell => (
            entry + stop_distance,
            target_rrs.iter().map(|rr| entry - rr * stop_distance).collect(),
        ),
        Label::Buy | Label::Hold => (
            entry - stop_distance,
            target_rrs.iter().map(|rr| entry + rr * stop_distance).collect(),
        ),
    };

    build(entry, stop_loss, take_profits)
}

fn effective_atr(price: f64, atr: Option<f64>) -> f64 {
    match atr {
        Some(a) if a.is_finite() && a > 0.0 => a,
        _ => price * ATR_FALLBACK_PCT,
    }
}

fn build(entry: f64, stop_loss: f64, take_profits: Vec<f64>) -> TradingLevels {
    let stop_distance = (entry - stop_loss).abs();
    let risk_reward = if stop_distance > 0.0 && !take_profits.is_empty() {
        (take_profits[0] - entry).abs() / stop_distance
    } else {
        0.0
    };

    TradingLevels {
        entry,
        stop_loss,
        take_profits,
        risk_reward,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn buy_levels_have_stop_below_and_targets_above() {
        let levels = generate_levels(100.0, Label::Buy, Some(2.0));
        assert!(levels.stop_loss < levels.entry);
        assert!(levels.take_profits.iter().all(|&t| t > levels.entry));
        assert_relative_eq!(levels.stop_loss, 97.0);
        assert_relative_eq!(levels.take_profits[0], 104.0);
        assert_relative_eq!(levels.take_profits[2], 109.0);
    }

    #[test]
    fn sell_levels_are_mirrored() {
        let levels = generate_levels(100.0, Label::Sell, Some(2.0));
        assert!(levels.stop_loss > levels.entry);
        assert!(levels.take_profits.iter().all(|&t| t < levels.entry));
        assert_relative_eq!(levels.stop_loss, 103.0);
        assert_relative_eq!(levels.take_profits[0], 96.0);
    }

    #[test]
    fn hold_still_produces_usable_bracket() {
        let levels = generate_levels(100.0, Label::Hold, Some(2.0));
        assert!(levels.stop_loss < levels.entry);
        assert!(!levels.take_profits.is_empty());
        assert!(levels.take_profits.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn risk_reward_is_first_target_over_stop_distance() {
        // stop distance 3, first target distance 4 → RR = 4/3
        let levels = generate_levels(100.0, Label::Buy, Some(2.0));
        assert_relative_eq!(levels.risk_reward, 4.0 / 3.0);
    }

    #[test]
    fn missing_atr_falls_back_to_two_percent() {
        let levels = generate_levels(100.0, Label::Buy, None);
        assert_relative_eq!(levels.stop_loss, 100.0 - 1.5 * 2.0);
    }

    #[test]
    fn zero_atr_falls_back_without_dividing_by_zero() {
        let levels = generate_levels(100.0, Label::Buy, Some(0.0));
        assert!(levels.risk_reward.is_finite());
        assert!(levels.risk_reward > 0.0);
        assert!(levels.stop_loss < 100.0);
    }

    #[test]
    fn zero_price_yields_degenerate_but_finite_levels() {
        let levels = generate_levels(0.0, Label::Buy, None);
        assert_eq!(levels.risk_reward, 0.0);
        assert!(levels.stop_loss.is_finite());
    }

    #[test]
    fn bracket_levels_place_targets_at_rr_multiples() {
        // stop distance = 1.5 * 2 = 3; tp1 = 100 + 2*3, tp2 = 100 + 3*3
        let levels = bracket_levels(100.0, Label::Buy, Some(2.0), 1.5, &[2.0, 3.0]);
        assert_relative_eq!(levels.stop_loss, 97.0);
        assert_relative_eq!(levels.take_profits[0], 106.0);
        assert_relative_eq!(levels.take_profits[1], 109.0);
        assert_relative_eq!(levels.risk_reward, 2.0);
    }

    #[test]
    fn bracket_levels_short_side_is_mirrored() {
        let levels = bracket_levels(100.0, Label::Sell, Some(2.0), 1.5, &[2.0, 3.0]);
        assert_relative_eq!(levels.stop_loss, 103.0);
        assert_relative_eq!(levels.take_profits[0], 94.0);
    }
}
