//! Multi-layer confluence scoring.
//!
//! Up to eight independent analysis layers each contribute a bounded score;
//! the sum is normalized to 0..100 and mapped to a BUY/SELL/HOLD label with a
//! confidence and a qualitative risk grade. Layers without data (disabled or
//! derivatives unavailable) are omitted from both the sum and the confidence
//! average; the normalization denominator stays fixed, which biases
//! partial-layer runs toward HOLD on purpose.

pub mod layers;
pub mod structure;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{Candle, Decision, DecisionEngine, Label, RiskLevel};

use crate::config::ConfluenceFileConfig;

use layers::MAX_TOTAL;
use structure::{analyze_structure, MarketStructure};

pub const BUY_THRESHOLD: f64 = 70.0;
pub const SELL_THRESHOLD: f64 = 30.0;

/// The bounded contribution of one analysis layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerScore {
    pub score: f64,
    pub reasons: Vec<String>,
    /// Never below 0.1: a layer with nothing to say still reports a floor
    /// confidence so the aggregate average stays defined.
    pub confidence: f64,
}

impl LayerScore {
    pub fn new(score: f64, reasons: Vec<String>, confidence: f64) -> Self {
        Self {
            score,
            reasons,
            confidence: confidence.clamp(0.1, 1.0),
        }
    }
}

/// Optional derivatives context for the funding/OI/CVD layers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DerivativesSnapshot {
    pub funding_rate: Option<f64>,
    pub premium: Option<f64>,
    /// Open-interest history aligned with the candle window tail.
    pub open_interest: Vec<f64>,
    /// Cumulative volume delta history aligned with the candle window tail.
    pub cvd: Vec<f64>,
}

/// The aggregated verdict of one evaluation step. Recomputed every step,
/// never persisted directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfluenceResult {
    pub total_score: f64,
    /// 0..=100.
    pub normalized_score: f64,
    pub label: Label,
    /// 0.1..=1.
    pub confidence: f64,
    pub layers: BTreeMap<String, LayerScore>,
    pub summary: String,
    pub risk_level: RiskLevel,
}

/// The confluence scorer. Implements [`DecisionEngine`] so it can be plugged
/// straight into the backtest engine.
#[derive(Debug, Clone)]
pub struct ConfluenceScorer {
    config: ConfluenceFileConfig,
    derivatives: Option<DerivativesSnapshot>,
}

impl ConfluenceScorer {
    pub fn new(config: ConfluenceFileConfig) -> Self {
        Self {
            config,
            derivatives: None,
        }
    }

    /// Attach a derivatives snapshot for the funding/OI/CVD layers.
    pub fn with_derivatives(mut self, snapshot: DerivativesSnapshot) -> Self {
        self.derivatives = Some(snapshot);
        self
    }

    /// Score a candle window (oldest first).
    pub fn score(&self, window: &[Candle]) -> ConfluenceResult {
        let ms = analyze_structure(window);
        self.score_with_structure(window, &ms)
    }

    fn score_with_structure(&self, window: &[Candle], ms: &MarketStructure) -> ConfluenceResult {
        let closes: Vec<f64> = window.iter().map(|c| c.close).collect();
        let toggles = &self.config.layers;
        let params = &self.config.indicators;

        let mut layer_scores: BTreeMap<String, LayerScore> = BTreeMap::new();

        if toggles.structure {
            layer_scores.insert("structure".into(), layers::structure_layer(ms));
        }
        if toggles.price_action {
            layer_scores.insert("price_action".into(), layers::price_action_layer(window));
        }
        if toggles.ema {
            layer_scores.insert("ema".into(), layers::ema_layer(&closes));
        }
        if toggles.momentum {
            layer_scores.insert(
                "momentum".into(),
                layers::momentum_layer(&closes, params.rsi_period, params.divergence_lookback),
            );
        }
        if let Some(deriv) = &self.derivatives {
            if toggles.funding {
                if let Some(layer) = layers::funding_layer(deriv) {
                    layer_scores.insert("funding".into(), layer);
                }
            }
            if toggles.open_interest {
                if let Some(layer) = layers::open_interest_layer(deriv, &closes) {
                    layer_scores.insert("open_interest".into(), layer);
                }
            }
            if toggles.cvd {
                if let Some(layer) = layers::cvd_layer(deriv, &closes) {
                    layer_scores.insert("cvd".into(), layer);
                }
            }
        }
        if toggles.fibonacci {
            layer_scores.insert("fibonacci".into(), layers::fibonacci_layer(window));
        }

        aggregate(layer_scores)
    }
}

impl DecisionEngine for ConfluenceScorer {
    fn name(&self) -> &str {
        "confluence"
    }

    fn evaluate(&self, window: &[Candle]) -> Decision {
        let ms = analyze_structure(window);
        let result = self.score_with_structure(window, &ms);
        debug!(
            label = %result.label,
            normalized = result.normalized_score,
            confidence = result.confidence,
            layers = result.layers.len(),
            "confluence evaluated"
        );
        Decision {
            label: result.label,
            score: result.total_score,
            confidence: Some(result.confidence),
            summary: result.summary,
            regime: Some(ms.bias.to_string()),
        }
    }
}

/// Sum present layers, normalize against the fixed +-87 envelope, derive
/// label, confidence and risk grade.
fn aggregate(layer_scores: BTreeMap<String, LayerScore>) -> ConfluenceResult {
    let total_score: f64 = layer_scores.values().map(|l| l.score).sum();

    let normalized_score = (((total_score + MAX_TOTAL) / (2.0 * MAX_TOTAL)) * 100.0)
        .round()
        .clamp(0.0, 100.0);

    let label = if normalized_score >= BUY_THRESHOLD {
        Label::Buy
    } else if normalized_score <= SELL_THRESHOLD {
        Label::Sell
    } else {
        Label::Hold
    };

    let mean_confidence = if layer_scores.is_empty() {
        0.0
    } else {
        layer_scores.values().map(|l| l.confidence).sum::<f64>() / layer_scores.len() as f64
    };
    let magnitude = (total_score.abs() / MAX_TOTAL).min(1.0);
    let confidence = ((mean_confidence + magnitude) / 2.0).max(0.1);

    let risk_level = if confidence > 0.7 && (normalized_score >= 75.0 || normalized_score <= 25.0)
    {
        RiskLevel::Low
    } else if confidence > 0.5 {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    };

    let summary = build_summary(label, normalized_score, confidence, &layer_scores);

    ConfluenceResult {
        total_score,
        normalized_score,
        label,
        confidence,
        layers: layer_scores,
        summary,
        risk_level,
    }
}

fn build_summary(
    label: Label,
    normalized: f64,
    confidence: f64,
    layers: &BTreeMap<String, LayerScore>,
) -> String {
    let mut ranked: Vec<(&String, &LayerScore)> = layers.iter().collect();
    ranked.sort_by(|a, b| {
        b.1.score
            .abs()
            .partial_cmp(&a.1.score.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let top: Vec<String> = ranked
        .iter()
        .take(3)
        .map(|(name, l)| format!("{name} {:+.1}", l.score))
        .collect();

    format!(
        "{label} ({normalized:.0}/100, {} layers, conf {confidence:.2}): {}",
        layers.len(),
        top.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfluenceFileConfig;
    use chrono::{TimeZone, Utc};

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle {
                time: Utc.timestamp_opt(1_700_000_000 + i as i64 * 3600, 0).unwrap(),
                open: c,
                high: c + 1.0,
                low: (c - 1.0).max(0.1),
                close: c,
                volume: 100.0,
            })
            .collect()
    }

    fn layer(score: f64, confidence: f64) -> LayerScore {
        LayerScore::new(score, vec!["test".into()], confidence)
    }

    #[test]
    fn normalized_score_always_in_bounds() {
        for total in [-200.0, -87.0, -30.0, 0.0, 30.0, 87.0, 200.0] {
            let mut layers = BTreeMap::new();
            layers.insert("structure".to_string(), layer(total, 0.5));
            let r = aggregate(layers);
            assert!(
                (0.0..=100.0).contains(&r.normalized_score),
                "normalized {} out of bounds for total {total}",
                r.normalized_score
            );
        }
    }

    #[test]
    fn label_is_deterministic_in_normalized_score() {
        // total 40 → normalized = round((127/174)*100) = 73 → BUY
        let mut layers = BTreeMap::new();
        layers.insert("structure".to_string(), layer(40.0, 0.8));
        let r = aggregate(layers);
        assert_eq!(r.normalized_score, 73.0);
        assert_eq!(r.label, Label::Buy);

        // total -40 → normalized 27 → SELL
        let mut layers = BTreeMap::new();
        layers.insert("structure".to_string(), layer(-40.0, 0.8));
        let r = aggregate(layers);
        assert_eq!(r.normalized_score, 27.0);
        assert_eq!(r.label, Label::Sell);

        // total 0 → normalized 50 → HOLD
        let mut layers = BTreeMap::new();
        layers.insert("structure".to_string(), layer(0.0, 0.8));
        let r = aggregate(layers);
        assert_eq!(r.normalized_score, 50.0);
        assert_eq!(r.label, Label::Hold);
    }

    #[test]
    fn missing_layers_bias_toward_hold() {
        // A single strongly bullish small-range layer cannot reach BUY when
        // the denominator is not rescaled.
        let mut layers = BTreeMap::new();
        layers.insert("ema".to_string(), layer(8.0, 0.9));
        let r = aggregate(layers);
        assert_eq!(r.label, Label::Hold);
    }

    #[test]
    fn empty_layers_is_neutral_hold_with_floor_confidence() {
        let r = aggregate(BTreeMap::new());
        assert_eq!(r.label, Label::Hold);
        assert_eq!(r.normalized_score, 50.0);
        assert!(r.confidence >= 0.1);
    }

    #[test]
    fn confidence_floor_holds() {
        let mut layers = BTreeMap::new();
        layers.insert("structure".to_string(), layer(0.0, 0.1));
        let r = aggregate(layers);
        assert!(r.confidence >= 0.1);
    }

    #[test]
    fn risk_level_low_needs_confident_decisive_score() {
        let mut layers = BTreeMap::new();
        layers.insert("structure".to_string(), layer(80.0, 0.95));
        let r = aggregate(layers);
        assert!(r.normalized_score >= 75.0);
        assert_eq!(r.risk_level, RiskLevel::Low);
    }

    #[test]
    fn risk_level_high_when_unconfident() {
        let mut layers = BTreeMap::new();
        layers.insert("structure".to_string(), layer(5.0, 0.2));
        let r = aggregate(layers);
        assert_eq!(r.risk_level, RiskLevel::High);
    }

    #[test]
    fn scorer_holds_on_flat_market() {
        let scorer = ConfluenceScorer::new(ConfluenceFileConfig::default());
        let window = candles_from_closes(&[100.0; 120]);
        let r = scorer.score(&window);
        // Synthetic candles keep a 2.0 high-low range, so the fibonacci layer
        // can still contribute a few points; the label must stay HOLD.
        assert_eq!(r.label, Label::Hold);
        assert!((45.0..=55.0).contains(&r.normalized_score));
    }

    #[test]
    fn scorer_summary_names_top_layers() {
        let scorer = ConfluenceScorer::new(ConfluenceFileConfig::default());
        let closes: Vec<f64> = (0..250).map(|i| 100.0 + i as f64 * 0.5).collect();
        let r = scorer.score(&candles_from_closes(&closes));
        assert!(r.summary.contains("layers"));
        assert!(!r.layers.is_empty());
    }

    #[test]
    fn decision_engine_reports_regime() {
        let scorer = ConfluenceScorer::new(ConfluenceFileConfig::default());
        let closes: Vec<f64> = (0..250)
            .map(|i| 100.0 + i as f64 * 0.5 + ((i % 6) as f64 - 3.0) * 4.0)
            .collect();
        let decision = scorer.evaluate(&candles_from_closes(&closes));
        assert!(decision.regime.is_some());
        assert!(decision.confidence.is_some());
    }

    #[test]
    fn derivatives_layers_only_present_with_snapshot() {
        let scorer = ConfluenceScorer::new(ConfluenceFileConfig::default());
        let closes: Vec<f64> = (0..250).map(|i| 100.0 + i as f64 * 0.2).collect();
        let window = candles_from_closes(&closes);

        let without = scorer.score(&window);
        assert!(!without.layers.contains_key("funding"));
        assert!(!without.layers.contains_key("cvd"));

        let with = scorer
            .clone()
            .with_derivatives(DerivativesSnapshot {
                funding_rate: Some(0.0005),
                premium: None,
                open_interest: (0..30).map(|i| 1000.0 + i as f64).collect(),
                cvd: (0..30).map(|i| i as f64 * 10.0).collect(),
            })
            .score(&window);
        assert!(with.layers.contains_key("funding"));
        assert!(with.layers.contains_key("open_interest"));
        assert!(with.layers.contains_key("cvd"));
    }
}
