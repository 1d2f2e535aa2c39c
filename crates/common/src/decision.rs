use serde::{Deserialize, Serialize};

use crate::{Candle, Label};

/// A directional decision produced by one evaluation step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub label: Label,
    /// Raw (un-normalized) aggregate score behind the label.
    pub score: f64,
    pub confidence: Option<f64>,
    pub summary: String,
    pub regime: Option<String>,
}

impl Decision {
    /// A neutral decision, used when a strategy has nothing to say.
    pub fn hold(summary: impl Into<String>) -> Self {
        Self {
            label: Label::Hold,
            score: 0.0,
            confidence: None,
            summary: summary.into(),
            regime: None,
        }
    }
}

/// The seam between scoring and simulation.
///
/// The backtest engine calls `evaluate` with the trailing warm-up window of
/// candles ending at the current step. Any conforming implementation (the
/// confluence scorer, a dumb momentum strategy, a test stub) can be injected
/// without the engine knowing the concrete type.
pub trait DecisionEngine: Send + Sync {
    /// Human-readable name shown in logs and summaries.
    fn name(&self) -> &str;

    /// Evaluate the window (oldest candle first) and return a decision.
    fn evaluate(&self, window: &[Candle]) -> Decision;
}
