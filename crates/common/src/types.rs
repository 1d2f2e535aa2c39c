use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One historical OHLCV bar. The immutable input unit of every evaluation
/// and simulation step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// OHLC consistency: `low <= min(open, close) <= max(open, close) <= high`
    /// and all prices strictly positive.
    pub fn is_consistent(&self) -> bool {
        let body_low = self.open.min(self.close);
        let body_high = self.open.max(self.close);
        self.low > 0.0
            && self.low <= body_low
            && body_high <= self.high
            && self.volume >= 0.0
            && [self.open, self.high, self.low, self.close]
                .iter()
                .all(|p| p.is_finite())
    }
}

/// Directional decision label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
pub enum Label {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Label::Buy => write!(f, "BUY"),
            Label::Sell => write!(f, "SELL"),
            Label::Hold => write!(f, "HOLD"),
        }
    }
}

/// Side of an executed position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// How a simulated or tracked position was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Timeout,
    EndOfData,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "stop_loss"),
            ExitReason::TakeProfit => write!(f, "take_profit"),
            ExitReason::Timeout => write!(f, "timeout"),
            ExitReason::EndOfData => write!(f, "end_of_data"),
        }
    }
}

/// Qualitative risk grade attached to a scored decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// A persisted signal row. Natural key is `(ts, symbol, timeframe)`;
/// duplicate inserts on that key are no-ops. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SignalRecord {
    pub id: String,
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub label: Label,
    pub score: f64,
    pub confidence: Option<f64>,
    pub timeframe: String,
    pub regime: Option<String>,
    pub htf_bias: Option<String>,
    pub mtf_aligned: Option<bool>,
    pub summary: Option<String>,
}

/// A persisted fill for one signal. At most one per signal; a HOLD signal
/// never produces one. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ExecutionRecord {
    pub signal_id: String,
    pub side: Side,
    pub entry: f64,
    pub sl: Option<f64>,
    pub tp1: Option<f64>,
    pub tp2: Option<f64>,
    pub qty: Option<f64>,
    pub fees: Option<f64>,
    pub slip: Option<f64>,
    pub spread: Option<f64>,
    pub risk_amount: Option<f64>,
}

/// A persisted resolution for one signal. Zero (still open) or exactly one.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OutcomeRecord {
    pub signal_id: String,
    pub exit_ts: DateTime<Utc>,
    pub exit_price: f64,
    pub pnl: f64,
    pub pnl_pct: Option<f64>,
    pub rr: f64,
    pub reason: ExitReason,
    pub duration_mins: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            time: Utc::now(),
            open,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn consistent_candle_passes() {
        assert!(candle(100.0, 105.0, 95.0, 102.0).is_consistent());
    }

    #[test]
    fn flat_candle_is_consistent() {
        assert!(candle(100.0, 100.0, 100.0, 100.0).is_consistent());
    }

    #[test]
    fn high_below_low_fails() {
        assert!(!candle(100.0, 95.0, 105.0, 100.0).is_consistent());
    }

    #[test]
    fn body_outside_range_fails() {
        assert!(!candle(110.0, 105.0, 95.0, 100.0).is_consistent());
        assert!(!candle(100.0, 105.0, 95.0, 90.0).is_consistent());
    }

    #[test]
    fn non_positive_price_fails() {
        assert!(!candle(0.0, 1.0, 0.0, 1.0).is_consistent());
        assert!(!candle(-1.0, 1.0, -2.0, 1.0).is_consistent());
    }

    #[test]
    fn label_display_matches_db_encoding() {
        assert_eq!(Label::Buy.to_string(), "BUY");
        assert_eq!(Label::Sell.to_string(), "SELL");
        assert_eq!(Label::Hold.to_string(), "HOLD");
    }

    #[test]
    fn exit_reason_display_is_snake_case() {
        assert_eq!(ExitReason::StopLoss.to_string(), "stop_loss");
        assert_eq!(ExitReason::EndOfData.to_string(), "end_of_data");
    }
}
