//! Up-front request validation.
//!
//! Every violation is collected before the run is rejected, so a caller sees
//! the complete list instead of fixing one field at a time. A request that
//! fails here never reaches the simulation loop.

use common::{Error, Result};

use crate::backtest::BacktestRequest;

/// Minimum history required for a meaningful run.
pub const MIN_CANDLES: usize = 200;
/// How many malformed candles are listed individually before summarizing.
const MAX_REPORTED_CANDLES: usize = 5;

/// Validate a backtest request. Returns `Error::Validation` carrying every
/// violation found.
pub fn validate_request(req: &BacktestRequest) -> Result<()> {
    let mut violations = Vec::new();

    if req.symbol.trim().is_empty() {
        violations.push("symbol: must not be empty".to_string());
    }
    if req.timeframe.trim().is_empty() {
        violations.push("timeframe: must not be empty".to_string());
    }

    if req.candles.len() < MIN_CANDLES {
        violations.push(format!(
            "candles: need at least {MIN_CANDLES}, got {}",
            req.candles.len()
        ));
    }

    if !(0.0..=0.01).contains(&req.cost.fee_rate) {
        violations.push(format!(
            "cost.fee_rate: must be within [0, 0.01], got {}",
            req.cost.fee_rate
        ));
    }
    if !(0.0..=100.0).contains(&req.cost.slip_bps) {
        violations.push(format!(
            "cost.slip_bps: must be within [0, 100], got {}",
            req.cost.slip_bps
        ));
    }
    if !(0.0..=100.0).contains(&req.cost.spread_bps) {
        violations.push(format!(
            "cost.spread_bps: must be within [0, 100], got {}",
            req.cost.spread_bps
        ));
    }

    if req.risk.equity <= 0.0 {
        violations.push(format!(
            "risk.equity: must be positive, got {}",
            req.risk.equity
        ));
    }
    if req.risk.risk_pct <= 0.0 || req.risk.risk_pct > 10.0 {
        violations.push(format!(
            "risk.risk_pct: must be within (0, 10], got {}",
            req.risk.risk_pct
        ));
    }
    if req.risk.atr_mult <= 0.0 {
        violations.push(format!(
            "risk.atr_mult: must be positive, got {}",
            req.risk.atr_mult
        ));
    }
    if req.risk.tp1_rr <= 0.0 {
        violations.push(format!(
            "risk.tp1_rr: must be positive, got {}",
            req.risk.tp1_rr
        ));
    }
    if req.risk.tp2_rr <= 0.0 {
        violations.push(format!(
            "risk.tp2_rr: must be positive, got {}",
            req.risk.tp2_rr
        ));
    }

    if req.warmup == 0 {
        violations.push("warmup: must be at least 1".to_string());
    } else if req.warmup >= req.candles.len() && req.candles.len() >= MIN_CANDLES {
        violations.push(format!(
            "warmup: {} leaves no candles to evaluate",
            req.warmup
        ));
    }

    let mut malformed = Vec::new();
    for (i, candle) in req.candles.iter().enumerate() {
        if !candle.is_consistent() {
            malformed.push(i);
        }
    }
    for &i in malformed.iter().take(MAX_REPORTED_CANDLES) {
        violations.push(format!("candles[{i}]: OHLC values are inconsistent"));
    }
    if malformed.len() > MAX_REPORTED_CANDLES {
        violations.push(format!(
            "candles: {} more inconsistent candles not listed",
            malformed.len() - MAX_REPORTED_CANDLES
        ));
    }

    for (i, pair) in req.candles.windows(2).enumerate() {
        if pair[1].time <= pair[0].time {
            violations.push(format!(
                "candles[{}]: timestamp does not increase monotonically",
                i + 1
            ));
            break; // one report is enough, later ones are usually the same fault
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(violations))
    }
}
