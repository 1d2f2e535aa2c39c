//! Historical simulation engine.
//!
//! One synchronous pass over a candle sequence: evaluate a pluggable
//! decision function per step, fill BUY/SELL decisions at the next candle's
//! open with slippage, then race the stop against the first target over a
//! bounded forward horizon. One position at a time; the loop resumes after
//! the exit candle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use common::{Candle, Decision, DecisionEngine, ExitReason, Label, Result, Side};
use strategy::indicators::atr;
use strategy::levels::bracket_levels;

use crate::metrics::{self, EquityPoint, PerformanceMetrics, TradePoint};
use crate::validate;

/// Bounded exit-race horizon, in candles past the fill.
pub const EXIT_HORIZON: usize = 100;

/// Execution-cost parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CostModel {
    /// Per-side fee as a fraction of notional, 0..=0.01.
    pub fee_rate: f64,
    /// Entry slippage in basis points, 0..=100.
    pub slip_bps: f64,
    /// Spread cost in basis points, 0..=100.
    pub spread_bps: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            fee_rate: 0.0004,
            slip_bps: 5.0,
            spread_bps: 2.0,
        }
    }
}

/// Risk/sizing parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskModel {
    /// Starting account equity, must be positive.
    pub equity: f64,
    /// Percent of equity risked per trade, (0, 10].
    pub risk_pct: f64,
    /// Stop distance in ATR multiples.
    pub atr_mult: f64,
    /// First target, in multiples of the stop distance.
    pub tp1_rr: f64,
    /// Second target, recorded on the execution but not raced.
    pub tp2_rr: f64,
}

impl Default for RiskModel {
    fn default() -> Self {
        Self {
            equity: 10_000.0,
            risk_pct: 1.0,
            atr_mult: 1.5,
            tp1_rr: 2.0,
            tp2_rr: 3.0,
        }
    }
}

/// A full backtest request. Validated up front; see [`validate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub symbol: String,
    pub timeframe: String,
    pub candles: Vec<Candle>,
    pub cost: CostModel,
    pub risk: RiskModel,
    /// Trailing evaluation window length; also the first evaluated index.
    pub warmup: usize,
    /// Hard cap on opened trades.
    pub max_trades: usize,
}

impl BacktestRequest {
    pub fn new(symbol: impl Into<String>, timeframe: impl Into<String>, candles: Vec<Candle>) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe: timeframe.into(),
            candles,
            cost: CostModel::default(),
            risk: RiskModel::default(),
            warmup: 100,
            max_trades: 500,
        }
    }
}

/// One resolved simulated trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Timestamp of the candle the decision was made on.
    pub signal_ts: DateTime<Utc>,
    pub entry_ts: DateTime<Utc>,
    pub exit_ts: DateTime<Utc>,
    pub side: Side,
    pub entry: f64,
    pub exit: f64,
    pub stop: f64,
    pub target: f64,
    pub target2: f64,
    pub qty: f64,
    pub gross_pnl: f64,
    /// Fee + spread cost deducted from the gross P&L. Entry slippage is
    /// already inside the fill price; its cash value is `slip_cost`.
    pub cost: f64,
    pub slip_cost: f64,
    pub pnl: f64,
    /// Realized R multiple, signed by profitability.
    pub rr: f64,
    pub reason: ExitReason,
    /// The decision that opened this trade, kept for lifecycle persistence.
    pub decision: Decision,
}

/// Run counters and date coverage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub duration_days: f64,
    pub total_signals: usize,
    pub traded_signals: usize,
    pub skipped_signals: usize,
}

/// Everything a run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub stats: PerformanceMetrics,
    pub curve: Vec<EquityPoint>,
    pub trades: Vec<TradeRecord>,
    pub summary: BacktestSummary,
}

/// Run one backtest. Validation failures abort before any simulation step;
/// the decision engine is consulted once per post-warm-up candle.
pub fn run_backtest(req: &BacktestRequest, decider: &dyn DecisionEngine) -> Result<BacktestResult> {
    validate::validate_request(req)?;

    let candles = &req.candles;
    info!(
        symbol = %req.symbol,
        timeframe = %req.timeframe,
        candles = candles.len(),
        warmup = req.warmup,
        strategy = decider.name(),
        "backtest starting"
    );

    let mut trades: Vec<TradeRecord> = Vec::new();
    let mut total_signals = 0usize;
    let mut skipped_signals = 0usize;

    let mut i = req.warmup;
    while i < candles.len() {
        if trades.len() >= req.max_trades {
            debug!(max_trades = req.max_trades, "trade cap reached, stopping");
            break;
        }

        let window = &candles[i + 1 - req.warmup..=i];
        total_signals += 1;
        let decision = decider.evaluate(window);

        if decision.label == Label::Hold {
            skipped_signals += 1;
            i += 1;
            continue;
        }

        // Fill at the next candle's open; without one there is nothing to
        // execute against.
        let Some(next) = candles.get(i + 1) else {
            break;
        };
        let fill_idx = i + 1;

        let side = match decision.label {
            Label::Buy => Side::Long,
            Label::Sell => Side::Short,
            Label::Hold => unreachable!("hold handled above"),
        };

        let slip = req.cost.slip_bps / 10_000.0;
        let entry = match side {
            Side::Long => next.open * (1.0 + slip),
            Side::Short => next.open * (1.0 - slip),
        };

        let window_atr = atr(window, 14).last().copied().unwrap_or(0.0);
        let levels = bracket_levels(
            entry,
            decision.label,
            Some(window_atr),
            req.risk.atr_mult,
            &[req.risk.tp1_rr, req.risk.tp2_rr],
        );
        let stop = levels.stop_loss;
        let target = levels.take_profits[0];
        let target2 = levels.take_profits[1];
        let stop_distance = (entry - stop).abs();

        let risk_amount = req.risk.equity * req.risk.risk_pct / 100.0;
        let qty = risk_amount / stop_distance;

        // Exit race: first candle index whose range touches stop or target.
        // Within one candle the intrabar order is unknowable, so the stop is
        // checked first.
        let horizon_end = (fill_idx + EXIT_HORIZON).min(candles.len());
        let mut resolution: Option<(usize, f64, ExitReason)> = None;
        for (j, c) in candles.iter().enumerate().take(horizon_end).skip(fill_idx) {
            let stop_hit = match side {
                Side::Long => c.low <= stop,
                Side::Short => c.high >= stop,
            };
            if stop_hit {
                resolution = Some((j, stop, ExitReason::StopLoss));
                break;
            }
            let target_hit = match side {
                Side::Long => c.high >= target,
                Side::Short => c.low <= target,
            };
            if target_hit {
                resolution = Some((j, target, ExitReason::TakeProfit));
                break;
            }
        }

        let (exit_idx, exit_price, reason) = resolution.unwrap_or_else(|| {
            let last_idx = horizon_end - 1;
            let reason = if horizon_end == candles.len() {
                ExitReason::EndOfData
            } else {
                ExitReason::Timeout
            };
            (last_idx, candles[last_idx].close, reason)
        });

        let gross_pnl = match side {
            Side::Long => (exit_price - entry) * qty,
            Side::Short => (entry - exit_price) * qty,
        };
        let notional = entry * qty;
        let exit_notional = exit_price * qty;
        let fee_cost = req.cost.fee_rate * (notional + exit_notional);
        let spread_cost = req.cost.spread_bps / 10_000.0 * notional;
        let cost = fee_cost + spread_cost;
        let slip_cost = slip * next.open * qty;
        let pnl = gross_pnl - cost;

        let raw_rr = (exit_price - entry).abs() / stop_distance;
        let rr = if pnl < 0.0 { -raw_rr } else { raw_rr };

        debug!(
            side = %side,
            entry,
            exit = exit_price,
            reason = %reason,
            pnl,
            "trade resolved"
        );

        trades.push(TradeRecord {
            signal_ts: candles[i].time,
            entry_ts: next.time,
            exit_ts: candles[exit_idx].time,
            side,
            entry,
            exit: exit_price,
            stop,
            target,
            target2,
            qty,
            gross_pnl,
            cost,
            slip_cost,
            pnl,
            rr,
            reason,
            decision,
        });

        // One position at a time: resume evaluation after the exit candle.
        i = exit_idx + 1;
    }

    let points: Vec<TradePoint> = trades
        .iter()
        .map(|t| TradePoint {
            ts: t.exit_ts,
            pnl: t.pnl,
        })
        .collect();

    let stats = metrics::compute_metrics(&points, req.risk.equity);
    let curve = metrics::equity_curve(candles[0].time, req.risk.equity, &points);

    let start_date = candles[0].time;
    let end_date = candles[candles.len() - 1].time;
    let summary = BacktestSummary {
        start_date,
        end_date,
        duration_days: (end_date - start_date).num_seconds() as f64 / 86_400.0,
        total_signals,
        traded_signals: trades.len(),
        skipped_signals,
    };

    info!(
        trades = trades.len(),
        signals = total_signals,
        skipped = skipped_signals,
        total_pnl = stats.total_pnl,
        "backtest finished"
    );

    Ok(BacktestResult {
        stats,
        curve,
        trades,
        summary,
    })
}

// ─── Tests ────────────────────────────────────────────────────────────────────
