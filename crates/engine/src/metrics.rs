//! Performance metrics: pure functions over realized trade P&L.
//!
//! Everything here takes an ordered `{ts, pnl}` sequence plus a starting
//! equity and returns derived values; no engine or store dependencies. All
//! division-by-zero cases are guarded with defined sentinels (0 or infinity)
//! instead of panicking, and an empty trade list yields an explicit
//! zero-valued metrics object.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

const PERIODS_PER_YEAR: f64 = 252.0;

/// One realized trade, reduced to what the metrics need.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradePoint {
    pub ts: DateTime<Utc>,
    pub pnl: f64,
}

/// One point of the equity curve. `peak` is the running maximum and
/// `drawdown = peak - equity` is never negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub ts: DateTime<Utc>,
    pub equity: f64,
    pub drawdown: f64,
    pub peak: f64,
}

/// Aggregate statistics for a trade sequence. Ratios are rounded to two
/// decimal places.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    /// Percent, 0..=100.
    pub win_rate: f64,
    pub total_pnl: f64,
    pub avg_win: f64,
    /// Signed (non-positive) average of losing trades.
    pub avg_loss: f64,
    pub expectancy: f64,
    pub profit_factor: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    pub recovery_factor: f64,
    /// Largest peak-to-trough decline, in account currency.
    pub max_drawdown: f64,
    /// Largest decline as a percent of the peak it fell from.
    pub max_drawdown_pct: f64,
    /// Percent, annualized by the 252-period convention.
    pub annualized_return: f64,
}

/// Granularity for [`period_breakdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    Week,
    Month,
}

/// Per-period P&L slice of a trade sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodStats {
    pub period: String,
    pub pnl: f64,
    pub trades: usize,
    /// Percent, 0..=100.
    pub win_rate: f64,
}

/// Build the equity curve. The first point is the starting equity at
/// `start_ts`; every trade appends one point.
pub fn equity_curve(
    start_ts: DateTime<Utc>,
    starting_equity: f64,
    points: &[TradePoint],
) -> Vec<EquityPoint> {
    let mut curve = Vec::with_capacity(points.len() + 1);
    let mut equity = starting_equity;
    let mut peak = starting_equity;

    curve.push(EquityPoint {
        ts: start_ts,
        equity,
        drawdown: 0.0,
        peak,
    });

    for p in points {
        equity += p.pnl;
        if equity > peak {
            peak = equity;
        }
        curve.push(EquityPoint {
            ts: p.ts,
            equity,
            drawdown: peak - equity,
            peak,
        });
    }

    curve
}

/// Compute the full metrics block for an ordered trade sequence.
pub fn compute_metrics(points: &[TradePoint], starting_equity: f64) -> PerformanceMetrics {
    if points.is_empty() || starting_equity <= 0.0 {
        return PerformanceMetrics::default();
    }

    let total_trades = points.len();
    let wins_vec: Vec<f64> = points.iter().map(|p| p.pnl).filter(|&p| p > 0.0).collect();
    let losses_vec: Vec<f64> = points.iter().map(|p| p.pnl).filter(|&p| p < 0.0).collect();
    let wins = wins_vec.len();
    let losses = losses_vec.len();

    let gross_wins: f64 = wins_vec.iter().sum();
    let gross_losses: f64 = losses_vec.iter().sum();
    let total_pnl: f64 = points.iter().map(|p| p.pnl).sum();

    let win_rate = wins as f64 / total_trades as f64 * 100.0;
    let avg_win = if wins > 0 { gross_wins / wins as f64 } else { 0.0 };
    let avg_loss = if losses > 0 {
        gross_losses / losses as f64
    } else {
        0.0
    };

    let p_win = wins as f64 / total_trades as f64;
    let p_loss = losses as f64 / total_trades as f64;
    let expectancy = p_win * avg_win + p_loss * avg_loss;

    let profit_factor = if gross_losses.abs() > 0.0 {
        gross_wins / gross_losses.abs()
    } else if gross_wins > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    // Per-trade returns against starting equity, annualized on the
    // 252-period convention.
    let returns: Vec<f64> = points.iter().map(|p| p.pnl / starting_equity).collect();
    let mean_return = returns.iter().sum::<f64>() / returns.len() as f64;
    let sharpe = sharpe_ratio(&returns, mean_return);
    let sortino = sortino_ratio(&returns, mean_return);

    let annualized_return = mean_return * PERIODS_PER_YEAR * 100.0;

    let (max_drawdown, max_drawdown_pct) = max_drawdown_of(points, starting_equity);

    let calmar = if max_drawdown_pct > 0.0 {
        annualized_return / max_drawdown_pct
    } else if annualized_return > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    let recovery_factor = if max_drawdown > 0.0 {
        total_pnl.abs() / max_drawdown
    } else {
        0.0
    };

    PerformanceMetrics {
        total_trades,
        wins,
        losses,
        win_rate: round2(win_rate),
        total_pnl: round2(total_pnl),
        avg_win: round2(avg_win),
        avg_loss: round2(avg_loss),
        expectancy: round2(expectancy),
        profit_factor: round2(profit_factor),
        sharpe: round2(sharpe),
        sortino: round2(sortino),
        calmar: round2(calmar),
        recovery_factor: round2(recovery_factor),
        max_drawdown: round2(max_drawdown),
        max_drawdown_pct: round2(max_drawdown_pct),
        annualized_return: round2(annualized_return),
    }
}

/// Group trades by day/week/month key, chronologically sorted.
pub fn period_breakdown(points: &[TradePoint], period: Period) -> Vec<PeriodStats> {
    use std::collections::BTreeMap;

    let mut buckets: BTreeMap<String, (f64, usize, usize)> = BTreeMap::new();
    for p in points {
        let key = match period {
            Period::Day => p.ts.format("%Y-%m-%d").to_string(),
            // ISO week year so the key sorts chronologically across year ends
            Period::Week => format!("{}-W{:02}", p.ts.iso_week().year(), p.ts.iso_week().week()),
            Period::Month => p.ts.format("%Y-%m").to_string(),
        };
        let entry = buckets.entry(key).or_insert((0.0, 0, 0));
        entry.0 += p.pnl;
        entry.1 += 1;
        if p.pnl > 0.0 {
            entry.2 += 1;
        }
    }

    buckets
        .into_iter()
        .map(|(period, (pnl, trades, wins))| PeriodStats {
            period,
            pnl: round2(pnl),
            trades,
            win_rate: round2(wins as f64 / trades as f64 * 100.0),
        })
        .collect()
}

/// Annualized Sharpe over per-trade returns. 0 for fewer than 2 points or
/// zero variance.
fn sharpe_ratio(returns: &[f64], mean: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    let sd = variance.sqrt();
    if sd < 1e-15 {
        return 0.0;
    }
    mean / sd * PERIODS_PER_YEAR.sqrt()
}

/// Annualized Sortino: downside deviation only. Infinity when there are no
/// losing trades and the mean return is positive.
fn sortino_ratio(returns: &[f64], mean: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let downside_sq: Vec<f64> = returns.iter().filter(|&&r| r < 0.0).map(|r| r * r).collect();
    if downside_sq.is_empty() {
        return if mean > 0.0 { f64::INFINITY } else { 0.0 };
    }
    let downside = (downside_sq.iter().sum::<f64>() / returns.len() as f64).sqrt();
    if downside < 1e-15 {
        return 0.0;
    }
    mean / downside * PERIODS_PER_YEAR.sqrt()
}

/// Max drawdown in absolute terms and as a percent of the peak.
fn max_drawdown_of(points: &[TradePoint], starting_equity: f64) -> (f64, f64) {
    let mut equity = starting_equity;
    let mut peak = starting_equity;
    let mut max_abs = 0.0_f64;
    let mut max_pct = 0.0_f64;

    for p in points {
        equity += p.pnl;
        if equity > peak {
            peak = equity;
        }
        let dd = peak - equity;
        if dd > max_abs {
            max_abs = dd;
        }
        if peak > 0.0 {
            let pct = dd / peak * 100.0;
            if pct > max_pct {
                max_pct = pct;
            }
        }
    }

    (max_abs, max_pct)
}

fn round2(v: f64) -> f64 {
    if v.is_finite() {
        (v * 100.0).round() / 100.0
    } else {
        v
    }
}
