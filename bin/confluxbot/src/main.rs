use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use clap::Parser;
use sqlx::SqlitePool;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use common::{Candle, Config, DecisionEngine, ExecutionRecord, OutcomeRecord, SignalRecord};
use engine::{period_breakdown, run_backtest, BacktestRequest, BacktestResult, Period, TradeRecord};
use lifecycle::{run_event_logger, EventPublisher, SignalStore};
use strategy::indicators::atr;
use strategy::{generate_levels, ConfluenceFileConfig, ConfluenceScorer};

/// Replay the confluence scorer over historical candles and report
/// risk-adjusted performance.
#[derive(Debug, Parser)]
#[command(name = "confluxbot", version)]
struct Args {
    /// CSV file with time,open,high,low,close,volume rows (oldest first).
    candles: PathBuf,

    #[arg(long, default_value = "BTCUSDT")]
    symbol: String,

    #[arg(long, default_value = "1h")]
    timeframe: String,

    /// Per-side fee rate, e.g. 0.0004.
    #[arg(long, default_value_t = 0.0004)]
    fee_rate: f64,

    #[arg(long, default_value_t = 5.0)]
    slip_bps: f64,

    #[arg(long, default_value_t = 2.0)]
    spread_bps: f64,

    #[arg(long, env = "STARTING_EQUITY", default_value_t = 10_000.0)]
    equity: f64,

    /// Percent of equity risked per trade.
    #[arg(long, default_value_t = 1.0)]
    risk_pct: f64,

    #[arg(long, default_value_t = 500)]
    max_trades: usize,

    /// Persist signals/executions/outcomes to the lifecycle store.
    #[arg(long)]
    persist: bool,

    /// Also print a per-period P&L breakdown.
    #[arg(long, value_enum)]
    breakdown: Option<BreakdownArg>,

    /// Write the full result (trades + curve) as JSON to this path.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum BreakdownArg {
    Day,
    Week,
    Month,
}

impl From<BreakdownArg> for Period {
    fn from(value: BreakdownArg) -> Self {
        match value {
            BreakdownArg::Day => Period::Day,
            BreakdownArg::Week => Period::Week,
            BreakdownArg::Month => Period::Month,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let args = Args::parse();
    let cfg = Config::from_env();

    // ── Candles ───────────────────────────────────────────────────────────────
    let candles = load_candles(&args.candles)
        .with_context(|| format!("loading candles from {}", args.candles.display()))?;
    info!(candles = candles.len(), symbol = %args.symbol, "candles loaded");

    // ── Scorer ────────────────────────────────────────────────────────────────
    let layers_cfg = ConfluenceFileConfig::load_or_default(&cfg.layers_config_path);
    let scorer = ConfluenceScorer::new(layers_cfg);

    // ── Backtest ──────────────────────────────────────────────────────────────
    let mut request = BacktestRequest::new(args.symbol.as_str(), args.timeframe.as_str(), candles);
    request.cost.fee_rate = args.fee_rate;
    request.cost.slip_bps = args.slip_bps;
    request.cost.spread_bps = args.spread_bps;
    request.risk.equity = args.equity;
    request.risk.risk_pct = args.risk_pct;
    request.warmup = cfg.warmup_candles;
    request.max_trades = args.max_trades;

    let result = run_backtest(&request, &scorer)?;

    println!("{}", serde_json::to_string_pretty(&result.summary)?);
    println!("{}", serde_json::to_string_pretty(&result.stats)?);

    // What would the scorer publish right now? Evaluate the most recent
    // window and attach the standard level profile.
    let tail = &request.candles[request.candles.len() - request.warmup..];
    let latest = scorer.evaluate(tail);
    let last_close = tail[tail.len() - 1].close;
    let last_atr = atr(tail, 14).last().copied();
    let levels = generate_levels(last_close, latest.label, last_atr);
    info!(
        label = %latest.label,
        summary = %latest.summary,
        entry = levels.entry,
        stop = levels.stop_loss,
        tp1 = levels.take_profits[0],
        rr = levels.risk_reward,
        "latest evaluation"
    );

    if let Some(breakdown) = args.breakdown {
        let points: Vec<engine::TradePoint> = result
            .trades
            .iter()
            .map(|t| engine::TradePoint {
                ts: t.exit_ts,
                pnl: t.pnl,
            })
            .collect();
        let stats = period_breakdown(&points, breakdown.into());
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }

    if let Some(path) = &args.out {
        std::fs::write(path, serde_json::to_vec_pretty(&result)?)
            .with_context(|| format!("writing result to {}", path.display()))?;
        info!(path = %path.display(), "full result written");
    }

    if args.persist {
        // Persistence failures degrade gracefully: the backtest result has
        // already been reported either way.
        if let Err(e) = persist_run(&cfg, &args, &request, &result).await {
            error!(error = %e, "lifecycle persistence failed");
        }
    }

    Ok(())
}

/// Write every simulated trade through the three-stage lifecycle store and
/// refresh the aggregate snapshot.
async fn persist_run(
    cfg: &Config,
    args: &Args,
    request: &BacktestRequest,
    result: &BacktestResult,
) -> Result<()> {
    let db = SqlitePool::connect(&cfg.database_url)
        .await
        .with_context(|| format!("connecting to {}", cfg.database_url))?;
    sqlx::migrate!("../../migrations")
        .run(&db)
        .await
        .context("running database migrations")?;

    let (publisher, rx) = EventPublisher::channel(1024);
    let logger = tokio::spawn(run_event_logger(rx));
    let store = SignalStore::new(db, publisher);

    for trade in &result.trades {
        if let Err(e) = persist_trade(&store, args, request, trade).await {
            error!(error = %e, signal_ts = %trade.signal_ts, "failed to persist trade");
        }
    }

    store.purge_older_than(cfg.signal_retention_days).await?;
    let stats = store.window_stats(30).await?;
    store.snapshot_performance(30, &stats).await?;
    info!(
        signals = stats.total_signals,
        closed = stats.closed,
        win_rate = stats.win_rate,
        "lifecycle store updated"
    );

    drop(store);
    let _ = logger.await;
    Ok(())
}

async fn persist_trade(
    store: &SignalStore,
    args: &Args,
    request: &BacktestRequest,
    trade: &TradeRecord,
) -> Result<()> {
    let signal_id = Uuid::new_v4().to_string();
    let signal = SignalRecord {
        id: signal_id.clone(),
        ts: trade.signal_ts,
        symbol: args.symbol.clone(),
        label: trade.decision.label,
        score: trade.decision.score,
        confidence: trade.decision.confidence,
        timeframe: args.timeframe.clone(),
        regime: trade.decision.regime.clone(),
        htf_bias: trade.decision.regime.clone(),
        mtf_aligned: None,
        summary: Some(trade.decision.summary.clone()),
    };
    let scenarios = vec![
        format!("tp1@{:.2}", trade.target),
        format!("tp2@{:.2}", trade.target2),
    ];
    let inserted = store
        .insert_signal(&signal, request.risk.tp1_rr, scenarios)
        .await?;
    if !inserted {
        // Natural-key duplicate from an earlier run; the chain already exists.
        return Ok(());
    }

    let execution = ExecutionRecord {
        signal_id: signal_id.clone(),
        side: trade.side,
        entry: trade.entry,
        sl: Some(trade.stop),
        tp1: Some(trade.target),
        tp2: Some(trade.target2),
        qty: Some(trade.qty),
        fees: Some(trade.cost - spread_cost(request, trade)),
        slip: Some(trade.slip_cost),
        spread: Some(spread_cost(request, trade)),
        risk_amount: Some(request.risk.equity * request.risk.risk_pct / 100.0),
    };
    let time_to_trigger_ms = (trade.entry_ts - trade.signal_ts).num_milliseconds();
    store.insert_execution(&execution, time_to_trigger_ms).await?;

    let outcome = OutcomeRecord {
        signal_id,
        exit_ts: trade.exit_ts,
        exit_price: trade.exit,
        pnl: trade.pnl,
        pnl_pct: Some(trade.pnl / request.risk.equity * 100.0),
        rr: trade.rr,
        reason: trade.reason,
        duration_mins: Some((trade.exit_ts - trade.entry_ts).num_minutes()),
    };
    store.insert_outcome(&outcome).await?;
    Ok(())
}

fn spread_cost(request: &BacktestRequest, trade: &TradeRecord) -> f64 {
    request.cost.spread_bps / 10_000.0 * trade.entry * trade.qty
}

/// Load candles from a CSV with `time,open,high,low,close,volume` columns.
/// `time` may be unix seconds, unix milliseconds or RFC 3339.
fn load_candles(path: &PathBuf) -> Result<Vec<Candle>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut candles = Vec::new();

    for record in reader.deserialize() {
        let row: CsvCandle = record?;
        candles.push(Candle {
            time: parse_time(&row.time)?,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }

    Ok(candles)
}

#[derive(Debug, serde::Deserialize)]
struct CsvCandle {
    time: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(unix) = raw.parse::<i64>() {
        // Heuristic: anything above 1e10 would be year 2286 as seconds,
        // so treat it as milliseconds.
        let (secs, millis) = if unix > 10_000_000_000 {
            (unix / 1000, (unix % 1000) as u32)
        } else {
            (unix, 0)
        };
        return Utc
            .timestamp_opt(secs, millis * 1_000_000)
            .single()
            .with_context(|| format!("unix timestamp out of range: {raw}"));
    }
    Ok(raw.parse::<DateTime<Utc>>()?)
}
