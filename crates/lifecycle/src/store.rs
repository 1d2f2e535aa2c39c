//! Durable signal lifecycle store.
//!
//! Three append-mostly tables: a signal is inserted once (idempotent on its
//! natural key), gains at most one execution and at most one outcome. Each
//! durable write publishes a lifecycle event after the fact; event emission
//! is decoupled from the write and can never fail it.

use chrono::{Duration, Utc};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use common::{ExecutionRecord, Label, OutcomeRecord, Result, SignalRecord};

use crate::events::{EventPublisher, LifecycleEvent, RULES_VERSION};

/// Default signal expiry advertised on published events.
const DEFAULT_EXPIRY_MINUTES: i64 = 240;

/// A signal joined with whatever lifecycle stages exist for it.
#[derive(Debug, Clone)]
pub struct SignalChain {
    pub signal: SignalRecord,
    pub execution: Option<ExecutionRecord>,
    pub outcome: Option<OutcomeRecord>,
}

/// Aggregate statistics over a trailing window of signals.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowStats {
    pub total_signals: i64,
    pub closed: i64,
    pub wins: i64,
    pub losses: i64,
    /// Percent, 0..=100.
    pub win_rate: f64,
    pub total_pnl: f64,
    pub avg_rr: f64,
}

pub struct SignalStore {
    db: SqlitePool,
    events: EventPublisher,
    signal_expiry_minutes: i64,
}

impl SignalStore {
    pub fn new(db: SqlitePool, events: EventPublisher) -> Self {
        Self {
            db,
            events,
            signal_expiry_minutes: DEFAULT_EXPIRY_MINUTES,
        }
    }

    pub fn with_expiry_minutes(mut self, minutes: i64) -> Self {
        self.signal_expiry_minutes = minutes;
        self
    }

    /// Insert a signal. Duplicate `(ts, symbol, timeframe)` inserts are
    /// no-ops and emit no event. Returns whether a new row was written.
    pub async fn insert_signal(
        &self,
        sig: &SignalRecord,
        rr: f64,
        scenarios: Vec<String>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO signals
                (id, ts, symbol, label, score, confidence, timeframe,
                 regime, htf_bias, mtf_aligned, summary)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT (ts, symbol, timeframe) DO NOTHING
            "#,
        )
        .bind(&sig.id)
        .bind(sig.ts)
        .bind(&sig.symbol)
        .bind(sig.label)
        .bind(sig.score)
        .bind(sig.confidence)
        .bind(&sig.timeframe)
        .bind(&sig.regime)
        .bind(&sig.htf_bias)
        .bind(sig.mtf_aligned)
        .bind(&sig.summary)
        .execute(&self.db)
        .await?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            self.events.publish(LifecycleEvent::Published {
                signal_id: sig.id.clone(),
                symbol: sig.symbol.clone(),
                confluence_score: sig.score,
                rr,
                scenarios,
                expiry_minutes: self.signal_expiry_minutes,
                rules_version: RULES_VERSION.to_string(),
            });
        } else {
            debug!(signal_id = %sig.id, "duplicate signal insert ignored");
        }
        Ok(inserted)
    }

    /// Insert the (single) execution for a signal. A second insert for the
    /// same signal is a no-op. Returns whether a new row was written.
    pub async fn insert_execution(
        &self,
        exec: &ExecutionRecord,
        time_to_trigger_ms: i64,
    ) -> Result<bool> {
        let symbol = self.signal_symbol(&exec.signal_id).await?;

        let result = sqlx::query(
            r#"
            INSERT INTO executions
                (id, signal_id, side, entry, sl, tp1, tp2, qty, fees, slip,
                 spread, risk_amount)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT (signal_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&exec.signal_id)
        .bind(exec.side)
        .bind(exec.entry)
        .bind(exec.sl)
        .bind(exec.tp1)
        .bind(exec.tp2)
        .bind(exec.qty)
        .bind(exec.fees)
        .bind(exec.slip)
        .bind(exec.spread)
        .bind(exec.risk_amount)
        .execute(&self.db)
        .await?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            self.events.publish(LifecycleEvent::Triggered {
                signal_id: exec.signal_id.clone(),
                symbol,
                entry_fill: exec.entry,
                time_to_trigger_ms,
            });
        }
        Ok(inserted)
    }

    /// Insert the (single) outcome for a signal. Emits `closed` when the
    /// signal had an execution, `invalidated` when it resolved without ever
    /// triggering. Returns whether a new row was written.
    pub async fn insert_outcome(&self, out: &OutcomeRecord) -> Result<bool> {
        let symbol = self.signal_symbol(&out.signal_id).await?;
        let had_execution = self.execution(&out.signal_id).await?.is_some();

        let result = sqlx::query(
            r#"
            INSERT INTO outcomes
                (id, signal_id, exit_ts, exit_price, pnl, pnl_pct, rr,
                 reason, duration_mins)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT (signal_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&out.signal_id)
        .bind(out.exit_ts)
        .bind(out.exit_price)
        .bind(out.pnl)
        .bind(out.pnl_pct)
        .bind(out.rr)
        .bind(out.reason)
        .bind(out.duration_mins)
        .execute(&self.db)
        .await?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            let event = if had_execution {
                LifecycleEvent::Closed {
                    signal_id: out.signal_id.clone(),
                    symbol,
                    rr_realized: out.rr,
                    time_in_trade_ms: out.duration_mins.unwrap_or(0) * 60_000,
                    exit_reason: out.reason.to_string(),
                }
            } else {
                LifecycleEvent::Invalidated {
                    signal_id: out.signal_id.clone(),
                    symbol,
                    reason: out.reason.to_string(),
                }
            };
            self.events.publish(event);
        }
        Ok(inserted)
    }

    /// Fetch one signal with its execution and outcome, if present.
    pub async fn signal_chain(&self, signal_id: &str) -> Result<Option<SignalChain>> {
        let signal = sqlx::query_as::<_, SignalRecord>(
            "SELECT id, ts, symbol, label, score, confidence, timeframe, \
             regime, htf_bias, mtf_aligned, summary FROM signals WHERE id = ?1",
        )
        .bind(signal_id)
        .fetch_optional(&self.db)
        .await?;

        let Some(signal) = signal else {
            return Ok(None);
        };
        let execution = self.execution(signal_id).await?;
        let outcome = self.outcome(signal_id).await?;
        Ok(Some(SignalChain {
            signal,
            execution,
            outcome,
        }))
    }

    /// Most recent signals (joined), newest first.
    pub async fn recent_chains(&self, limit: i64) -> Result<Vec<SignalChain>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM signals ORDER BY ts DESC LIMIT ?1")
                .bind(limit)
                .fetch_all(&self.db)
                .await?;

        let mut chains = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(chain) = self.signal_chain(&id).await? {
                chains.push(chain);
            }
        }
        Ok(chains)
    }

    /// Signals with an execution but no outcome yet, HOLD excluded.
    pub async fn open_positions(&self) -> Result<Vec<SignalChain>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT s.id
            FROM signals s
            JOIN executions e ON e.signal_id = s.id
            LEFT JOIN outcomes o ON o.signal_id = s.id
            WHERE o.id IS NULL AND s.label != ?1
            ORDER BY s.ts
            "#,
        )
        .bind(Label::Hold)
        .fetch_all(&self.db)
        .await?;

        let mut chains = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(chain) = self.signal_chain(&id).await? {
                chains.push(chain);
            }
        }
        Ok(chains)
    }

    /// Aggregate statistics over signals from the trailing `days`.
    pub async fn window_stats(&self, days: i64) -> Result<WindowStats> {
        let cutoff = Utc::now() - Duration::days(days);

        let total_signals: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM signals WHERE ts >= ?1")
                .bind(cutoff)
                .fetch_one(&self.db)
                .await?;

        let row = sqlx::query(
            r#"
            SELECT COUNT(*)                                        AS closed,
                   COALESCE(SUM(CASE WHEN o.pnl > 0 THEN 1 ELSE 0 END), 0) AS wins,
                   COALESCE(SUM(CASE WHEN o.pnl < 0 THEN 1 ELSE 0 END), 0) AS losses,
                   COALESCE(SUM(o.pnl), 0.0)                       AS total_pnl,
                   COALESCE(AVG(o.rr), 0.0)                        AS avg_rr
            FROM outcomes o
            JOIN signals s ON s.id = o.signal_id
            WHERE s.ts >= ?1
            "#,
        )
        .bind(cutoff)
        .fetch_one(&self.db)
        .await?;

        let closed: i64 = row.get("closed");
        let wins: i64 = row.get("wins");
        let losses: i64 = row.get("losses");
        let win_rate = if closed > 0 {
            wins as f64 / closed as f64 * 100.0
        } else {
            0.0
        };

        Ok(WindowStats {
            total_signals,
            closed,
            wins,
            losses,
            win_rate,
            total_pnl: row.get("total_pnl"),
            avg_rr: row.get("avg_rr"),
        })
    }

    /// Persist an aggregate row for historical comparison.
    pub async fn snapshot_performance(&self, window_days: i64, stats: &WindowStats) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO performance_snapshots
                (id, ts, window_days, total_signals, closed, wins, losses,
                 win_rate, total_pnl, avg_rr)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(Utc::now())
        .bind(window_days)
        .bind(stats.total_signals)
        .bind(stats.closed)
        .bind(stats.wins)
        .bind(stats.losses)
        .bind(stats.win_rate)
        .bind(stats.total_pnl)
        .bind(stats.avg_rr)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Delete signals older than `days`, cascading to their executions and
    /// outcomes. Returns the number of purged signals.
    pub async fn purge_older_than(&self, days: i64) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(days);

        let mut tx = self.db.begin().await?;
        sqlx::query(
            "DELETE FROM outcomes WHERE signal_id IN (SELECT id FROM signals WHERE ts < ?1)",
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM executions WHERE signal_id IN (SELECT id FROM signals WHERE ts < ?1)",
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;
        let purged = sqlx::query("DELETE FROM signals WHERE ts < ?1")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;

        if purged > 0 {
            info!(purged, days, "retention cleanup removed old signals");
        }
        Ok(purged)
    }

    async fn signal_symbol(&self, signal_id: &str) -> Result<String> {
        let symbol: Option<String> =
            sqlx::query_scalar("SELECT symbol FROM signals WHERE id = ?1")
                .bind(signal_id)
                .fetch_optional(&self.db)
                .await?;
        symbol.ok_or_else(|| {
            common::Error::Other(format!("record references unknown signal '{signal_id}'"))
        })
    }

    async fn execution(&self, signal_id: &str) -> Result<Option<ExecutionRecord>> {
        Ok(sqlx::query_as::<_, ExecutionRecord>(
            "SELECT signal_id, side, entry, sl, tp1, tp2, qty, fees, slip, \
             spread, risk_amount FROM executions WHERE signal_id = ?1",
        )
        .bind(signal_id)
        .fetch_optional(&self.db)
        .await?)
    }

    async fn outcome(&self, signal_id: &str) -> Result<Option<OutcomeRecord>> {
        Ok(sqlx::query_as::<_, OutcomeRecord>(
            "SELECT signal_id, exit_ts, exit_price, pnl, pnl_pct, rr, reason, \
             duration_mins FROM outcomes WHERE signal_id = ?1",
        )
        .bind(signal_id)
        .fetch_optional(&self.db)
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{ExitReason, Side};
    use sqlx::sqlite::SqlitePoolOptions;
    use tokio::sync::mpsc;

    async fn mem_store() -> (SignalStore, mpsc::Receiver<LifecycleEvent>) {
        // A single connection keeps the in-memory database alive and shared.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .expect("migrations");
        let (publisher, rx) = EventPublisher::channel(64);
        (SignalStore::new(pool, publisher), rx)
    }

    fn make_signal(id: &str, symbol: &str) -> SignalRecord {
        SignalRecord {
            id: id.into(),
            ts: Utc::now(),
            symbol: symbol.into(),
            label: Label::Buy,
            score: 40.0,
            confidence: Some(0.7),
            timeframe: "1h".into(),
            regime: Some("bullish".into()),
            htf_bias: None,
            mtf_aligned: None,
            summary: Some("test signal".into()),
        }
    }

    fn make_execution(signal_id: &str) -> ExecutionRecord {
        ExecutionRecord {
            signal_id: signal_id.into(),
            side: Side::Long,
            entry: 100.0,
            sl: Some(97.0),
            tp1: Some(106.0),
            tp2: Some(109.0),
            qty: Some(0.5),
            fees: Some(0.08),
            slip: Some(0.05),
            spread: Some(0.02),
            risk_amount: Some(100.0),
        }
    }

    fn make_outcome(signal_id: &str, pnl: f64) -> OutcomeRecord {
        OutcomeRecord {
            signal_id: signal_id.into(),
            exit_ts: Utc::now(),
            exit_price: 106.0,
            pnl,
            pnl_pct: Some(pnl / 100.0),
            rr: if pnl >= 0.0 { 2.0 } else { -1.0 },
            reason: if pnl >= 0.0 {
                ExitReason::TakeProfit
            } else {
                ExitReason::StopLoss
            },
            duration_mins: Some(90),
        }
    }

    async fn signal_count(store: &SignalStore) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM signals")
            .fetch_one(&store.db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn duplicate_signal_insert_is_noop() {
        let (store, mut rx) = mem_store().await;
        let sig = make_signal("s1", "BTCUSDT");

        assert!(store.insert_signal(&sig, 1.33, vec![]).await.unwrap());

        // Same natural key, different id
        let mut dup = make_signal("s2", "BTCUSDT");
        dup.ts = sig.ts;
        assert!(!store.insert_signal(&dup, 1.33, vec![]).await.unwrap());

        assert_eq!(signal_count(&store).await, 1);

        // Exactly one published event
        assert!(matches!(
            rx.try_recv().unwrap(),
            LifecycleEvent::Published { .. }
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn at_most_one_execution_per_signal() {
        let (store, mut rx) = mem_store().await;
        store
            .insert_signal(&make_signal("s1", "BTCUSDT"), 1.0, vec![])
            .await
            .unwrap();
        let _ = rx.try_recv();

        assert!(store
            .insert_execution(&make_execution("s1"), 500)
            .await
            .unwrap());
        assert!(!store
            .insert_execution(&make_execution("s1"), 700)
            .await
            .unwrap());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM executions")
            .fetch_one(&store.db)
            .await
            .unwrap();
        assert_eq!(count, 1);

        assert!(matches!(
            rx.try_recv().unwrap(),
            LifecycleEvent::Triggered { .. }
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn at_most_one_outcome_per_signal() {
        let (store, _rx) = mem_store().await;
        store
            .insert_signal(&make_signal("s1", "BTCUSDT"), 1.0, vec![])
            .await
            .unwrap();
        store
            .insert_execution(&make_execution("s1"), 500)
            .await
            .unwrap();

        assert!(store.insert_outcome(&make_outcome("s1", 50.0)).await.unwrap());
        assert!(!store.insert_outcome(&make_outcome("s1", -20.0)).await.unwrap());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outcomes")
            .fetch_one(&store.db)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn outcome_after_execution_emits_closed() {
        let (store, mut rx) = mem_store().await;
        store
            .insert_signal(&make_signal("s1", "BTCUSDT"), 1.0, vec![])
            .await
            .unwrap();
        store
            .insert_execution(&make_execution("s1"), 500)
            .await
            .unwrap();
        store.insert_outcome(&make_outcome("s1", 50.0)).await.unwrap();

        let _ = rx.try_recv(); // published
        let _ = rx.try_recv(); // triggered
        match rx.try_recv().unwrap() {
            LifecycleEvent::Closed {
                rr_realized,
                exit_reason,
                ..
            } => {
                assert_eq!(rr_realized, 2.0);
                assert_eq!(exit_reason, "take_profit");
            }
            other => panic!("expected closed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn outcome_without_execution_emits_invalidated() {
        let (store, mut rx) = mem_store().await;
        store
            .insert_signal(&make_signal("s1", "BTCUSDT"), 1.0, vec![])
            .await
            .unwrap();
        store.insert_outcome(&make_outcome("s1", 0.0)).await.unwrap();

        let _ = rx.try_recv(); // published
        assert!(matches!(
            rx.try_recv().unwrap(),
            LifecycleEvent::Invalidated { .. }
        ));
    }

    #[tokio::test]
    async fn execution_for_unknown_signal_fails() {
        let (store, _rx) = mem_store().await;
        let err = store
            .insert_execution(&make_execution("ghost"), 100)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown signal"));
    }

    #[tokio::test]
    async fn open_positions_excludes_closed_and_untriggered() {
        let (store, _rx) = mem_store().await;

        // s1: open (signal + execution, no outcome)
        let mut s1 = make_signal("s1", "BTCUSDT");
        s1.ts = Utc::now() - Duration::minutes(30);
        store.insert_signal(&s1, 1.0, vec![]).await.unwrap();
        store.insert_execution(&make_execution("s1"), 10).await.unwrap();

        // s2: closed
        let mut s2 = make_signal("s2", "ETHUSDT");
        s2.ts = Utc::now() - Duration::minutes(20);
        store.insert_signal(&s2, 1.0, vec![]).await.unwrap();
        store.insert_execution(&make_execution("s2"), 10).await.unwrap();
        store.insert_outcome(&make_outcome("s2", 30.0)).await.unwrap();

        // s3: signal only, never triggered
        let mut s3 = make_signal("s3", "SOLUSDT");
        s3.ts = Utc::now() - Duration::minutes(10);
        store.insert_signal(&s3, 1.0, vec![]).await.unwrap();

        let open = store.open_positions().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].signal.id, "s1");
        assert!(open[0].execution.is_some());
        assert!(open[0].outcome.is_none());
    }

    #[tokio::test]
    async fn signal_chain_joins_all_three_stages() {
        let (store, _rx) = mem_store().await;
        store
            .insert_signal(&make_signal("s1", "BTCUSDT"), 1.0, vec![])
            .await
            .unwrap();
        store.insert_execution(&make_execution("s1"), 10).await.unwrap();
        store.insert_outcome(&make_outcome("s1", 42.0)).await.unwrap();

        let chain = store.signal_chain("s1").await.unwrap().unwrap();
        assert_eq!(chain.signal.symbol, "BTCUSDT");
        assert_eq!(chain.execution.unwrap().entry, 100.0);
        assert_eq!(chain.outcome.unwrap().pnl, 42.0);

        assert!(store.signal_chain("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn window_stats_aggregates_outcomes() {
        let (store, _rx) = mem_store().await;
        for (i, pnl) in [50.0, -20.0, 30.0].iter().enumerate() {
            let mut sig = make_signal(&format!("s{i}"), "BTCUSDT");
            sig.ts = Utc::now() - Duration::hours(i as i64 + 1);
            store.insert_signal(&sig, 1.0, vec![]).await.unwrap();
            store
                .insert_execution(&make_execution(&format!("s{i}")), 10)
                .await
                .unwrap();
            store
                .insert_outcome(&make_outcome(&format!("s{i}"), *pnl))
                .await
                .unwrap();
        }

        let stats = store.window_stats(7).await.unwrap();
        assert_eq!(stats.total_signals, 3);
        assert_eq!(stats.closed, 3);
        assert_eq!(stats.wins, 2);
        assert_eq!(stats.losses, 1);
        assert!((stats.total_pnl - 60.0).abs() < 1e-9);
        assert!((stats.win_rate - 2.0 / 3.0 * 100.0).abs() < 1e-9);

        store.snapshot_performance(7, &stats).await.unwrap();
        let snapshots: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM performance_snapshots")
            .fetch_one(&store.db)
            .await
            .unwrap();
        assert_eq!(snapshots, 1);
    }

    #[tokio::test]
    async fn purge_cascades_to_executions_and_outcomes() {
        let (store, _rx) = mem_store().await;

        let mut old = make_signal("old", "BTCUSDT");
        old.ts = Utc::now() - Duration::days(90);
        store.insert_signal(&old, 1.0, vec![]).await.unwrap();
        store.insert_execution(&make_execution("old"), 10).await.unwrap();
        store.insert_outcome(&make_outcome("old", 10.0)).await.unwrap();

        let fresh = make_signal("fresh", "BTCUSDT");
        store.insert_signal(&fresh, 1.0, vec![]).await.unwrap();

        let purged = store.purge_older_than(30).await.unwrap();
        assert_eq!(purged, 1);
        assert_eq!(signal_count(&store).await, 1);

        let executions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM executions")
            .fetch_one(&store.db)
            .await
            .unwrap();
        let outcomes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outcomes")
            .fetch_one(&store.db)
            .await
            .unwrap();
        assert_eq!(executions, 0);
        assert_eq!(outcomes, 0);
    }
}
