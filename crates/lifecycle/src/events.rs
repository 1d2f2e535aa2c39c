//! Best-effort lifecycle event emission.
//!
//! Every durable write in the store publishes one event to a bounded channel.
//! Publication is fire-and-forget: a full or closed channel is logged and
//! dropped, and must never fail or roll back the write that triggered it.
//! A consumer task drains the channel independently.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Version tag stamped on published events so consumers can detect rule
/// changes across deployments.
pub const RULES_VERSION: &str = "v1";

/// One lifecycle transition of a signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Published {
        signal_id: String,
        symbol: String,
        confluence_score: f64,
        rr: f64,
        scenarios: Vec<String>,
        expiry_minutes: i64,
        rules_version: String,
    },
    Triggered {
        signal_id: String,
        symbol: String,
        entry_fill: f64,
        time_to_trigger_ms: i64,
    },
    Closed {
        signal_id: String,
        symbol: String,
        rr_realized: f64,
        time_in_trade_ms: i64,
        exit_reason: String,
    },
    Invalidated {
        signal_id: String,
        symbol: String,
        reason: String,
    },
}

impl LifecycleEvent {
    pub fn signal_id(&self) -> &str {
        match self {
            LifecycleEvent::Published { signal_id, .. }
            | LifecycleEvent::Triggered { signal_id, .. }
            | LifecycleEvent::Closed { signal_id, .. }
            | LifecycleEvent::Invalidated { signal_id, .. } => signal_id,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::Published { .. } => "published",
            LifecycleEvent::Triggered { .. } => "triggered",
            LifecycleEvent::Closed { .. } => "closed",
            LifecycleEvent::Invalidated { .. } => "invalidated",
        }
    }
}

/// Cloneable publishing handle held by the store.
#[derive(Clone)]
pub struct EventPublisher {
    tx: mpsc::Sender<LifecycleEvent>,
}

impl EventPublisher {
    /// Build a publisher and the receiving end for a consumer task.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<LifecycleEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Publish without blocking. Failures are logged and dropped.
    pub fn publish(&self, event: LifecycleEvent) {
        if let Err(e) = self.tx.try_send(event) {
            warn!(error = %e, "lifecycle event dropped");
        }
    }
}

/// Drain lifecycle events and log them. Stands in for the external
/// observability collaborator; call from `tokio::spawn`.
pub async fn run_event_logger(mut rx: mpsc::Receiver<LifecycleEvent>) {
    while let Some(event) = rx.recv().await {
        info!(
            kind = event.kind(),
            signal_id = event.signal_id(),
            payload = %serde_json::to_string(&event).unwrap_or_default(),
            "lifecycle event"
        );
    }
    warn!("lifecycle event channel closed");
}
