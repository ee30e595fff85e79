use dispatch_core::oplog::{CoordinationLog, OpEvent, OpKind};
use dispatch_core::sink::OpsSink;
use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Clone, Debug, Serialize)]
pub struct BroadcastEvent {
    pub event: String,
    pub payload: serde_json::Value,
}

/// Fan-out point for coordination events: every emission is appended to the
/// audit log and pushed to all SSE subscribers.
#[derive(Clone)]
pub struct EventHub {
    log: CoordinationLog,
    tx: broadcast::Sender<BroadcastEvent>,
}

impl EventHub {
    pub fn new(log: CoordinationLog) -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { log, tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tx.subscribe()
    }

    pub fn log(&self) -> &CoordinationLog {
        &self.log
    }
}

impl OpsSink for EventHub {
    fn emit_json(&self, event: &str, payload: serde_json::Value) {
        if let Some(kind) = OpKind::from_event(event) {
            let incident_id = payload
                .get("incidentId")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            let record = OpEvent {
                id: None,
                incident_id,
                kind,
                payload: Some(payload.clone()),
                recorded_at: chrono::Utc::now(),
            };
            if let Err(err) = self.log.append(&record) {
                tracing::warn!(event, error = %err, "coordination log append failed");
            }
        } else {
            tracing::debug!(event, "unlogged event kind");
        }

        let _ = self.tx.send(BroadcastEvent {
            event: event.to_string(),
            payload,
        });
    }
}
