use crate::hub::{BroadcastEvent, EventHub};
use crate::watch::WatchRegistry;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use dispatch_core::backend::HttpBackend;
use dispatch_core::maps::MapsService;
use dispatch_core::oplog::{CoordinationLog, OpEvent};
use futures::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;

pub type HttpRegistry = WatchRegistry<HttpBackend, MapsService, MapsService>;

#[derive(Clone)]
pub struct ConsoleState {
    pub registry: Arc<HttpRegistry>,
    pub hub: EventHub,
    pub log: CoordinationLog,
}

pub fn console_router(state: ConsoleState) -> Router {
    Router::new()
        .route("/watch/:incident_id", post(start_watch).delete(stop_watch))
        .route("/incidents/:incident_id/events", get(incident_events))
        .route("/incidents/:incident_id/timeline", get(incident_timeline))
        .with_state(state)
}

async fn start_watch(
    State(state): State<ConsoleState>,
    Path(incident_id): Path<String>,
) -> StatusCode {
    if state.registry.start(&incident_id) {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    }
}

async fn stop_watch(
    State(state): State<ConsoleState>,
    Path(incident_id): Path<String>,
) -> StatusCode {
    if state.registry.stop(&incident_id) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn incident_timeline(
    State(state): State<ConsoleState>,
    Path(incident_id): Path<String>,
) -> Result<Json<Vec<OpEvent>>, (StatusCode, String)> {
    state
        .log
        .timeline(&incident_id)
        .map(Json)
        .map_err(|err| (StatusCode::INTERNAL_SERVER_ERROR, err))
}

/// Live coordination events for one incident, as they are emitted. Consoles
/// subscribe here instead of polling the backend themselves.
async fn incident_events(
    State(state): State<ConsoleState>,
    Path(incident_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.hub.subscribe();
    let stream = futures::stream::unfold((rx, incident_id), |(mut rx, incident_id)| async move {
        loop {
            match rx.recv().await {
                Ok(broadcast_event) => {
                    if !is_for_incident(&broadcast_event, &incident_id) {
                        continue;
                    }
                    let Ok(event) = Event::default()
                        .event(broadcast_event.event)
                        .json_data(&broadcast_event.payload)
                    else {
                        continue;
                    };
                    return Some((Ok(event), (rx, incident_id)));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "sse subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn is_for_incident(event: &BroadcastEvent, incident_id: &str) -> bool {
    event
        .payload
        .get("incidentId")
        .and_then(serde_json::Value::as_str)
        == Some(incident_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_filter_matches_on_payload_incident_id() {
        let event = BroadcastEvent {
            event: "route-updated".into(),
            payload: serde_json::json!({"incidentId": "inc-1"}),
        };
        assert!(is_for_incident(&event, "inc-1"));
        assert!(!is_for_incident(&event, "inc-2"));

        let missing = BroadcastEvent {
            event: "route-updated".into(),
            payload: serde_json::json!({}),
        };
        assert!(!is_for_incident(&missing, "inc-1"));
    }
}
