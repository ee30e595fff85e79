use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What the console observed or surfaced for an incident. One row per
/// coordination event; the SSE catch-up path reads them incrementally.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    WatchStarted,
    WatchStopped,
    OnSceneNotice,
    NoticeDismissed,
    IncidentFinished,
    NavigateSummary,
    ResponderMoved,
    DestinationChanged,
    RouteUpdated,
    RouteCleared,
    ChannelBound,
    ChannelReleased,
    CallJoined,
    CallStepFailed,
    CallEnded,
}

impl OpKind {
    pub fn as_event(&self) -> &'static str {
        match self {
            OpKind::WatchStarted => "watch-started",
            OpKind::WatchStopped => "watch-stopped",
            OpKind::OnSceneNotice => "responder-on-scene",
            OpKind::NoticeDismissed => "notice-dismissed",
            OpKind::IncidentFinished => "incident-finished",
            OpKind::NavigateSummary => "navigate-summary",
            OpKind::ResponderMoved => "responder-moved",
            OpKind::DestinationChanged => "destination-changed",
            OpKind::RouteUpdated => "route-updated",
            OpKind::RouteCleared => "route-cleared",
            OpKind::ChannelBound => "channel-bound",
            OpKind::ChannelReleased => "channel-released",
            OpKind::CallJoined => "call-joined",
            OpKind::CallStepFailed => "call-step-failed",
            OpKind::CallEnded => "call-ended",
        }
    }

    pub fn from_event(event: &str) -> Option<OpKind> {
        [
            OpKind::WatchStarted,
            OpKind::WatchStopped,
            OpKind::OnSceneNotice,
            OpKind::NoticeDismissed,
            OpKind::IncidentFinished,
            OpKind::NavigateSummary,
            OpKind::ResponderMoved,
            OpKind::DestinationChanged,
            OpKind::RouteUpdated,
            OpKind::RouteCleared,
            OpKind::ChannelBound,
            OpKind::ChannelReleased,
            OpKind::CallJoined,
            OpKind::CallStepFailed,
            OpKind::CallEnded,
        ]
        .into_iter()
        .find(|kind| kind.as_event() == event)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OpEvent {
    pub id: Option<i64>,
    pub incident_id: String,
    pub kind: OpKind,
    pub payload: Option<serde_json::Value>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct CoordinationLog {
    db_path: Arc<PathBuf>,
}

impl CoordinationLog {
    pub fn open(path: &str) -> Result<Self, String> {
        let db_path = PathBuf::from(path);
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
            }
        }

        let conn = Connection::open(&db_path).map_err(|e| e.to_string())?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            CREATE TABLE IF NOT EXISTS ops (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                incident_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                payload TEXT,
                recorded_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_ops_incident ON ops(incident_id);
            ",
        )
        .map_err(|e| e.to_string())?;

        Ok(Self {
            db_path: Arc::new(db_path),
        })
    }

    pub fn append(&self, event: &OpEvent) -> Result<i64, String> {
        let conn = Connection::open(&*self.db_path).map_err(|e| e.to_string())?;
        let payload = event
            .payload
            .as_ref()
            .map(|p| serde_json::to_string(p).map_err(|e| e.to_string()))
            .transpose()?;

        conn.execute(
            "INSERT INTO ops (incident_id, kind, payload, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                event.incident_id,
                event.kind.as_event(),
                payload,
                event.recorded_at.to_rfc3339(),
            ],
        )
        .map_err(|e| e.to_string())?;

        Ok(conn.last_insert_rowid())
    }

    pub fn timeline(&self, incident_id: &str) -> Result<Vec<OpEvent>, String> {
        let conn = Connection::open(&*self.db_path).map_err(|e| e.to_string())?;
        let mut stmt = conn
            .prepare(
                "SELECT id, incident_id, kind, payload, recorded_at
                 FROM ops
                 WHERE incident_id = ?1
                 ORDER BY id ASC",
            )
            .map_err(|e| e.to_string())?;

        let rows = stmt
            .query_map(params![incident_id], map_row)
            .map_err(|e| e.to_string())?;

        collect_rows(rows)
    }

    pub fn events_after(&self, after_id: i64) -> Result<Vec<OpEvent>, String> {
        let conn = Connection::open(&*self.db_path).map_err(|e| e.to_string())?;
        let mut stmt = conn
            .prepare(
                "SELECT id, incident_id, kind, payload, recorded_at
                 FROM ops
                 WHERE id > ?1
                 ORDER BY id ASC",
            )
            .map_err(|e| e.to_string())?;

        let rows = stmt
            .query_map(params![after_id], map_row)
            .map_err(|e| e.to_string())?;

        collect_rows(rows)
    }

    pub fn latest_id(&self) -> Result<Option<i64>, String> {
        let conn = Connection::open(&*self.db_path).map_err(|e| e.to_string())?;
        conn.query_row("SELECT MAX(id) FROM ops", [], |row| {
            row.get::<_, Option<i64>>(0)
        })
        .optional()
        .map_err(|e| e.to_string())
        .map(|v| v.flatten())
    }
}

fn collect_rows(
    rows: impl Iterator<Item = rusqlite::Result<OpEvent>>,
) -> Result<Vec<OpEvent>, String> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(|e| e.to_string())?);
    }
    Ok(out)
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<OpEvent> {
    let kind_str: String = row.get(2)?;
    let payload_str: Option<String> = row.get(3)?;
    let recorded_at_str: String = row.get(4)?;

    let kind = OpKind::from_event(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown op kind '{kind_str}'").into(),
        )
    })?;

    let payload = payload_str
        .map(|s| {
            serde_json::from_str(&s).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(
                    3,
                    rusqlite::types::Type::Text,
                    Box::new(err),
                )
            })
        })
        .transpose()?;

    let recorded_at = DateTime::parse_from_rfc3339(&recorded_at_str)
        .map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                Box::new(err),
            )
        })?
        .with_timezone(&Utc);

    Ok(OpEvent {
        id: row.get(0)?,
        incident_id: row.get(1)?,
        kind,
        payload,
        recorded_at,
    })
}
