use crate::hub::EventHub;
use crate::watch::WatchRegistry;
use dispatch_core::backend::IncidentBackend;
use dispatch_core::call::{CallClient, CallSession, MediaTeardown};
use dispatch_core::channel::{ChatBinding, MessagingClient, MessagingSession};
use dispatch_core::oplog::CoordinationLog;
use dispatch_core::session::SessionContext;
use dispatch_core::sink::OpsSink;
use dispatch_core::status::StatusConfig;
use dispatch_core::travel::{Geocoder, RoutePlan, RoutePlanner, TravelConfig};
use incident_registry::{CanonicalIncidentV1, GeoPoint, HospitalRecord, UserRecord};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replays a scripted incident lifecycle on a fixed cadence, so the status
/// and travel monitors observe the same progression independently. The last
/// snapshot repeats forever.
#[derive(Clone)]
pub struct DemoBackend {
    script: Arc<Vec<CanonicalIncidentV1>>,
    started: Arc<Mutex<Option<std::time::Instant>>>,
    step: Duration,
    hospital: HospitalRecord,
}

impl DemoBackend {
    pub fn new(script: Vec<CanonicalIncidentV1>, step: Duration) -> Self {
        Self {
            script: Arc::new(script),
            started: Arc::new(Mutex::new(None)),
            step,
            hospital: demo_hospital(),
        }
    }

    pub fn single_step() -> Self {
        Self::new(
            vec![demo_incident(serde_json::json!({
                "isVerified": true,
                "isAccepted": true,
                "responderStatus": "enroute"
            }))],
            Duration::from_millis(200),
        )
    }
}

impl IncidentBackend for DemoBackend {
    async fn fetch_incident(&self, _id: &str) -> Result<CanonicalIncidentV1, String> {
        if self.script.is_empty() {
            return Err("demo script is empty".to_string());
        }
        let elapsed = {
            let mut started = self.started.lock().expect("started lock");
            started.get_or_insert_with(std::time::Instant::now).elapsed()
        };
        let index = (elapsed.as_millis() / self.step.as_millis().max(1)) as usize;
        Ok(self.script[index.min(self.script.len() - 1)].clone())
    }

    async fn update_incident(&self, id: &str, patch: serde_json::Value) -> Result<(), String> {
        tracing::info!(incident_id = %id, %patch, "demo backend patched");
        Ok(())
    }

    async fn fetch_hospital(&self, id: &str) -> Result<HospitalRecord, String> {
        if id == self.hospital.id {
            Ok(self.hospital.clone())
        } else {
            Err(format!("unknown hospital {id}"))
        }
    }

    async fn fetch_user(&self, id: &str) -> Result<UserRecord, String> {
        serde_json::from_value(serde_json::json!({
            "_id": id,
            "firstName": "Field",
            "lastName": "Responder"
        }))
        .map_err(|e| e.to_string())
    }
}

#[derive(Clone)]
pub struct DemoPlanner;

impl RoutePlanner for DemoPlanner {
    async fn plan_route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<RoutePlan, String> {
        Ok(RoutePlan {
            path: vec![origin, origin.midpoint(&destination), destination],
            duration_text: "9 mins".into(),
            distance_text: "3.1 km".into(),
        })
    }
}

#[derive(Clone)]
pub struct DemoGeocoder;

impl Geocoder for DemoGeocoder {
    async fn reverse(&self, point: GeoPoint) -> Result<String, String> {
        Ok(format!("near {:.3}, {:.3}", point.lat, point.lon))
    }
}

struct DemoMessaging;
struct DemoMessagingSession;

impl MessagingClient for DemoMessaging {
    type Session = DemoMessagingSession;

    async fn connect(&self, _user_id: &str, _token: &str) -> Result<DemoMessagingSession, String> {
        Ok(DemoMessagingSession)
    }
}

impl MessagingSession for DemoMessagingSession {
    async fn join(&self, _channel_type: &str, _channel_id: &str) -> Result<(), String> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Succeeds everywhere except camera teardown, to show the leave waterfall
/// carrying on past a failed step.
#[derive(Clone)]
struct DemoCall;

impl CallClient for DemoCall {
    async fn join(&self, _call_type: &str, _call_id: &str, _create: bool) -> Result<(), String> {
        Ok(())
    }

    async fn leave(&self) -> Result<(), String> {
        Ok(())
    }

    async fn disable_camera(&self) -> Result<(), String> {
        Err("camera track already stopped".into())
    }

    async fn disable_microphone(&self) -> Result<(), String> {
        Ok(())
    }

    async fn disconnect_user(&self) -> Result<(), String> {
        Ok(())
    }
}

impl MediaTeardown for DemoCall {
    async fn release_all(&self) -> Result<(), String> {
        Ok(())
    }
}

fn demo_hospital() -> HospitalRecord {
    serde_json::from_value(serde_json::json!({
        "_id": "hosp-onm",
        "name": "Ospital ng Maynila",
        "address": "Quirino Ave, Malate",
        "coordinates": {"lat": 14.5672, "lng": 120.9882}
    }))
    .expect("demo hospital")
}

fn demo_incident(overrides: serde_json::Value) -> CanonicalIncidentV1 {
    let mut value = serde_json::json!({
        "_id": "abcdef0123",
        "incidentType": "Medical",
        "lguStatus": "connected",
        "responder": "resp-77",
        "incidentDetails": {
            "coordinates": {"lat": 14.5995, "lng": 120.9842},
            "description": "collapsed pedestrian, Taft Ave"
        }
    });
    if let Some(map) = overrides.as_object() {
        for (key, override_value) in map {
            value[key] = override_value.clone();
        }
    }
    serde_json::from_value(value).expect("demo incident")
}

fn demo_script() -> Vec<CanonicalIncidentV1> {
    vec![
        demo_incident(serde_json::json!({
            "isVerified": true,
            "isAccepted": true,
            "responderStatus": "enroute",
            "responderCoordinates": {"lat": 14.6091, "lng": 121.0223}
        })),
        demo_incident(serde_json::json!({
            "isVerified": true,
            "isAccepted": true,
            "responderStatus": "onscene",
            "responderNotification": "unread",
            "responderCoordinates": {"lat": 14.5996, "lng": 120.9845}
        })),
        demo_incident(serde_json::json!({
            "isVerified": true,
            "isAccepted": true,
            "responderStatus": "onscene",
            "responderNotification": "read",
            "responderCoordinates": {"lat": 14.5996, "lng": 120.9845},
            "selectedHospital": "hosp-onm"
        })),
        demo_incident(serde_json::json!({
            "isVerified": true,
            "isAccepted": true,
            "responderStatus": "transporting",
            "responderCoordinates": {"lat": 14.5831, "lng": 120.9860},
            "selectedHospital": "hosp-onm"
        })),
        demo_incident(serde_json::json!({
            "isVerified": true,
            "isAccepted": true,
            "isResolved": true,
            "isFinished": true,
            "responderStatus": "finished",
            "selectedHospital": "hosp-onm"
        })),
    ]
}

/// Walks one incident through accepted → on-scene → hospital → finished with
/// every monitor running against an in-memory backend, then prints the
/// coordination timeline it produced.
pub async fn run() -> Result<(), String> {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| e.to_string())?
        .as_nanos();
    let log = CoordinationLog::open(&format!("/tmp/dispatch-console-demo/{nanos}.db"))?;
    let hub = EventHub::new(log.clone());
    let incident_id = "abcdef0123";

    let backend = DemoBackend::new(demo_script(), Duration::from_millis(400));
    let registry = WatchRegistry::new(
        backend.clone(),
        Some(DemoPlanner),
        Some(DemoGeocoder),
        hub.clone(),
        StatusConfig {
            poll_interval: Duration::from_millis(200),
            dismiss_after: Duration::from_millis(400),
            navigate_after: Duration::from_millis(400),
        },
        TravelConfig {
            poll_interval: Duration::from_millis(200),
        },
    );
    registry.start(incident_id);

    let context = SessionContext {
        user_id: "op-demo".into(),
        display_name: "Demo Operator".into(),
        auth_token: "demo-token".into(),
    };
    let first = backend.fetch_incident(incident_id).await?;
    if let Some(reference) = &first.responder {
        match dispatch_core::backend::resolve_user(&backend, reference).await {
            Ok(user) => {
                tracing::info!(responder = %user.display_name(), "responder assigned");
            }
            Err(err) => tracing::warn!(error = %err, "responder lookup failed"),
        }
    }
    let mut chat = ChatBinding::bind(&DemoMessaging, &context, &first).await;
    if let Some(surface) = chat.surface() {
        hub.emit_json(
            "channel-bound",
            serde_json::json!({"incidentId": incident_id, "channelId": surface.channel_id}),
        );
    }

    let mut call = CallSession::new(
        DemoCall,
        DemoCall,
        hub.clone(),
        incident_id.to_string(),
        "dispatch-operations".to_string(),
    );
    call.start().await;

    // let the pollers chew through the script and the finish timers fire
    tokio::time::sleep(Duration::from_millis(2500)).await;

    call.leave().await;
    chat.release().await;
    hub.emit_json(
        "channel-released",
        serde_json::json!({"incidentId": incident_id}),
    );
    registry.stop(incident_id);

    let timeline = log.timeline(incident_id)?;
    println!(
        "coordination timeline:\n{}",
        serde_json::to_string_pretty(&timeline).map_err(|e| e.to_string())?
    );

    Ok(())
}
