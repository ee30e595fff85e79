use crate::backend::IncidentBackend;
use crate::sink::OpsSink;
use incident_registry::{CanonicalIncidentV1, GeoPoint, HospitalRecord, Ref};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Driving-route computation with traffic-aware duration. External service;
/// failures clear the route rather than showing a stale one.
pub trait RoutePlanner: Send + Sync + 'static {
    fn plan_route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> impl Future<Output = Result<RoutePlan, String>> + Send;
}

pub trait Geocoder: Send + Sync + 'static {
    fn reverse(&self, point: GeoPoint) -> impl Future<Output = Result<String, String>> + Send;
}

#[derive(Clone, Debug, PartialEq)]
pub struct RoutePlan {
    pub path: Vec<GeoPoint>,
    pub duration_text: String,
    pub distance_text: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RouteSummary {
    pub path: Vec<GeoPoint>,
    pub duration_text: String,
    pub distance_text: String,
    pub midpoint: GeoPoint,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Destination {
    Site(GeoPoint),
    Hospital {
        id: String,
        name: String,
        point: GeoPoint,
    },
}

impl Destination {
    pub fn point(&self) -> GeoPoint {
        match self {
            Destination::Site(point) => *point,
            Destination::Hospital { point, .. } => *point,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TravelConfig {
    pub poll_interval: Duration,
}

impl Default for TravelConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TravelEffect {
    OriginMoved(GeoPoint),
    HospitalSelected(Ref<HospitalRecord>),
}

/// Change detection for the two independently updated geo inputs. Both
/// components of a point must match for an update to count as a no-op.
#[derive(Debug, Default)]
pub struct TravelTracker {
    origin: Option<GeoPoint>,
    hospital_id: Option<String>,
}

impl TravelTracker {
    pub fn observe(&mut self, incident: &CanonicalIncidentV1) -> Vec<TravelEffect> {
        let mut effects = Vec::new();

        if let Some(hospital) = &incident.selected_hospital {
            if self.hospital_id.as_deref() != Some(hospital.id()) {
                self.hospital_id = Some(hospital.id().to_string());
                effects.push(TravelEffect::HospitalSelected(hospital.clone()));
            }
        }

        if let Some(position) = incident.responder_coordinates {
            if self.origin != Some(position) {
                self.origin = Some(position);
                effects.push(TravelEffect::OriginMoved(position));
            }
        }

        effects
    }

    /// Undo a hospital observation whose detail fetch failed, so the next
    /// cycle retries it.
    pub fn forget_hospital(&mut self) {
        self.hospital_id = None;
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TravelSnapshot {
    pub responder: Option<GeoPoint>,
    pub responder_address: Option<String>,
    pub destination: Option<Destination>,
    pub route: Option<RouteSummary>,
    pub stopped: bool,
}

pub struct TravelHandle {
    snapshot_rx: watch::Receiver<TravelSnapshot>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TravelHandle {
    pub fn snapshot(&self) -> watch::Receiver<TravelSnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    pub async fn join(self) {
        let _ = self.task.await;
    }
}

fn route_midpoint(plan: &RoutePlan, origin: GeoPoint, destination: GeoPoint) -> GeoPoint {
    match plan.path.get(plan.path.len() / 2) {
        Some(point) => *point,
        None => origin.midpoint(&destination),
    }
}

/// Polls the incident for responder position and hospital selection, and
/// recomputes the route whenever origin or destination actually changed.
/// Once a hospital is the destination it stays the destination.
pub fn spawn<B, P, G, S>(
    backend: B,
    planner: P,
    geocoder: G,
    sink: S,
    incident_id: String,
    config: TravelConfig,
) -> TravelHandle
where
    B: IncidentBackend,
    P: RoutePlanner,
    G: Geocoder,
    S: OpsSink,
{
    let (shutdown, mut shutdown_rx) = watch::channel(false);
    let (snapshot_tx, snapshot_rx) = watch::channel(TravelSnapshot::default());

    let task = tokio::spawn(async move {
        let mut tracker = TravelTracker::default();
        let mut snapshot = TravelSnapshot::default();
        let mut last_routed: Option<(GeoPoint, GeoPoint)> = None;
        let mut ticker = interval(config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let incident = match backend.fetch_incident(&incident_id).await {
                        Ok(incident) => incident,
                        Err(err) => {
                            tracing::warn!(incident_id = %incident_id, error = %err, "travel poll failed");
                            continue;
                        }
                    };

                    if snapshot.destination.is_none() {
                        if let Some(site) = incident.site_coordinates() {
                            snapshot.destination = Some(Destination::Site(site));
                        }
                    }

                    for effect in tracker.observe(&incident) {
                        match effect {
                            TravelEffect::HospitalSelected(hospital) => {
                                let record = match hospital.embedded() {
                                    Some(record) => Some(record.clone()),
                                    None => match backend.fetch_hospital(hospital.id()).await {
                                        Ok(record) => Some(record),
                                        Err(err) => {
                                            tracing::warn!(
                                                incident_id = %incident_id,
                                                hospital_id = %hospital.id(),
                                                error = %err,
                                                "hospital fetch failed"
                                            );
                                            tracker.forget_hospital();
                                            None
                                        }
                                    },
                                };

                                if let Some(record) = record {
                                    sink.emit_json(
                                        "destination-changed",
                                        serde_json::json!({
                                            "incidentId": incident_id,
                                            "hospitalId": record.id,
                                            "name": record.name,
                                        }),
                                    );
                                    snapshot.destination = Some(Destination::Hospital {
                                        id: record.id,
                                        name: record.name,
                                        point: record.coordinates,
                                    });
                                }
                            }
                            TravelEffect::OriginMoved(position) => {
                                snapshot.responder = Some(position);
                                sink.emit_json(
                                    "responder-moved",
                                    serde_json::json!({
                                        "incidentId": incident_id,
                                        "lat": position.lat,
                                        "lng": position.lon,
                                    }),
                                );
                                match geocoder.reverse(position).await {
                                    Ok(address) => snapshot.responder_address = Some(address),
                                    Err(err) => {
                                        tracing::warn!(incident_id = %incident_id, error = %err, "reverse geocode failed");
                                    }
                                }
                            }
                        }
                    }

                    let pair = match (snapshot.responder, snapshot.destination.as_ref()) {
                        (Some(origin), Some(destination)) => Some((origin, destination.point())),
                        _ => None,
                    };
                    if let Some((origin, destination)) = pair {
                        if last_routed != Some((origin, destination)) {
                            last_routed = Some((origin, destination));
                            match planner.plan_route(origin, destination).await {
                                Ok(plan) => {
                                    let midpoint = route_midpoint(&plan, origin, destination);
                                    sink.emit_json(
                                        "route-updated",
                                        serde_json::json!({
                                            "incidentId": incident_id,
                                            "duration": plan.duration_text,
                                            "distance": plan.distance_text,
                                        }),
                                    );
                                    snapshot.route = Some(RouteSummary {
                                        path: plan.path,
                                        duration_text: plan.duration_text,
                                        distance_text: plan.distance_text,
                                        midpoint,
                                    });
                                }
                                Err(err) => {
                                    tracing::warn!(incident_id = %incident_id, error = %err, "route computation failed");
                                    if snapshot.route.take().is_some() {
                                        sink.emit_json(
                                            "route-cleared",
                                            serde_json::json!({"incidentId": incident_id}),
                                        );
                                    }
                                }
                            }
                        }
                    }

                    let _ = snapshot_tx.send(snapshot.clone());
                }
                _ = shutdown_rx.changed() => break,
            }
        }

        snapshot.stopped = true;
        let _ = snapshot_tx.send(snapshot);
    });

    TravelHandle {
        snapshot_rx,
        shutdown,
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::ScriptedBackend;
    use crate::sink::testing::CaptureSink;
    use std::sync::{Arc, Mutex};

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint { lat, lon }
    }

    fn incident_json(responder: Option<GeoPoint>, hospital: Option<serde_json::Value>) -> CanonicalIncidentV1 {
        let mut value = serde_json::json!({
            "_id": "abcdef0123",
            "incidentType": "Medical",
            "incidentDetails": {"coordinates": {"lat": 14.60, "lng": 120.98}}
        });
        if let Some(p) = responder {
            value["responderCoordinates"] = serde_json::json!({"lat": p.lat, "lng": p.lon});
        }
        if let Some(h) = hospital {
            value["selectedHospital"] = h;
        }
        serde_json::from_value(value).expect("parse")
    }

    #[derive(Clone)]
    struct CountingPlanner {
        calls: Arc<Mutex<usize>>,
        fail_from_call: Option<usize>,
    }

    impl CountingPlanner {
        fn new() -> Self {
            Self {
                calls: Arc::new(Mutex::new(0)),
                fail_from_call: None,
            }
        }

        fn failing_from(call: usize) -> Self {
            Self {
                calls: Arc::new(Mutex::new(0)),
                fail_from_call: Some(call),
            }
        }

        fn call_count(&self) -> usize {
            *self.calls.lock().expect("lock")
        }
    }

    impl RoutePlanner for CountingPlanner {
        async fn plan_route(
            &self,
            origin: GeoPoint,
            destination: GeoPoint,
        ) -> Result<RoutePlan, String> {
            let call = {
                let mut calls = self.calls.lock().expect("lock");
                *calls += 1;
                *calls
            };
            if self.fail_from_call.is_some_and(|n| call >= n) {
                return Err("directions unavailable".into());
            }
            Ok(RoutePlan {
                path: vec![origin, origin.midpoint(&destination), destination],
                duration_text: "12 mins".into(),
                distance_text: "4.2 km".into(),
            })
        }
    }

    #[derive(Clone)]
    struct FixedGeocoder;

    impl Geocoder for FixedGeocoder {
        async fn reverse(&self, _point: GeoPoint) -> Result<String, String> {
            Ok("Taft Ave, Manila".into())
        }
    }

    #[test]
    fn noop_coordinate_update_is_not_a_change() {
        let mut tracker = TravelTracker::default();
        let moved = incident_json(Some(point(14.61, 120.99)), None);

        assert_eq!(
            tracker.observe(&moved),
            vec![TravelEffect::OriginMoved(point(14.61, 120.99))]
        );
        // identical lat and lng: nothing to do
        assert!(tracker.observe(&moved).is_empty());

        let nudged = incident_json(Some(point(14.61, 121.00)), None);
        assert_eq!(
            tracker.observe(&nudged),
            vec![TravelEffect::OriginMoved(point(14.61, 121.00))]
        );
    }

    #[test]
    fn hospital_selection_is_sticky() {
        let mut tracker = TravelTracker::default();
        let with_hospital = incident_json(None, Some(serde_json::json!("hosp-1")));

        assert_eq!(tracker.observe(&with_hospital).len(), 1);
        assert!(tracker.observe(&with_hospital).is_empty());

        // hospital disappearing from the record does not revert anything
        let without = incident_json(None, None);
        assert!(tracker.observe(&without).is_empty());

        // a different hospital is a new switch
        let other = incident_json(None, Some(serde_json::json!("hosp-2")));
        assert_eq!(tracker.observe(&other).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_coordinates_do_not_recompute_route() {
        let responder = point(14.61, 120.99);
        let backend = ScriptedBackend::new(vec![
            incident_json(Some(responder), None),
            incident_json(Some(responder), None),
            incident_json(Some(responder), None),
        ]);
        let planner = CountingPlanner::new();
        let sink = CaptureSink::default();
        let handle = spawn(
            backend.clone(),
            planner.clone(),
            FixedGeocoder,
            sink.clone(),
            "abcdef0123".into(),
            TravelConfig::default(),
        );

        let mut rx = handle.snapshot();
        while backend.fetch_count() < 4 {
            rx.changed().await.expect("monitor alive");
        }

        assert_eq!(planner.call_count(), 1);
        assert_eq!(sink.events_named("route-updated"), 1);
        assert_eq!(rx.borrow().responder_address.as_deref(), Some("Taft Ave, Manila"));

        handle.stop();
        handle.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn destination_switches_to_hospital_and_stays() {
        let responder = point(14.61, 120.99);
        let backend = ScriptedBackend::new(vec![
            incident_json(Some(responder), None),
            incident_json(Some(responder), Some(serde_json::json!("hosp-1"))),
            incident_json(Some(responder), None),
        ]);
        backend.hospitals.lock().expect("lock").push(HospitalRecord {
            id: "hosp-1".into(),
            name: "Ospital ng Maynila".into(),
            address: None,
            coordinates: point(14.57, 120.98),
        });
        let planner = CountingPlanner::new();
        let sink = CaptureSink::default();
        let handle = spawn(
            backend.clone(),
            planner.clone(),
            FixedGeocoder,
            sink.clone(),
            "abcdef0123".into(),
            TravelConfig::default(),
        );

        let mut rx = handle.snapshot();
        // first poll routes to the incident site
        loop {
            rx.changed().await.expect("monitor alive");
            if rx.borrow().route.is_some() {
                break;
            }
        }
        assert!(matches!(rx.borrow().destination, Some(Destination::Site(_))));

        // second poll switches to the hospital
        loop {
            rx.changed().await.expect("monitor alive");
            if matches!(rx.borrow().destination, Some(Destination::Hospital { .. })) {
                break;
            }
        }
        assert_eq!(sink.events_named("destination-changed"), 1);

        // the record dropping the hospital again does not revert
        while backend.fetch_count() < 4 {
            rx.changed().await.expect("monitor alive");
        }
        assert!(matches!(rx.borrow().destination, Some(Destination::Hospital { .. })));
        assert_eq!(planner.call_count(), 2);

        handle.stop();
        handle.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn route_failure_clears_route_state() {
        let backend = ScriptedBackend::new(vec![
            incident_json(Some(point(14.61, 120.99)), None),
            incident_json(Some(point(14.62, 121.00)), None),
        ]);
        let planner = CountingPlanner::failing_from(2);
        let sink = CaptureSink::default();
        let handle = spawn(
            backend.clone(),
            planner.clone(),
            FixedGeocoder,
            sink.clone(),
            "abcdef0123".into(),
            TravelConfig::default(),
        );

        let mut rx = handle.snapshot();
        loop {
            rx.changed().await.expect("monitor alive");
            if rx.borrow().route.is_some() {
                break;
            }
        }
        loop {
            rx.changed().await.expect("monitor alive");
            if rx.borrow().route.is_none() {
                break;
            }
        }

        assert_eq!(planner.call_count(), 2);
        assert_eq!(sink.events_named("route-cleared"), 1);

        handle.stop();
        handle.join().await;
    }
}
