use crate::hub::EventHub;
use dispatch_core::backend::IncidentBackend;
use dispatch_core::sink::OpsSink;
use dispatch_core::status::{self, StatusConfig, StatusHandle};
use dispatch_core::travel::{self, Geocoder, RoutePlanner, TravelConfig, TravelHandle};
use std::collections::HashMap;
use std::sync::Mutex;

struct Watcher {
    status: StatusHandle,
    travel: Option<TravelHandle>,
}

/// Monitors per watched incident. Starting the same incident twice is a
/// no-op; stopping tears the monitors down. Without maps configuration the
/// travel monitor is skipped and only status is watched.
pub struct WatchRegistry<B, P, G>
where
    B: IncidentBackend,
    P: RoutePlanner + Clone,
    G: Geocoder + Clone,
{
    backend: B,
    planner: Option<P>,
    geocoder: Option<G>,
    hub: EventHub,
    status_config: StatusConfig,
    travel_config: TravelConfig,
    watchers: Mutex<HashMap<String, Watcher>>,
}

impl<B, P, G> WatchRegistry<B, P, G>
where
    B: IncidentBackend,
    P: RoutePlanner + Clone,
    G: Geocoder + Clone,
{
    pub fn new(
        backend: B,
        planner: Option<P>,
        geocoder: Option<G>,
        hub: EventHub,
        status_config: StatusConfig,
        travel_config: TravelConfig,
    ) -> Self {
        Self {
            backend,
            planner,
            geocoder,
            hub,
            status_config,
            travel_config,
            watchers: Mutex::new(HashMap::new()),
        }
    }

    pub fn start(&self, incident_id: &str) -> bool {
        let mut watchers = self.watchers.lock().expect("watchers lock");
        if watchers.contains_key(incident_id) {
            return false;
        }

        let status = status::spawn(
            self.backend.clone(),
            self.hub.clone(),
            incident_id.to_string(),
            self.status_config.clone(),
        );
        let travel = match (&self.planner, &self.geocoder) {
            (Some(planner), Some(geocoder)) => Some(travel::spawn(
                self.backend.clone(),
                planner.clone(),
                geocoder.clone(),
                self.hub.clone(),
                incident_id.to_string(),
                self.travel_config.clone(),
            )),
            _ => None,
        };

        watchers.insert(incident_id.to_string(), Watcher { status, travel });
        drop(watchers);

        self.hub.emit_json(
            "watch-started",
            serde_json::json!({"incidentId": incident_id}),
        );
        true
    }

    pub fn stop(&self, incident_id: &str) -> bool {
        let removed = self
            .watchers
            .lock()
            .expect("watchers lock")
            .remove(incident_id);
        let Some(watcher) = removed else {
            return false;
        };

        watcher.status.stop();
        if let Some(travel) = &watcher.travel {
            travel.stop();
        }
        self.hub.emit_json(
            "watch-stopped",
            serde_json::json!({"incidentId": incident_id}),
        );
        true
    }

    pub fn watched(&self) -> Vec<String> {
        let watchers = self.watchers.lock().expect("watchers lock");
        let mut ids: Vec<String> = watchers.keys().cloned().collect();
        ids.sort();
        ids
    }
}
