use crate::config::DispatchConfig;
use crate::travel::{Geocoder, RoutePlan, RoutePlanner};
use incident_registry::GeoPoint;
use serde::Deserialize;

/// Directions and reverse geocoding over the mapping service's HTTP API.
/// Both need the maps URL and key from configuration; without them the
/// travel monitor simply runs without a planner.
#[derive(Clone)]
pub struct MapsService {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectionsResponse {
    duration_text: String,
    distance_text: String,
    #[serde(default)]
    path: Vec<GeoPoint>,
}

#[derive(Deserialize)]
struct ReverseResponse {
    address: String,
}

impl MapsService {
    pub fn from_config(config: &DispatchConfig) -> Option<Self> {
        let base_url = config.maps_url.as_ref()?;
        let api_key = config.maps_api_key.as_ref()?;

        Some(Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.clone(),
        })
    }
}

impl RoutePlanner for MapsService {
    async fn plan_route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<RoutePlan, String> {
        let response = self
            .http
            .get(format!("{}/directions", self.base_url))
            .query(&[
                ("origin", format!("{},{}", origin.lat, origin.lon)),
                (
                    "destination",
                    format!("{},{}", destination.lat, destination.lon),
                ),
                ("mode", "driving".into()),
                ("departure_time", "now".into()),
                ("key", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;

        let directions: DirectionsResponse = response.json().await.map_err(|e| e.to_string())?;
        Ok(RoutePlan {
            path: directions.path,
            duration_text: directions.duration_text,
            distance_text: directions.distance_text,
        })
    }
}

impl Geocoder for MapsService {
    async fn reverse(&self, point: GeoPoint) -> Result<String, String> {
        let response = self
            .http
            .get(format!("{}/geocode/reverse", self.base_url))
            .query(&[
                ("lat", point.lat.to_string()),
                ("lng", point.lon.to_string()),
                ("key", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;

        let reverse: ReverseResponse = response.json().await.map_err(|e| e.to_string())?;
        Ok(reverse.address)
    }
}
