use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GeoPoint {
    pub lat: f64,
    #[serde(rename = "lng")]
    pub lon: f64,
}

impl GeoPoint {
    pub fn midpoint(&self, other: &GeoPoint) -> GeoPoint {
        GeoPoint {
            lat: (self.lat + other.lat) / 2.0,
            lon: (self.lon + other.lon) / 2.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum IncidentType {
    Medical,
    Fire,
    Police,
    General,
}

impl IncidentType {
    pub fn slug(&self) -> &'static str {
        match self {
            IncidentType::Medical => "medical",
            IncidentType::Fire => "fire",
            IncidentType::Police => "police",
            IncidentType::General => "general",
        }
    }
}

/// Tri-state toast marker. `Unread` is consumed exactly once by the console,
/// which writes it back as `Read`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResponderNotification {
    Unread,
    Read,
    #[default]
    None,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LguStatus {
    Connected,
    Pending,
    Disconnected,
    Unknown,
}

impl<'de> Deserialize<'de> for LguStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // fail-closed: any status the console does not recognize gates the
        // same way a disconnected one does
        let value = String::deserialize(deserializer)?;
        Ok(match value.as_str() {
            "connected" => LguStatus::Connected,
            "pending" => LguStatus::Pending,
            "disconnected" => LguStatus::Disconnected,
            _ => LguStatus::Unknown,
        })
    }
}

pub trait Identified {
    fn record_id(&self) -> &str;
}

/// Backend fields like `selectedHospital`, `user` and `responder` arrive
/// either as a bare id string or as the embedded record. This is the single
/// place that shape is resolved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Ref<T> {
    Embedded(T),
    Id(String),
}

impl<T: Identified> Ref<T> {
    pub fn id(&self) -> &str {
        match self {
            Ref::Embedded(record) => record.record_id(),
            Ref::Id(id) => id,
        }
    }

    pub fn embedded(&self) -> Option<&T> {
        match self {
            Ref::Embedded(record) => Some(record),
            Ref::Id(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HospitalRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    pub coordinates: GeoPoint,
}

impl Identified for HospitalRecord {
    fn record_id(&self) -> &str {
        &self.id
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl UserRecord {
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => self.id.clone(),
        }
    }
}

impl Identified for UserRecord {
    fn record_id(&self) -> &str {
        &self.id
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IncidentDetails {
    #[serde(default)]
    pub coordinates: Option<GeoPoint>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalIncidentV1 {
    #[serde(rename = "_id")]
    pub id: String,
    pub incident_type: IncidentType,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub is_accepted: bool,
    #[serde(default)]
    pub is_resolved: bool,
    #[serde(default)]
    pub is_finished: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub on_scene_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub responder_status: Option<String>,
    #[serde(default)]
    pub responder_notification: ResponderNotification,
    #[serde(default)]
    pub responder_coordinates: Option<GeoPoint>,
    #[serde(default)]
    pub coordinates: Option<GeoPoint>,
    #[serde(default)]
    pub incident_details: Option<IncidentDetails>,
    #[serde(default)]
    pub selected_hospital: Option<Ref<HospitalRecord>>,
    #[serde(default)]
    pub responder: Option<Ref<UserRecord>>,
    #[serde(default)]
    pub user: Option<Ref<UserRecord>>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub lgu_status: Option<LguStatus>,
}

impl CanonicalIncidentV1 {
    /// Reported site of the incident. Older records nest the point under
    /// `incidentDetails`, newer ones carry it at the top level.
    pub fn site_coordinates(&self) -> Option<GeoPoint> {
        self.coordinates
            .or_else(|| self.incident_details.as_ref().and_then(|d| d.coordinates))
    }
}

pub fn validate_incident_v1(incident: &CanonicalIncidentV1) -> Result<(), String> {
    if incident.id.trim().is_empty() {
        return Err("id is required".into());
    }

    let stamps = [
        ("createdAt", incident.created_at),
        ("acceptedAt", incident.accepted_at),
        ("onSceneAt", incident.on_scene_at),
        ("resolvedAt", incident.resolved_at),
    ];
    let mut last: Option<(&str, DateTime<Utc>)> = None;
    for (name, stamp) in stamps {
        let Some(stamp) = stamp else {
            continue;
        };
        if let Some((prev_name, prev)) = last {
            if stamp < prev {
                return Err(format!("{name} precedes {prev_name}"));
            }
        }
        last = Some((name, stamp));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_incident() -> CanonicalIncidentV1 {
        serde_json::from_value(serde_json::json!({
            "_id": "abcdef0123",
            "incidentType": "Medical"
        }))
        .expect("parse")
    }

    #[test]
    fn parses_minimal_record_with_defaults() {
        let incident = base_incident();
        assert_eq!(incident.id, "abcdef0123");
        assert!(!incident.is_finished);
        assert_eq!(incident.responder_notification, ResponderNotification::None);
        assert!(incident.lgu_status.is_none());
        assert!(validate_incident_v1(&incident).is_ok());
    }

    #[test]
    fn ref_parses_both_shapes() {
        let by_id: Ref<HospitalRecord> = serde_json::from_value(serde_json::json!("hosp-1")).expect("parse id");
        assert_eq!(by_id.id(), "hosp-1");
        assert!(by_id.embedded().is_none());

        let embedded: Ref<HospitalRecord> = serde_json::from_value(serde_json::json!({
            "_id": "hosp-2",
            "name": "Ospital ng Maynila",
            "coordinates": {"lat": 14.57, "lng": 120.98}
        }))
        .expect("parse embedded");
        assert_eq!(embedded.id(), "hosp-2");
        assert_eq!(embedded.embedded().expect("record").name, "Ospital ng Maynila");
    }

    #[test]
    fn unknown_lgu_status_maps_to_unknown() {
        let incident: CanonicalIncidentV1 = serde_json::from_value(serde_json::json!({
            "_id": "abcdef0123",
            "incidentType": "Fire",
            "lguStatus": "handshaking"
        }))
        .expect("parse");
        assert_eq!(incident.lgu_status, Some(LguStatus::Unknown));
    }

    #[test]
    fn site_coordinates_falls_back_to_nested_details() {
        let incident: CanonicalIncidentV1 = serde_json::from_value(serde_json::json!({
            "_id": "abcdef0123",
            "incidentType": "Police",
            "incidentDetails": {"coordinates": {"lat": 14.6, "lng": 121.0}}
        }))
        .expect("parse");
        let site = incident.site_coordinates().expect("site");
        assert_eq!(site, GeoPoint { lat: 14.6, lon: 121.0 });
    }

    #[test]
    fn geo_point_equality_requires_both_components() {
        let a = GeoPoint { lat: 14.6, lon: 121.0 };
        assert_eq!(a, GeoPoint { lat: 14.6, lon: 121.0 });
        assert_ne!(a, GeoPoint { lat: 14.6, lon: 121.1 });
        assert_ne!(a, GeoPoint { lat: 14.7, lon: 121.0 });
    }

    #[test]
    fn rejects_out_of_order_lifecycle_timestamps() {
        let mut incident = base_incident();
        incident.accepted_at = Some("2026-01-02T00:00:00Z".parse().expect("ts"));
        incident.on_scene_at = Some("2026-01-01T00:00:00Z".parse().expect("ts"));
        let err = validate_incident_v1(&incident).expect_err("must reject");
        assert!(err.contains("onSceneAt"));
    }

    #[test]
    fn notification_roundtrips_lowercase() {
        let json = serde_json::to_string(&ResponderNotification::Unread).expect("serialize");
        assert_eq!(json, "\"unread\"");
        let back: ResponderNotification = serde_json::from_str("\"read\"").expect("parse");
        assert_eq!(back, ResponderNotification::Read);
    }
}
