use crate::config::DispatchConfig;
use crate::session::SessionContext;
use incident_registry::{CanonicalIncidentV1, HospitalRecord, Ref, UserRecord};
use std::future::Future;

/// Access to the GuardianPH REST backend. Monitors are generic over this so
/// tests can script records without a network.
///
/// Futures are `Send` because monitors run inside spawned tasks.
pub trait IncidentBackend: Clone + Send + Sync + 'static {
    fn fetch_incident(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<CanonicalIncidentV1, String>> + Send;

    /// Partial update; only the fields present in `patch` change.
    fn update_incident(
        &self,
        id: &str,
        patch: serde_json::Value,
    ) -> impl Future<Output = Result<(), String>> + Send;

    fn fetch_hospital(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<HospitalRecord, String>> + Send;

    fn fetch_user(&self, id: &str) -> impl Future<Output = Result<UserRecord, String>> + Send;
}

/// Resolve an id-or-embedded user reference to the full record, fetching
/// only when the backend sent a bare id.
pub async fn resolve_user<B: IncidentBackend>(
    backend: &B,
    reference: &Ref<UserRecord>,
) -> Result<UserRecord, String> {
    match reference {
        Ref::Embedded(user) => Ok(user.clone()),
        Ref::Id(id) => backend.fetch_user(id).await,
    }
}

#[derive(Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
    auth_token: String,
}

impl HttpBackend {
    pub fn new(config: &DispatchConfig, session: &SessionContext) -> Result<Self, String> {
        if session.auth_token.trim().is_empty() {
            return Err("auth token is empty".into());
        }

        Ok(Self {
            http: reqwest::Client::new(),
            base_url: config.server_url.trim_end_matches('/').to_string(),
            auth_token: session.auth_token.clone(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, String> {
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(&self.auth_token)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let response = response.error_for_status().map_err(|e| e.to_string())?;
        response.json::<T>().await.map_err(|e| e.to_string())
    }
}

impl IncidentBackend for HttpBackend {
    async fn fetch_incident(&self, id: &str) -> Result<CanonicalIncidentV1, String> {
        self.get_json(&format!("/incidents/{id}")).await
    }

    async fn update_incident(&self, id: &str, patch: serde_json::Value) -> Result<(), String> {
        let response = self
            .http
            .put(format!("{}/incidents/update/{id}", self.base_url))
            .bearer_auth(&self.auth_token)
            .json(&patch)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        response.error_for_status().map(|_| ()).map_err(|e| e.to_string())
    }

    async fn fetch_hospital(&self, id: &str) -> Result<HospitalRecord, String> {
        self.get_json(&format!("/hospitals/{id}")).await
    }

    async fn fetch_user(&self, id: &str) -> Result<UserRecord, String> {
        self.get_json(&format!("/users/{id}")).await
    }
}
