#[derive(Clone, Debug)]
pub struct DispatchConfig {
    pub server_url: String,
    pub stream_api_key: Option<String>,
    pub maps_api_key: Option<String>,
    pub maps_url: Option<String>,
}

impl DispatchConfig {
    /// Read once at startup. A missing backend URL is a hard error: no
    /// monitor is allowed to start without one.
    pub fn from_env() -> Result<Self, String> {
        let server_url = std::env::var("GUARDIAN_SERVER_URL")
            .map_err(|_| "GUARDIAN_SERVER_URL is not set".to_string())?;

        Ok(Self {
            server_url,
            stream_api_key: std::env::var("STREAM_API_KEY").ok(),
            maps_api_key: std::env::var("MAPS_API_KEY").ok(),
            maps_url: std::env::var("MAPS_SERVER_URL").ok(),
        })
    }
}
