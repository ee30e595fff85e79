use serde::{Deserialize, Serialize};

/// Who is operating this console. Built once at startup and passed into every
/// component that keys a backend or real-time session; nothing reads ambient
/// storage after construction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionContext {
    pub user_id: String,
    pub display_name: String,
    pub auth_token: String,
}

impl SessionContext {
    pub fn from_env() -> Result<Self, String> {
        let auth_token = std::env::var("GUARDIAN_AUTH_TOKEN")
            .map_err(|_| "GUARDIAN_AUTH_TOKEN is not set".to_string())?;
        let user_id = std::env::var("GUARDIAN_USER_ID")
            .map_err(|_| "GUARDIAN_USER_ID is not set".to_string())?;
        let display_name =
            std::env::var("GUARDIAN_USER_NAME").unwrap_or_else(|_| "operator".into());

        Ok(Self {
            user_id,
            display_name,
            auth_token,
        })
    }
}
