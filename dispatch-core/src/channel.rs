use crate::session::SessionContext;
use incident_registry::CanonicalIncidentV1;
use incident_registry::LguStatus;
use std::future::Future;

pub const CHANNEL_TYPE: &str = "messaging";

/// Derive the chat-channel identity for an incident without a server round
/// trip. Every component viewing the same incident must arrive at the same
/// id, so the fallback is a pure function of the record.
pub fn derive_channel_id(incident: &CanonicalIncidentV1) -> Option<String> {
    if let Some(id) = &incident.channel_id {
        return Some(id.clone());
    }

    let slice: String = incident.id.chars().skip(5).take(5).collect();
    if slice.is_empty() {
        return None;
    }
    Some(format!("{}-{}", incident.incident_type.slug(), slice))
}

pub trait MessagingClient: Send + Sync + 'static {
    type Session: MessagingSession;

    fn connect(
        &self,
        user_id: &str,
        auth_token: &str,
    ) -> impl Future<Output = Result<Self::Session, String>> + Send;
}

pub trait MessagingSession: Send + Sync + 'static {
    fn join(
        &self,
        channel_type: &str,
        channel_id: &str,
    ) -> impl Future<Output = Result<(), String>> + Send;

    fn disconnect(&self) -> impl Future<Output = Result<(), String>> + Send;
}

/// What the console renders when the chat widget is allowed to exist.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatSurface {
    pub channel_type: &'static str,
    pub channel_id: String,
    pub expanded: bool,
}

/// One messaging session per mounted view. Connect failures degrade to "no
/// surface"; the gate is fail-closed on anything but a connected LGU.
pub struct ChatBinding<S: MessagingSession> {
    session: Option<S>,
    channel_id: Option<String>,
    lgu_status: Option<LguStatus>,
    expanded: bool,
    released: bool,
}

impl<S: MessagingSession> ChatBinding<S> {
    pub async fn bind<C>(
        client: &C,
        context: &SessionContext,
        incident: &CanonicalIncidentV1,
    ) -> Self
    where
        C: MessagingClient<Session = S>,
    {
        let channel_id = derive_channel_id(incident);

        let session = match &channel_id {
            Some(channel_id) => {
                match client.connect(&context.user_id, &context.auth_token).await {
                    Ok(session) => match session.join(CHANNEL_TYPE, channel_id).await {
                        Ok(()) => Some(session),
                        Err(err) => {
                            tracing::warn!(incident_id = %incident.id, error = %err, "channel join failed");
                            let _ = session.disconnect().await;
                            None
                        }
                    },
                    Err(err) => {
                        tracing::warn!(incident_id = %incident.id, error = %err, "messaging connect failed");
                        None
                    }
                }
            }
            None => None,
        };

        Self {
            session,
            channel_id,
            lgu_status: incident.lgu_status,
            expanded: false,
            released: false,
        }
    }

    /// Refresh the gate from a newer poll of the same incident. The channel
    /// identity never changes after bind.
    pub fn update(&mut self, incident: &CanonicalIncidentV1) {
        self.lgu_status = incident.lgu_status;
    }

    pub fn channel_id(&self) -> Option<&str> {
        self.channel_id.as_deref()
    }

    pub fn surface(&self) -> Option<ChatSurface> {
        if self.released || self.session.is_none() {
            return None;
        }
        if self.lgu_status != Some(LguStatus::Connected) {
            return None;
        }
        let channel_id = self.channel_id.clone()?;

        Some(ChatSurface {
            channel_type: CHANNEL_TYPE,
            channel_id,
            expanded: self.expanded,
        })
    }

    pub fn toggle(&mut self) {
        self.expanded = !self.expanded;
    }

    /// Disconnect the messaging session. Safe to call more than once.
    pub async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Some(session) = self.session.take() {
            if let Err(err) = session.disconnect().await {
                tracing::warn!(error = %err, "messaging disconnect failed");
            }
        }
    }
}
