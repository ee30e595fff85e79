use crate::sink::OpsSink;
use std::future::Future;

pub const CALL_TYPE: &str = "default";

/// Video-call SDK surface, reduced to the operations the leave waterfall
/// needs. The real client is external; tests script it.
pub trait CallClient: Send + Sync + 'static {
    fn join(
        &self,
        call_type: &str,
        call_id: &str,
        create: bool,
    ) -> impl Future<Output = Result<(), String>> + Send;

    fn leave(&self) -> impl Future<Output = Result<(), String>> + Send;

    fn disable_camera(&self) -> impl Future<Output = Result<(), String>> + Send;

    fn disable_microphone(&self) -> impl Future<Output = Result<(), String>> + Send;

    fn disconnect_user(&self) -> impl Future<Output = Result<(), String>> + Send;
}

/// Platform-specific release of locally held media tracks, beyond what the
/// call SDK tracks itself.
pub trait MediaTeardown: Send + Sync + 'static {
    fn release_all(&self) -> impl Future<Output = Result<(), String>> + Send;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallPhase {
    Idle,
    Initializing,
    Active,
    Leaving,
}

pub struct CallSession<C, M, S>
where
    C: CallClient,
    M: MediaTeardown,
    S: OpsSink,
{
    client: C,
    media: M,
    sink: S,
    incident_id: String,
    call_id: String,
    phase: CallPhase,
    ended: bool,
}

impl<C, M, S> CallSession<C, M, S>
where
    C: CallClient,
    M: MediaTeardown,
    S: OpsSink,
{
    pub fn new(client: C, media: M, sink: S, incident_id: String, call_id: String) -> Self {
        Self {
            client,
            media,
            sink,
            incident_id,
            call_id,
            phase: CallPhase::Idle,
            ended: false,
        }
    }

    pub fn phase(&self) -> CallPhase {
        self.phase
    }

    /// Join the well-known call. Re-entry while initializing or active is a
    /// no-op, and a failed attempt returns to `Idle` without retrying; a
    /// human re-triggers.
    pub async fn start(&mut self) -> CallPhase {
        if self.phase != CallPhase::Idle || self.ended {
            return self.phase;
        }

        self.phase = CallPhase::Initializing;
        match self.client.join(CALL_TYPE, &self.call_id, true).await {
            Ok(()) => {
                self.phase = CallPhase::Active;
                self.sink.emit_json(
                    "call-joined",
                    serde_json::json!({"incidentId": self.incident_id, "callId": self.call_id}),
                );
            }
            Err(err) => {
                tracing::warn!(call_id = %self.call_id, error = %err, "call join failed");
                self.phase = CallPhase::Idle;
            }
        }
        self.phase
    }

    /// The leave waterfall. Every step is best-effort: a failure is logged
    /// and the next step still runs, and the ended signal is always reached.
    /// Explicit leave and teardown can both land here; only the first does
    /// anything.
    pub async fn leave(&mut self) {
        if self.ended || self.phase == CallPhase::Leaving {
            return;
        }
        self.ended = true;
        self.phase = CallPhase::Leaving;

        self.step("leave", self.client.leave()).await;
        self.step("disable-camera", self.client.disable_camera()).await;
        self.step("disable-microphone", self.client.disable_microphone())
            .await;
        self.step("release-media", self.media.release_all()).await;
        self.step("disconnect", self.client.disconnect_user()).await;

        self.phase = CallPhase::Idle;
        self.sink.emit_json(
            "call-ended",
            serde_json::json!({"incidentId": self.incident_id, "callId": self.call_id}),
        );
    }

    async fn step(&self, name: &str, op: impl Future<Output = Result<(), String>>) {
        if let Err(err) = op.await {
            tracing::warn!(call_id = %self.call_id, step = name, error = %err, "leave step failed");
            self.sink.emit_json(
                "call-step-failed",
                serde_json::json!({"incidentId": self.incident_id, "step": name, "error": err}),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::CaptureSink;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct ScriptedCall {
        log: Arc<Mutex<Vec<String>>>,
        join_fails: bool,
        camera_fails: bool,
    }

    impl ScriptedCall {
        fn calls(&self) -> Vec<String> {
            self.log.lock().expect("lock").clone()
        }

        fn count(&self, name: &str) -> usize {
            self.calls().iter().filter(|c| c.as_str() == name).count()
        }

        fn record(&self, name: &str) {
            self.log.lock().expect("lock").push(name.to_string());
        }
    }

    impl CallClient for ScriptedCall {
        async fn join(&self, _call_type: &str, _call_id: &str, _create: bool) -> Result<(), String> {
            self.record("join");
            if self.join_fails {
                return Err("sfu unreachable".into());
            }
            Ok(())
        }

        async fn leave(&self) -> Result<(), String> {
            self.record("leave");
            Ok(())
        }

        async fn disable_camera(&self) -> Result<(), String> {
            self.record("disable-camera");
            if self.camera_fails {
                return Err("camera track already gone".into());
            }
            Ok(())
        }

        async fn disable_microphone(&self) -> Result<(), String> {
            self.record("disable-microphone");
            Ok(())
        }

        async fn disconnect_user(&self) -> Result<(), String> {
            self.record("disconnect");
            Ok(())
        }
    }

    impl MediaTeardown for ScriptedCall {
        async fn release_all(&self) -> Result<(), String> {
            self.record("release-media");
            Ok(())
        }
    }

    fn session(client: ScriptedCall, sink: CaptureSink) -> CallSession<ScriptedCall, ScriptedCall, CaptureSink> {
        CallSession::new(
            client.clone(),
            client,
            sink,
            "abcdef0123".into(),
            "dispatch-room".into(),
        )
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let client = ScriptedCall::default();
        let mut call = session(client.clone(), CaptureSink::default());

        assert_eq!(call.start().await, CallPhase::Active);
        assert_eq!(call.start().await, CallPhase::Active);
        assert_eq!(client.count("join"), 1);
    }

    #[tokio::test]
    async fn failed_join_returns_to_idle_without_retry() {
        let client = ScriptedCall {
            join_fails: true,
            ..Default::default()
        };
        let sink = CaptureSink::default();
        let mut call = session(client.clone(), sink.clone());

        assert_eq!(call.start().await, CallPhase::Idle);
        assert_eq!(client.count("join"), 1);
        assert_eq!(sink.events_named("call-joined"), 0);
    }

    #[tokio::test]
    async fn leave_runs_the_full_waterfall_in_order() {
        let client = ScriptedCall::default();
        let sink = CaptureSink::default();
        let mut call = session(client.clone(), sink.clone());

        call.start().await;
        call.leave().await;

        assert_eq!(
            client.calls(),
            vec![
                "join",
                "leave",
                "disable-camera",
                "disable-microphone",
                "release-media",
                "disconnect"
            ]
        );
        assert_eq!(sink.events_named("call-ended"), 1);
        assert_eq!(call.phase(), CallPhase::Idle);
    }

    #[tokio::test]
    async fn camera_failure_still_reaches_disconnect_and_navigation() {
        let client = ScriptedCall {
            camera_fails: true,
            ..Default::default()
        };
        let sink = CaptureSink::default();
        let mut call = session(client.clone(), sink.clone());

        call.start().await;
        call.leave().await;

        assert_eq!(client.count("disconnect"), 1);
        assert_eq!(sink.events_named("call-step-failed"), 1);
        assert_eq!(sink.events_named("call-ended"), 1);
    }

    #[tokio::test]
    async fn double_leave_disconnects_exactly_once() {
        let client = ScriptedCall::default();
        let sink = CaptureSink::default();
        let mut call = session(client.clone(), sink.clone());

        call.start().await;
        call.leave().await;
        call.leave().await;

        assert_eq!(client.count("disconnect"), 1);
        assert_eq!(sink.events_named("call-ended"), 1);
    }

    #[tokio::test]
    async fn start_after_teardown_stays_down() {
        let client = ScriptedCall::default();
        let mut call = session(client.clone(), CaptureSink::default());

        call.start().await;
        call.leave().await;
        assert_eq!(call.start().await, CallPhase::Idle);
        assert_eq!(client.count("join"), 1);
    }
}
