use crate::backend::IncidentBackend;
use crate::sink::OpsSink;
use incident_registry::{CanonicalIncidentV1, ResponderNotification};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};

pub const ON_SCENE_STATUS: &str = "onscene";

#[derive(Clone, Debug)]
pub struct StatusConfig {
    pub poll_interval: Duration,
    pub dismiss_after: Duration,
    pub navigate_after: Duration,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            dismiss_after: Duration::from_secs(5),
            navigate_after: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StatusEffect {
    OnSceneNotice,
    MarkNotificationRead,
    FinishedNotice,
}

/// One-shot latches for the two notifications. Pure transition logic; the
/// polling loop owns the timers around it.
#[derive(Debug, Default)]
pub struct StatusTracker {
    status: Option<String>,
    on_scene_notified: bool,
    finished: bool,
}

impl StatusTracker {
    pub fn observe(&mut self, incident: &CanonicalIncidentV1) -> Vec<StatusEffect> {
        let mut effects = Vec::new();
        if self.finished {
            return effects;
        }

        if incident.is_finished {
            self.finished = true;
            effects.push(StatusEffect::FinishedNotice);
            return effects;
        }

        if let Some(status) = &incident.responder_status {
            self.status = Some(status.clone());
        }

        if !self.on_scene_notified
            && incident.responder_status.as_deref() == Some(ON_SCENE_STATUS)
            && incident.responder_notification == ResponderNotification::Unread
        {
            self.on_scene_notified = true;
            effects.push(StatusEffect::OnSceneNotice);
            effects.push(StatusEffect::MarkNotificationRead);
        }

        effects
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatusSnapshot {
    pub responder_status: Option<String>,
    pub on_scene_visible: bool,
    pub finished_visible: bool,
    pub stopped: bool,
}

#[derive(Clone, Copy, Debug)]
enum StatusCommand {
    DismissOnScene,
    DismissFinished,
}

pub struct StatusHandle {
    snapshot_rx: watch::Receiver<StatusSnapshot>,
    commands: mpsc::UnboundedSender<StatusCommand>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl StatusHandle {
    pub fn snapshot(&self) -> watch::Receiver<StatusSnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn dismiss_on_scene(&self) {
        let _ = self.commands.send(StatusCommand::DismissOnScene);
    }

    pub fn dismiss_finished(&self) {
        let _ = self.commands.send(StatusCommand::DismissFinished);
    }

    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    pub async fn join(self) {
        let _ = self.task.await;
    }
}

/// Polls the incident on a fixed interval and surfaces the on-scene and
/// finished notifications, each at most once. Fetch failures are logged and
/// the next cycle proceeds; a fetch still in flight delays the next tick, so
/// cycles never overlap.
pub fn spawn<B, S>(backend: B, sink: S, incident_id: String, config: StatusConfig) -> StatusHandle
where
    B: IncidentBackend,
    S: OpsSink,
{
    let (shutdown, mut shutdown_rx) = watch::channel(false);
    let (commands, mut command_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = watch::channel(StatusSnapshot::default());

    let task = tokio::spawn(async move {
        let mut tracker = StatusTracker::default();
        let mut snapshot = StatusSnapshot::default();
        let mut ticker = interval(config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let far_future = Instant::now() + Duration::from_secs(86_400);
        let mut dismiss_timer = Box::pin(sleep_until(far_future));
        let mut dismiss_armed = false;
        let mut navigate_timer = Box::pin(sleep_until(far_future));
        let mut navigate_armed = false;
        let mut polling = true;

        loop {
            tokio::select! {
                _ = ticker.tick(), if polling => {
                    let incident = match backend.fetch_incident(&incident_id).await {
                        Ok(incident) => incident,
                        Err(err) => {
                            tracing::warn!(incident_id = %incident_id, error = %err, "status poll failed");
                            continue;
                        }
                    };

                    for effect in tracker.observe(&incident) {
                        match effect {
                            StatusEffect::OnSceneNotice => {
                                snapshot.on_scene_visible = true;
                                sink.emit_json(
                                    "responder-on-scene",
                                    serde_json::json!({"incidentId": incident_id, "status": ON_SCENE_STATUS}),
                                );
                                dismiss_timer.as_mut().reset(Instant::now() + config.dismiss_after);
                                dismiss_armed = true;
                            }
                            StatusEffect::MarkNotificationRead => {
                                let backend = backend.clone();
                                let id = incident_id.clone();
                                tokio::spawn(async move {
                                    let patch = serde_json::json!({"responderNotification": "read"});
                                    if let Err(err) = backend.update_incident(&id, patch).await {
                                        tracing::warn!(incident_id = %id, error = %err, "read-receipt write failed");
                                    }
                                });
                            }
                            StatusEffect::FinishedNotice => {
                                snapshot.finished_visible = true;
                                polling = false;
                                sink.emit_json(
                                    "incident-finished",
                                    serde_json::json!({"incidentId": incident_id}),
                                );
                                navigate_timer.as_mut().reset(Instant::now() + config.navigate_after);
                                navigate_armed = true;
                            }
                        }
                    }

                    snapshot.responder_status = tracker.status().map(ToString::to_string);
                    let _ = snapshot_tx.send(snapshot.clone());
                }
                _ = dismiss_timer.as_mut(), if dismiss_armed => {
                    dismiss_armed = false;
                    snapshot.on_scene_visible = false;
                    sink.emit_json(
                        "notice-dismissed",
                        serde_json::json!({"incidentId": incident_id, "notice": "on-scene", "auto": true}),
                    );
                    let _ = snapshot_tx.send(snapshot.clone());
                }
                _ = navigate_timer.as_mut(), if navigate_armed => {
                    sink.emit_json(
                        "navigate-summary",
                        serde_json::json!({"incidentId": incident_id, "to": "summary"}),
                    );
                    break;
                }
                Some(command) = command_rx.recv() => {
                    match command {
                        StatusCommand::DismissOnScene => {
                            dismiss_armed = false;
                            if snapshot.on_scene_visible {
                                snapshot.on_scene_visible = false;
                                sink.emit_json(
                                    "notice-dismissed",
                                    serde_json::json!({"incidentId": incident_id, "notice": "on-scene", "auto": false}),
                                );
                                let _ = snapshot_tx.send(snapshot.clone());
                            }
                        }
                        StatusCommand::DismissFinished => {
                            if snapshot.finished_visible {
                                snapshot.finished_visible = false;
                                sink.emit_json(
                                    "notice-dismissed",
                                    serde_json::json!({"incidentId": incident_id, "notice": "finished", "auto": false}),
                                );
                            }
                            if navigate_armed {
                                // operator chose to stay; nothing left to schedule
                                break;
                            }
                            let _ = snapshot_tx.send(snapshot.clone());
                        }
                    }
                }
                _ = shutdown_rx.changed() => break,
            }
        }

        snapshot.stopped = true;
        let _ = snapshot_tx.send(snapshot);
    });

    StatusHandle {
        snapshot_rx,
        commands,
        shutdown,
        task,
    }
}
