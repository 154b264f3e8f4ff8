//! Presence coordinator: feedback state, idle arbitration, switches
//!
//! Routes each inbound bus message to its handler. Handlers never fail;
//! malformed or incomplete payloads fall through the guards as no-ops so one
//! bad event cannot take down delivery for the rest.

mod feedback;
mod idle;
mod switches;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::RwLock;
use tracing::debug;

use crate::bus::{topic, BusClient, Message};
use crate::config::Config;

pub use feedback::{DeviceState, FeedbackState};

/// The coordinator owning all process-wide presence state
pub struct Coordinator {
    bus: BusClient,
    /// Ordered idle-screen chain; the default display skill is always last
    idle_skill_chain: Vec<String>,
    idle_display_skill: String,
    idle_reply_timeout: Duration,
    default_volume_percent: f64,
    state: RwLock<DeviceState>,
    /// First-run guard for the startup-finished sequence
    startup_done: AtomicBool,
}

impl Coordinator {
    /// Create a coordinator publishing through the given bus client
    pub fn new(bus: BusClient, config: &Config) -> Self {
        Self {
            bus,
            idle_skill_chain: config.idle_skill_chain(),
            idle_display_skill: config.idle_display_skill.clone(),
            idle_reply_timeout: Duration::from_millis(config.idle_reply_timeout_ms),
            default_volume_percent: config.default_volume_percent,
            state: RwLock::new(DeviceState::default()),
            startup_done: AtomicBool::new(false),
        }
    }

    /// Route one inbound bus message, preserving same-topic ordering
    ///
    /// Emit-and-return handlers run inline so events are processed in
    /// arrival order; handlers that wait on idle-screen replies run as their
    /// own task so the wait cannot stall delivery of unrelated events.
    pub async fn dispatch(self: Arc<Self>, msg: Message) {
        if Self::blocks_for_replies(&msg.topic) {
            tokio::spawn(async move {
                self.handle_message(msg).await;
            });
        } else {
            self.handle_message(msg).await;
        }
    }

    /// Handlers for these topics wait on gui.handle-idle replies
    fn blocks_for_replies(topic: &str) -> bool {
        matches!(
            topic,
            topic::GUI_IDLE
                | topic::GUI_CONNECTED
                | topic::RECOGNITION_UNKNOWN
                | topic::STARTUP_FINISHED
        )
    }

    /// Dispatch one inbound bus message to its handler
    pub async fn handle_message(&self, msg: Message) {
        debug!(topic = %msg.topic, "bus message");

        match msg.topic.as_str() {
            topic::AWOKEN => self.handle_wake(&msg).await,
            topic::SKILL_RESPONSE => self.handle_skill_response(&msg).await,
            topic::SESSION_STARTED => self.handle_session_started(&msg).await,
            topic::SESSION_ENDED => self.handle_session_ended(&msg).await,
            topic::GUI_IDLE => {
                self.handle_idle().await;
            }
            // A reconnected GUI and an unrecognized utterance both land back
            // on the idle screen
            topic::GUI_CONNECTED | topic::RECOGNITION_UNKNOWN => {
                self.handle_idle().await;
            }
            topic::SWITCH_STATE => self.handle_switch_state(&msg),
            topic::STARTUP_FINISHED => self.handle_startup_finished().await,
            topic::READY_GET => self.handle_ready_get(&msg).await,
            other => debug!(topic = other, "unhandled topic"),
        }
    }

    /// Wake word heard: stop speaking, show awake
    async fn handle_wake(&self, msg: &Message) {
        self.bus.publish(topic::TTS_STOP, json!({}));

        let change = self.state.write().await.wake(msg.str_field("session_id"));
        self.announce_feedback(change);
    }

    async fn handle_skill_response(&self, msg: &Message) {
        let change = self
            .state
            .write()
            .await
            .skill_response(msg.str_field("session_id"));
        self.announce_feedback(change);
    }

    async fn handle_session_started(&self, msg: &Message) {
        let session_id = msg.str_field("session_id");
        let skill_id = msg.str_field("skill_id");

        let change = self.state.write().await.session_started(
            session_id,
            skill_id.as_deref(),
            &self.idle_display_skill,
        );
        self.announce_feedback(change);
    }

    async fn handle_session_ended(&self, msg: &Message) {
        let session_id = msg.str_field("session_id");

        let change = self
            .state
            .write()
            .await
            .session_ended(session_id.as_deref());
        self.announce_feedback(change);
    }

    /// Reply to a readiness query with the current flag
    async fn handle_ready_get(&self, msg: &Message) {
        let ready = self.state.read().await.ready;
        self.bus.send(msg.response(json!({ "ready": ready })));
    }

    /// Emit the feedback.set-state command for a guard-passing transition
    fn announce_feedback(&self, change: Option<FeedbackState>) {
        if let Some(state) = change {
            self.bus
                .publish(topic::FEEDBACK_SET_STATE, json!({ "state": state.as_str() }));
        }
    }
}
