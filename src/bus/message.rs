//! Bus message type and topic names
//!
//! All messages are JSON objects with a topic and a free-form data payload.
//! On the wire they are prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Topics consumed and emitted by the daemon
pub mod topic {
    // Consumed
    /// Wake word detected (data: session_id)
    pub const AWOKEN: &str = "listener.awoken";
    /// A skill produced a response (data: session_id)
    pub const SKILL_RESPONSE: &str = "skill.response";
    /// A conversational session started (data: session_id, skill_id)
    pub const SESSION_STARTED: &str = "session.started";
    /// A conversational session ended (data: session_id)
    pub const SESSION_ENDED: &str = "session.ended";
    /// Device became idle, an idle screen must be chosen
    pub const GUI_IDLE: &str = "gui.idle";
    /// GUI (re)connected and needs the idle screen restored
    pub const GUI_CONNECTED: &str = "gui.connected";
    /// Speech was captured but not understood
    pub const RECOGNITION_UNKNOWN: &str = "listener.recognition-unknown";
    /// Hardware switch changed (data: name, state)
    pub const SWITCH_STATE: &str = "switch.state";
    /// Device finished connecting and loading; run the ready sequence
    pub const STARTUP_FINISHED: &str = "startup.finished";
    /// Query whether the device is ready (request/response)
    pub const READY_GET: &str = "ready.get";

    // Emitted
    /// Stop any text-to-speech output
    pub const TTS_STOP: &str = "tts.stop";
    /// Set the LED/visual feedback state (data: state)
    pub const FEEDBACK_SET_STATE: &str = "feedback.set-state";
    /// Mute the microphone
    pub const MIC_MUTE: &str = "mic.mute";
    /// Unmute the microphone
    pub const MIC_UNMUTE: &str = "mic.unmute";
    /// Start listening for a voice command
    pub const MIC_LISTEN: &str = "mic.listen";
    /// Skills are loaded and initialized
    pub const SKILLS_INITIALIZED: &str = "skills.initialized";
    /// Ask all switches to report their current state
    pub const SWITCH_REPORT_STATES: &str = "switch.report-states";
    /// Configuration may have changed; consumers should reload
    pub const CONFIGURATION_UPDATED: &str = "configuration.updated";
    /// Device is fully ready
    pub const READY: &str = "ready";
    /// Set the output volume (data: percent, no_osd)
    pub const VOLUME_SET: &str = "volume.set";
    /// Ask a skill to take over the idle screen (request, data: skill_id;
    /// reply data: handled)
    pub const GUI_HANDLE_IDLE: &str = "gui.handle-idle";
    /// Tell the connectivity-check activity to stop
    pub const CONNECT_CHECK_STOP: &str = "connect-check.stop";
}

/// A single bus message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Topic name, e.g. "session.started"
    pub topic: String,

    /// Free-form payload; handlers read fields defensively
    #[serde(default)]
    pub data: Value,

    /// Correlation id, set on requests expecting a reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The id of the request this message replies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_to: Option<String>,
}

impl Message {
    /// Create a message with no correlation id
    pub fn new(topic: impl Into<String>, data: Value) -> Self {
        Self {
            topic: topic.into(),
            data,
            id: None,
            response_to: None,
        }
    }

    /// Build a reply to this message on the `<topic>.response` topic
    pub fn response(&self, data: Value) -> Self {
        Self {
            topic: format!("{}.response", self.topic),
            data,
            id: None,
            response_to: self.id.clone(),
        }
    }

    /// Read a string field from the payload, if present
    pub fn str_field(&self, name: &str) -> Option<String> {
        self.data.get(name).and_then(Value::as_str).map(str::to_owned)
    }

    /// Read a bool field from the payload, defaulting to false
    pub fn bool_field(&self, name: &str) -> bool {
        self.data
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_serialization() {
        let msg = Message::new(topic::SWITCH_STATE, json!({"name": "mute", "state": "off"}));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("switch.state"));
        assert!(json.contains("mute"));
        // Unset correlation fields are omitted from the wire format
        assert!(!json.contains("response_to"));
    }

    #[test]
    fn test_message_deserialization_defaults() {
        let json = r#"{"topic":"gui.idle"}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.topic, topic::GUI_IDLE);
        assert!(msg.data.is_null());
        assert!(msg.id.is_none());
    }

    #[test]
    fn test_response_correlation() {
        let mut req = Message::new(topic::READY_GET, json!({}));
        req.id = Some("42".to_string());

        let reply = req.response(json!({"ready": true}));
        assert_eq!(reply.topic, "ready.get.response");
        assert_eq!(reply.response_to.as_deref(), Some("42"));
        assert!(reply.bool_field("ready"));
    }

    #[test]
    fn test_absent_fields_read_as_none() {
        let msg = Message::new(topic::SESSION_ENDED, json!({}));
        assert!(msg.str_field("session_id").is_none());
        assert!(!msg.bool_field("handled"));
    }
}
