//! Feedback state machine
//!
//! Tracks the device's outward indicator (LED pattern) across conversational
//! sessions. A session that moves the state away from asleep becomes its
//! owner; only that session's end resets the state, except an idle trigger
//! which clears it unconditionally.

use serde::{Deserialize, Serialize};

/// The three visual feedback states of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackState {
    /// No interaction in progress
    Asleep,
    /// Wake word heard, listening
    Awake,
    /// Processing a request
    Thinking,
}

impl Default for FeedbackState {
    fn default() -> Self {
        Self::Asleep
    }
}

impl FeedbackState {
    /// Wire name used in feedback.set-state payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackState::Asleep => "asleep",
            FeedbackState::Awake => "awake",
            FeedbackState::Thinking => "thinking",
        }
    }
}

impl std::fmt::Display for FeedbackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide device state, guarded by the coordinator's lock
#[derive(Debug, Default)]
pub struct DeviceState {
    /// Current visual feedback state
    pub feedback: FeedbackState,
    /// Session that most recently claimed the feedback state
    pub owning_session: Option<String>,
    /// Set once by the startup-finished sequence, never reset
    pub ready: bool,
}

impl DeviceState {
    /// Wake word heard: go awake, the waking session takes ownership
    ///
    /// Each transition method returns the state to announce on the bus, or
    /// `None` when the event's guard rejected it.
    pub fn wake(&mut self, session_id: Option<String>) -> Option<FeedbackState> {
        self.feedback = FeedbackState::Awake;
        self.owning_session = session_id;
        Some(FeedbackState::Awake)
    }

    /// A skill responded: go thinking, the responding session takes ownership
    pub fn skill_response(&mut self, session_id: Option<String>) -> Option<FeedbackState> {
        self.feedback = FeedbackState::Thinking;
        self.owning_session = session_id;
        Some(FeedbackState::Thinking)
    }

    /// A session started: go thinking unless the idle-display skill started
    /// it (idle screens must not light up the device)
    pub fn session_started(
        &mut self,
        session_id: Option<String>,
        skill_id: Option<&str>,
        idle_display_skill: &str,
    ) -> Option<FeedbackState> {
        if skill_id == Some(idle_display_skill) {
            return None;
        }
        self.feedback = FeedbackState::Thinking;
        self.owning_session = session_id;
        Some(FeedbackState::Thinking)
    }

    /// A session ended: back to asleep only if the owning session ended
    pub fn session_ended(&mut self, session_id: Option<&str>) -> Option<FeedbackState> {
        if session_id.is_none() || session_id != self.owning_session.as_deref() {
            return None;
        }
        self.feedback = FeedbackState::Asleep;
        self.owning_session = None;
        Some(FeedbackState::Asleep)
    }

    /// Idle trigger: clear to asleep regardless of ownership
    pub fn idle_reset(&mut self) -> FeedbackState {
        self.feedback = FeedbackState::Asleep;
        self.owning_session = None;
        FeedbackState::Asleep
    }
}
