//! Hardware switch handling and the startup-finished sequence

use std::sync::atomic::Ordering;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::bus::{topic, Message};

use super::Coordinator;

impl Coordinator {
    /// Translate a hardware switch event into a device command
    pub(super) fn handle_switch_state(&self, msg: &Message) {
        let name = msg.str_field("name");
        let state = msg.str_field("state");

        match (name.as_deref(), state.as_deref()) {
            // The off/inactive position of the mute switch means muted.
            // This looks inverted, but it is how the hardware is wired.
            (Some("mute"), Some("off")) => self.bus.publish(topic::MIC_MUTE, json!({})),
            (Some("mute"), _) => self.bus.publish(topic::MIC_UNMUTE, json!({})),
            // Action button wakes up the device
            (Some("action"), Some("on")) => self.bus.publish(topic::MIC_LISTEN, json!({})),
            _ => debug!(?name, ?state, "ignored switch event"),
        }
    }

    /// Run the one-shot ready sequence
    ///
    /// Skills must observe skills.initialized and configuration.updated
    /// before ready, and the volume and idle screen follow ready. A repeat
    /// startup-finished signal is ignored.
    pub(super) async fn handle_startup_finished(&self) {
        if self.startup_done.swap(true, Ordering::SeqCst) {
            warn!("duplicate startup-finished signal, ignored");
            return;
        }

        // Skills should have been loaded by now
        self.bus.publish(topic::SKILLS_INITIALIZED, json!({}));

        // Request switch states so mute is correctly shown
        self.bus.publish(topic::SWITCH_REPORT_STATES, json!({}));

        // Inform services that config may have changed
        self.bus.publish(topic::CONFIGURATION_UPDATED, json!({}));

        // Inform skills that we're ready
        self.state.write().await.ready = true;
        self.bus.publish(topic::READY, json!({}));
        info!("ready");

        // Set default volume, silently
        self.bus.publish(
            topic::VOLUME_SET,
            json!({ "percent": self.default_volume_percent, "no_osd": true }),
        );

        // Show the idle screen
        self.handle_idle().await;

        // The connectivity check has served its purpose
        self.bus.publish(topic::CONNECT_CHECK_STOP, json!({}));

        debug!("completed start up");
    }
}
