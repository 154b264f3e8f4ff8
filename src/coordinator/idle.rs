//! Idle screen arbitration
//!
//! When the device falls idle, each idle-capable skill is asked in turn
//! whether it wants the screen. First acceptor wins; the configured default
//! display skill sits at the end of the chain as the fallback candidate.

use serde_json::json;
use tracing::{debug, warn};

use crate::bus::{topic, Message};

use super::Coordinator;

impl Coordinator {
    /// Arbitrate the idle screen
    ///
    /// Clears the feedback state first, then offers the screen to each skill
    /// in chain order with a bounded wait per attempt. Returns the id of the
    /// accepting skill, or `None` when the whole chain declines, in which
    /// case no screen is shown and whatever the GUI last rendered stays up.
    pub async fn handle_idle(&self) -> Option<String> {
        let cleared = self.state.write().await.idle_reset();
        self.announce_feedback(Some(cleared));

        // The state lock is not held during the waits below; other events
        // keep flowing while skills make up their minds.
        for skill_id in &self.idle_skill_chain {
            let request = Message::new(topic::GUI_HANDLE_IDLE, json!({ "skill_id": skill_id }));
            let reply = self
                .bus
                .wait_for_response(request, self.idle_reply_timeout)
                .await;

            match reply {
                Some(reply) if reply.bool_field("handled") => {
                    debug!(skill_id, "idle screen handled");
                    return Some(skill_id.clone());
                }
                Some(_) => debug!(skill_id, "declined idle screen"),
                None => debug!(skill_id, "no reply to idle offer"),
            }
        }

        warn!("no skill took the idle screen");
        None
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tokio::sync::mpsc;

    use crate::bus::{topic, BusClient, Message};
    use crate::coordinator::testutil::coordinator_with_chain;
    use crate::coordinator::Coordinator;

    /// Answer gui.handle-idle requests according to `answers`
    /// (skill id -> handled); anything absent is left to time out.
    /// Returns the skill ids queried, in order.
    async fn run_arbitration(
        coordinator: Arc<Coordinator>,
        bus: BusClient,
        mut outbound: mpsc::UnboundedReceiver<Message>,
        answers: Vec<(&str, bool)>,
    ) -> (Option<String>, Vec<String>) {
        let mut arbitration = tokio::spawn(async move { coordinator.handle_idle().await });

        let mut queried = Vec::new();
        let winner = loop {
            tokio::select! {
                result = &mut arbitration => break result.unwrap(),
                msg = outbound.recv() => {
                    let Some(msg) = msg else { continue };
                    if msg.topic != topic::GUI_HANDLE_IDLE {
                        continue;
                    }
                    let skill_id = msg.str_field("skill_id").unwrap();
                    queried.push(skill_id.clone());
                    if let Some((_, handled)) = answers.iter().find(|(id, _)| *id == skill_id) {
                        bus.dispatch_inbound(msg.response(json!({ "handled": handled })));
                    }
                }
            }
        };

        (winner, queried)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_acceptor_wins_in_order() {
        let (coordinator, bus, outbound) =
            coordinator_with_chain(&["a", "b", "c", "homescreen"], "homescreen");

        let (winner, queried) = run_arbitration(
            coordinator,
            bus,
            outbound,
            vec![("a", false), ("b", false), ("c", true)],
        )
        .await;

        assert_eq!(winner.as_deref(), Some("c"));
        assert_eq!(queried, vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_earlier_acceptor_preempts_rest() {
        let (coordinator, bus, outbound) =
            coordinator_with_chain(&["a", "b", "homescreen"], "homescreen");

        let (winner, queried) =
            run_arbitration(coordinator, bus, outbound, vec![("a", true), ("b", true)]).await;

        assert_eq!(winner.as_deref(), Some("a"));
        assert_eq!(queried, vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_skill_times_out_and_chain_advances() {
        let (coordinator, bus, outbound) =
            coordinator_with_chain(&["a", "b", "homescreen"], "homescreen");

        // "a" never answers; "b" takes the screen after the timeout
        let (winner, queried) =
            run_arbitration(coordinator, bus, outbound, vec![("b", true)]).await;

        assert_eq!(winner.as_deref(), Some("b"));
        assert_eq!(queried, vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_chain_reports_no_screen() {
        let (coordinator, bus, outbound) =
            coordinator_with_chain(&["a", "b", "homescreen"], "homescreen");

        let (winner, queried) = run_arbitration(coordinator, bus, outbound, vec![]).await;

        assert!(winner.is_none());
        assert_eq!(queried, vec!["a", "b", "homescreen"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_clears_feedback_before_arbitration() {
        let (coordinator, bus, mut outbound) = coordinator_with_chain(&["homescreen"], "homescreen");

        coordinator
            .handle_message(Message::new(topic::AWOKEN, json!({"session_id": "s1"})))
            .await;
        while outbound.try_recv().is_ok() {}

        let handle = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.handle_idle().await }
        });

        // The asleep command goes out before any skill is offered the screen
        let first = outbound.recv().await.unwrap();
        assert_eq!(first.topic, topic::FEEDBACK_SET_STATE);
        assert_eq!(first.str_field("state").as_deref(), Some("asleep"));

        let offer = outbound.recv().await.unwrap();
        assert_eq!(offer.topic, topic::GUI_HANDLE_IDLE);
        bus.dispatch_inbound(offer.response(json!({"handled": true})));

        assert_eq!(handle.await.unwrap().as_deref(), Some("homescreen"));
    }
}
