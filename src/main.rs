//! presence-daemon: presence and feedback coordinator for a voice assistant
//!
//! This daemon connects to the assistant message bus and provides:
//! - Visual/LED feedback state tracking across conversational sessions
//! - Idle screen arbitration between idle-capable skills
//! - Hardware switch translation (mute, action button)
//! - The one-shot startup-finished sequence that marks the device ready
//!
//! It holds no persistent state; everything is rebuilt from bus traffic.

mod bus;
mod config;
mod coordinator;
mod lifecycle;

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::bus::BusClient;
use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::lifecycle::ShutdownSignal;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "presence-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    info!(?config.bus_socket_path, ?config.idle_display_skill, "configuration loaded");

    // Create shutdown signal handler
    let shutdown = ShutdownSignal::new();

    // Connect to the message bus
    let (bus, mut event_rx) = BusClient::connect(&config.bus_socket_path).await?;

    // Create the coordinator
    let coordinator = Arc::new(Coordinator::new(bus, &config));

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Dispatch bus events in arrival order; only the idle-arbitration
        // paths run as their own task (see Coordinator::dispatch)
        _ = async {
            while let Some(msg) = event_rx.recv().await {
                Arc::clone(&coordinator).dispatch(msg).await;
            }
            error!("bus connection lost");
        } => {}

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    info!("presence-daemon stopped");

    Ok(())
}
