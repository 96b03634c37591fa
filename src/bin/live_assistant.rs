//! Live Assistant
//!
//! Talks to the remote voice assistant through the default microphone and
//! speaker, with a local control UI. Pass `--ui-only` to wait for a start
//! request from the UI instead of starting immediately.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use navigator_live::{
    audio::{device::list_devices, CpalDevices},
    config::AppConfig,
    network::WebSocketConnector,
    ui::WebServer,
    LiveSession, SessionEvent,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Navigator Live Assistant");

    let ui_only = std::env::args().skip(1).any(|arg| arg == "--ui-only");

    let config = AppConfig::load()?;
    if let Some(path) = AppConfig::config_path() {
        tracing::info!("Config file: {}", path.display());
    }

    println!("\n=== Available Audio Devices ===");
    for device in list_devices() {
        let direction = if device.is_input { "Input" } else { "Output" };
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {} ({}){}:", device.name, direction, default_marker);
        println!("    ID: {}", device.id);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();

    let session = Arc::new(LiveSession::new(
        config.clone(),
        Arc::new(CpalDevices),
        Arc::new(WebSocketConnector::new()),
    ));

    // Mirror session events to the console
    let mut events = session.events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::StateChanged { state }) => tracing::info!("Session {}", state),
                Ok(SessionEvent::SpeakingChanged { speaking }) => {
                    tracing::info!("{}", if speaking { "Assistant speaking" } else { "Listening" })
                }
                Ok(SessionEvent::TurnComplete) => tracing::debug!("Turn complete"),
                Ok(SessionEvent::Text { text }) => println!("Navigator: {}", text),
                Ok(SessionEvent::Error { kind, message }) => {
                    tracing::error!("Session error ({:?}): {}", kind, message)
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let web_handle = if config.ui.enabled {
        let server = WebServer::new(&config.ui, session.clone())?;
        tracing::info!("Web UI available at http://{}", server.addr());
        Some(server.start_background(async move {
            let _ = shutdown_rx.await;
        }))
    } else {
        None
    };

    if !ui_only {
        if let Err(e) = session.start().await {
            tracing::error!("Could not start live session: {}", e);
        }
    }

    tracing::info!("Press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    session.stop();
    let _ = shutdown_tx.send(());
    if let Some(handle) = web_handle {
        if let Ok(Err(e)) = handle.await {
            tracing::warn!("Web server error: {}", e);
        }
    }

    let status = session.status();
    tracing::info!(
        "Session summary: {} frames sent, {} chunks played, {} chunks dropped",
        status.frames_sent,
        status.chunks_played,
        status.chunks_dropped
    );

    Ok(())
}
