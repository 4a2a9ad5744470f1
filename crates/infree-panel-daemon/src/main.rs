//! infree Panel Daemon
//!
//! Device-side service: receives framed commands over the USB gadget serial
//! port and drives the panel backlight and display.

mod backlight;
mod config;
mod lifecycle;
mod screen;
mod transport;

use anyhow::{Context, Result};
use infree_panel_core::{ByteQueue, Dispatcher};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use backlight::SysfsBacklight;
use config::Config;
use lifecycle::{PanelLifecycle, Watchdog};
use screen::PanelScreen;
use transport::SerialTransport;

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/default.toml".to_string());

    let config = Config::load(&config_path).context("Failed to load configuration")?;
    info!("Loaded configuration from: {}", config_path);

    // Collaborators
    let backlight = SysfsBacklight::open(config.backlight.path.as_deref())
        .context("Failed to open backlight")?;
    let screen = PanelScreen::new(&config.display);

    // Transport and the queue between ingestion and dispatch
    let queue = Arc::new(ByteQueue::new(config.protocol.queue_capacity));
    let transport = SerialTransport::open(&config.transport)?;
    let ack = transport.ack();
    let lifecycle = PanelLifecycle::new(&config.lifecycle, transport.flush_handle());
    transport.spawn(queue.clone(), &config.protocol);

    // Start dispatch loop
    let dispatcher = Dispatcher::with_max_frame(
        queue,
        ack,
        backlight,
        screen,
        lifecycle,
        config.protocol.max_frame,
    );
    tokio::spawn(dispatcher.run());

    // Start watchdog
    if let Some(path) = &config.lifecycle.watchdog {
        match Watchdog::open(path) {
            Ok(watchdog) => {
                let interval = Duration::from_millis(config.lifecycle.watchdog_interval);
                tokio::spawn(lifecycle::watchdog_loop(watchdog, interval));
            }
            Err(e) => warn!(
                "Failed to open watchdog {}: {}. Continuing without it.",
                path.display(),
                e
            ),
        }
    }

    // Setup Unix signal handlers
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    info!(
        "Panel {}x{} ready on {}",
        config.display.width, config.display.height, config.transport.device
    );

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down");
        }
    }

    Ok(())
}
