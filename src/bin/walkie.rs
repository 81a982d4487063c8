//! Push-to-talk node
//!
//! Holds transmit while the button is asserted and plays what other nodes
//! broadcast otherwise.
//!
//! Usage: `walkie [CONFIG]`

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ptt_relay::{
    audio::{list_devices, CpalBackend},
    config::AppConfig,
    input,
    network::UdpBroadcastTransport,
    ptt::{PushToTalkController, SystemClock},
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

    tracing::info!("Starting push-to-talk relay");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref()).context("loading configuration")?;

    for device in list_devices() {
        let direction = match (device.is_input, device.is_output) {
            (true, true) => "Input/Output",
            (true, false) => "Input",
            (false, true) => "Output",
            _ => "Unknown",
        };
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        tracing::info!(
            "Audio device: {} ({}){} rates {:?} channels {:?}",
            device.name,
            direction,
            default_marker,
            device.sample_rates,
            device.channels
        );
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let worker_shutdown = shutdown.clone();

    // cpal streams are not Send: everything audio is built on the worker.
    let worker = tokio::task::spawn_blocking(move || -> Result<()> {
        let transport = UdpBroadcastTransport::new(config.link.clone())?;
        tracing::info!("Node id {}", transport.node());
        let input = input::from_config(&config.input).context("opening push-to-talk input")?;

        let mut controller = PushToTalkController::new(
            CpalBackend::new(),
            transport,
            input,
            SystemClock::new(),
            config.audio.clone(),
            &config.ptt,
        );
        controller.run(&worker_shutdown)?;
        Ok(())
    });
    tokio::pin!(worker);

    tokio::select! {
        result = &mut worker => {
            return result.context("relay worker panicked")?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for Ctrl-C")?;
            tracing::info!("Shutting down");
            shutdown.store(true, Ordering::SeqCst);
        }
    }

    worker.await.context("relay worker panicked")?
}
