//! # Garage Bridge Daemon
//!
//! Process entry point for the local bus ↔ cloud shadow bridge.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         garage-bridged                                  │
//! │                                                                         │
//! │  sensor ──► local broker ──► MqttLocalBus ──┐                           │
//! │                                              ▼                          │
//! │                                  SynchronizationBridge                  │
//! │                                              │                          │
//! │  cloud shadow ◄── TLS ◄── AwsShadowClient ◄──┘                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `garage-bridged [CONFIG_PATH]`. Without an argument the path comes
//! from `GARAGE_BRIDGE_CONFIG`, then the per-user config directory.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use garage_bridge::{
    AwsShadowClient, BridgeConfig, BridgeEventEmitter, BridgeStatus, CloudTransportManager,
    LocalTransportManager, MqttLocalBus, SynchronizationBridge,
};
use garage_core::{GarageCommand, TopicSet};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const CONFIG_ENV: &str = "GARAGE_BRIDGE_CONFIG";

/// Writes bridge notifications to the log.
struct LogEmitter;

impl BridgeEventEmitter for LogEmitter {
    fn emit_status(&self, status: &BridgeStatus) {
        info!(
            local = %status.local_state,
            cloud = %status.cloud_state,
            hardware_dead = status.hardware_dead,
            sent = status.updates_sent,
            dropped = status.updates_dropped,
            commands = status.commands_dispatched,
            "Bridge status"
        );
    }

    fn emit_command(&self, command: GarageCommand, sequence_token: u64) {
        info!(%command, token = sequence_token, "Door command relayed");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,garage=debug,rumqttc=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Bridge exited with error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
    let config = BridgeConfig::load(config_path).context("loading configuration")?;
    info!(
        local = %format!("{}:{}", config.local.host, config.local.port),
        cloud = %format!("{}:{}", config.cloud.host, config.cloud.port),
        thing = %config.cloud.thing_name,
        "Configuration loaded"
    );

    let (bus, local_events) = MqttLocalBus::new(config.local.clone());
    let local = LocalTransportManager::new(
        bus,
        TopicSet::garage(),
        config.local.qos()?,
        config.local.reconnect_policy(),
    );

    let certificates = config
        .cloud
        .certificate_paths()
        .context("resolving certificate directory")?;
    let (shadow, cloud_events) = AwsShadowClient::new(config.cloud.max_in_flight_acks);
    let cloud = CloudTransportManager::new(shadow, &config.cloud, certificates);

    let bridge =
        SynchronizationBridge::new(local, cloud, &config.health).with_emitter(Arc::new(LogEmitter));
    bridge.start().await?;

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(()).await;
    });

    bridge.run(local_events, cloud_events, shutdown_rx).await;
    info!("Bridge shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
