//! # garage-bridge: Local Bus ↔ Cloud Shadow Bridge
//!
//! This crate connects the garage sensor's local MQTT broker to its cloud
//! device shadow. Telemetry flows up as reported state, door commands flow
//! down from shadow deltas.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Bridge Architecture                            │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                SynchronizationBridge (orchestrator)              │  │
//! │  │                                                                  │  │
//! │  │  Owns the shadow model, command tracker and health monitor      │  │
//! │  │  Runs the 1 s service loop                                       │  │
//! │  └───────────────┬──────────────────────────────────┬───────────────┘  │
//! │                  ▼                                  ▼                   │
//! │  ┌───────────────────────────────┐  ┌───────────────────────────────┐  │
//! │  │ LocalTransportManager         │  │ CloudTransportManager         │  │
//! │  │                               │  │                               │  │
//! │  │ Subscribes hardware topics    │  │ Session lock, update retries  │  │
//! │  │ Fixed-interval reconnect      │  │ Busy / reconnect handling     │  │
//! │  └───────────────┬───────────────┘  └───────────────┬───────────────┘  │
//! │                  ▼                                  ▼                   │
//! │  ┌───────────────────────────────┐  ┌───────────────────────────────┐  │
//! │  │ LocalBusClient                │  │ ShadowClient                  │  │
//! │  │  MqttLocalBus (rumqttc, TCP)  │  │  AwsShadowClient (rumqttc,    │  │
//! │  │                               │  │  mutual TLS)                  │  │
//! │  └───────────────────────────────┘  └───────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`bridge`] - Main `SynchronizationBridge` orchestrator
//! - [`config`] - Settings for both links and the health loop
//! - [`error`] - Bridge error types
//! - [`connection`] - Link state tracking
//! - [`retry`] - Reconnect and update retry policies
//! - [`local`] - Local bus seam and its transport manager
//! - [`local_mqtt`] - `rumqttc` local broker client
//! - [`cloud`] - Shadow client seam and its transport manager
//! - [`cloud_mqtt`] - `rumqttc` shadow client over TLS
//!
//! ## Usage
//!
//! ```rust,ignore
//! use garage_bridge::{BridgeConfig, MqttLocalBus, AwsShadowClient};
//!
//! let config = BridgeConfig::load(None)?;
//! let (bus, local_rx) = MqttLocalBus::new(config.local.clone());
//! let (shadow, cloud_rx) = AwsShadowClient::new(config.cloud.max_in_flight_acks);
//!
//! let bridge = SynchronizationBridge::new(local, cloud, &config.health);
//! bridge.start().await?;
//! bridge.run(local_rx, cloud_rx, shutdown_rx).await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod bridge;
pub mod cloud;
pub mod cloud_mqtt;
pub mod config;
pub mod connection;
pub mod error;
pub mod local;
pub mod local_mqtt;
pub mod retry;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use bridge::{BridgeEventEmitter, BridgeStatus, NoOpEmitter, SynchronizationBridge};
pub use cloud::{
    AckStatus, CloudTransportManager, DropReason, PublishOutcome, ShadowClient, ShadowEvent,
    YieldOutcome,
};
pub use cloud_mqtt::AwsShadowClient;
pub use config::{BridgeConfig, CertificatePaths, CloudSettings, HealthSettings, LocalSettings};
pub use connection::ConnectionState;
pub use error::{BridgeError, BridgeResult};
pub use local::{LocalBusClient, LocalEvent, LocalTransportManager, MessageDisposition};
pub use local_mqtt::MqttLocalBus;
pub use retry::{ReconnectPolicy, ShadowRetryPolicy};
