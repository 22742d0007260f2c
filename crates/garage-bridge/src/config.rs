//! # Bridge Configuration
//!
//! Configuration for both MQTT links and the health tick.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     GARAGE_CLOUD_HOST=abc123-ats.iot.eu-west-1.amazonaws.com           │
//! │     GARAGE_LOCAL_PASSWORD=...                                          │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/bridge/bridge.toml (Linux)                               │
//! │     ~/Library/Application Support/com.garage.bridge/bridge.toml        │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     Local broker on localhost:1883, thing "VirtualGarage"              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # bridge.toml
//! [local]
//! host = "192.168.1.20"
//! username = "ESP8266_1"
//! password = "mqtt_pw1"
//!
//! [cloud]
//! host = "abc123-ats.iot.eu-west-1.amazonaws.com"
//! thing_name = "VirtualGarage"
//! cert_dir = "certs"
//!
//! [health]
//! dead_after_secs = 2
//! report_every_ticks = 5
//! ```
//!
//! The cloud host has no usable default; validation fails until it is set.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rumqttc::QoS;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{BridgeError, BridgeResult};
use crate::retry::{ReconnectPolicy, ShadowRetryPolicy};

// =============================================================================
// Local Broker Settings
// =============================================================================

/// Settings for the plain MQTT link to the local broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSettings {
    #[serde(default = "default_local_host")]
    pub host: String,

    #[serde(default = "default_local_port")]
    pub port: u16,

    #[serde(default = "default_local_client_id")]
    pub client_id: String,

    #[serde(default = "default_local_username")]
    pub username: String,

    #[serde(default = "default_local_password")]
    pub password: String,

    #[serde(default = "default_local_keep_alive")]
    pub keep_alive_secs: u64,

    #[serde(default = "default_true")]
    pub clean_session: bool,

    /// QoS used for both subscriptions and publishes (0, 1 or 2).
    #[serde(default = "default_local_qos")]
    pub qos: u8,

    /// Fixed delay between reconnect attempts (milliseconds).
    #[serde(default = "default_local_reconnect_interval")]
    pub reconnect_interval_ms: u64,

    /// Maximum reconnect attempts. 0 retries forever.
    #[serde(default)]
    pub max_reconnect_attempts: u32,

    /// Time allowed for the CONNACK (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_local_host() -> String {
    "localhost".to_string()
}
fn default_local_port() -> u16 {
    1883
}
fn default_local_client_id() -> String {
    "LocalMQTTInterface".to_string()
}
fn default_local_username() -> String {
    "ESP8266_1".to_string()
}
fn default_local_password() -> String {
    "mqtt_pw1".to_string()
}
fn default_local_keep_alive() -> u64 {
    20
}
fn default_local_qos() -> u8 {
    1
}
fn default_local_reconnect_interval() -> u64 {
    2000
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_true() -> bool {
    true
}

impl Default for LocalSettings {
    fn default() -> Self {
        LocalSettings {
            host: default_local_host(),
            port: default_local_port(),
            client_id: default_local_client_id(),
            username: default_local_username(),
            password: default_local_password(),
            keep_alive_secs: default_local_keep_alive(),
            clean_session: true,
            qos: default_local_qos(),
            reconnect_interval_ms: default_local_reconnect_interval(),
            max_reconnect_attempts: 0,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl LocalSettings {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Returns the configured QoS level.
    pub fn qos(&self) -> BridgeResult<QoS> {
        qos_from_level(self.qos)
    }

    /// Reconnect policy derived from the interval and attempt cap.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            Duration::from_millis(self.reconnect_interval_ms),
            non_zero(self.max_reconnect_attempts),
        )
    }
}

// =============================================================================
// Cloud Shadow Settings
// =============================================================================

/// Settings for the TLS device-shadow session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudSettings {
    /// Shadow service endpoint. Required.
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_cloud_port")]
    pub port: u16,

    #[serde(default = "default_thing_name")]
    pub thing_name: String,

    #[serde(default = "default_cloud_client_id")]
    pub client_id: String,

    /// Certificate directory, relative to the working directory unless absolute.
    #[serde(default = "default_cert_dir")]
    pub cert_dir: PathBuf,

    #[serde(default = "default_root_ca_file")]
    pub root_ca_file: String,

    #[serde(default = "default_client_cert_file")]
    pub client_cert_file: String,

    #[serde(default = "default_private_key_file")]
    pub private_key_file: String,

    #[serde(default = "default_cloud_keep_alive")]
    pub keep_alive_secs: u64,

    /// Per-call poll timeout for the shadow session (milliseconds).
    #[serde(default = "default_yield_timeout")]
    pub yield_timeout_ms: u64,

    /// Time an update waits for accepted/rejected (seconds).
    #[serde(default = "default_ack_timeout")]
    pub ack_timeout_secs: u64,

    /// Capacity of a serialized update document (bytes).
    #[serde(default = "default_max_document_len")]
    pub max_document_len: usize,

    /// Largest delta document accepted (bytes).
    #[serde(default = "default_delta_buffer_len")]
    pub delta_buffer_len: usize,

    #[serde(default = "default_reconnect_wait")]
    pub reconnect_wait_ms: u64,

    #[serde(default = "default_not_idle_wait")]
    pub not_idle_wait_ms: u64,

    /// Consecutive not-idle yields tolerated before the session is restarted.
    #[serde(default = "default_not_idle_limit")]
    pub not_idle_limit: u32,

    /// Delay between failed update calls (milliseconds). 0 retries immediately.
    #[serde(default)]
    pub update_retry_delay_ms: u64,

    /// Maximum update call attempts. 0 retries forever.
    #[serde(default)]
    pub update_retry_limit: u32,

    /// Updates awaiting acknowledgement before the client reports not idle.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight_acks: usize,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_cloud_port() -> u16 {
    8883
}
fn default_thing_name() -> String {
    "VirtualGarage".to_string()
}
fn default_cloud_client_id() -> String {
    "GarageManager".to_string()
}
fn default_cert_dir() -> PathBuf {
    PathBuf::from("certs")
}
fn default_root_ca_file() -> String {
    "root".to_string()
}
fn default_client_cert_file() -> String {
    "cert".to_string()
}
fn default_private_key_file() -> String {
    "key".to_string()
}
fn default_cloud_keep_alive() -> u64 {
    600
}
fn default_yield_timeout() -> u64 {
    200
}
fn default_ack_timeout() -> u64 {
    4
}
fn default_max_document_len() -> usize {
    garage_core::MAX_UPDATE_DOCUMENT_LEN
}
fn default_delta_buffer_len() -> usize {
    513
}
fn default_reconnect_wait() -> u64 {
    1000
}
fn default_not_idle_wait() -> u64 {
    2000
}
fn default_not_idle_limit() -> u32 {
    50
}
fn default_max_in_flight() -> usize {
    10
}

impl Default for CloudSettings {
    fn default() -> Self {
        CloudSettings {
            host: String::new(),
            port: default_cloud_port(),
            thing_name: default_thing_name(),
            client_id: default_cloud_client_id(),
            cert_dir: default_cert_dir(),
            root_ca_file: default_root_ca_file(),
            client_cert_file: default_client_cert_file(),
            private_key_file: default_private_key_file(),
            keep_alive_secs: default_cloud_keep_alive(),
            yield_timeout_ms: default_yield_timeout(),
            ack_timeout_secs: default_ack_timeout(),
            max_document_len: default_max_document_len(),
            delta_buffer_len: default_delta_buffer_len(),
            reconnect_wait_ms: default_reconnect_wait(),
            not_idle_wait_ms: default_not_idle_wait(),
            not_idle_limit: default_not_idle_limit(),
            update_retry_delay_ms: 0,
            update_retry_limit: 0,
            max_in_flight_acks: default_max_in_flight(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Resolved certificate and key paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePaths {
    pub root_ca: PathBuf,
    pub client_cert: PathBuf,
    pub private_key: PathBuf,
}

impl CloudSettings {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn yield_timeout(&self) -> Duration {
        Duration::from_millis(self.yield_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Resolves the three credential files against `base`.
    pub fn certificate_paths_in(&self, base: &Path) -> CertificatePaths {
        let dir = base.join(&self.cert_dir);
        CertificatePaths {
            root_ca: dir.join(&self.root_ca_file),
            client_cert: dir.join(&self.client_cert_file),
            private_key: dir.join(&self.private_key_file),
        }
    }

    /// Resolves the credential files against the current working directory.
    pub fn certificate_paths(&self) -> BridgeResult<CertificatePaths> {
        let cwd = std::env::current_dir().map_err(|e| {
            BridgeError::InvalidConfig(format!("cannot resolve working directory: {}", e))
        })?;
        Ok(self.certificate_paths_in(&cwd))
    }

    /// Retry parameters for the outbound-update protocol.
    pub fn retry_policy(&self) -> ShadowRetryPolicy {
        ShadowRetryPolicy {
            reconnect_wait: Duration::from_millis(self.reconnect_wait_ms),
            not_idle_wait: Duration::from_millis(self.not_idle_wait_ms),
            not_idle_limit: self.not_idle_limit,
            update_retry_delay: Duration::from_millis(self.update_retry_delay_ms),
            update_retry_limit: non_zero(self.update_retry_limit),
        }
    }
}

// =============================================================================
// Health Settings
// =============================================================================

/// Settings for the once-per-second health tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSettings {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Silence after which the hardware is reported dead (seconds).
    #[serde(default = "default_dead_after")]
    pub dead_after_secs: u64,

    #[serde(default = "default_report_every")]
    pub report_every_ticks: u64,
}

fn default_tick_interval() -> u64 {
    1000
}
fn default_dead_after() -> u64 {
    garage_core::health::DEFAULT_DEAD_AFTER.as_secs()
}
fn default_report_every() -> u64 {
    garage_core::health::DEFAULT_REPORT_EVERY
}

impl Default for HealthSettings {
    fn default() -> Self {
        HealthSettings {
            tick_interval_ms: default_tick_interval(),
            dead_after_secs: default_dead_after(),
            report_every_ticks: default_report_every(),
        }
    }
}

impl HealthSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn dead_after(&self) -> Duration {
        Duration::from_secs(self.dead_after_secs)
    }
}

// =============================================================================
// Main Bridge Configuration
// =============================================================================

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub local: LocalSettings,

    #[serde(default)]
    pub cloud: CloudSettings,

    #[serde(default)]
    pub health: HealthSettings,
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (bridge.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> BridgeResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading bridge config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> BridgeResult<()> {
        if self.cloud.host.trim().is_empty() {
            return Err(BridgeError::InvalidConfig(
                "cloud.host must be set (or GARAGE_CLOUD_HOST)".into(),
            ));
        }

        if self.local.host.trim().is_empty() {
            return Err(BridgeError::InvalidConfig("local.host must not be empty".into()));
        }

        if self.local.port == 0 || self.cloud.port == 0 {
            return Err(BridgeError::InvalidConfig("ports must be non-zero".into()));
        }

        self.local.qos()?;

        if self.cloud.thing_name.is_empty() || self.cloud.client_id.is_empty() {
            return Err(BridgeError::InvalidConfig(
                "cloud.thing_name and cloud.client_id must not be empty".into(),
            ));
        }

        if self.cloud.max_document_len == 0 || self.cloud.delta_buffer_len == 0 {
            return Err(BridgeError::InvalidConfig(
                "document and delta buffer sizes must be greater than 0".into(),
            ));
        }

        if self.cloud.max_in_flight_acks == 0 {
            return Err(BridgeError::InvalidConfig(
                "max_in_flight_acks must be greater than 0".into(),
            ));
        }

        if self.health.tick_interval_ms == 0 {
            return Err(BridgeError::InvalidConfig(
                "tick_interval_ms must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("GARAGE_LOCAL_HOST") {
            debug!(host = %host, "Overriding local host from environment");
            self.local.host = host;
        }

        if let Ok(port) = std::env::var("GARAGE_LOCAL_PORT") {
            match port.parse::<u16>() {
                Ok(p) => self.local.port = p,
                Err(_) => warn!(port = %port, "Ignoring invalid GARAGE_LOCAL_PORT"),
            }
        }

        if let Ok(username) = std::env::var("GARAGE_LOCAL_USERNAME") {
            self.local.username = username;
        }

        if let Ok(password) = std::env::var("GARAGE_LOCAL_PASSWORD") {
            self.local.password = password;
        }

        if let Ok(host) = std::env::var("GARAGE_CLOUD_HOST") {
            debug!(host = %host, "Overriding cloud host from environment");
            self.cloud.host = host;
        }

        if let Ok(port) = std::env::var("GARAGE_CLOUD_PORT") {
            match port.parse::<u16>() {
                Ok(p) => self.cloud.port = p,
                Err(_) => warn!(port = %port, "Ignoring invalid GARAGE_CLOUD_PORT"),
            }
        }

        if let Ok(thing) = std::env::var("GARAGE_THING_NAME") {
            self.cloud.thing_name = thing;
        }

        if let Ok(dir) = std::env::var("GARAGE_CERT_DIR") {
            self.cloud.cert_dir = PathBuf::from(dir);
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "garage", "bridge")
            .map(|dirs| dirs.config_dir().join("bridge.toml"))
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn qos_from_level(level: u8) -> BridgeResult<QoS> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(BridgeError::InvalidConfig(format!(
            "QoS must be 0, 1 or 2, got {}",
            other
        ))),
    }
}

fn non_zero(limit: u32) -> Option<u32> {
    (limit > 0).then_some(limit)
}
