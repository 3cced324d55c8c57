//! Agent configuration.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use watchsync_auth::{AuthConfig, FederationConfig};

/// Smallest remote poll interval the agent will honour (seconds).
pub const MIN_POLL_INTERVAL_SECS: u64 = 10;

/// Largest accepted `delivery.max_backoff_secs` (one day).
pub const MAX_BACKOFF_CEILING_SECS: f64 = 86_400.0;

/// Settings for the outbound event worker.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Endpoint receiving `POST`ed events.
    pub event_api_url: String,

    pub request_timeout_secs: u64,

    /// Pause after each successful delivery (milliseconds).
    pub pace_millis: u64,

    /// Upper bound on a single retry sleep (seconds).
    pub max_backoff_secs: f64,

    pub max_backoff_exponent: u32,

    /// How long the worker blocks on an empty queue before rechecking stop.
    pub queue_wait_millis: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            event_api_url: "https://api.watchsync.io/v1/events".to_string(),
            request_timeout_secs: 15,
            pace_millis: 1900,
            max_backoff_secs: 47.0,
            max_backoff_exponent: 10,
            queue_wait_millis: 3000,
        }
    }
}

impl DeliveryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn pace(&self) -> Duration {
        Duration::from_millis(self.pace_millis)
    }

    /// Backoff cap, clamped to `0..=MAX_BACKOFF_CEILING_SECS`.
    pub fn max_backoff(&self) -> Duration {
        let secs = self.max_backoff_secs.clamp(0.0, MAX_BACKOFF_CEILING_SECS);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }

    pub fn queue_wait(&self) -> Duration {
        Duration::from_millis(self.queue_wait_millis)
    }
}

/// Settings for the remote sync consumer.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Queue URL; normally replaced by the value from the device config.
    pub queue_url: String,

    pub poll_interval_secs: u64,

    /// Pause before applying each remote message (milliseconds).
    pub message_pause_millis: u64,

    /// Stop-check period at the top of the consumer loop (milliseconds).
    pub idle_check_millis: u64,

    pub receive_timeout_secs: u64,

    pub region: String,

    /// Optional queue endpoint override (for local testing).
    pub endpoint_override: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            queue_url: String::new(),
            poll_interval_secs: 60,
            message_pause_millis: 850,
            idle_check_millis: 1000,
            receive_timeout_secs: 20,
            region: "eu-west-1".to_string(),
            endpoint_override: None,
        }
    }
}

impl RemoteConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(MIN_POLL_INTERVAL_SECS))
    }

    pub fn message_pause(&self) -> Duration {
        Duration::from_millis(self.message_pause_millis)
    }

    pub fn idle_check(&self) -> Duration {
        Duration::from_millis(self.idle_check_millis)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_secs(self.receive_timeout_secs)
    }
}

/// The local media catalog's JSON-RPC endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub url: String,

    /// HTTP basic credentials; sent only when `username` is set.
    pub username: String,
    pub password: String,

    pub request_timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080/jsonrpc".to_string(),
            username: String::new(),
            password: String::new(),
            request_timeout_secs: 15,
        }
    }
}

impl CatalogConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Device registration and per-device settings endpoints.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub register_url: String,
    pub device_config_url: String,
    pub request_timeout_secs: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            register_url: "https://api.watchsync.io/v1/devices/register".to_string(),
            device_config_url: "https://api.watchsync.io/v1/devices/config".to_string(),
            request_timeout_secs: 15,
        }
    }
}

/// Identity of the host application, reported at registration and startup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationInfo {
    pub app_id: String,
    pub app_name: String,
    pub app_version: String,
}

impl Default for ApplicationInfo {
    fn default() -> Self {
        Self {
            app_id: "service.watchsync".to_string(),
            app_name: "WatchSync".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Top-level agent configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Identity stamped on outbound events and compared against the
    /// `origin` of remote messages. Falls back to the OAuth client id.
    pub device_id: String,

    pub catalog: CatalogConfig,
    pub auth: AuthConfig,
    pub federation: FederationConfig,
    pub delivery: DeliveryConfig,
    pub remote: RemoteConfig,
    pub bootstrap: BootstrapConfig,
    pub application: ApplicationInfo,

    /// Free-form host description sent at registration and startup.
    pub system_info: serde_json::Value,

    /// Code shown to the user while the device is unregistered. Generated
    /// on first registration; the host persists it.
    pub registration_code: String,
}

impl AgentConfig {
    /// Parses and checks a config. The device identity may still be
    /// missing here: an unregistered device gets it at registration.
    pub fn from_json(json: &str) -> SyncResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate_settings()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    pub fn device_id(&self) -> &str {
        if self.device_id.is_empty() {
            &self.auth.client_id
        } else {
            &self.device_id
        }
    }

    pub fn has_client_credentials(&self) -> bool {
        !self.auth.client_id.is_empty() && !self.auth.client_secret.is_empty()
    }

    /// Full check before the workers start.
    pub fn validate(&self) -> SyncResult<()> {
        if self.device_id().is_empty() {
            return Err(SyncError::Config(
                "either device_id or auth.client_id must be set".to_string(),
            ));
        }
        self.validate_settings()
    }

    /// Checks everything that does not depend on registration.
    pub fn validate_settings(&self) -> SyncResult<()> {
        if self.delivery.event_api_url.is_empty() {
            return Err(SyncError::Config("missing delivery.event_api_url".to_string()));
        }
        let backoff = self.delivery.max_backoff_secs;
        if !(0.0..=MAX_BACKOFF_CEILING_SECS).contains(&backoff) {
            return Err(SyncError::Config(format!(
                "delivery.max_backoff_secs must be within 0..={MAX_BACKOFF_CEILING_SECS}, got {backoff}"
            )));
        }
        if self.catalog.url.is_empty() {
            return Err(SyncError::Config("missing catalog.url".to_string()));
        }
        Ok(())
    }
}
