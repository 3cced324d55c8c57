//! Device registration and per-device settings.
//!
//! An unregistered device shows the user a short code and registers with
//! it to obtain OAuth client credentials. A registered device fetches its
//! queue URL and poll interval before the workers start.

use crate::backoff::Backoff;
use crate::config::{AgentConfig, ApplicationInfo, BootstrapConfig, MIN_POLL_INTERVAL_SECS};
use crate::error::{SyncError, SyncResult};
use crate::signal::Signal;
use crate::state::{ConnectionStatus, RuntimeState};
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;
use watchsync_auth::TokenSource;

/// A fresh registration code.
pub fn new_registration_code() -> String {
    Uuid::new_v4().to_string()
}

/// The `XXXX-XXXX` form of a registration code shown to the user.
pub fn friendly_registration_code(code: &str) -> String {
    let head: String = code.chars().take(4).collect();
    let tail: String = code.chars().skip(4).take(4).collect();
    format!("{head}-{tail}").to_uppercase()
}

/// Client credentials issued at registration.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceCredentials {
    #[serde(rename = "auth_client_id")]
    pub client_id: String,
    #[serde(rename = "auth_client_secret")]
    pub client_secret: String,
}

impl fmt::Debug for DeviceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCredentials")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Settings the service holds for this device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSettings {
    pub queue_url: String,
    pub poll_interval: Duration,
}

#[derive(Serialize)]
struct RegistrationRequest<'a> {
    system_info: &'a Value,
    application: &'a ApplicationInfo,
    registration_code: &'a str,
}

#[derive(Deserialize)]
struct RegistrationResponse {
    registration_status: String,
    #[serde(flatten)]
    credentials: Option<DeviceCredentials>,
}

#[derive(Deserialize)]
struct DeviceConfigResponse {
    queue_endpoint: String,
    queue_poll_interval: u64,
}

/// Client for the registration and device-config endpoints.
pub struct BootstrapClient {
    client: Client,
    config: BootstrapConfig,
}

impl BootstrapClient {
    pub fn new(config: &BootstrapConfig, user_agent: &str) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Registers this device. A 4xx means the user has not yet entered the
    /// code on the service.
    pub async fn register_device(
        &self,
        registration_code: &str,
        application: &ApplicationInfo,
        system_info: &Value,
    ) -> SyncResult<DeviceCredentials> {
        let resp = self
            .client
            .post(&self.config.register_url)
            .json(&RegistrationRequest {
                system_info,
                application,
                registration_code,
            })
            .send()
            .await?;

        let status = resp.status();
        if status.is_client_error() {
            return Err(SyncError::Registration(format!(
                "register this device with code {}",
                friendly_registration_code(registration_code)
            )));
        }

        let body: RegistrationResponse = resp.error_for_status()?.json().await?;
        match body.credentials {
            Some(credentials) if body.registration_status == "successful" => {
                info!("registered device as {}", credentials.client_id);
                Ok(credentials)
            }
            _ => Err(SyncError::Registration(format!(
                "registration {}",
                body.registration_status
            ))),
        }
    }

    /// Fetches the queue URL and poll interval for this device.
    pub async fn fetch_device_settings(
        &self,
        tokens: &dyn TokenSource,
    ) -> SyncResult<DeviceSettings> {
        let authorization = tokens.authorization_header().await?;
        let body: DeviceConfigResponse = self
            .client
            .get(&self.config.device_config_url)
            .header(AUTHORIZATION, authorization)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(DeviceSettings {
            queue_url: body.queue_endpoint,
            poll_interval: Duration::from_secs(body.queue_poll_interval.max(MIN_POLL_INTERVAL_SECS)),
        })
    }
}

/// Registers the device if it has no client credentials yet, filling them
/// into `config`. Returns the new credentials so the host can persist them.
pub async fn ensure_registered(
    bootstrap: &BootstrapClient,
    config: &mut AgentConfig,
    state: &RuntimeState,
) -> SyncResult<Option<DeviceCredentials>> {
    if config.has_client_credentials() {
        return Ok(None);
    }

    state.set_status(ConnectionStatus::Unregistered);
    if config.registration_code.is_empty() {
        config.registration_code = new_registration_code();
    }

    let credentials = bootstrap
        .register_device(
            &config.registration_code,
            &config.application,
            &config.system_info,
        )
        .await
        .inspect_err(|e| error!("device registration failed: {e}"))?;

    config.auth.client_id = credentials.client_id.clone();
    config.auth.client_secret = credentials.client_secret.clone();
    config.registration_code.clear();
    Ok(Some(credentials))
}

/// Fetches device settings into `state`, retrying transient failures with
/// backoff until `stop` is set.
pub async fn run_setup(
    bootstrap: &BootstrapClient,
    tokens: &dyn TokenSource,
    state: &RuntimeState,
    stop: &Signal,
    mut backoff: Backoff,
) -> SyncResult<DeviceSettings> {
    loop {
        match bootstrap.fetch_device_settings(tokens).await {
            Ok(settings) => {
                state.set_queue_url(settings.queue_url.clone());
                state.set_poll_interval(settings.poll_interval);
                state.set_status(ConnectionStatus::Registered);
                info!("device setup complete");
                return Ok(settings);
            }
            Err(e) if e.is_permanent() => {
                error!("device setup failed: {e}");
                state.set_status(ConnectionStatus::AuthFailed(e.to_string()));
                return Err(e);
            }
            Err(e) => {
                let delay = backoff.next_delay();
                warn!(
                    "device setup failed, retrying in {:.1}s: {e}",
                    delay.as_secs_f64()
                );
                state.set_status(ConnectionStatus::Offline);
                if stop.wait_timeout(delay).await {
                    return Err(SyncError::Stopped);
                }
            }
        }
    }
}
