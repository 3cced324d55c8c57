//! Federated cloud credential lifecycle with auto-refresh.
//!
//! Trades the agent's bearer token for short-lived cloud credentials and
//! refreshes them before expiry. Every access checks the expiry first, so
//! callers never see credentials that expire inside the refresh margin.

use crate::error::AuthResult;
use crate::token::TokenSource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Temporary cloud credentials returned by the federation exchange.
#[derive(Clone, Serialize, Deserialize)]
pub struct FederatedCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
}

impl FederatedCredentials {
    /// Returns true if credentials will expire within the given seconds.
    pub fn expires_within_secs(&self, secs: i64) -> bool {
        Utc::now() + chrono::Duration::seconds(secs) >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    fn access_arguments(&self) -> AccessArguments {
        AccessArguments {
            access_key_id: self.access_key_id.clone(),
            secret_access_key: self.secret_access_key.clone(),
            session_token: self.session_token.clone(),
        }
    }
}

impl fmt::Debug for FederatedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FederatedCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// The arguments a cloud client needs to sign requests.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessArguments {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
}

impl fmt::Debug for AccessArguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessArguments")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

/// Exchanges a web-identity token for temporary credentials.
#[async_trait]
pub trait FederationExchange: Send + Sync {
    async fn exchange(&self, web_identity_token: &str) -> AuthResult<FederatedCredentials>;
}

/// Caches federated credentials and refreshes them on demand.
pub struct CredentialBroker {
    tokens: Arc<dyn TokenSource>,
    exchange: Arc<dyn FederationExchange>,
    credentials: RwLock<Option<FederatedCredentials>>,
    /// Serializes refreshes; concurrent callers reuse the winner's result.
    refresh_lock: Mutex<()>,
    refresh_margin_secs: i64,
}

impl CredentialBroker {
    pub fn new(
        tokens: Arc<dyn TokenSource>,
        exchange: Arc<dyn FederationExchange>,
        refresh_margin_secs: i64,
    ) -> Self {
        Self {
            tokens,
            exchange,
            credentials: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            refresh_margin_secs,
        }
    }

    /// Gets signing arguments, refreshing the credentials if needed.
    pub async fn get_access_arguments(&self) -> AuthResult<AccessArguments> {
        if let Some(args) = self.cached().await {
            return Ok(args);
        }

        let _guard = self.refresh_lock.lock().await;

        // A concurrent caller may have refreshed while we waited.
        if let Some(args) = self.cached().await {
            return Ok(args);
        }

        let creds = self.refresh().await?;
        Ok(creds.access_arguments())
    }

    /// Forces a credential refresh.
    pub async fn refresh(&self) -> AuthResult<FederatedCredentials> {
        let web_token = self.tokens.bearer_token().await?;
        let new_creds = self
            .exchange
            .exchange(&web_token)
            .await
            .inspect_err(|e| warn!("federation exchange failed: {e}"))?;

        debug!(
            "refreshed federated credentials, expires at {}",
            new_creds.expires_at
        );

        *self.credentials.write().await = Some(new_creds.clone());
        Ok(new_creds)
    }

    /// Clears cached credentials.
    pub async fn clear(&self) {
        *self.credentials.write().await = None;
    }

    /// Returns true if credentials are currently cached and valid.
    pub async fn has_valid_credentials(&self) -> bool {
        self.cached().await.is_some()
    }

    async fn cached(&self) -> Option<AccessArguments> {
        let creds = self.credentials.read().await;
        match creds.as_ref() {
            Some(c) if !c.expires_within_secs(self.refresh_margin_secs) => {
                Some(c.access_arguments())
            }
            Some(c) => {
                debug!(
                    "federated credentials expire at {}, refresh needed",
                    c.expires_at
                );
                None
            }
            None => None,
        }
    }
}
