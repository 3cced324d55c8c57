//! OAuth client-credentials token lifecycle.
//!
//! The token endpoint is discovered once from the issuer's OIDC metadata and
//! cached for the process lifetime. Tokens are cached until their `exp` claim
//! minus the refresh margin has passed. A single lock covers the cached
//! token, so concurrent callers that find no valid token trigger exactly one
//! token request between them.

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

/// Anything that can hand out a bearer token.
///
/// Implemented by [`TokenManager`]; consumers depend on the trait so they can
/// be driven by fixed tokens in tests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Returns a token that is valid for at least the refresh margin.
    async fn bearer_token(&self) -> AuthResult<String>;

    /// Drops the cached token so the next call fetches a new one.
    async fn invalidate(&self);

    /// `Authorization` header value for the current token.
    async fn authorization_header(&self) -> AuthResult<String> {
        Ok(format!("Bearer {}", self.bearer_token().await?))
    }
}

/// A bearer token and the expiry parsed from its payload.
#[derive(Clone)]
pub struct BearerToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl BearerToken {
    /// Parses the `exp` claim out of a compact (dot-delimited) token.
    pub fn parse(value: String) -> AuthResult<Self> {
        let expires_at = expiry_from_token(&value)?;
        Ok(Self { value, expires_at })
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns true if the token will expire within the given seconds.
    pub fn expires_within_secs(&self, secs: i64) -> bool {
        Utc::now() + chrono::Duration::seconds(secs) >= self.expires_at
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Extracts the `exp` claim from the second segment of a compact token.
pub fn expiry_from_token(token: &str) -> AuthResult<DateTime<Utc>> {
    #[derive(Deserialize)]
    struct Claims {
        exp: f64,
    }

    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthError::MalformedToken("missing payload segment".to_string()))?;

    let decoded = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::MalformedToken(format!("payload is not base64url: {e}")))?;

    let claims: Claims = serde_json::from_slice(&decoded)
        .map_err(|e| AuthError::MalformedToken(format!("payload has no numeric exp: {e}")))?;

    DateTime::from_timestamp(claims.exp as i64, 0)
        .ok_or_else(|| AuthError::MalformedToken(format!("exp out of range: {}", claims.exp)))
}

#[derive(Deserialize)]
struct DiscoveryDocument {
    token_endpoint: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    token_type: String,
    access_token: String,
}

/// Owns the agent's bearer token.
pub struct TokenManager {
    client: Client,
    config: AuthConfig,
    token_endpoint: OnceCell<String>,
    /// Held across a refresh so at most one token request is in flight.
    current: Mutex<Option<BearerToken>>,
}

impl TokenManager {
    pub fn new(config: AuthConfig) -> AuthResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| AuthError::Client(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            token_endpoint: OnceCell::new(),
            current: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Gets a valid token, requesting a new one if none is cached or the
    /// cached one is inside the refresh margin.
    pub async fn get_token(&self) -> AuthResult<String> {
        self.validate()?;

        let mut current = self.current.lock().await;
        if let Some(token) = current.as_ref() {
            if !token.expires_within_secs(self.config.refresh_margin_secs) {
                return Ok(token.value.clone());
            }
            debug!(
                "bearer token expires at {}, refreshing",
                token.expires_at
            );
            *current = None;
        }

        let token = self.request_token().await?;
        debug!("obtained bearer token, expires at {}", token.expires_at);
        let value = token.value.clone();
        *current = Some(token);
        Ok(value)
    }

    /// Forces the next [`get_token`](Self::get_token) to request a new token.
    pub async fn refresh_token(&self) {
        *self.current.lock().await = None;
    }

    /// Returns true if a token is cached and outside the refresh margin.
    pub async fn has_valid_token(&self) -> bool {
        self.current
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.expires_within_secs(self.config.refresh_margin_secs))
    }

    fn validate(&self) -> AuthResult<()> {
        if self.config.client_id.is_empty() {
            return Err(AuthError::Client("missing client_id".to_string()));
        }
        if self.config.client_secret.is_empty() {
            return Err(AuthError::Client("missing client_secret".to_string()));
        }
        if self.config.scope.is_empty() {
            return Err(AuthError::Client("missing scope".to_string()));
        }
        Ok(())
    }

    async fn token_endpoint(&self) -> AuthResult<&str> {
        let endpoint = self
            .token_endpoint
            .get_or_try_init(|| async {
                let url = self.config.discovery_url();
                let resp = self.client.get(&url).send().await?;
                let doc: DiscoveryDocument = check_status(resp, "OIDC discovery")
                    .await?
                    .json()
                    .await?;
                debug!("discovered token endpoint {}", doc.token_endpoint);
                Ok::<_, AuthError>(doc.token_endpoint)
            })
            .await?;
        Ok(endpoint.as_str())
    }

    async fn request_token(&self) -> AuthResult<BearerToken> {
        let endpoint = self.token_endpoint().await?;

        let resp = self
            .client
            .post(endpoint)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("scope", self.config.scope.as_str()),
            ])
            .send()
            .await?;

        let body: TokenResponse = check_status(resp, "token authentication")
            .await?
            .json()
            .await?;

        if !body.token_type.eq_ignore_ascii_case("bearer") {
            return Err(AuthError::MalformedToken(format!(
                "unexpected token type {:?}",
                body.token_type
            )));
        }

        BearerToken::parse(body.access_token)
    }
}

#[async_trait]
impl TokenSource for TokenManager {
    async fn bearer_token(&self) -> AuthResult<String> {
        self.get_token().await
    }

    async fn invalidate(&self) {
        self.refresh_token().await;
    }
}

/// Maps 4xx to a permanent error and any other non-success to a transient one.
async fn check_status(resp: Response, context: &str) -> AuthResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    if status.is_client_error() {
        warn!("{context} rejected with {status}");
        Err(AuthError::Client(format!(
            "{status} client error during {context}: {body}"
        )))
    } else {
        Err(AuthError::Server(format!(
            "{status} server error during {context}: {body}"
        )))
    }
}
