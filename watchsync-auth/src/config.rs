//! Authentication configuration.

use serde::{Deserialize, Serialize};

/// Maximum role session name length accepted by STS.
const MAX_ROLE_SESSION_NAME: usize = 64;

/// STS bounds for `DurationSeconds`.
const MIN_SESSION_DURATION_SECS: u32 = 900;
const MAX_SESSION_DURATION_SECS: u32 = 43_200;

/// Configuration for the OAuth client-credentials flow.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OIDC issuer; discovery is fetched from `{issuer}/.well-known/openid-configuration`.
    pub issuer_url: String,

    pub client_id: String,

    pub client_secret: String,

    /// Space-separated scopes requested with every token.
    pub scope: String,

    /// Timeout applied to discovery and token requests (seconds).
    pub request_timeout_secs: u64,

    /// Tokens are refreshed once they expire within this many seconds.
    pub refresh_margin_secs: i64,

    pub user_agent: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer_url: "https://auth.watchsync.io".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            scope: "watchsync.client/event.write watchsync.client/task.read".to_string(),
            request_timeout_secs: 15,
            refresh_margin_secs: 120, // 2 minutes before expiry
            user_agent: concat!("watchsync-agent/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl AuthConfig {
    /// Issuer URL without a trailing slash.
    pub fn issuer(&self) -> &str {
        self.issuer_url.strip_suffix('/').unwrap_or(&self.issuer_url)
    }

    pub fn discovery_url(&self) -> String {
        format!("{}/.well-known/openid-configuration", self.issuer())
    }
}

/// Configuration for the web-identity federation exchange.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationConfig {
    /// Role assumed with the bearer token as web identity.
    pub role_arn: String,

    pub role_session_name: String,

    /// Requested lifetime of the federated credentials (seconds).
    pub session_duration_secs: u32,

    pub region: String,

    /// Optional STS endpoint override (for local testing).
    pub endpoint_override: Option<String>,

    /// Credentials are refreshed once they expire within this many seconds.
    pub refresh_margin_secs: i64,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            role_arn: String::new(),
            role_session_name: String::new(),
            session_duration_secs: 3600,
            region: "eu-west-1".to_string(),
            endpoint_override: None,
            refresh_margin_secs: 120,
        }
    }
}

impl FederationConfig {
    /// Session name truncated to the STS limit.
    pub fn session_name(&self) -> String {
        self.role_session_name
            .chars()
            .take(MAX_ROLE_SESSION_NAME)
            .collect()
    }

    /// Session duration clamped to what STS will accept.
    pub fn session_duration(&self) -> u32 {
        self.session_duration_secs
            .clamp(MIN_SESSION_DURATION_SECS, MAX_SESSION_DURATION_SECS)
    }
}
