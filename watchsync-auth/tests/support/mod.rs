//! Shared test helpers for token and federation tests.

#![allow(dead_code)]

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use watchsync_auth::AuthConfig;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN_PATH: &str = "/oauth2/token";

/// Builds an unsigned compact token whose `exp` is `expires_in_secs` from now.
pub fn token_expiring_in(expires_in_secs: i64) -> String {
    let exp = (Utc::now() + Duration::seconds(expires_in_secs)).timestamp();
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::json!({ "exp": exp, "sub": "dev-1" }).to_string());
    format!("{header}.{payload}.signature")
}

pub fn token_body(token: &str) -> serde_json::Value {
    serde_json::json!({
        "token_type": "Bearer",
        "access_token": token,
        "expires_in": 3600
    })
}

pub fn auth_config(server: &MockServer) -> AuthConfig {
    AuthConfig {
        issuer_url: format!("{}/", server.uri()),
        client_id: "dev-1".into(),
        client_secret: "s3cret".into(),
        scope: "watchsync.client/event.write".into(),
        request_timeout_secs: 5,
        ..AuthConfig::default()
    }
}

/// Mounts the discovery document pointing at [`TOKEN_PATH`].
pub async fn mount_discovery(server: &MockServer, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "issuer": server.uri(),
            "token_endpoint": format!("{}{}", server.uri(), TOKEN_PATH),
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}
