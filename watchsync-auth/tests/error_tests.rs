use watchsync_auth::AuthError;

#[test]
fn client_error_display() {
    let err = AuthError::Client("missing client_id".into());
    assert_eq!(err.to_string(), "client error: missing client_id");
    assert!(err.is_permanent());
}

#[test]
fn server_error_display() {
    let err = AuthError::Server("503 Service Unavailable".into());
    assert_eq!(err.to_string(), "server error: 503 Service Unavailable");
    assert!(!err.is_permanent());
}

#[test]
fn malformed_token_is_transient() {
    assert!(!AuthError::MalformedToken("no exp".into()).is_permanent());
}

#[test]
fn from_serde_json_error() {
    let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err: AuthError = json_err.into();
    assert!(err.to_string().contains("serialization error"));
}
