//! Authentication for the watchsync agent.
//!
//! Provides:
//! - OAuth client-credentials bearer tokens with OIDC discovery and
//!   refresh ahead of expiry
//! - Web-identity federation of the bearer token into short-lived cloud
//!   credentials, refreshed the same way
//! - A permanent/transient error split that callers use to decide between
//!   surfacing a failure and retrying it

pub mod config;
pub mod error;
pub mod federation;
pub mod sts;
pub mod token;

pub use config::{AuthConfig, FederationConfig};
pub use error::{AuthError, AuthResult};
pub use federation::{AccessArguments, CredentialBroker, FederatedCredentials, FederationExchange};
pub use sts::StsFederation;
pub use token::{BearerToken, TokenManager, TokenSource};
