//! `AssumeRoleWithWebIdentity` federation against AWS STS.

use crate::config::FederationConfig;
use crate::error::{AuthError, AuthResult};
use crate::federation::{FederatedCredentials, FederationExchange};
use async_trait::async_trait;
use aws_sdk_sts::Client as StsClient;
use aws_sdk_sts::error::SdkError;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Federation exchange backed by STS.
pub struct StsFederation {
    client: StsClient,
    role_arn: String,
    session_name: String,
    duration_secs: i32,
}

impl StsFederation {
    pub fn new(config: &FederationConfig) -> Self {
        // AssumeRoleWithWebIdentity is unsigned; no credentials provider needed.
        let mut builder = aws_sdk_sts::Config::builder()
            .region(aws_types::region::Region::new(config.region.clone()))
            .behavior_version_latest();

        if let Some(ref endpoint) = config.endpoint_override {
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            client: StsClient::from_conf(builder.build()),
            role_arn: config.role_arn.clone(),
            session_name: config.session_name(),
            duration_secs: config.session_duration() as i32,
        }
    }
}

#[async_trait]
impl FederationExchange for StsFederation {
    async fn exchange(&self, web_identity_token: &str) -> AuthResult<FederatedCredentials> {
        let out = self
            .client
            .assume_role_with_web_identity()
            .role_arn(&self.role_arn)
            .role_session_name(&self.session_name)
            .duration_seconds(self.duration_secs)
            .web_identity_token(web_identity_token)
            .send()
            .await
            .map_err(|e| match e {
                SdkError::ServiceError(ctx) => AuthError::Client(format!(
                    "web identity federation rejected: {}",
                    ctx.into_err()
                )),
                other => AuthError::Server(format!("web identity federation failed: {other}")),
            })?;

        let creds = out
            .credentials()
            .ok_or_else(|| AuthError::Server("federation response had no credentials".into()))?;

        let expiration = creds.expiration();
        let expires_at: DateTime<Utc> =
            DateTime::from_timestamp(expiration.secs(), expiration.subsec_nanos())
                .ok_or_else(|| AuthError::Server("federation expiry out of range".into()))?;

        debug!(
            "assumed role {} as {}, expires at {expires_at}",
            self.role_arn, self.session_name
        );

        Ok(FederatedCredentials {
            access_key_id: creds.access_key_id().to_string(),
            secret_access_key: creds.secret_access_key().to_string(),
            session_token: creds.session_token().to_string(),
            expires_at,
        })
    }
}
