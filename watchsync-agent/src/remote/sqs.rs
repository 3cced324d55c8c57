//! [`RemoteQueue`] backed by SQS, signed with federated credentials.

use super::{RemoteMessage, RemoteQueue};
use crate::config::RemoteConfig;
use crate::error::{SyncError, SyncResult};
use crate::state::RuntimeState;
use async_trait::async_trait;
use aws_sdk_sqs::Client as SqsClient;
use aws_sdk_sqs::config::timeout::TimeoutConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use watchsync_auth::{AccessArguments, CredentialBroker};

/// Receives and deletes messages on this device's update queue.
///
/// The queue URL is read from the runtime state on every call, so a URL
/// replaced by device setup takes effect on the next receive.
pub struct SqsRemoteQueue {
    broker: Arc<CredentialBroker>,
    state: Arc<RuntimeState>,
    region: String,
    endpoint_override: Option<String>,
    timeout: Duration,
}

impl SqsRemoteQueue {
    pub fn new(
        broker: Arc<CredentialBroker>,
        state: Arc<RuntimeState>,
        config: &RemoteConfig,
    ) -> Self {
        Self {
            broker,
            state,
            region: config.region.clone(),
            endpoint_override: config.endpoint_override.clone(),
            timeout: config.receive_timeout(),
        }
    }

    fn queue_url(&self) -> SyncResult<String> {
        let url = self.state.queue_url();
        if url.is_empty() {
            return Err(SyncError::Queue("no queue URL configured".to_string()));
        }
        Ok(url)
    }

    /// Builds a client from the broker's current credentials.
    async fn build_client(&self) -> SyncResult<SqsClient> {
        let AccessArguments {
            access_key_id,
            secret_access_key,
            session_token,
        } = self.broker.get_access_arguments().await?;

        let credentials = aws_credential_types::Credentials::new(
            access_key_id,
            secret_access_key,
            Some(session_token),
            None,
            "watchsync-federation",
        );

        let mut config_builder = aws_sdk_sqs::Config::builder()
            .region(aws_types::region::Region::new(self.region.clone()))
            .credentials_provider(credentials)
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(self.timeout)
                    .build(),
            )
            .behavior_version_latest();

        if let Some(ref endpoint) = self.endpoint_override {
            config_builder = config_builder.endpoint_url(endpoint);
        }

        Ok(SqsClient::from_conf(config_builder.build()))
    }
}

#[async_trait]
impl RemoteQueue for SqsRemoteQueue {
    async fn receive(&self) -> SyncResult<Vec<RemoteMessage>> {
        let queue_url = self.queue_url()?;
        let client = self.build_client().await?;
        let out = client
            .receive_message()
            .queue_url(queue_url)
            .max_number_of_messages(1)
            .message_attribute_names("All")
            .send()
            .await
            .map_err(|e| SyncError::Queue(format!("receive failed: {e}")))?;

        let messages: Vec<RemoteMessage> = out
            .messages()
            .iter()
            .map(|m| RemoteMessage {
                receipt: m.receipt_handle().unwrap_or_default().to_string(),
                body: m.body().unwrap_or_default().to_string(),
                attributes: m
                    .message_attributes()
                    .map(|attrs| {
                        attrs
                            .iter()
                            .filter_map(|(name, value)| {
                                value.string_value().map(|v| (name.clone(), v.to_string()))
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            })
            .collect();

        debug!("received {} message(s) from remote queue", messages.len());
        Ok(messages)
    }

    async fn delete(&self, message: &RemoteMessage) -> SyncResult<()> {
        let queue_url = self.queue_url()?;
        let client = self.build_client().await?;
        client
            .delete_message()
            .queue_url(queue_url)
            .receipt_handle(&message.receipt)
            .send()
            .await
            .map_err(|e| SyncError::Queue(format!("delete failed: {e}")))?;
        Ok(())
    }
}
