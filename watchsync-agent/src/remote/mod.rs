//! Updates from other devices, received through the remote queue.

mod consumer;
mod matcher;
mod message;
mod sqs;

pub use consumer::{MessageOutcome, RemoteSyncConsumer};
pub use matcher::{MatchOutcome, MatchTier, Matcher};
pub use message::{
    EVENT_ATTRIBUTE, LIBRARY_UPDATE_SUFFIX, ORIGIN_ATTRIBUTE, POLL_INTERVAL_CHANGED,
    RemoteCommand, RemoteUpdate,
};
pub use sqs::SqsRemoteQueue;

use crate::error::SyncResult;
use async_trait::async_trait;
use std::collections::HashMap;

/// A message received from the remote queue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteMessage {
    /// Broker handle used to delete the message once consumed.
    pub receipt: String,
    pub body: String,
    pub attributes: HashMap<String, String>,
}

impl RemoteMessage {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// The broker holding updates addressed to this device.
#[async_trait]
pub trait RemoteQueue: Send + Sync {
    /// Receives the next batch; empty when the queue is drained.
    async fn receive(&self) -> SyncResult<Vec<RemoteMessage>>;

    /// Removes a consumed message.
    async fn delete(&self, message: &RemoteMessage) -> SyncResult<()>;
}
