//! Outbound event delivery.
//!
//! Events are queued with a priority and delivered one at a time:
//! - **Success**: backoff resets and the worker pauses briefly to bound the
//!   request rate
//! - **Failure**: the event goes back on the queue ahead of normal traffic
//!   and the worker sleeps on a capped, jittered exponential schedule
//!
//! All sleeps end early when the worker is stopped.

use crate::backoff::Backoff;
use crate::config::DeliveryConfig;
use crate::error::{SyncError, SyncResult};
use crate::queue::{Priority, PriorityQueue};
use crate::signal::Signal;
use crate::worker::{MessageHandler, WorkerHandle, WorkerLoop};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use watchsync_auth::TokenSource;

/// Timestamp format of `origin_utc_datetime`.
pub const ORIGIN_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Event emitted once the agent's workers are running.
pub const SETUP_COMPLETE_EVENT: &str = "kodi.client.setup.complete";

/// An event on its way to the event endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEvent {
    pub origin_utc_datetime: String,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl OutboundEvent {
    /// Stamps a new event with the current UTC time.
    pub fn new(event: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            origin_utc_datetime: Utc::now().format(ORIGIN_TIMESTAMP_FORMAT).to_string(),
            event: event.into(),
            data,
        }
    }
}

/// Cloneable producer side of the outbound queue.
#[derive(Clone, Default)]
pub struct EventPublisher {
    queue: PriorityQueue<OutboundEvent>,
}

impl EventPublisher {
    pub fn new(queue: PriorityQueue<OutboundEvent>) -> Self {
        Self { queue }
    }

    /// Queues an event at normal priority.
    pub fn publish(&self, event: impl Into<String>, data: Option<Value>) {
        let event = OutboundEvent::new(event, data);
        debug!("queued event {}", event.event);
        self.queue.push(Priority::NORMAL, event);
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

/// The outbound event worker.
pub struct EventLogger {
    publisher: EventPublisher,
    worker: WorkerHandle,
}

impl EventLogger {
    /// Starts the delivery worker. Must be called inside a tokio runtime.
    pub fn spawn(config: &DeliveryConfig, tokens: Arc<dyn TokenSource>) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        let queue = PriorityQueue::new();
        let stop = Signal::new();
        let delivery = Delivery {
            client,
            url: config.event_api_url.clone(),
            tokens,
            queue: queue.clone(),
            stop: stop.clone(),
            backoff: Backoff::new(config.max_backoff(), config.max_backoff_exponent),
            pace: config.pace(),
        };

        let worker = WorkerLoop::new("event logger", queue.clone(), stop, delivery)
            .with_wait(config.queue_wait())
            .spawn();

        Ok(Self {
            publisher: EventPublisher::new(queue),
            worker,
        })
    }

    pub fn publisher(&self) -> EventPublisher {
        self.publisher.clone()
    }

    pub fn new_event(&self, event: impl Into<String>, data: Option<Value>) {
        self.publisher.publish(event, data);
    }

    /// Events queued but not yet delivered.
    pub fn pending(&self) -> usize {
        self.publisher.pending()
    }

    /// Stops delivery. Undelivered events are dropped.
    pub async fn stop(&self) {
        self.worker.stop().await;
    }
}

struct Delivery {
    client: Client,
    url: String,
    tokens: Arc<dyn TokenSource>,
    queue: PriorityQueue<OutboundEvent>,
    stop: Signal,
    backoff: Backoff,
    pace: std::time::Duration,
}

impl Delivery {
    async fn post(&self, event: &OutboundEvent) -> SyncResult<()> {
        let authorization = self.tokens.authorization_header().await?;
        let resp = self
            .client
            .post(&self.url)
            .header(AUTHORIZATION, authorization)
            .json(event)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::UNAUTHORIZED {
            // Force a fresh token for the retry.
            self.tokens.invalidate().await;
        }
        let body = resp.text().await.unwrap_or_default();
        Err(SyncError::Delivery(format!("{status}: {body}")))
    }
}

#[async_trait]
impl MessageHandler<OutboundEvent> for Delivery {
    async fn handle(&mut self, event: OutboundEvent) -> SyncResult<()> {
        match self.post(&event).await {
            Ok(()) => {
                info!("delivered event {}", event.event);
                self.backoff.reset();
                self.stop.wait_timeout(self.pace).await;
            }
            Err(e) => {
                let delay = self.backoff.next_delay();
                warn!(
                    "failed to deliver event {}, retrying in {:.1}s: {e}",
                    event.event,
                    delay.as_secs_f64()
                );
                self.queue.push(Priority::RETRY, event);
                self.stop.wait_timeout(delay).await;
            }
        }
        Ok(())
    }
}
