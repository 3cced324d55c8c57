//! The remote sync consumer.
//!
//! Waits for the poll interval or a wakeup, then drains the remote queue
//! while the local player is idle. Busy state is checked before every
//! receive and before every message, so no catalog write happens while
//! something is playing or a scan is running.

use super::matcher::{MatchOutcome, Matcher};
use super::message::{ORIGIN_ATTRIBUTE, RemoteCommand};
use super::{RemoteMessage, RemoteQueue};
use crate::catalog::MediaCatalog;
use crate::config::RemoteConfig;
use crate::error::{SyncError, SyncResult};
use crate::signal::Signal;
use crate::state::{ConnectionStatus, RuntimeState};
use crate::worker::{DIAGNOSTICS_TARGET, WorkerHandle, panic_message};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What became of one remote message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    /// Sent by this device.
    SelfOrigin,
    PollIntervalChanged(Duration),
    Matched(MatchOutcome),
    Ignored(String),
}

impl MessageOutcome {
    /// Whether the message should be removed from the remote queue.
    pub fn consumes_message(&self) -> bool {
        !matches!(self, MessageOutcome::Matched(MatchOutcome::ScanRequested { .. }))
    }
}

pub struct RemoteSyncConsumer {
    state: Arc<RuntimeState>,
    catalog: Arc<dyn MediaCatalog>,
    queue: Arc<dyn RemoteQueue>,
    device_id: String,
    wakeup: Signal,
    stop: Signal,
    message_pause: Duration,
    idle_check: Duration,
}

impl RemoteSyncConsumer {
    pub fn new(
        state: Arc<RuntimeState>,
        catalog: Arc<dyn MediaCatalog>,
        queue: Arc<dyn RemoteQueue>,
        device_id: impl Into<String>,
        wakeup: Signal,
        config: &RemoteConfig,
    ) -> Self {
        Self {
            state,
            catalog,
            queue,
            device_id: device_id.into(),
            wakeup,
            stop: Signal::new(),
            message_pause: config.message_pause(),
            idle_check: config.idle_check(),
        }
    }

    /// Spawns the poll loop. Stopping also sets the wakeup signal so a
    /// pending poll wait ends at once.
    pub fn spawn(self) -> WorkerHandle {
        let stop = self.stop.clone();
        let wakeup = self.wakeup.clone();
        let task = tokio::spawn(self.run());
        WorkerHandle::new("remote sync consumer", stop, move || wakeup.set(), task)
    }

    pub async fn run(self) {
        info!("remote sync consumer started");
        while !self.stop.wait_timeout(self.idle_check).await {
            let interval = self.state.poll_interval();
            self.wakeup.wait_timeout(interval).await;
            self.wakeup.clear();
            self.drain().await;
        }
        self.state.set_status(ConnectionStatus::Offline);
        info!("remote sync consumer exited");
    }

    /// Processes messages until the queue is empty, the device is busy, or
    /// the consumer is stopped. Returns the number of messages handled.
    pub async fn drain(&self) -> usize {
        let mut handled = 0;
        while self.ready().await {
            // A long-poll receive must not hold up shutdown.
            let received = tokio::select! {
                _ = self.stop.wait() => return handled,
                received = self.queue.receive() => received,
            };
            let messages = match received {
                Ok(messages) => {
                    self.state.set_status(ConnectionStatus::Online);
                    messages
                }
                Err(e) => {
                    self.report_poll_failure(&e);
                    break;
                }
            };
            if messages.is_empty() {
                break;
            }

            for message in &messages {
                if !self.ready().await {
                    return handled;
                }
                if self.stop.wait_timeout(self.message_pause).await {
                    return handled;
                }
                self.process(message).await;
                handled += 1;
            }
        }
        handled
    }

    async fn ready(&self) -> bool {
        if self.stop.is_set() {
            return false;
        }
        let busy = tokio::select! {
            _ = self.stop.wait() => return false,
            busy = self.catalog.busy_state() => busy,
        };
        match busy {
            Ok(busy) if busy.is_busy() => {
                debug!("player busy ({busy:?}), deferring remote updates");
                false
            }
            Ok(_) => true,
            Err(e) => {
                warn!("could not read player state, deferring remote updates: {e}");
                false
            }
        }
    }

    fn report_poll_failure(&self, e: &SyncError) {
        warn!("remote queue unavailable: {e}");
        match e {
            SyncError::Auth(auth) if auth.is_permanent() => {
                self.state
                    .set_status(ConnectionStatus::AuthFailed(auth.to_string()));
            }
            _ => self.state.set_status(ConnectionStatus::Offline),
        }
    }

    /// Handles one message and deletes it if it was consumed. Errors and
    /// panics are reported and never escape.
    async fn process(&self, message: &RemoteMessage) {
        let consumed = match AssertUnwindSafe(self.handle_message(message))
            .catch_unwind()
            .await
        {
            Ok(Ok(outcome)) => {
                debug!("remote message outcome: {outcome:?}");
                outcome.consumes_message()
            }
            Ok(Err(e @ (SyncError::Decode(_) | SyncError::Serialization(_)))) => {
                // Redelivery cannot fix a malformed message.
                warn!("discarding malformed remote message: {e}");
                true
            }
            Ok(Err(e)) => {
                error!(target: DIAGNOSTICS_TARGET, "remote message failed: {e}");
                false
            }
            Err(panic) => {
                error!(
                    target: DIAGNOSTICS_TARGET,
                    "remote message handler panicked: {}",
                    panic_message(panic.as_ref())
                );
                false
            }
        };

        if consumed {
            if let Err(e) = self.queue.delete(message).await {
                warn!("could not delete remote message: {e}");
            }
        }
    }

    /// Applies one message without touching the remote queue.
    pub async fn handle_message(&self, message: &RemoteMessage) -> SyncResult<MessageOutcome> {
        if message.attribute(ORIGIN_ATTRIBUTE) == Some(self.device_id.as_str()) {
            debug!("skipping message from this device");
            return Ok(MessageOutcome::SelfOrigin);
        }

        match RemoteCommand::decode(message)? {
            RemoteCommand::PollIntervalChanged(Some(interval)) => Ok(
                MessageOutcome::PollIntervalChanged(self.state.set_poll_interval(interval)),
            ),
            RemoteCommand::PollIntervalChanged(None) => Ok(MessageOutcome::Ignored(
                "poll interval change without a value".to_string(),
            )),
            RemoteCommand::LibraryUpdate(update) => {
                let matcher = Matcher::new(self.catalog.as_ref(), &self.state);
                Ok(MessageOutcome::Matched(matcher.apply(&update).await?))
            }
            RemoteCommand::Unknown(event) => {
                debug!("ignoring remote event {event}");
                Ok(MessageOutcome::Ignored(event))
            }
        }
    }
}
