//! Reconciles local notifications into outbound events.
//!
//! Library updates are enriched with catalog details and published, unless
//! they are the echo of a write the remote consumer just made. Wake and
//! screensaver notifications wake the remote consumer.

use crate::catalog::MediaCatalog;
use crate::error::{SyncError, SyncResult};
use crate::events::EventPublisher;
use crate::notifications::{
    ItemRef, LIBRARY_UPDATE, LocalNotification, SCAN_FINISHED, SCREENSAVER_ACTIVATED,
    SCREENSAVER_DEACTIVATED, SYSTEM_WAKE,
};
use crate::signal::Signal;
use crate::state::RuntimeState;
use crate::types::ContentKind;
use crate::worker::MessageHandler;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

/// Prefix of events forwarded from local notifications.
pub const NOTIFICATION_EVENT_PREFIX: &str = "kodi.client.notification.";

pub struct Reconciler {
    state: Arc<RuntimeState>,
    catalog: Arc<dyn MediaCatalog>,
    events: EventPublisher,
    wakeup: Signal,
}

impl Reconciler {
    pub fn new(
        state: Arc<RuntimeState>,
        catalog: Arc<dyn MediaCatalog>,
        events: EventPublisher,
        wakeup: Signal,
    ) -> Self {
        Self {
            state,
            catalog,
            events,
            wakeup,
        }
    }

    async fn library_update(&self, notification: &LocalNotification) -> SyncResult<()> {
        let raw = notification
            .data
            .as_deref()
            .ok_or_else(|| SyncError::Decode("library update without data".to_string()))?;
        let data: Value = serde_json::from_str(raw)?;
        let item: ItemRef = serde_json::from_value(
            data.get("item")
                .cloned()
                .ok_or_else(|| SyncError::Decode("library update without item".to_string()))?,
        )?;

        let Ok(kind) = item.kind.parse::<ContentKind>() else {
            debug!("ignoring library update for {}", item.kind);
            return Ok(());
        };

        if self.state.take_expected_update(kind, item.id) {
            debug!("suppressing echo of remote update to {kind} {}", item.id);
            return Ok(());
        }

        let mut payload = json!({
            "notification": {
                "sender": notification.sender,
                "method": notification.method,
                "data": data,
            }
        });

        let detail = self.catalog.get_detail(kind, item.id).await?;
        if kind == ContentKind::Episode {
            if let Some(show_id) = detail.as_ref().and_then(|d| d.tvshowid) {
                payload["tvshowdetails"] =
                    serde_json::to_value(self.catalog.get_show_detail(show_id).await?)?;
            }
        }
        payload[kind.details_field()] = serde_json::to_value(detail)?;

        self.events.publish(
            format!("{NOTIFICATION_EVENT_PREFIX}{}", notification.method),
            Some(payload),
        );
        Ok(())
    }

    fn forward(&self, notification: &LocalNotification) {
        self.events.publish(
            format!("{NOTIFICATION_EVENT_PREFIX}{}", notification.method),
            Some(json!({
                "notification": {
                    "sender": notification.sender,
                    "method": notification.method,
                    "data": notification.data,
                }
            })),
        );
    }
}

#[async_trait]
impl MessageHandler<LocalNotification> for Reconciler {
    async fn handle(&mut self, notification: LocalNotification) -> SyncResult<()> {
        match notification.method.as_str() {
            LIBRARY_UPDATE => self.library_update(&notification).await?,
            SYSTEM_WAKE | SCAN_FINISHED => self.wakeup.set(),
            SCREENSAVER_DEACTIVATED => {
                self.wakeup.set();
                self.forward(&notification);
            }
            SCREENSAVER_ACTIVATED => self.forward(&notification),
            other => debug!("no action for {other}"),
        }
        Ok(())
    }
}
