//! Decoding of remote queue messages.

use super::RemoteMessage;
use crate::error::{SyncError, SyncResult};
use crate::notifications::ItemRef;
use crate::types::{ContentDetail, ContentKind, ShowDetail};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

pub const ORIGIN_ATTRIBUTE: &str = "origin";
pub const EVENT_ATTRIBUTE: &str = "event";

pub const POLL_INTERVAL_CHANGED: &str = "kodi.update_poll_interval.changed";
pub const LIBRARY_UPDATE_SUFFIX: &str = "VideoLibrary.OnUpdate";

/// What a remote message asks this device to do.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCommand {
    /// New poll interval; `None` when the body carried no usable value.
    PollIntervalChanged(Option<Duration>),
    LibraryUpdate(Box<RemoteUpdate>),
    Unknown(String),
}

impl RemoteCommand {
    pub fn decode(message: &RemoteMessage) -> SyncResult<Self> {
        let event = message
            .attribute(EVENT_ATTRIBUTE)
            .ok_or_else(|| SyncError::Decode("message has no event attribute".to_string()))?;

        if event == POLL_INTERVAL_CHANGED {
            let body: Value = serde_json::from_str(&message.body)?;
            return Ok(RemoteCommand::PollIntervalChanged(
                body.get("new_poll_interval")
                    .and_then(seconds)
                    .map(Duration::from_secs),
            ));
        }

        if event.ends_with(LIBRARY_UPDATE_SUFFIX) {
            let update: RemoteUpdate = serde_json::from_str(&message.body)?;
            return Ok(RemoteCommand::LibraryUpdate(Box::new(update)));
        }

        Ok(RemoteCommand::Unknown(event.to_string()))
    }
}

fn seconds(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A library update broadcast by another device.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteUpdate {
    pub notification: UpdateNotification,
    #[serde(default)]
    pub moviedetails: Option<ContentDetail>,
    #[serde(default)]
    pub episodedetails: Option<ContentDetail>,
    #[serde(default)]
    pub tvshowdetails: Option<ShowDetail>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpdateNotification {
    pub data: UpdateData,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpdateData {
    pub item: ItemRef,
}

impl RemoteUpdate {
    pub fn kind(&self) -> SyncResult<ContentKind> {
        self.notification
            .data
            .item
            .kind
            .parse()
            .map_err(SyncError::Decode)
    }

    /// Details of the updated movie or episode.
    pub fn content(&self, kind: ContentKind) -> SyncResult<&ContentDetail> {
        let detail = match kind {
            ContentKind::Movie => self.moviedetails.as_ref(),
            ContentKind::Episode => self.episodedetails.as_ref(),
        };
        detail.ok_or_else(|| SyncError::Decode(format!("update has no {}", kind.details_field())))
    }

    /// Name for logs; episodes are prefixed with their show.
    pub fn title(&self, kind: ContentKind) -> String {
        let content = self
            .content(kind)
            .map(ContentDetail::display_name)
            .unwrap_or_default();
        match (&self.tvshowdetails, kind) {
            (Some(show), ContentKind::Episode) => format!("{} - {content}", show.title),
            _ => content.to_string(),
        }
    }
}
