//! Capture of local host notifications.
//!
//! The host calls [`NotificationCapture::on_notification`] for every
//! notification it sees. Relevant ones are filtered, prioritised, and
//! queued for the reconciler.

use crate::queue::{Priority, PriorityQueue};
use crate::types::ContentId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Sender of notifications raised by the media centre itself.
pub const HOST_SENDER: &str = "xbmc";

pub const LIBRARY_UPDATE: &str = "VideoLibrary.OnUpdate";
pub const SCAN_STARTED: &str = "VideoLibrary.OnScanStarted";
pub const SCAN_FINISHED: &str = "VideoLibrary.OnScanFinished";
pub const SYSTEM_WAKE: &str = "System.OnWake";
pub const SCREENSAVER_ACTIVATED: &str = "GUI.OnScreensaverActivated";
pub const SCREENSAVER_DEACTIVATED: &str = "GUI.OnScreensaverDeactivated";

/// Notifications that other components wait on.
const WAKEUP_METHODS: [&str; 4] = [
    SYSTEM_WAKE,
    SCREENSAVER_DEACTIVATED,
    SCREENSAVER_ACTIVATED,
    SCAN_FINISHED,
];

/// A host notification as queued for the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalNotification {
    pub sender: String,
    pub method: String,
    /// Raw JSON payload, when the notification carries one.
    pub data: Option<String>,
}

/// `item` reference inside a library update payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: ContentId,
}

#[derive(Debug, Default)]
struct ScanStats {
    started_at: Option<Instant>,
    last_duration: Option<Duration>,
}

/// Filters host notifications onto the local queue.
pub struct NotificationCapture {
    queue: PriorityQueue<LocalNotification>,
    scan: Mutex<ScanStats>,
}

impl NotificationCapture {
    pub fn new(queue: PriorityQueue<LocalNotification>) -> Self {
        Self {
            queue,
            scan: Mutex::new(ScanStats::default()),
        }
    }

    /// Handles one host notification. Returns true if it was queued.
    pub fn on_notification(&self, sender: &str, method: &str, data: &str) -> bool {
        if sender != HOST_SENDER {
            trace!("ignoring notification from {sender}");
            return false;
        }

        match method {
            SCAN_STARTED => self.scan_started(),
            SCAN_FINISHED => self.scan_finished(),
            _ => {}
        }

        if WAKEUP_METHODS.contains(&method) {
            self.enqueue(Priority::WAKEUP, sender, method, None);
            return true;
        }

        if method == LIBRARY_UPDATE {
            let Ok(payload) = serde_json::from_str::<Value>(data) else {
                debug!("dropping {method} with unparseable payload");
                return false;
            };
            if is_truthy(payload.get("transaction")) || is_truthy(payload.get("added")) {
                trace!("dropping bulk {method}");
                return false;
            }
            if payload.get("item").is_none() {
                debug!("dropping {method} without item");
                return false;
            }
            self.enqueue(Priority::NORMAL, sender, method, Some(data.to_string()));
            return true;
        }

        false
    }

    fn enqueue(&self, priority: u8, sender: &str, method: &str, data: Option<String>) {
        debug!("queued local notification {method}");
        self.queue.push(
            priority,
            LocalNotification {
                sender: sender.to_string(),
                method: method.to_string(),
                data,
            },
        );
    }

    fn stats(&self) -> MutexGuard<'_, ScanStats> {
        self.scan.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn scan_started(&self) {
        self.stats().started_at = Some(Instant::now());
    }

    fn scan_finished(&self) {
        let mut stats = self.stats();
        if let Some(started) = stats.started_at.take() {
            let elapsed = started.elapsed();
            debug!("library scan took {:.1}s", elapsed.as_secs_f64());
            stats.last_duration = Some(elapsed);
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.stats().started_at.is_some()
    }

    /// Duration of the last library scan seen start to finish.
    pub fn last_scan_duration(&self) -> Option<Duration> {
        self.stats().last_duration
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}
