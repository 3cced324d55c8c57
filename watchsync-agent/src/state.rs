//! Runtime state shared by the workers.
//!
//! Holds the mutable settings (queue URL, poll interval), the one-shot
//! ignore set used to swallow echoes of our own catalog writes, the rescan
//! history, and the connection status. Every accessor takes the lock for a
//! single step, so no caller ever holds it across an await.

use crate::config::{MIN_POLL_INTERVAL_SECS, RemoteConfig};
use crate::types::{ContentId, ContentKind};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// What the agent reports about its link to the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Starting,
    Unregistered,
    Registered,
    Online,
    Offline,
    AuthFailed(String),
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Starting => f.write_str("starting"),
            ConnectionStatus::Unregistered => f.write_str("unregistered"),
            ConnectionStatus::Registered => f.write_str("registered"),
            ConnectionStatus::Online => f.write_str("online"),
            ConnectionStatus::Offline => f.write_str("offline"),
            ConnectionStatus::AuthFailed(reason) => write!(f, "authentication failed: {reason}"),
        }
    }
}

/// Result of consulting the rescan history for a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDecision {
    /// First miss for this path: a scan should be triggered.
    Scan,
    /// The previous scan did not help; the path has been forgotten.
    GiveUp,
}

struct Inner {
    queue_url: String,
    poll_interval: Duration,
    ignored: HashMap<ContentKind, HashSet<ContentId>>,
    scanned: HashSet<String>,
}

/// Shared runtime state.
pub struct RuntimeState {
    inner: Mutex<Inner>,
    status: watch::Sender<ConnectionStatus>,
}

impl RuntimeState {
    pub fn new(queue_url: impl Into<String>, poll_interval: Duration) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Starting);
        Self {
            inner: Mutex::new(Inner {
                queue_url: queue_url.into(),
                poll_interval: floor_poll_interval(poll_interval),
                ignored: HashMap::new(),
                scanned: HashSet::new(),
            }),
            status,
        }
    }

    pub fn from_config(config: &RemoteConfig) -> Self {
        Self::new(config.queue_url.clone(), config.poll_interval())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Settings ──

    pub fn queue_url(&self) -> String {
        self.lock().queue_url.clone()
    }

    pub fn set_queue_url(&self, url: impl Into<String>) {
        self.lock().queue_url = url.into();
    }

    pub fn poll_interval(&self) -> Duration {
        self.lock().poll_interval
    }

    /// Stores a new poll interval, raised to the minimum if needed.
    /// Returns the interval actually stored.
    pub fn set_poll_interval(&self, interval: Duration) -> Duration {
        let interval = floor_poll_interval(interval);
        let mut inner = self.lock();
        if inner.poll_interval != interval {
            info!("poll interval changed to {}s", interval.as_secs());
        }
        inner.poll_interval = interval;
        interval
    }

    // ── Ignore set ──

    /// Records that we are about to write `id`, so the resulting local
    /// notification must not be re-broadcast.
    pub fn expect_local_update(&self, kind: ContentKind, id: ContentId) {
        self.lock().ignored.entry(kind).or_default().insert(id);
    }

    /// Consumes a pending ignore entry. Returns true if one existed.
    pub fn take_expected_update(&self, kind: ContentKind, id: ContentId) -> bool {
        let mut inner = self.lock();
        let Some(ids) = inner.ignored.get_mut(&kind) else {
            return false;
        };
        let found = ids.remove(&id);
        if ids.is_empty() {
            inner.ignored.remove(&kind);
        }
        found
    }

    pub fn is_update_expected(&self, kind: ContentKind, id: ContentId) -> bool {
        self.lock()
            .ignored
            .get(&kind)
            .is_some_and(|ids| ids.contains(&id))
    }

    // ── Scan history ──

    /// Decides whether a miss on `dirpath` should trigger a rescan.
    ///
    /// The first miss records the path and asks for a scan; the next miss
    /// forgets it again and gives up.
    pub fn claim_scan(&self, dirpath: &str) -> ScanDecision {
        let mut inner = self.lock();
        if inner.scanned.remove(dirpath) {
            debug!("{dirpath} already rescanned without a match");
            ScanDecision::GiveUp
        } else {
            inner.scanned.insert(dirpath.to_string());
            ScanDecision::Scan
        }
    }

    /// Undoes a [`claim_scan`](Self::claim_scan) whose scan could not be issued.
    pub fn release_scan(&self, dirpath: &str) {
        self.lock().scanned.remove(dirpath);
    }

    pub fn was_scanned(&self, dirpath: &str) -> bool {
        self.lock().scanned.contains(dirpath)
    }

    // ── Connection status ──

    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    pub fn set_status(&self, status: ConnectionStatus) {
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            debug!("connection status: {status}");
            *current = status;
            true
        });
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }
}

fn floor_poll_interval(interval: Duration) -> Duration {
    interval.max(Duration::from_secs(MIN_POLL_INTERVAL_SECS))
}
