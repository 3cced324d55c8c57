//! In-memory collaborators shared by the agent tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use watchsync_agent::error::{SyncError, SyncResult};
use watchsync_agent::remote::{EVENT_ATTRIBUTE, ORIGIN_ATTRIBUTE, RemoteMessage, RemoteQueue};
use watchsync_agent::{
    BusyState, ContentDetail, ContentId, ContentKind, ContentSummary, ExternalIds,
    catalog::MediaCatalog, ShowDetail, WatchStatus, shares_external_id,
};
use watchsync_auth::{AuthError, AuthResult, TokenSource};

pub const LOCAL_DEVICE: &str = "deviceA";
pub const REMOTE_DEVICE: &str = "deviceB";
pub const UPDATE_EVENT: &str = "kodi.client.notification.VideoLibrary.OnUpdate";

pub fn ids(pairs: &[(&str, &str)]) -> ExternalIds {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ── Catalog ──

/// One local library entry.
#[derive(Debug, Clone)]
pub struct Entry {
    pub kind: ContentKind,
    pub id: ContentId,
    pub title: String,
    pub dirpath: String,
    pub filename: String,
    pub uniqueid: ExternalIds,
    pub show_id: Option<ContentId>,
}

impl Entry {
    pub fn movie(id: ContentId, dirpath: &str, filename: &str, uniqueid: ExternalIds) -> Self {
        Self {
            kind: ContentKind::Movie,
            id,
            title: format!("Movie {id}"),
            dirpath: dirpath.into(),
            filename: filename.into(),
            uniqueid,
            show_id: None,
        }
    }

    pub fn episode(id: ContentId, show_id: ContentId, dirpath: &str, filename: &str) -> Self {
        Self {
            kind: ContentKind::Episode,
            id,
            title: format!("Episode {id}"),
            dirpath: dirpath.into(),
            filename: filename.into(),
            uniqueid: ExternalIds::new(),
            show_id: Some(show_id),
        }
    }

    fn summary(&self) -> ContentSummary {
        ContentSummary {
            id: self.id,
            label: self.title.clone(),
            file: format!("{}{}", self.dirpath, self.filename),
            show_id: self.show_id,
        }
    }
}

/// Every call the agent made against the catalog, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogCall {
    FindByPath(ContentKind, String, Option<String>),
    ResolveShow,
    ResolveContent(ContentKind),
    SetWatchStatus(ContentKind, ContentId, WatchStatus),
    Scan(Option<String>),
    GetDetail(ContentKind, ContentId),
    GetShow(ContentId),
}

#[derive(Default)]
pub struct FakeCatalog {
    entries: Mutex<Vec<Entry>>,
    shows: Mutex<Vec<(ContentId, ShowDetail)>>,
    calls: Mutex<Vec<CatalogCall>>,
    pub playing: AtomicBool,
    pub scanning: AtomicBool,
    pub fail_writes: AtomicBool,
    /// Busy probes never complete.
    pub stall_busy_probe: AtomicBool,
}

impl FakeCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_entries(entries: Vec<Entry>) -> Arc<Self> {
        let catalog = Self::default();
        *catalog.entries.lock().unwrap() = entries;
        Arc::new(catalog)
    }

    pub fn add_show(&self, id: ContentId, title: &str, uniqueid: ExternalIds) {
        self.shows.lock().unwrap().push((
            id,
            ShowDetail {
                title: title.into(),
                uniqueid,
                ..Default::default()
            },
        ));
    }

    pub fn calls(&self) -> Vec<CatalogCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<(ContentKind, ContentId, WatchStatus)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                CatalogCall::SetWatchStatus(kind, id, status) => Some((kind, id, status)),
                _ => None,
            })
            .collect()
    }

    pub fn scans(&self) -> Vec<Option<String>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                CatalogCall::Scan(dir) => Some(dir),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: CatalogCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl MediaCatalog for FakeCatalog {
    async fn find_by_path(
        &self,
        kind: ContentKind,
        filename: &str,
        dirpath: Option<&str>,
    ) -> SyncResult<Vec<ContentSummary>> {
        self.record(CatalogCall::FindByPath(
            kind,
            filename.into(),
            dirpath.map(String::from),
        ));
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind && e.filename == filename)
            .filter(|e| dirpath.is_none_or(|dir| e.dirpath.starts_with(dir)))
            .map(Entry::summary)
            .collect())
    }

    async fn get_detail(
        &self,
        kind: ContentKind,
        id: ContentId,
    ) -> SyncResult<Option<ContentDetail>> {
        self.record(CatalogCall::GetDetail(kind, id));
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.kind == kind && e.id == id)
            .map(|e| ContentDetail {
                title: e.title.clone(),
                filename: e.filename.clone(),
                dirpath: e.dirpath.clone(),
                uniqueid: e.uniqueid.clone(),
                tvshowid: e.show_id,
                ..Default::default()
            }))
    }

    async fn get_show_detail(&self, id: ContentId) -> SyncResult<Option<ShowDetail>> {
        self.record(CatalogCall::GetShow(id));
        Ok(self
            .shows
            .lock()
            .unwrap()
            .iter()
            .find(|(show_id, _)| *show_id == id)
            .map(|(_, show)| show.clone()))
    }

    async fn resolve_show_id(&self, ids: &ExternalIds) -> SyncResult<Option<ContentId>> {
        self.record(CatalogCall::ResolveShow);
        Ok(self
            .shows
            .lock()
            .unwrap()
            .iter()
            .find(|(_, show)| shares_external_id(ids, &show.uniqueid))
            .map(|(id, _)| *id))
    }

    async fn resolve_content_id(
        &self,
        kind: ContentKind,
        ids: &ExternalIds,
    ) -> SyncResult<Option<ContentId>> {
        self.record(CatalogCall::ResolveContent(kind));
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.kind == kind && shares_external_id(ids, &e.uniqueid))
            .map(|e| e.id))
    }

    async fn set_watch_status(
        &self,
        kind: ContentKind,
        id: ContentId,
        status: &WatchStatus,
    ) -> SyncResult<()> {
        self.record(CatalogCall::SetWatchStatus(kind, id, status.clone()));
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SyncError::Catalog("database is locked".into()));
        }
        Ok(())
    }

    async fn trigger_scan(&self, dirpath: Option<&str>) -> SyncResult<()> {
        self.record(CatalogCall::Scan(dirpath.map(String::from)));
        Ok(())
    }

    async fn busy_state(&self) -> SyncResult<BusyState> {
        if self.stall_busy_probe.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(BusyState {
            is_playing: self.playing.load(Ordering::SeqCst),
            is_scanning: self.scanning.load(Ordering::SeqCst),
        })
    }
}

// ── Remote queue ──

/// Queue fake: `receive` hands out one message at a time; messages that
/// are not deleted stay "in flight" and are not redelivered.
#[derive(Default)]
pub struct FakeQueue {
    pending: Mutex<VecDeque<RemoteMessage>>,
    in_flight: Mutex<Vec<RemoteMessage>>,
    deleted: Mutex<Vec<String>>,
    pub receives: AtomicUsize,
    /// Receives never complete, like a long poll that outlives shutdown.
    pub stall_receive: AtomicBool,
    failure: Mutex<Option<fn() -> SyncError>>,
}

impl FakeQueue {
    pub fn with_messages(messages: Vec<RemoteMessage>) -> Arc<Self> {
        let queue = Self::default();
        queue.pending.lock().unwrap().extend(messages);
        Arc::new(queue)
    }

    pub fn push(&self, message: RemoteMessage) {
        self.pending.lock().unwrap().push_back(message);
    }

    /// Makes every receive fail with the error built by `failure`.
    pub fn fail_with(&self, failure: fn() -> SyncError) {
        *self.failure.lock().unwrap() = Some(failure);
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    /// Receipts handed out but never deleted.
    pub fn undeleted(&self) -> Vec<String> {
        let deleted = self.deleted();
        self.in_flight
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.receipt.clone())
            .filter(|r| !deleted.contains(r))
            .collect()
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

#[async_trait]
impl RemoteQueue for FakeQueue {
    async fn receive(&self) -> SyncResult<Vec<RemoteMessage>> {
        self.receives.fetch_add(1, Ordering::SeqCst);
        if self.stall_receive.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(failure) = *self.failure.lock().unwrap() {
            return Err(failure());
        }
        let next = self.pending.lock().unwrap().pop_front();
        Ok(next
            .inspect(|m| self.in_flight.lock().unwrap().push(m.clone()))
            .into_iter()
            .collect())
    }

    async fn delete(&self, message: &RemoteMessage) -> SyncResult<()> {
        self.deleted.lock().unwrap().push(message.receipt.clone());
        Ok(())
    }
}

// ── Messages ──

pub fn remote_message(receipt: &str, origin: &str, event: &str, body: Value) -> RemoteMessage {
    RemoteMessage {
        receipt: receipt.into(),
        body: body.to_string(),
        attributes: [
            (ORIGIN_ATTRIBUTE.to_string(), origin.to_string()),
            (EVENT_ATTRIBUTE.to_string(), event.to_string()),
        ]
        .into(),
    }
}

/// Body of a movie update as another device would broadcast it.
pub fn movie_update_body(id: ContentId, dirpath: &str, filename: &str, imdb: &str) -> Value {
    json!({
        "notification": {
            "sender": "xbmc",
            "method": "VideoLibrary.OnUpdate",
            "data": { "item": { "type": "movie", "id": id } }
        },
        "moviedetails": {
            "title": "Remote Movie",
            "filename": filename,
            "dirpath": dirpath,
            "uniqueid": { "imdb": imdb },
            "playcount": 1,
            "resume": { "position": 120.0, "total": 0.0 },
            "lastplayed": "2020-01-01 00:00:00"
        }
    })
}

pub fn episode_update_body(dirpath: &str, filename: &str, show_tvdb: &str) -> Value {
    json!({
        "notification": {
            "sender": "xbmc",
            "method": "VideoLibrary.OnUpdate",
            "data": { "item": { "type": "episode", "id": 901 } }
        },
        "episodedetails": {
            "title": "Pilot",
            "filename": filename,
            "dirpath": dirpath,
            "playcount": 2,
            "resume": { "position": 0.0, "total": 0.0 },
            "lastplayed": "2021-06-01 20:00:00",
            "tvshowid": 12
        },
        "tvshowdetails": {
            "title": "The Show",
            "uniqueid": { "tvdb": show_tvdb }
        }
    })
}

// ── Tokens ──

/// Token source returning a fixed token and counting invalidations.
#[derive(Default)]
pub struct FixedTokens {
    pub invalidations: AtomicUsize,
    pub reject: bool,
}

impl FixedTokens {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rejected() -> Arc<Self> {
        Arc::new(Self {
            reject: true,
            ..Default::default()
        })
    }
}

pub const FIXED_TOKEN: &str = "test-bearer-token";

#[async_trait]
impl TokenSource for FixedTokens {
    async fn bearer_token(&self) -> AuthResult<String> {
        if self.reject {
            return Err(AuthError::Client("401 invalid_client".into()));
        }
        Ok(FIXED_TOKEN.into())
    }

    async fn invalidate(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}
