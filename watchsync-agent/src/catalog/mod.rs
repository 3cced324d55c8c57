//! The local media catalog the agent reads from and writes to.

mod jsonrpc;

pub use jsonrpc::JsonRpcCatalog;

use crate::error::SyncResult;
use crate::types::{
    BusyState, ContentDetail, ContentId, ContentKind, ContentSummary, ExternalIds, ShowDetail,
    WatchStatus,
};
use async_trait::async_trait;

/// Capabilities the agent needs from the local catalog.
#[async_trait]
pub trait MediaCatalog: Send + Sync {
    /// Content of `kind` whose filename equals `filename` and, when given,
    /// whose path starts with `dirpath`.
    async fn find_by_path(
        &self,
        kind: ContentKind,
        filename: &str,
        dirpath: Option<&str>,
    ) -> SyncResult<Vec<ContentSummary>>;

    async fn get_detail(&self, kind: ContentKind, id: ContentId)
    -> SyncResult<Option<ContentDetail>>;

    async fn get_show_detail(&self, id: ContentId) -> SyncResult<Option<ShowDetail>>;

    /// Local show sharing at least one external id with `ids`.
    async fn resolve_show_id(&self, ids: &ExternalIds) -> SyncResult<Option<ContentId>>;

    /// Local content of `kind` sharing at least one external id with `ids`.
    async fn resolve_content_id(
        &self,
        kind: ContentKind,
        ids: &ExternalIds,
    ) -> SyncResult<Option<ContentId>>;

    async fn set_watch_status(
        &self,
        kind: ContentKind,
        id: ContentId,
        status: &WatchStatus,
    ) -> SyncResult<()>;

    /// Starts a library scan, limited to `dirpath` when given.
    async fn trigger_scan(&self, dirpath: Option<&str>) -> SyncResult<()>;

    async fn busy_state(&self) -> SyncResult<BusyState>;
}
