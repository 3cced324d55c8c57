//! Tiered matching of a remote update against the local catalog.
//!
//! Tiers run in order and each only runs if the previous found nothing:
//! 1. exact filename under the remote directory
//! 2. external ids (for episodes, of the parent show) plus filename
//! 3. a one-shot rescan of the remote directory

use super::message::RemoteUpdate;
use crate::catalog::MediaCatalog;
use crate::error::SyncResult;
use crate::state::{RuntimeState, ScanDecision};
use crate::types::{ContentDetail, ContentId, ContentKind, ContentSummary, WatchStatus};
use tracing::{debug, info, warn};

/// Which tier produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    ExactPath,
    Identity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Watch state was written to `updated` local items.
    Updated { tier: MatchTier, updated: usize },
    /// No match yet; a scan of `dirpath` was started.
    ScanRequested { dirpath: String },
    /// No match even after a rescan.
    Unmatched,
}

/// Local item an identity lookup resolved to.
#[derive(Clone, Copy)]
enum Owner {
    Content(ContentId),
    Show(ContentId),
}

/// Applies remote updates to the local catalog.
pub struct Matcher<'a> {
    catalog: &'a dyn MediaCatalog,
    state: &'a RuntimeState,
}

impl<'a> Matcher<'a> {
    pub fn new(catalog: &'a dyn MediaCatalog, state: &'a RuntimeState) -> Self {
        Self { catalog, state }
    }

    pub async fn apply(&self, update: &RemoteUpdate) -> SyncResult<MatchOutcome> {
        let kind = update.kind()?;
        let content = update.content(kind)?;
        let status = content.watch_status();
        debug!("remote {kind} update for {}", update.title(kind));

        let exact = self
            .catalog
            .find_by_path(kind, &content.filename, Some(&content.dirpath))
            .await?;
        if !exact.is_empty() {
            let updated = self.write_all(kind, &exact, &status).await?;
            return Ok(MatchOutcome::Updated {
                tier: MatchTier::ExactPath,
                updated,
            });
        }

        let by_identity = self.identity_matches(kind, update, content).await?;
        if !by_identity.is_empty() {
            let updated = self.write_all(kind, &by_identity, &status).await?;
            return Ok(MatchOutcome::Updated {
                tier: MatchTier::Identity,
                updated,
            });
        }

        match self.state.claim_scan(&content.dirpath) {
            ScanDecision::Scan => {
                debug!("no local match, scanning {}", content.dirpath);
                if let Err(e) = self.catalog.trigger_scan(Some(&content.dirpath)).await {
                    self.state.release_scan(&content.dirpath);
                    return Err(e);
                }
                Ok(MatchOutcome::ScanRequested {
                    dirpath: content.dirpath.clone(),
                })
            }
            ScanDecision::GiveUp => {
                warn!(
                    "could not sync {kind} '{}': no local match",
                    update.title(kind)
                );
                Ok(MatchOutcome::Unmatched)
            }
        }
    }

    async fn identity_matches(
        &self,
        kind: ContentKind,
        update: &RemoteUpdate,
        content: &ContentDetail,
    ) -> SyncResult<Vec<ContentSummary>> {
        let owner = match kind {
            ContentKind::Movie => self
                .catalog
                .resolve_content_id(kind, &content.uniqueid)
                .await?
                .map(Owner::Content),
            ContentKind::Episode => match &update.tvshowdetails {
                Some(show) => self
                    .catalog
                    .resolve_show_id(&show.uniqueid)
                    .await?
                    .map(Owner::Show),
                None => None,
            },
        };
        let Some(owner) = owner else {
            return Ok(Vec::new());
        };

        let mut candidates = self
            .catalog
            .find_by_path(kind, &content.filename, None)
            .await?;
        candidates.retain(|c| match owner {
            Owner::Content(id) => c.id == id,
            Owner::Show(id) => c.show_id == Some(id),
        });
        Ok(candidates)
    }

    async fn write_all(
        &self,
        kind: ContentKind,
        matches: &[ContentSummary],
        status: &WatchStatus,
    ) -> SyncResult<usize> {
        for item in matches {
            // Must be recorded before the write so the echo is recognised.
            self.state.expect_local_update(kind, item.id);
            if let Err(e) = self.catalog.set_watch_status(kind, item.id, status).await {
                self.state.take_expected_update(kind, item.id);
                return Err(e);
            }
            info!("synced watch status for {kind} {}", item.label);
        }
        Ok(matches.len())
    }
}
