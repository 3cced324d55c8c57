//! [`MediaCatalog`] over a media centre's HTTP JSON-RPC endpoint.

use super::MediaCatalog;
use crate::config::CatalogConfig;
use crate::error::{SyncError, SyncResult};
use crate::types::{
    BusyState, ContentDetail, ContentId, ContentKind, ContentSummary, ExternalIds, ShowDetail,
    WatchStatus, shares_external_id,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, trace};
use uuid::Uuid;

/// Listing page size.
const PAGE_SIZE: u64 = 100;

const DETAIL_PROPERTIES: [&str; 6] = ["title", "uniqueid", "lastplayed", "playcount", "resume", "file"];
const EPISODE_EXTRA_PROPERTIES: [&str; 5] = ["tvshowid", "dateadded", "episode", "season", "seasonid"];

/// Per-kind method and field names.
struct Methods {
    list: &'static str,
    list_field: &'static str,
    list_properties: &'static [&'static str],
    details: &'static str,
    set_details: &'static str,
    id_field: &'static str,
}

fn methods(kind: ContentKind) -> Methods {
    match kind {
        ContentKind::Movie => Methods {
            list: "VideoLibrary.GetMovies",
            list_field: "movies",
            list_properties: &["file", "dateadded", "uniqueid"],
            details: "VideoLibrary.GetMovieDetails",
            set_details: "VideoLibrary.SetMovieDetails",
            id_field: "movieid",
        },
        ContentKind::Episode => Methods {
            list: "VideoLibrary.GetEpisodes",
            list_field: "episodes",
            list_properties: &["file", "episode", "season", "tvshowid", "dateadded", "uniqueid"],
            details: "VideoLibrary.GetEpisodeDetails",
            set_details: "VideoLibrary.SetEpisodeDetails",
            id_field: "episodeid",
        },
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct Limits {
    end: u64,
    total: u64,
}

#[derive(Deserialize)]
struct ListedContent {
    #[serde(alias = "movieid", alias = "episodeid")]
    id: ContentId,
    #[serde(default)]
    label: String,
    #[serde(default)]
    file: String,
    #[serde(default)]
    tvshowid: Option<ContentId>,
    #[serde(default)]
    uniqueid: ExternalIds,
}

#[derive(Deserialize)]
struct ListedShow {
    tvshowid: ContentId,
    #[serde(default)]
    uniqueid: ExternalIds,
}

/// JSON-RPC catalog client.
pub struct JsonRpcCatalog {
    client: Client,
    url: String,
    credentials: Option<(String, String)>,
}

impl JsonRpcCatalog {
    pub fn new(url: impl Into<String>, timeout: Duration) -> SyncResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            credentials: None,
        })
    }

    /// Client for the configured endpoint, with basic auth when a user
    /// name is set.
    pub fn from_config(config: &CatalogConfig) -> SyncResult<Self> {
        let catalog = Self::new(config.url.clone(), config.request_timeout())?;
        Ok(if config.username.is_empty() {
            catalog
        } else {
            catalog.with_credentials(config.username.clone(), config.password.clone())
        })
    }

    /// HTTP basic credentials for the JSON-RPC endpoint.
    pub fn with_credentials(mut self, username: String, password: String) -> Self {
        self.credentials = Some((username, password));
        self
    }

    async fn call(&self, method: &str, params: Value) -> SyncResult<Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": Uuid::new_v4().to_string(),
            "method": method,
            "params": params,
        });
        trace!("JSON-RPC request {payload}");

        let mut request = self.client.post(&self.url).json(&payload);
        if let Some((user, pass)) = &self.credentials {
            request = request.basic_auth(user, Some(pass));
        }
        let resp: RpcResponse = request.send().await?.error_for_status()?.json().await?;

        if let Some(err) = resp.error {
            return Err(SyncError::Catalog(format!(
                "{method} failed ({}): {}",
                err.code, err.message
            )));
        }
        resp.result
            .ok_or_else(|| SyncError::Catalog(format!("{method} returned no result")))
    }

    /// Pages through a listing method and collects `field` from each page.
    async fn list<T: DeserializeOwned>(
        &self,
        method: &str,
        field: &str,
        properties: &[&str],
        filter: Option<Value>,
    ) -> SyncResult<Vec<T>> {
        let mut items = Vec::new();
        let mut start = 0;
        loop {
            let mut params = json!({
                "limits": { "start": start, "end": start + PAGE_SIZE },
                "properties": properties,
            });
            if let Some(filter) = &filter {
                params["filter"] = filter.clone();
            }

            let mut result = self.call(method, params).await?;
            let Some(limits) = result.get("limits").cloned() else {
                debug!("{method} returned no results");
                break;
            };
            let limits: Limits = serde_json::from_value(limits)?;

            if let Some(page) = result.get_mut(field).map(Value::take) {
                items.extend(serde_json::from_value::<Vec<T>>(page)?);
            }

            if limits.end >= limits.total || limits.end <= start {
                break;
            }
            start = limits.end;
        }
        Ok(items)
    }
}

#[async_trait]
impl MediaCatalog for JsonRpcCatalog {
    async fn find_by_path(
        &self,
        kind: ContentKind,
        filename: &str,
        dirpath: Option<&str>,
    ) -> SyncResult<Vec<ContentSummary>> {
        let by_name = json!({ "field": "filename", "operator": "is", "value": filename });
        let filter = match dirpath {
            Some(dir) => json!({ "and": [
                by_name,
                { "field": "path", "operator": "startswith", "value": dir },
            ]}),
            None => by_name,
        };

        let m = methods(kind);
        let listed: Vec<ListedContent> = self
            .list(m.list, m.list_field, m.list_properties, Some(filter))
            .await?;
        Ok(listed
            .into_iter()
            .map(|c| ContentSummary {
                id: c.id,
                label: c.label,
                file: c.file,
                show_id: c.tvshowid,
            })
            .collect())
    }

    async fn get_detail(
        &self,
        kind: ContentKind,
        id: ContentId,
    ) -> SyncResult<Option<ContentDetail>> {
        let m = methods(kind);
        let mut properties = DETAIL_PROPERTIES.to_vec();
        if kind == ContentKind::Episode {
            properties.extend(EPISODE_EXTRA_PROPERTIES);
        }

        let mut params = json!({ "properties": properties });
        params[m.id_field] = json!(id);
        let mut result = self.call(m.details, params).await?;

        let Some(raw) = result.get_mut(kind.details_field()).map(Value::take) else {
            return Ok(None);
        };
        let mut detail: ContentDetail = serde_json::from_value(raw)?;
        if let Some(file) = detail.extra.get("file").and_then(Value::as_str) {
            let (dirpath, filename) = split_path(file);
            detail.dirpath = dirpath.to_string();
            detail.filename = filename.to_string();
        }
        Ok(Some(detail))
    }

    async fn get_show_detail(&self, id: ContentId) -> SyncResult<Option<ShowDetail>> {
        let mut result = self
            .call(
                "VideoLibrary.GetTVShowDetails",
                json!({ "tvshowid": id, "properties": ["episode", "title", "uniqueid"] }),
            )
            .await?;
        match result.get_mut("tvshowdetails").map(Value::take) {
            Some(raw) => Ok(Some(serde_json::from_value(raw)?)),
            None => Ok(None),
        }
    }

    async fn resolve_show_id(&self, ids: &ExternalIds) -> SyncResult<Option<ContentId>> {
        let shows: Vec<ListedShow> = self
            .list("VideoLibrary.GetTVShows", "tvshows", &["uniqueid"], None)
            .await?;
        Ok(shows
            .into_iter()
            .find(|s| shares_external_id(ids, &s.uniqueid))
            .map(|s| s.tvshowid))
    }

    async fn resolve_content_id(
        &self,
        kind: ContentKind,
        ids: &ExternalIds,
    ) -> SyncResult<Option<ContentId>> {
        let m = methods(kind);
        let listed: Vec<ListedContent> = self.list(m.list, m.list_field, &["uniqueid"], None).await?;
        Ok(listed
            .into_iter()
            .find(|c| shares_external_id(ids, &c.uniqueid))
            .map(|c| c.id))
    }

    async fn set_watch_status(
        &self,
        kind: ContentKind,
        id: ContentId,
        status: &WatchStatus,
    ) -> SyncResult<()> {
        let m = methods(kind);
        let mut params = serde_json::to_value(status)?;
        params[m.id_field] = json!(id);
        self.call(m.set_details, params).await?;
        Ok(())
    }

    async fn trigger_scan(&self, dirpath: Option<&str>) -> SyncResult<()> {
        let mut params = json!({ "showdialogs": true });
        if let Some(dir) = dirpath.filter(|d| !d.is_empty()) {
            params["directory"] = json!(scan_directory(dir));
        }
        self.call("VideoLibrary.Scan", params).await?;
        Ok(())
    }

    async fn busy_state(&self) -> SyncResult<BusyState> {
        let players = self.call("Player.GetActivePlayers", json!({})).await?;
        let booleans = self
            .call(
                "XBMC.GetInfoBooleans",
                json!({ "booleans": ["Library.IsScanning"] }),
            )
            .await?;

        Ok(BusyState {
            is_playing: players.as_array().is_some_and(|p| !p.is_empty()),
            is_scanning: booleans
                .get("Library.IsScanning")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }
}

/// Splits a media path into directory and file name at the last separator.
pub fn split_path(file: &str) -> (&str, &str) {
    match file.rfind(['/', '\\']) {
        Some(0) => (&file[..1], &file[1..]),
        Some(i) => (&file[..i], &file[i + 1..]),
        None => ("", file),
    }
}

/// Appends the trailing separator a scan directory needs.
pub fn scan_directory(dir: &str) -> String {
    let separator = if dir.contains("://") || dir.starts_with('/') {
        '/'
    } else if dir.starts_with('\\') || dir.get(1..3) == Some(":\\") {
        '\\'
    } else {
        return dir.to_string();
    };

    if dir.ends_with(separator) {
        dir.to_string()
    } else {
        format!("{dir}{separator}")
    }
}
