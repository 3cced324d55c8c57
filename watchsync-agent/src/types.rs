//! Catalog data types shared by the workers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Local catalog identifier of a movie, episode or show.
pub type ContentId = i64;

/// External identifiers keyed by provider (`imdb`, `tmdb`, `tvdb`, ...).
pub type ExternalIds = BTreeMap<String, String>;

/// Kinds of content whose watch state is synced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Movie,
    Episode,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Movie => "movie",
            ContentKind::Episode => "episode",
        }
    }

    /// Payload field carrying this kind's details.
    pub fn details_field(&self) -> &'static str {
        match self {
            ContentKind::Movie => "moviedetails",
            ContentKind::Episode => "episodedetails",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(ContentKind::Movie),
            "episode" => Ok(ContentKind::Episode),
            other => Err(format!("unsupported content type: {other}")),
        }
    }
}

/// A catalog entry returned by a path search.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentSummary {
    pub id: ContentId,
    pub label: String,
    pub file: String,
    /// Owning show, for episodes.
    pub show_id: Option<ContentId>,
}

/// Resume point in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Resume {
    #[serde(default)]
    pub position: f64,
    #[serde(default)]
    pub total: f64,
}

/// The fields written when a remote update is applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchStatus {
    pub playcount: u32,
    pub resume: Resume,
    #[serde(rename = "lastplayed")]
    pub last_played: String,
}

/// Movie or episode details as exchanged between devices.
///
/// Fields the agent does not interpret (season, episode, label, the local
/// id, ...) are kept in `extra` and forwarded untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentDetail {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub dirpath: String,
    #[serde(default)]
    pub uniqueid: ExternalIds,
    #[serde(default)]
    pub playcount: u32,
    #[serde(default)]
    pub resume: Resume,
    #[serde(default)]
    pub lastplayed: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvshowid: Option<ContentId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContentDetail {
    pub fn watch_status(&self) -> WatchStatus {
        WatchStatus {
            playcount: self.playcount,
            resume: self.resume,
            last_played: self.lastplayed.clone(),
        }
    }

    /// Human-readable name for logs.
    pub fn display_name(&self) -> &str {
        if self.title.is_empty() {
            &self.filename
        } else {
            &self.title
        }
    }
}

/// TV show details, used to resolve episodes across devices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShowDetail {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub uniqueid: ExternalIds,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Whether the local player is busy enough that remote updates must wait.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusyState {
    pub is_playing: bool,
    pub is_scanning: bool,
}

impl BusyState {
    pub fn is_busy(&self) -> bool {
        self.is_playing || self.is_scanning
    }
}

/// True if the two id sets agree on at least one provider.
///
/// Empty values never match.
pub fn shares_external_id(wanted: &ExternalIds, candidate: &ExternalIds) -> bool {
    wanted
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .any(|(provider, value)| candidate.get(provider) == Some(value))
}
