use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    Track,
    Album,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Track => "track",
            MediaType::Album => "album",
        }
    }

    /// Lenient form of `from_str`: anything that isn't exactly "album" is a track.
    pub fn or_track(s: Option<&str>) -> MediaType {
        match s {
            Some("album") => MediaType::Album,
            _ => MediaType::Track,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown media type: {0:?}")]
pub struct UnknownMediaType(pub String);

impl FromStr for MediaType {
    type Err = UnknownMediaType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "track" => Ok(MediaType::Track),
            "album" => Ok(MediaType::Album),
            other => Err(UnknownMediaType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayItem {
    pub title: String,
    pub artist: String,
    pub id: String,
    pub media_type: MediaType,
}

/// Form posted to `/`.
///
/// Fields stay loosely typed: a missing or unknown `search_type` falls back to
/// tracks instead of rejecting the request.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SearchForm {
    pub search_type: Option<String>,
    pub text_input: Option<String>,
}

/// Form posted to `/download_item`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DownloadForm {
    pub item_id: Option<String>,
    pub item_type: Option<String>,
}

/// Query string of `/`, also the target of the post-download redirect.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IndexQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_output: Option<String>,
}
