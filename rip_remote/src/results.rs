// Parsing of the JSON that `rip search --output-file` leaves behind.
//
// rip writes an array of loosely shaped records:
//
// {"source": "qobuz", "media_type": "track", "id": "12345", "desc": "Title by Artist"}
//
// Nothing about that is versioned, so every record is checked on its own and bad ones are
// skipped rather than failing the whole search.

use lazy_static::lazy_static;
use regex::Regex;
use ripweb_protocol::{DisplayItem, MediaType};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

lazy_static! {
    // non-greedy title, so "Stand by Me by Ben E. King" splits at the first " by "
    static ref TITLE_BY_ARTIST: Regex = Regex::new(r"^(.+?) by (.+)$").unwrap();
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RecordError {
    #[error("record is not an object")]
    NotAnObject,
    #[error("missing field {0:?}")]
    MissingField(&'static str),
    #[error("field {0:?} has the wrong type")]
    WrongType(&'static str),
    #[error("unsupported media type {0}")]
    MediaType(Value),
}

fn field<'a>(
    record: &'a serde_json::Map<String, Value>,
    name: &'static str,
) -> Result<&'a Value, RecordError> {
    record.get(name).ok_or(RecordError::MissingField(name))
}

fn parse_record(record: &Value) -> Result<DisplayItem, RecordError> {
    let record = record.as_object().ok_or(RecordError::NotAnObject)?;

    let id = match field(record, "id")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return Err(RecordError::WrongType("id")),
    };
    let desc = field(record, "desc")?
        .as_str()
        .ok_or(RecordError::WrongType("desc"))?;
    let media_type = match field(record, "media_type")? {
        Value::String(s) if s == "track" => MediaType::Track,
        Value::String(s) if s == "album" => MediaType::Album,
        other => return Err(RecordError::MediaType(other.clone())),
    };

    let (title, artist) = split_description(desc);
    Ok(DisplayItem {
        title,
        artist,
        id,
        media_type,
    })
}

/// Best effort split of "Title by Artist". Without a match the whole description is the title.
pub fn split_description(desc: &str) -> (String, String) {
    let desc = desc.trim();
    match TITLE_BY_ARTIST.captures(desc) {
        Some(caps) => (caps[1].trim().to_string(), caps[2].trim().to_string()),
        None => (desc.to_string(), UNKNOWN_ARTIST.to_string()),
    }
}

/// Turn the contents of a results file into display items, in file order.
///
/// Never fails: anything that isn't an array gives an empty list, malformed records are dropped.
/// Both cases are logged.
pub fn parse_search_results(json: &Value) -> Vec<DisplayItem> {
    let records = match json.as_array() {
        Some(records) => records,
        None => {
            warn!(json = %json, "expected a list of search results, got something else");
            return Vec::new();
        }
    };
    records
        .iter()
        .filter_map(|record| match parse_record(record) {
            Ok(item) => Some(item),
            Err(error) => {
                warn!(%error, record = %record, "skipping search result");
                None
            }
        })
        .collect()
}
