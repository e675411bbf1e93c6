//! `inforoute-types` – shared data model for the Inforoute 65 workspace.
//!
//! - [`RoadItem`] – one road-segment advisory from the upstream feed.
//! - [`color`] – the closed colour → traffic-level table.
//! - [`Event`] / [`EventPayload`] – messages routed over the event bus.
//! - [`FetchError`], [`InforouteError`], [`SetupError`] – error taxonomy.

pub mod color;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

pub use color::{ColorLevel, UNKNOWN_LEVEL, level_for_color};

/// Geometry kind that is excluded from every fetch result.
pub const POINT_GEOMETRY: &str = "POINT";

// ─────────────────────────────────────────────────────────────────────────────
// Road items
// ─────────────────────────────────────────────────────────────────────────────

/// One road-advisory record from the `"OI"` list of the feed.
///
/// The upstream feed is loosely typed: identifiers and weights come either as
/// JSON strings or numbers, coordinates sometimes as strings.  Every field is
/// optional and empty strings are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoadItem {
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub pid: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub tifid: Option<String>,
    /// Human readable label of the road section.
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub lib: Option<String>,
    /// Hex colour of the advisory, case-insensitive, usually without `#`.
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub type_geom: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "lenient_coord", skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_coord", skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub equipement: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub poids: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RoadItem {
    /// Identity key used by downstream entities: `tifid`, else `pid`.
    pub fn identity(&self) -> Option<&str> {
        self.tifid.as_deref().or(self.pid.as_deref())
    }

    /// `true` for point-geometry records, which never reach consumers.
    pub fn is_point(&self) -> bool {
        self.type_geom.as_deref() == Some(POINT_GEOMETRY)
    }

    /// Traffic level derived from [`RoadItem::color`].
    pub fn level(&self) -> ColorLevel {
        level_for_color(self.color.as_deref())
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_coord<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Event bus messages
// ─────────────────────────────────────────────────────────────────────────────

/// Unified event wrapper for the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "inforoute-runtime::coordinator"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp `payload` with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// A refresh cycle replaced the snapshot.
    RefreshSucceeded { items: usize },
    /// A refresh cycle failed.  `stale` is `true` when a previous snapshot is
    /// still being served.
    RefreshFailed { cause: FetchError, stale: bool },
    EntryLoaded { entry_id: String, entities: usize },
    EntryUnloaded { entry_id: String },
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Coarse classification of a [`FetchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Connection failure, timeout or non-success status.
    Transport,
    /// Malformed JSON or unexpected document shape.
    Parse,
}

/// Failure of a single feed fetch.  No partial result accompanies it.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {millis} ms")]
    Timeout { millis: u64 },

    #[error("upstream returned HTTP {0}")]
    Status(u16),

    #[error("malformed feed: {0}")]
    Parse(String),
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Parse(_) => FetchErrorKind::Parse,
            _ => FetchErrorKind::Transport,
        }
    }

    pub fn is_transport(&self) -> bool {
        self.kind() == FetchErrorKind::Transport
    }
}

/// Workspace-wide runtime error.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum InforouteError {
    #[error("refresh failed: {cause}")]
    RefreshFailed { cause: FetchError },

    #[error("event bus error: {0}")]
    Channel(String),
}

/// Fatal failure while attaching a config entry.
#[derive(Error, Debug, Clone)]
pub enum SetupError {
    /// There is no earlier snapshot to fall back on, so the entry cannot load.
    #[error("first refresh failed: {0}")]
    FirstRefresh(FetchError),

    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn road_item_accepts_numbers_and_strings() {
        let item: RoadItem = serde_json::from_str(
            r#"{"pid":12,"tifid":"T1","lat":"43.25","lng":0.1,"poids":3.5,"extra":"ignored"}"#,
        )
        .unwrap();
        assert_eq!(item.pid.as_deref(), Some("12"));
        assert_eq!(item.tifid.as_deref(), Some("T1"));
        assert_eq!(item.lat, Some(43.25));
        assert_eq!(item.lng, Some(0.1));
        assert_eq!(item.poids.as_deref(), Some("3.5"));
    }

    #[test]
    fn identity_falls_back_to_pid() {
        let item: RoadItem = serde_json::from_str(r#"{"pid":"P9","tifid":""}"#).unwrap();
        assert_eq!(item.identity(), Some("P9"));

        let item: RoadItem = serde_json::from_str(r#"{"pid":"P9","tifid":"T9"}"#).unwrap();
        assert_eq!(item.identity(), Some("T9"));

        let item: RoadItem = serde_json::from_str(r#"{"lib":"anonymous"}"#).unwrap();
        assert_eq!(item.identity(), None);
    }

    #[test]
    fn null_fields_are_absent() {
        let item: RoadItem =
            serde_json::from_str(r#"{"tifid":null,"address":null,"lat":null}"#).unwrap();
        assert_eq!(item, RoadItem::default());
    }

    #[test]
    fn point_detection_is_case_sensitive() {
        let point: RoadItem = serde_json::from_str(r#"{"type_geom":"POINT"}"#).unwrap();
        let lower: RoadItem = serde_json::from_str(r#"{"type_geom":"point"}"#).unwrap();
        assert!(point.is_point());
        assert!(!lower.is_point());
        assert!(!RoadItem::default().is_point());
    }

    #[test]
    fn fetch_error_classification() {
        assert!(FetchError::Timeout { millis: 10_000 }.is_transport());
        assert!(FetchError::Transport("refused".into()).is_transport());
        assert!(FetchError::Status(503).is_transport());
        assert_eq!(FetchError::Parse("eof".into()).kind(), FetchErrorKind::Parse);
    }

    #[test]
    fn error_display() {
        let err = InforouteError::RefreshFailed {
            cause: FetchError::Status(502),
        };
        assert!(err.to_string().contains("HTTP 502"));

        let err = SetupError::FirstRefresh(FetchError::Timeout { millis: 10_000 });
        assert!(err.to_string().contains("first refresh failed"));
    }
}
