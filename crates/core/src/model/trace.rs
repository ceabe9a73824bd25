use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One trace as handed over by the ingestion path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceInput {
    pub key: String,
    pub duration_ns: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub root: serde_json::Value,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub client_version: Option<String>,
    #[serde(default)]
    pub schema_tag: Option<String>,
    #[serde(default)]
    pub has_errors: bool,
}

/// Full stored trace, payloads included.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceRecord {
    pub id: String,
    pub graph_id: String,
    pub key: String,
    pub duration: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub root: serde_json::Value,
    pub details: Option<serde_json::Value>,
    pub client_name: Option<String>,
    pub client_version: Option<String>,
    pub schema_tag: Option<String>,
    pub has_errors: bool,
}

/// Row of the paginated trace list. Payload columns are left out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceListItem {
    pub id: String,
    pub key: String,
    pub duration: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub has_errors: bool,
}
