use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Stats {
    pub count: i64,
    pub error_count: i64,
    pub error_percent: i64,
    pub duration: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Operation {
    pub id: String,
    pub key: String,
    pub stats: Stats,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpmPoint {
    pub start_time: DateTime<Utc>,
    pub count: i64,
    pub error_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LatencyBin {
    pub duration: f64,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TraceFilterOptions {
    pub schema_tag: Vec<String>,
    pub client_name: Vec<String>,
    pub client_version: Vec<String>,
    pub has_errors: Vec<String>,
}
