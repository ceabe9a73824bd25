use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cursor::{self, Keyset, SortKey};
use crate::error::Result;
use crate::filter::{OrderByInput, TraceFilter};

/// Page size of the trace list.
pub const TRACES_PAGE_SIZE: usize = 10;
/// Page size of the operation list.
pub const OPERATIONS_PAGE_SIZE: usize = 7;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TracesRequest {
    pub graph_id: String,
    #[serde(default)]
    pub operation_id: Option<String>,
    #[serde(default)]
    pub order_by: Option<OrderByInput>,
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub trace_filters: Option<Vec<TraceFilter>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OperationsRequest {
    pub graph_id: String,
    #[serde(default)]
    pub order_by: Option<OrderByInput>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trace_filters: Option<Vec<TraceFilter>>,
}

/// Shared argument set of `operation`, `rpm`, `latencyDistribution` and `stats`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScopedRequest {
    pub graph_id: String,
    #[serde(default)]
    pub operation_id: Option<String>,
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trace_filters: Option<Vec<TraceFilter>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterOptionsRequest {
    pub graph_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceLookup {
    pub trace_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteGraphRequest {
    pub graph_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteGraphResponse {
    pub graph_id: String,
    pub deleted: usize,
}

/// `{nodes, cursor}` envelope. An empty cursor means there are no more pages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Connection<T> {
    pub nodes: Vec<T>,
    pub cursor: String,
}

impl<T> Connection<T> {
    pub fn unpaged(nodes: Vec<T>) -> Self {
        Self {
            nodes,
            cursor: String::new(),
        }
    }

    /// Shapes a `limit + 1` fetch into a page. When the extra row is present it
    /// is dropped from the page and becomes the resume point.
    pub fn from_overfetch<F>(
        mut rows: Vec<T>,
        limit: usize,
        field: F,
        ascending: bool,
    ) -> Result<Self>
    where
        F: SortKey,
        T: Keyset<F>,
    {
        if rows.len() <= limit {
            return Ok(Self::unpaged(rows));
        }
        rows.truncate(limit + 1);
        let cursor = match rows.pop() {
            Some(next) => cursor::encode(&next, field, ascending)?,
            None => String::new(),
        };
        Ok(Self {
            nodes: rows,
            cursor,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub db_path: String,
    pub db_size_bytes: u64,
    pub traces_count: usize,
    pub graphs_count: usize,
    pub oldest_start_time: Option<DateTime<Utc>>,
    pub newest_start_time: Option<DateTime<Utc>>,
}
