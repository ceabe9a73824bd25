//! Async front of the store. DuckDB calls are blocking, so each operation runs
//! on the blocking pool and is bounded by the query timeout.

use std::time::{Duration, Instant};

use tracegraph_core::cursor::Cursor;
use tracegraph_core::error::{Result, TracegraphError};
use tracegraph_core::filter::{OperationOrderField, OrderBy, TraceOrderField};
use tracegraph_core::ids::{GraphId, TraceId};
use tracegraph_core::model::operation::{LatencyBin, Operation, Stats, TraceFilterOptions};
use tracegraph_core::model::trace::{TraceInput, TraceListItem, TraceRecord};
use tracegraph_core::query::StatusResponse;

use crate::Store;
use crate::builder::Scope;

#[derive(Clone)]
pub struct Gateway {
    store: Store,
    timeout: Duration,
}

impl Gateway {
    pub fn new(store: Store, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    async fn run<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Store) -> Result<T> + Send + 'static,
    {
        let store = self.store.clone();
        let started = Instant::now();
        let task = tokio::task::spawn_blocking(move || f(&store));

        // On expiry the blocking task keeps running to completion and its
        // result is dropped with the join handle.
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => {
                tracing::debug!(op, elapsed_ms = started.elapsed().as_millis() as u64, "store op done");
                result
            }
            Ok(Err(e)) => Err(TracegraphError::Internal(format!("{op} task failed: {e}"))),
            Err(_) => {
                tracing::warn!(op, timeout = ?self.timeout, "store op timed out");
                Err(TracegraphError::QueryTimeout(self.timeout))
            }
        }
    }

    pub async fn insert(&self, graph_id: GraphId, traces: Vec<TraceInput>) -> Result<Vec<TraceId>> {
        self.run("insert", move |s| s.insert_traces(&graph_id, &traces))
            .await
    }

    pub async fn trace_page(
        &self,
        scope: Scope,
        order: OrderBy<TraceOrderField>,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> Result<Vec<TraceListItem>> {
        self.run("traces", move |s| {
            s.fetch_trace_page(&scope, order, cursor.as_ref(), limit)
        })
        .await
    }

    pub async fn operation_page(
        &self,
        scope: Scope,
        order: OrderBy<OperationOrderField>,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> Result<Vec<Operation>> {
        self.run("operations", move |s| {
            s.fetch_operation_page(&scope, order, cursor.as_ref(), limit)
        })
        .await
    }

    pub async fn rpm_buckets(&self, scope: Scope, bucket_ms: i64) -> Result<Vec<(i64, i64, i64)>> {
        self.run("rpm", move |s| s.fetch_rpm_buckets(&scope, bucket_ms))
            .await
    }

    pub async fn latency_bins(&self, scope: Scope, bins: u32) -> Result<Vec<LatencyBin>> {
        self.run("latency", move |s| s.fetch_latency_bins(&scope, bins))
            .await
    }

    pub async fn stats(&self, scope: Scope) -> Result<Stats> {
        self.run("stats", move |s| s.fetch_stats(&scope)).await
    }

    pub async fn filter_options(&self, graph_id: GraphId) -> Result<TraceFilterOptions> {
        self.run("filter_options", move |s| s.fetch_filter_options(&graph_id))
            .await
    }

    pub async fn trace(&self, trace_id: TraceId) -> Result<Option<TraceRecord>> {
        self.run("trace", move |s| s.get_trace(&trace_id.to_string()))
            .await
    }

    pub async fn delete_graph(&self, graph_id: GraphId) -> Result<usize> {
        self.run("delete_graph", move |s| s.delete_graph(&graph_id))
            .await
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        self.run("status", |s| s.status()).await
    }
}
