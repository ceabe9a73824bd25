//! Request-level operations: validate and default-fill the request, run the
//! shape through the gateway, and shape the result into its response type.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracegraph_core::aggregate;
use tracegraph_core::cursor;
use tracegraph_core::error::Result;
use tracegraph_core::filter::{FilterClause, OrderBy, TimeWindow, TraceFilter};
use tracegraph_core::ids::{GraphId, TraceId};
use tracegraph_core::model::operation::{
    LatencyBin, Operation, RpmPoint, Stats, TraceFilterOptions,
};
use tracegraph_core::model::trace::{TraceInput, TraceListItem, TraceRecord};
use tracegraph_core::query::{
    Connection, DeleteGraphRequest, DeleteGraphResponse, FilterOptionsRequest,
    OPERATIONS_PAGE_SIZE, OperationsRequest, ScopedRequest, StatusResponse, TRACES_PAGE_SIZE,
    TraceLookup, TracesRequest,
};

use crate::builder::Scope;
use crate::gateway::Gateway;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct Resolver {
    gateway: Gateway,
    clock: Clock,
    rpm_bucket: chrono::Duration,
    latency_bins: u32,
}

impl Resolver {
    pub fn new(gateway: Gateway, rpm_bucket: Duration, latency_bins: usize) -> Self {
        let rpm_bucket =
            chrono::Duration::from_std(rpm_bucket).unwrap_or_else(|_| chrono::Duration::minutes(1));
        Self {
            gateway,
            clock: Arc::new(Utc::now),
            rpm_bucket,
            latency_bins: u32::try_from(latency_bins).unwrap_or(u32::MAX).max(1),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn scope(
        &self,
        graph_id: &str,
        operation_id: Option<&str>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        filters: Option<&[TraceFilter]>,
    ) -> Result<Scope> {
        Ok(Scope {
            graph_id: GraphId::parse(graph_id)?,
            operation_key: operation_id.map(str::to_string),
            filters: FilterClause::parse_all(filters.unwrap_or_default())?,
            window: TimeWindow::resolve(from, to, (self.clock)())?,
        })
    }

    fn scoped(&self, req: &ScopedRequest) -> Result<Scope> {
        self.scope(
            &req.graph_id,
            req.operation_id.as_deref(),
            req.from,
            req.to,
            req.trace_filters.as_deref(),
        )
    }

    pub async fn traces(&self, req: &TracesRequest) -> Result<Connection<TraceListItem>> {
        let scope = self.scope(
            &req.graph_id,
            req.operation_id.as_deref(),
            req.from,
            req.to,
            req.trace_filters.as_deref(),
        )?;
        let order = OrderBy::resolve_traces(req.order_by.as_ref())?;
        let after = cursor::decode(req.after.as_deref(), order.field)?;

        let rows = self
            .gateway
            .trace_page(scope, order, after, TRACES_PAGE_SIZE)
            .await?;
        Connection::from_overfetch(rows, TRACES_PAGE_SIZE, order.field, order.asc)
    }

    pub async fn operations(&self, req: &OperationsRequest) -> Result<Connection<Operation>> {
        let scope = self.scope(
            &req.graph_id,
            None,
            req.from,
            req.to,
            req.trace_filters.as_deref(),
        )?;
        let order = OrderBy::resolve_operations(req.order_by.as_ref())?;
        let after = cursor::decode(req.after.as_deref(), order.field)?;

        let rows = self
            .gateway
            .operation_page(scope, order, after, OPERATIONS_PAGE_SIZE)
            .await?;
        Connection::from_overfetch(rows, OPERATIONS_PAGE_SIZE, order.field, order.asc)
    }

    /// First row of the operations query under the default order, narrowed to
    /// `operation_id` when given. `None` when nothing matches in the window.
    pub async fn operation(&self, req: &ScopedRequest) -> Result<Option<Operation>> {
        let scope = self.scoped(req)?;
        let order = OrderBy::resolve_operations(None)?;
        let rows = self.gateway.operation_page(scope, order, None, 1).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn rpm(&self, req: &ScopedRequest) -> Result<Connection<RpmPoint>> {
        let scope = self.scoped(req)?;
        let window = scope.window;
        let bucket = aggregate::rpm_bucket_for(&window, self.rpm_bucket);
        let rows = self
            .gateway
            .rpm_buckets(scope, bucket.num_milliseconds().max(1))
            .await?;
        Ok(Connection::unpaged(aggregate::fill_rpm_series(
            &rows, &window, bucket,
        )))
    }

    pub async fn latency_distribution(&self, req: &ScopedRequest) -> Result<Connection<LatencyBin>> {
        let scope = self.scoped(req)?;
        let bins = self.gateway.latency_bins(scope, self.latency_bins).await?;
        Ok(Connection::unpaged(bins))
    }

    pub async fn stats(&self, req: &ScopedRequest) -> Result<Stats> {
        let scope = self.scoped(req)?;
        self.gateway.stats(scope).await
    }

    pub async fn trace_filter_options(&self, req: &FilterOptionsRequest) -> Result<TraceFilterOptions> {
        let graph_id = GraphId::parse(&req.graph_id)?;
        self.gateway.filter_options(graph_id).await
    }

    pub async fn trace(&self, req: &TraceLookup) -> Result<Option<TraceRecord>> {
        let trace_id = TraceId::parse(&req.trace_id)?;
        self.gateway.trace(trace_id).await
    }

    pub async fn insert(&self, graph_id: &str, traces: Vec<TraceInput>) -> Result<Vec<TraceId>> {
        let graph_id = GraphId::parse(graph_id)?;
        let count = traces.len();
        let ids = self.gateway.insert(graph_id.clone(), traces).await?;
        tracing::debug!(graph_id = %graph_id, count, "accepted trace batch");
        Ok(ids)
    }

    pub async fn delete_graph(&self, req: &DeleteGraphRequest) -> Result<DeleteGraphResponse> {
        let graph_id = GraphId::parse(&req.graph_id)?;
        let deleted = self.gateway.delete_graph(graph_id.clone()).await?;
        tracing::info!(graph_id = %graph_id, deleted, "graph purged");
        Ok(DeleteGraphResponse {
            graph_id: graph_id.to_string(),
            deleted,
        })
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        self.gateway.status().await
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("rpm_bucket", &self.rpm_bucket)
            .field("latency_bins", &self.latency_bins)
            .finish_non_exhaustive()
    }
}
