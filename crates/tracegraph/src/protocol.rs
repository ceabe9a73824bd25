use serde::{Deserialize, Serialize};
use tracegraph_core::model::operation::{
    LatencyBin, Operation, RpmPoint, Stats, TraceFilterOptions,
};
use tracegraph_core::model::trace::{TraceListItem, TraceRecord};
use tracegraph_core::query::{
    Connection, DeleteGraphRequest, DeleteGraphResponse, FilterOptionsRequest, OperationsRequest,
    ScopedRequest, StatusResponse, TraceLookup, TracesRequest,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ApiRequest {
    Traces(TracesRequest),
    Operations(OperationsRequest),
    Operation(ScopedRequest),
    Rpm(ScopedRequest),
    LatencyDistribution(ScopedRequest),
    Stats(ScopedRequest),
    TraceFilterOptions(FilterOptionsRequest),
    Trace(TraceLookup),
    DeleteGraph(DeleteGraphRequest),
    Status,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ApiResponse {
    Traces(Connection<TraceListItem>),
    Operations(Connection<Operation>),
    Operation(Option<Operation>),
    Rpm(Connection<RpmPoint>),
    LatencyDistribution(Connection<LatencyBin>),
    Stats(Stats),
    TraceFilterOptions(TraceFilterOptions),
    Trace(Option<Box<TraceRecord>>),
    DeleteGraph(DeleteGraphResponse),
    Status(StatusResponse),
    Error(String),
}
