use std::net::SocketAddr;

use tracegraph_core::error::{Result, TracegraphError};
use tracegraph_store::Resolver;

use crate::http::{self, IngestLimits};

pub async fn run_ingest_server(
    resolver: Resolver,
    addr: SocketAddr,
    limits: IngestLimits,
) -> Result<()> {
    let router = http::router(resolver, limits);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| TracegraphError::Io(format!("bind ingest http {addr} failed: {e}")))?;
    tracing::info!(%addr, "ingest http listening");
    axum::serve(listener, router)
        .await
        .map_err(|e| TracegraphError::Ingest(format!("ingest http server failed: {e}")))
}
