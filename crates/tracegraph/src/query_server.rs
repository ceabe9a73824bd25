use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use axum::extract::State;
use axum::http::Method;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, UnixListener};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracegraph_store::Resolver;

use crate::protocol::{ApiRequest, ApiResponse};

pub async fn run_query_server(
    resolver: Resolver,
    uds_path: PathBuf,
    tcp_addr: SocketAddr,
) -> anyhow::Result<()> {
    if let Some(parent) = uds_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context("create uds parent dir")?;
    }

    if tokio::fs::metadata(&uds_path).await.is_ok() {
        let _ = tokio::fs::remove_file(&uds_path).await;
    }

    let uds_listener = UnixListener::bind(&uds_path).context("bind UDS query listener")?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = tokio::fs::metadata(&uds_path).await?.permissions();
        perms.set_mode(0o600);
        tokio::fs::set_permissions(&uds_path, perms).await?;
    }
    let tcp_listener = TcpListener::bind(tcp_addr)
        .await
        .context("bind TCP query listener")?;
    tracing::info!(uds = %uds_path.display(), tcp = %tcp_addr, "query server listening");

    let uds_task = tokio::spawn(run_uds_loop(uds_listener, resolver.clone()));
    let tcp_task = tokio::spawn(run_tcp_loop(tcp_listener, resolver));

    tokio::select! {
        res = uds_task => {
            res??;
        }
        res = tcp_task => {
            res??;
        }
    }

    Ok(())
}

pub fn query_http_router(resolver: Resolver) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/query", post(query_http))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(resolver)
}

pub async fn run_query_http_server(resolver: Resolver, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind query HTTP listener {addr}"))?;
    tracing::info!(%addr, "query http listening");
    axum::serve(listener, query_http_router(resolver))
        .await
        .context("query HTTP server failed")
}

async fn healthz() -> &'static str {
    "ok"
}

async fn query_http(State(resolver): State<Resolver>, Json(req): Json<ApiRequest>) -> Json<ApiResponse> {
    Json(handle_request(req, &resolver).await)
}

async fn run_uds_loop(listener: UnixListener, resolver: Resolver) -> anyhow::Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let resolver = resolver.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_stream(BufReader::new(stream), resolver).await {
                tracing::warn!(error = ?err, "uds client request failed");
            }
        });
    }
}

async fn run_tcp_loop(listener: TcpListener, resolver: Resolver) -> anyhow::Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let resolver = resolver.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_stream(BufReader::new(stream), resolver).await {
                tracing::warn!(error = ?err, "tcp client request failed");
            }
        });
    }
}

async fn handle_stream<T>(mut stream: BufReader<T>, resolver: Resolver) -> anyhow::Result<()>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let mut line = String::new();
    let n = stream.read_line(&mut line).await?;
    if n == 0 {
        return Ok(());
    }

    let response = match serde_json::from_str::<ApiRequest>(&line) {
        Ok(req) => handle_request(req, &resolver).await,
        Err(e) => ApiResponse::Error(format!("invalid request: {e}")),
    };
    let payload = serde_json::to_vec(&response)?;
    stream.get_mut().write_all(&payload).await?;
    stream.get_mut().write_all(b"\n").await?;
    stream.get_mut().flush().await?;
    Ok(())
}

pub async fn handle_request(req: ApiRequest, resolver: &Resolver) -> ApiResponse {
    let resp = match req {
        ApiRequest::Traces(r) => resolver.traces(&r).await.map(ApiResponse::Traces),
        ApiRequest::Operations(r) => resolver.operations(&r).await.map(ApiResponse::Operations),
        ApiRequest::Operation(r) => resolver.operation(&r).await.map(ApiResponse::Operation),
        ApiRequest::Rpm(r) => resolver.rpm(&r).await.map(ApiResponse::Rpm),
        ApiRequest::LatencyDistribution(r) => resolver
            .latency_distribution(&r)
            .await
            .map(ApiResponse::LatencyDistribution),
        ApiRequest::Stats(r) => resolver.stats(&r).await.map(ApiResponse::Stats),
        ApiRequest::TraceFilterOptions(r) => resolver
            .trace_filter_options(&r)
            .await
            .map(ApiResponse::TraceFilterOptions),
        ApiRequest::Trace(r) => resolver
            .trace(&r)
            .await
            .map(|t| ApiResponse::Trace(t.map(Box::new))),
        ApiRequest::DeleteGraph(r) => resolver.delete_graph(&r).await.map(ApiResponse::DeleteGraph),
        ApiRequest::Status => resolver.status().await.map(ApiResponse::Status),
    };

    resp.unwrap_or_else(|e| {
        if e.is_client_error() {
            tracing::warn!(error = %e, "query rejected");
        } else {
            tracing::error!(error = %e, "query failed");
        }
        ApiResponse::Error(e.public_message())
    })
}
