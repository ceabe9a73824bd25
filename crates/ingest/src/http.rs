use std::io::Read;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracegraph_core::error::TracegraphError;
use tracegraph_core::model::trace::TraceInput;
use tracegraph_store::Resolver;
use tracing::Level;

#[derive(Debug, Clone, Copy)]
pub struct IngestLimits {
    pub max_batch_size: usize,
    /// Applies to the raw body and again to the decoded body.
    pub max_body_bytes: usize,
}

#[derive(Clone)]
pub struct IngestState {
    pub resolver: Resolver,
    pub limits: IngestLimits,
}

#[derive(Debug, Deserialize)]
pub struct IngestBatch {
    pub traces: Vec<TraceInput>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestAccepted {
    pub ids: Vec<String>,
}

pub fn router(resolver: Resolver, limits: IngestLimits) -> Router {
    let state = IngestState { resolver, limits };
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers(Any);
    Router::new()
        .route("/v1/graphs/{graph_id}/traces", post(ingest_traces))
        .layer(DefaultBodyLimit::max(limits.max_body_bytes))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .on_request(tower_http::trace::DefaultOnRequest::new().level(Level::INFO))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn status_for(err: &TracegraphError) -> StatusCode {
    match err {
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        TracegraphError::QueryTimeout(_) | TracegraphError::StoreUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn body_too_large(max_body_bytes: usize) -> Response {
    error_response(
        StatusCode::PAYLOAD_TOO_LARGE,
        format!("decoded body exceeds limit of {max_body_bytes} bytes"),
    )
}

fn decode_body(
    headers: &HeaderMap,
    body: &Bytes,
    max_body_bytes: usize,
) -> Result<Vec<u8>, Response> {
    let encoding = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok());
    match encoding {
        None | Some("identity") => {
            if body.len() > max_body_bytes {
                return Err(body_too_large(max_body_bytes));
            }
            Ok(body.to_vec())
        }
        Some("gzip") => {
            // Inflate at most one byte past the cap so oversize is detectable.
            let limit = u64::try_from(max_body_bytes)
                .unwrap_or(u64::MAX)
                .saturating_add(1);
            let mut decoder = GzDecoder::new(&body[..]).take(limit);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out).map_err(|e| {
                tracing::warn!(error = %e, "gzip ingest body rejected");
                error_response(StatusCode::BAD_REQUEST, format!("invalid gzip body: {e}"))
            })?;
            if out.len() > max_body_bytes {
                tracing::warn!(max_body_bytes, "gzip ingest body inflates past limit");
                return Err(body_too_large(max_body_bytes));
            }
            Ok(out)
        }
        Some(other) => Err(error_response(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            format!("unsupported content encoding: {other}"),
        )),
    }
}

async fn ingest_traces(
    State(state): State<IngestState>,
    Path(graph_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let raw = match decode_body(&headers, &body, state.limits.max_body_bytes) {
        Ok(raw) => raw,
        Err(resp) => return resp,
    };
    let batch: IngestBatch = match serde_json::from_slice(&raw) {
        Ok(batch) => batch,
        Err(e) => {
            tracing::warn!(graph_id, error = %e, "ingest body decode failed");
            return error_response(StatusCode::BAD_REQUEST, format!("invalid trace batch: {e}"));
        }
    };
    if batch.traces.len() > state.limits.max_batch_size {
        return error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!(
                "batch of {} traces exceeds limit of {}",
                batch.traces.len(),
                state.limits.max_batch_size
            ),
        );
    }

    match state.resolver.insert(&graph_id, batch.traces).await {
        Ok(ids) => Json(IngestAccepted {
            ids: ids.iter().map(ToString::to_string).collect(),
        })
        .into_response(),
        Err(e) => {
            let status = status_for(&e);
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                tracing::error!(graph_id, error = %e, "trace insert failed");
            } else {
                tracing::warn!(graph_id, error = %e, "trace batch rejected");
            }
            error_response(status, e.public_message())
        }
    }
}
