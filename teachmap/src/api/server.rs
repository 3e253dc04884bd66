//! HTTP Server for the teachmap API.
//!
//! # API Endpoints
//!
//! | Method | Path              | Description                          |
//! |--------|-------------------|--------------------------------------|
//! | GET    | `/health`         | Health check                         |
//! | POST   | `/api/transform`  | Upload CSV + mapping sheet           |
//! | GET    | `/api/logs`       | SSE stream for real-time logs        |

use axum::{
    extract::{Multipart, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use super::logs::LOG_BROADCASTER;
use super::types::{error_response, TransformResponse};
use crate::config::{run_timestamp_now, RetentionPolicy, RunConfig};
use crate::error::{PipelineError, ServerError, ServerResult};
use crate::inference::InferenceBackend;
use crate::transform::pipeline::transform_bytes;

type ApiError = (StatusCode, Json<Value>);

/// Shared by every request.
#[derive(Clone)]
struct AppState {
    config: Arc<RunConfig>,
    backend: Arc<dyn InferenceBackend>,
}

/// Build the router.
pub fn router(config: RunConfig, backend: Arc<dyn InferenceBackend>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    let state = AppState {
        config: Arc::new(config),
        backend,
    };

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/transform", post(transform_upload))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(
    port: u16,
    config: RunConfig,
    backend: Arc<dyn InferenceBackend>,
) -> ServerResult<()> {
    let app = router(config, backend);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("🚀 teachmap server running on http://localhost:{}", port);
    info!("   POST /api/transform - Upload CSV + mapping sheet");
    info!("   GET  /api/logs      - SSE log stream");
    info!("   GET  /health        - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "teachmap",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.backend.name(),
        "endpoints": {
            "transform": "POST /api/transform",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    // Lagged receivers skip what they missed.
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Multipart form: `file` (CSV), `mapping` (sheet text), optional `dropInvalid`.
async fn transform_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<TransformResponse>, ApiError> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut mapping: Option<String> = None;
    let mut drop_invalid = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(ServerError::BadRequest(format!("Multipart error: {}", e))))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(ServerError::BadRequest(format!("Read error: {}", e))))?;
                file_data = Some(bytes.to_vec());
            }
            "mapping" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request(ServerError::BadRequest(format!("Read error: {}", e))))?;
                mapping = Some(text);
            }
            "dropInvalid" => {
                let text = field.text().await.unwrap_or_default();
                drop_invalid = matches!(text.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on");
            }
            _ => {}
        }
    }

    let bytes = file_data
        .ok_or_else(|| bad_request(ServerError::BadRequest("No file provided".to_string())))?;
    let mapping = mapping
        .ok_or_else(|| bad_request(ServerError::BadRequest("No mapping sheet provided".to_string())))?;

    info!(
        file = file_name.as_deref().unwrap_or("unknown"),
        bytes = bytes.len(),
        drop_invalid,
        "📄 New upload"
    );

    let retention = if drop_invalid {
        RetentionPolicy::DropFailing
    } else {
        state.config.retention
    };
    // Every upload is its own run.
    let config = (*state.config)
        .clone()
        .with_retention(retention)
        .with_run_timestamp(run_timestamp_now());

    let outcome = transform_bytes(&bytes, &mapping, &config, state.backend.clone())
        .await
        .map_err(|e| {
            error!("❌ Transform error: {}", e);
            let status = match e {
                PipelineError::Spec(_) | PipelineError::Csv(_) | PipelineError::EmptyInput => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(error_response(&ServerError::from(e).to_string())))
        })?;

    info!(
        records = outcome.summary.records,
        passed = outcome.summary.passed,
        failed = outcome.summary.failed,
        dropped = outcome.summary.dropped,
        "📊 Upload transformed"
    );

    Ok(Json(TransformResponse::from(outcome)))
}

fn bad_request(err: ServerError) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(error_response(&err.to_string())))
}
