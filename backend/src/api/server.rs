//! HTTP Server for the skybid API.
//!
//! Lets a web host upload a sheet and get the processed rows back.
//!
//! # API Endpoints
//!
//! | Method | Path              | Description                          |
//! |--------|-------------------|--------------------------------------|
//! | GET    | `/health`         | Health check                         |
//! | POST   | `/api/process`    | Upload a CSV sheet and run it        |
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

use super::logs::{log_error, log_info, LOG_BROADCASTER};
use super::types::{error_response, ProcessResponse};
use crate::anyapi::{HttpFetch, ReqwestFetcher};
use crate::cache::{DiskCache, ResponseCache};
use crate::error::{ServerError, ServerResult};
use crate::runner::{default_processor, load_config, run_sheet};
use crate::sheet::Sheet;

/// Shared by every request: one response cache and one HTTP client
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<dyn ResponseCache>,
    pub fetcher: Arc<dyn HttpFetch>,
}

impl AppState {
    pub fn new(cache: Arc<dyn ResponseCache>, fetcher: Arc<dyn HttpFetch>) -> Self {
        Self { cache, fetcher }
    }
}

/// Build the router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/process", post(process_sheet))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server with the on-disk cache and the reqwest fetcher
pub async fn start_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::new(Arc::new(DiskCache::new()), Arc::new(ReqwestFetcher::new()));
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("Skybid server running on http://localhost:{}", port);
    println!("   POST /api/process - Upload and process a sheet");
    println!("   GET  /api/logs    - SSE log stream");
    println!("   GET  /health      - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "skybid",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "process": "POST /api/process",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

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

type HandlerError = (StatusCode, Json<Value>);

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) | ServerError::Run(_) => StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServerError> for HandlerError {
    fn from(e: ServerError) -> Self {
        log_error(e.to_string());
        (e.status(), Json(error_response(&e.to_string())))
    }
}

/// Upload fields of `POST /api/process`
#[derive(Debug, Default)]
struct Upload {
    file: Option<(Option<String>, Vec<u8>)>,
    hours: Option<f64>,
}

async fn read_upload(mut multipart: Multipart) -> ServerResult<Upload> {
    let mut upload = Upload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                let file_name = field.file_name().map(|s| s.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                upload.file = Some((file_name, bytes.to_vec()));
            }
            "hours" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                let text = text.trim();
                if !text.is_empty() {
                    let hours = text
                        .parse::<f64>()
                        .map_err(|_| ServerError::BadRequest(format!("Invalid hours: {}", text)))?;
                    upload.hours = Some(hours);
                }
            }
            _ => {}
        }
    }

    Ok(upload)
}

/// Run the uploaded sheet through the default strategies
async fn process_sheet(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ProcessResponse>, HandlerError> {
    let upload = read_upload(multipart).await?;
    let (file_name, bytes) = upload
        .file
        .ok_or_else(|| ServerError::BadRequest("No file provided".into()))?;

    log_info(format!(
        "New upload: {} ({} bytes)",
        file_name.as_deref().unwrap_or("unknown"),
        bytes.len()
    ));

    let config = load_config(None, upload.hours).map_err(ServerError::Run)?;

    // Strategies block on HTTP, keep them off the async workers.
    let response = tokio::task::spawn_blocking(move || -> ServerResult<ProcessResponse> {
        let mut sheet = Sheet::from_bytes(&bytes).map_err(|e| ServerError::Run(e.into()))?;
        let mut processor = default_processor(state.cache, state.fetcher);
        let report = run_sheet(&mut processor, &mut sheet, config);
        Ok(ProcessResponse::new(sheet, report))
    })
    .await
    .map_err(|e| ServerError::Internal(e.to_string()))??;

    Ok(Json(response))
}
