//! HTTP surface: `POST /analyze`.
//!
//! Lookup failures never surface as HTTP errors; they are carried as error
//! markers inside a 200 response. Only bad input (400), wrong methods (405)
//! and unexpected failures (500) produce an error status.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use domain_intel_lib::{AnalysisError, AnalysisResponse, DomainAnalyzer};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<DomainAnalyzer>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub url: Option<String>,
}

/// Errors the handler turns into a JSON error response.
#[derive(Debug)]
pub enum ApiError {
    /// Body missing, not JSON, or the wrong shape
    BadRequest(String),
    Analysis(AnalysisError),
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        Self::Analysis(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Analysis(AnalysisError::InvalidInput { reason, .. }) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": reason }))).into_response()
            }
            ApiError::Analysis(err) => {
                error!(error = %err, "analysis failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Analysis failed", "details": err.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/analyze", post(analyze).fallback(method_not_allowed))
        .fallback(not_found)
        .with_state(state)
}

async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let Json(request) = payload?;
    let url = request.url.unwrap_or_default();
    debug!(%url, "analyze request");

    // A panicking lookup surfaces as a join error instead of a dropped connection
    let analyzer = state.analyzer.clone();
    let response = tokio::spawn(async move { analyzer.analyze(&url).await })
        .await
        .map_err(|e| AnalysisError::internal(format!("analysis task failed: {}", e)))??;
    Ok(Json(response))
}

async fn method_not_allowed() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "error": "Method not allowed" })),
    )
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}

/// Periodically drop expired cache entries.
pub fn spawn_cache_sweeper(analyzer: Arc<DomainAnalyzer>) -> JoinHandle<()> {
    let period = analyzer.config().sweep_interval.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = analyzer.cache().purge_expired();
            if removed > 0 {
                debug!(removed, remaining = analyzer.cache().len(), "swept expired cache entries");
            }
        }
    })
}

/// Serve until Ctrl-C or SIGTERM.
pub async fn serve(
    bind_addr: SocketAddr,
    analyzer: Arc<DomainAnalyzer>,
) -> Result<(), Box<dyn std::error::Error>> {
    let sweeper = spawn_cache_sweeper(analyzer.clone());
    let app = router(AppState { analyzer });

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(
        bind_address = %bind_addr,
        endpoint = format!("http://{}/analyze", bind_addr),
        "Starting HTTP server"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
