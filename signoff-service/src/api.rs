//! HTTP API for the signoff service.
//!
//! This module provides the REST API endpoints for:
//! - Health and metrics monitoring
//! - Embedding signatures into a stored document
//! - Signing a paper whose approval chain is complete

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, FromRequestParts, State},
    http::{StatusCode, header, request::Parts},
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::artifacts::{Backend, CALLER_ID_HEADER, CallerContext};
use crate::service::SignoffService;

pub mod embed;
use embed::{embed_handler, embed_paper_handler};

/// Application state
pub struct AppState<B> {
    pub service: Arc<SignoffService<B>>,
    pub start_time: Instant,
    pub metrics: Option<PrometheusHandle>,
}

/// Build the API router
pub fn router<B: Backend>(
    service: Arc<SignoffService<B>>,
    metrics: Option<PrometheusHandle>,
) -> Router {
    let max_body_size = service.limits().max_request_body_bytes;

    let state = Arc::new(AppState {
        service,
        start_time: Instant::now(),
        metrics,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/embed", post(embed_handler::<B>))
        .route(
            "/papers/{paper_id}/embed-signatures",
            post(embed_paper_handler::<B>),
        )
        .layer(DefaultBodyLimit::max(max_body_size));

    Router::new()
        .route("/health", get(health_handler::<B>))
        .route("/metrics", get(metrics_handler::<B>))
        .nest("/api", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Caller identity and bearer token taken from request headers
pub struct Caller(pub CallerContext);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_token = parts
            .headers
            .typed_get::<Authorization<Bearer>>()
            .map(|auth| auth.token().to_string());
        let caller_identity = parts
            .headers
            .get(CALLER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        Ok(Caller(CallerContext {
            caller_identity,
            auth_token,
        }))
    }
}

// === Health & Metrics ===

async fn health_handler<B: Backend>(State(state): State<Arc<AppState<B>>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
}

async fn metrics_handler<B: Backend>(State(state): State<Arc<AppState<B>>>) -> impl IntoResponse {
    let body = state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}
