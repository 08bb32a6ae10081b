use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

use crate::identity::get_client_ip;
use crate::rate_limiter::RateLimiter;
use crate::store::CountingStore;
use crate::response::{HealthResponse, IdentityResponse};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub rate_limiter: Arc<RateLimiter>,
}

/// Echo the caller's identity back as JSON
pub async fn identity_handler(request: Request) -> impl IntoResponse {
    Json(IdentityResponse {
        ip: get_client_ip(&request),
    })
}

/// Health check endpoint; reports whether the counting store answers
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.rate_limiter.store().ping().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse::healthy())),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(HealthResponse::unhealthy(e.to_string())))
        }
    }
}
