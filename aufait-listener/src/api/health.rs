//! Health Check API Handler
//!
//! Liveness endpoint for load balancers and monitoring.

use axum::{http::StatusCode, response::IntoResponse};

/// GET /heartbeat
pub async fn heartbeat() -> impl IntoResponse {
    (StatusCode::OK, format!("OK {}", env!("CARGO_PKG_VERSION")))
}
