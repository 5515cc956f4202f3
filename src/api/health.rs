//! Health check endpoint

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use super::ApiState;
use crate::registration::RegistrationState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub registration: RegistrationState,
}

/// Liveness probe; `status` is "degraded" while not registered
async fn health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    let registration = *state.registration.borrow();
    let status = if registration == RegistrationState::Registered {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        registration,
    })
}

/// Build health router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state)
}
