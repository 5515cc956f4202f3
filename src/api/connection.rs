//! IS-05 connection API listings

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use super::{ApiError, ApiState, route_both};

/// Connection API versions served
pub const CONNECTION_API_VERSIONS: [&str; 2] = ["v1.0", "v1.1"];

fn check_version(version: &str) -> Result<(), ApiError> {
    if CONNECTION_API_VERSIONS.contains(&version) {
        Ok(())
    } else {
        Err(ApiError::not_found(format!(
            "connection API version {version} is not served"
        )))
    }
}

async fn versions() -> Json<Vec<String>> {
    Json(CONNECTION_API_VERSIONS.iter().map(|v| format!("{v}/")).collect())
}

async fn base(Path(version): Path<String>) -> Result<Json<[&'static str; 1]>, ApiError> {
    check_version(&version)?;
    Ok(Json(["single/"]))
}

async fn single(Path(version): Path<String>) -> Result<Json<[&'static str; 2]>, ApiError> {
    check_version(&version)?;
    Ok(Json(["senders/", "receivers/"]))
}

async fn senders(
    State(state): State<Arc<ApiState>>,
    Path(version): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    check_version(&version)?;
    Ok(Json(state.graph.senders().map(|s| format!("{}/", s.id)).collect()))
}

async fn receivers(
    State(state): State<Arc<ApiState>>,
    Path(version): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    check_version(&version)?;
    Ok(Json(
        state.graph.receivers().map(|r| format!("{}/", r.id)).collect(),
    ))
}

/// Build connection API router
pub fn router(state: Arc<ApiState>) -> Router {
    let router = route_both(Router::new(), "/x-nmos/connection", get(versions));
    let router = route_both(router, "/x-nmos/connection/{version}", get(base));
    let router = route_both(router, "/x-nmos/connection/{version}/single", get(single));
    let router = route_both(
        router,
        "/x-nmos/connection/{version}/single/senders",
        get(senders),
    );
    route_both(
        router,
        "/x-nmos/connection/{version}/single/receivers",
        get(receivers),
    )
    .with_state(state)
}
