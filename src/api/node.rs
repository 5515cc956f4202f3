//! IS-04 node API endpoints

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use uuid::Uuid;

use super::{ApiError, ApiState, route_both};
use crate::resource::{Node, NormalizedDevice, Receiver, Sender};

const RESOURCE_PATHS: [&str; 6] = [
    "self/",
    "sources/",
    "flows/",
    "devices/",
    "senders/",
    "receivers/",
];

type Shared = State<Arc<ApiState>>;

fn check_version(state: &ApiState, version: &str) -> Result<(), ApiError> {
    if state.node_versions().iter().any(|v| v == version) {
        Ok(())
    } else {
        Err(ApiError::not_found(format!(
            "node API version {version} is not served"
        )))
    }
}

fn parse_id(id: &str) -> Result<Uuid, ApiError> {
    id.parse()
        .map_err(|_| ApiError::not_found(format!("{id} is not a resource id")))
}

async fn versions(State(state): Shared) -> Json<Vec<String>> {
    Json(state.node_versions().iter().map(|v| format!("{v}/")).collect())
}

async fn base(
    State(state): Shared,
    Path(version): Path<String>,
) -> Result<Json<[&'static str; 6]>, ApiError> {
    check_version(&state, &version)?;
    Ok(Json(RESOURCE_PATHS))
}

async fn node_self(
    State(state): Shared,
    Path(version): Path<String>,
) -> Result<Json<Node>, ApiError> {
    check_version(&state, &version)?;
    Ok(Json(state.graph.node().clone()))
}

async fn devices(
    State(state): Shared,
    Path(version): Path<String>,
) -> Result<Json<Vec<NormalizedDevice>>, ApiError> {
    check_version(&state, &version)?;
    Ok(Json(state.graph.normalized_devices()))
}

async fn device(
    State(state): Shared,
    Path((version, id)): Path<(String, String)>,
) -> Result<Json<NormalizedDevice>, ApiError> {
    check_version(&state, &version)?;
    let id = parse_id(&id)?;
    state
        .graph
        .device(id)
        .map(|d| Json(d.normalize()))
        .ok_or_else(|| ApiError::not_found(format!("device {id} not found")))
}

async fn senders(
    State(state): Shared,
    Path(version): Path<String>,
) -> Result<Json<Vec<Sender>>, ApiError> {
    check_version(&state, &version)?;
    Ok(Json(state.graph.senders().cloned().collect()))
}

async fn sender(
    State(state): Shared,
    Path((version, id)): Path<(String, String)>,
) -> Result<Json<Sender>, ApiError> {
    check_version(&state, &version)?;
    let id = parse_id(&id)?;
    state
        .graph
        .sender(id)
        .map(|s| Json(s.clone()))
        .ok_or_else(|| ApiError::not_found(format!("sender {id} not found")))
}

async fn receivers(
    State(state): Shared,
    Path(version): Path<String>,
) -> Result<Json<Vec<Receiver>>, ApiError> {
    check_version(&state, &version)?;
    Ok(Json(state.graph.receivers().cloned().collect()))
}

async fn receiver(
    State(state): Shared,
    Path((version, id)): Path<(String, String)>,
) -> Result<Json<Receiver>, ApiError> {
    check_version(&state, &version)?;
    let id = parse_id(&id)?;
    state
        .graph
        .receiver(id)
        .map(|r| Json(r.clone()))
        .ok_or_else(|| ApiError::not_found(format!("receiver {id} not found")))
}

/// Sources and flows are not modelled; both collections are empty
async fn empty(
    State(state): Shared,
    Path(version): Path<String>,
) -> Result<Json<Vec<Value>>, ApiError> {
    check_version(&state, &version)?;
    Ok(Json(Vec::new()))
}

/// Build node API router
pub fn router(state: Arc<ApiState>) -> axum::Router {
    let routes: [(&str, axum::routing::MethodRouter<Arc<ApiState>>); 11] = [
        ("/x-nmos/node", get(versions)),
        ("/x-nmos/node/{version}", get(base)),
        ("/x-nmos/node/{version}/self", get(node_self)),
        ("/x-nmos/node/{version}/devices", get(devices)),
        ("/x-nmos/node/{version}/devices/{id}", get(device)),
        ("/x-nmos/node/{version}/senders", get(senders)),
        ("/x-nmos/node/{version}/senders/{id}", get(sender)),
        ("/x-nmos/node/{version}/receivers", get(receivers)),
        ("/x-nmos/node/{version}/receivers/{id}", get(receiver)),
        ("/x-nmos/node/{version}/sources", get(empty)),
        ("/x-nmos/node/{version}/flows", get(empty)),
    ];

    routes
        .into_iter()
        .fold(Router::new(), |router, (path, method)| route_both(router, path, method))
        .with_state(state)
}

