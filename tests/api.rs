//! Node API endpoint integration tests

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use nmos_node::api::{ApiState, router};
use nmos_node::resource::device::{FORMAT_VIDEO, TRANSPORT_RTP_MCAST};
use nmos_node::{Receiver, RegistrationState, ResourceGraph};
use serde_json::Value;
use tokio::sync::watch;
use tower::ServiceExt;

mod common;
use common::two_sender_graph;

fn graph_with_receiver() -> ResourceGraph {
    let mut graph = two_sender_graph();
    let mut device = graph.devices()[0].clone();
    device.id = uuid::Uuid::new_v4();
    device.senders.clear();
    device.add_receiver(Receiver::new("return", FORMAT_VIDEO, TRANSPORT_RTP_MCAST));
    graph.attach_device(device);
    graph
}

/// Build a test API router
fn build_test_router(
    graph: Arc<ResourceGraph>,
) -> (axum::Router, watch::Sender<RegistrationState>) {
    let (tx, rx) = watch::channel(RegistrationState::Idle);
    let state = Arc::new(ApiState::new(graph, rx));
    (router(state), tx)
}

async fn get(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn base_paths_list_apis() {
    let (app, _state) = build_test_router(Arc::new(two_sender_graph()));

    let (status, body) = get(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!(["x-nmos/"]));

    let (_, body) = get(&app, "/x-nmos/").await;
    assert_eq!(body, serde_json::json!(["node/", "connection/"]));

    let (_, body) = get(&app, "/x-nmos/node").await;
    assert_eq!(body, serde_json::json!(["v1.3/"]));

    let (_, body) = get(&app, "/x-nmos/node/v1.3/").await;
    assert_eq!(body.as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn self_reflects_the_node() {
    let graph = Arc::new(two_sender_graph());
    let (app, _state) = build_test_router(Arc::clone(&graph));

    let (status, body) = get(&app, "/x-nmos/node/v1.3/self").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], graph.node().id.to_string());
    assert_eq!(body["hostname"], "test-host");
    assert!(body["version"].as_str().unwrap().contains(':'));
}

#[tokio::test]
async fn devices_are_normalized() {
    let graph = Arc::new(two_sender_graph());
    let (app, _state) = build_test_router(Arc::clone(&graph));
    let device = &graph.devices()[0];

    let (status, body) = get(&app, "/x-nmos/node/v1.3/devices/").await;
    assert_eq!(status, StatusCode::OK);

    let listed = &body[0];
    assert_eq!(listed["node_id"], graph.node().id.to_string());
    let senders: Vec<&str> = listed["senders"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s.as_str().unwrap())
        .collect();
    assert_eq!(
        senders,
        device
            .senders
            .iter()
            .map(|s| s.id.to_string())
            .collect::<Vec<_>>()
    );

    let (status, single) = get(&app, &format!("/x-nmos/node/v1.3/devices/{}", device.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&single, listed);
}

#[tokio::test]
async fn senders_and_receivers_are_listed() {
    let graph = Arc::new(graph_with_receiver());
    let (app, _state) = build_test_router(Arc::clone(&graph));

    let (_, senders) = get(&app, "/x-nmos/node/v1.3/senders").await;
    assert_eq!(senders.as_array().unwrap().len(), 2);

    let (_, receivers) = get(&app, "/x-nmos/node/v1.3/receivers").await;
    assert_eq!(receivers.as_array().unwrap().len(), 1);
    assert_eq!(receivers[0]["format"], FORMAT_VIDEO);

    let sender = graph.senders().next().unwrap();
    let (status, body) = get(&app, &format!("/x-nmos/node/v1.3/senders/{}/", sender.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["device_id"], sender.device_id.to_string());

    let (_, flows) = get(&app, "/x-nmos/node/v1.3/flows").await;
    assert_eq!(flows, serde_json::json!([]));
}

#[tokio::test]
async fn unknown_resources_are_404_with_error_body() {
    let (app, _state) = build_test_router(Arc::new(two_sender_graph()));

    let missing = uuid::Uuid::new_v4();
    let (status, body) = get(&app, &format!("/x-nmos/node/v1.3/senders/{missing}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
    assert!(body["error"].as_str().unwrap().contains(&missing.to_string()));

    let (status, body) = get(&app, "/x-nmos/node/v9.9/self").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);

    let (status, _) = get(&app, "/x-nmos/node/v1.3/devices/not-a-uuid").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get(&app, "/x-nmos/query").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
}

#[tokio::test]
async fn connection_api_lists_ids() {
    let graph = Arc::new(graph_with_receiver());
    let (app, _state) = build_test_router(Arc::clone(&graph));

    let (_, versions) = get(&app, "/x-nmos/connection/").await;
    assert_eq!(versions, serde_json::json!(["v1.0/", "v1.1/"]));

    let (_, single) = get(&app, "/x-nmos/connection/v1.1/single").await;
    assert_eq!(single, serde_json::json!(["senders/", "receivers/"]));

    let (_, senders) = get(&app, "/x-nmos/connection/v1.1/single/senders/").await;
    let expected: Vec<String> = graph.senders().map(|s| format!("{}/", s.id)).collect();
    assert_eq!(senders, serde_json::json!(expected));

    let (_, receivers) = get(&app, "/x-nmos/connection/v1.1/single/receivers").await;
    assert_eq!(receivers.as_array().unwrap().len(), 1);

    let (status, _) = get(&app, "/x-nmos/connection/v2.0/single").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_registration_state() {
    let (app, state) = build_test_router(Arc::new(two_sender_graph()));

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["registration"], "idle");

    state.send_replace(RegistrationState::Registered);
    let (_, body) = get(&app, "/health").await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["registration"], "registered");
}
