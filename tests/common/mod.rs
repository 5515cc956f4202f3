//! Shared test utilities
//!
//! [`MockRegistry`] is an in-process registration API that records every
//! call and answers with scripted statuses.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, post};
use axum::{Json, Router};
use nmos_node::resource::device::{DEVICE_TYPE_GENERIC, TRANSPORT_RTP_MCAST};
use nmos_node::{
    Device, Node, RegistrationSettings, RegistryCandidate, ResourceGraph, Sender, TxtRecords,
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// One request the registry received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Register { kind: String, id: String },
    Heartbeat { node_id: String, status: u16 },
    Delete { collection: String, id: String },
}

#[derive(Default)]
struct Script {
    calls: Vec<Call>,
    register_status: HashMap<String, u16>,
    stalled: HashSet<String>,
    heartbeat_status: Option<u16>,
}

type Shared = Arc<Mutex<Script>>;

/// In-process registry bound to `127.0.0.1:0`
pub struct MockRegistry {
    addr: SocketAddr,
    script: Shared,
    shutdown: CancellationToken,
}

impl MockRegistry {
    pub async fn start() -> Self {
        let script: Shared = Arc::default();
        let router = Router::new()
            .route("/x-nmos/registration/{version}/resource", post(register))
            .route(
                "/x-nmos/registration/{version}/health/nodes/{id}",
                post(heartbeat),
            )
            .route(
                "/x-nmos/registration/{version}/resource/{collection}/{id}",
                delete(remove),
            )
            .with_state(Arc::clone(&script));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock registry");
        let addr = listener.local_addr().expect("mock registry has no address");
        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await
                .expect("mock registry failed");
        });

        Self {
            addr,
            script,
            shutdown,
        }
    }

    /// Candidate pointing at this registry
    pub fn candidate(&self, pri: Option<u32>) -> RegistryCandidate {
        RegistryCandidate {
            instance: format!("mock-{}", self.addr.port()),
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: self.addr.port(),
            txt: TxtRecords {
                priority: pri,
                api_versions: vec!["v1.2".to_string(), "v1.3".to_string()],
                ..TxtRecords::default()
            },
        }
    }

    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Answer registrations of `kind` with `status` from now on
    pub fn fail_registration(&self, kind: &str, status: u16) {
        self.lock().register_status.insert(kind.to_string(), status);
    }

    pub fn accept_registration(&self, kind: &str) {
        self.lock().register_status.remove(kind);
    }

    /// Never answer registrations of `kind`
    pub fn stall_registration(&self, kind: &str) {
        self.lock().stalled.insert(kind.to_string());
    }

    /// Answer heartbeats with `status` from now on
    pub fn fail_heartbeats(&self, status: u16) {
        self.lock().heartbeat_status = Some(status);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Kinds of every registration, in arrival order
    pub fn registered_kinds(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Register { kind, .. } => Some(kind),
                _ => None,
            })
            .collect()
    }

    pub fn heartbeats(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Heartbeat { .. }))
            .count()
    }

    /// Heartbeats answered with anything but `200 OK`
    pub fn failed_heartbeats(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Heartbeat { status, .. } if *status != 200))
            .count()
    }

    pub fn deletes(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete { collection, id } => Some((collection, id)),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().expect("mock registry lock poisoned")
    }
}

impl Drop for MockRegistry {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn error_body(status: u16, error: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(json!({ "code": status, "error": error, "debug": null })),
    )
}

async fn register(
    State(script): State<Shared>,
    Path(_version): Path<String>,
    Json(envelope): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let kind = envelope["type"].as_str().unwrap_or_default().to_string();
    let id = envelope["data"]["id"].as_str().unwrap_or_default().to_string();

    let (stalled, status) = {
        let mut script = script.lock().expect("mock registry lock poisoned");
        script.calls.push(Call::Register {
            kind: kind.clone(),
            id,
        });
        (
            script.stalled.contains(&kind),
            script.register_status.get(&kind).copied(),
        )
    };

    if stalled {
        std::future::pending::<()>().await;
    }

    match status {
        Some(status) => error_body(status, &format!("{kind} refused")),
        None => (StatusCode::CREATED, Json(envelope["data"].clone())),
    }
}

async fn heartbeat(
    State(script): State<Shared>,
    Path((_version, id)): Path<(String, String)>,
) -> (StatusCode, Json<Value>) {
    let mut script = script.lock().expect("mock registry lock poisoned");
    let status = script.heartbeat_status.unwrap_or(200);
    script.calls.push(Call::Heartbeat {
        node_id: id,
        status,
    });

    match script.heartbeat_status {
        Some(status) => error_body(status, "registry unavailable"),
        None => (StatusCode::OK, Json(json!({ "health": "0" }))),
    }
}

async fn remove(
    State(script): State<Shared>,
    Path((_version, collection, id)): Path<(String, String, String)>,
) -> StatusCode {
    let mut script = script.lock().expect("mock registry lock poisoned");
    script.calls.push(Call::Delete { collection, id });
    StatusCode::NO_CONTENT
}

/// A node with one device carrying two senders
pub fn two_sender_graph() -> ResourceGraph {
    let mut graph = ResourceGraph::new(Node::new("test-host", "test-node"));
    let mut device = Device::new(graph.node().id, "encoder", DEVICE_TYPE_GENERIC);
    device.add_sender(Sender::new("sender1", TRANSPORT_RTP_MCAST));
    device.add_sender(Sender::new("sender2", TRANSPORT_RTP_MCAST));
    graph.attach_device(device);
    graph
}

/// Short timings so lifecycle tests run quickly
pub fn fast_settings() -> RegistrationSettings {
    RegistrationSettings {
        heartbeat_interval: Duration::from_millis(50),
        request_timeout: Duration::from_secs(2),
        selection_window: Duration::from_millis(20),
        retry_delay: Duration::from_millis(200),
        ..RegistrationSettings::default()
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
