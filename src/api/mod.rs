//! Node HTTP API
//!
//! Read-only reflection of the resource graph (IS-04 node API), IS-05
//! connection listings, and a health probe that reports the registration
//! state.

pub mod connection;
pub mod health;
pub mod node;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, get};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::error::RegistryErrorBody;
use crate::registration::RegistrationState;
use crate::resource::ResourceGraph;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub graph: Arc<ResourceGraph>,
    pub registration: watch::Receiver<RegistrationState>,
}

impl ApiState {
    #[must_use]
    pub const fn new(
        graph: Arc<ResourceGraph>,
        registration: watch::Receiver<RegistrationState>,
    ) -> Self {
        Self {
            graph,
            registration,
        }
    }

    /// Node API versions this node serves
    #[must_use]
    pub fn node_versions(&self) -> &[String] {
        &self.graph.node().api.versions
    }
}

/// NMOS-style error response: `{code, error, debug}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
}

impl ApiError {
    pub fn not_found(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: error.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = RegistryErrorBody {
            code: self.status.as_u16(),
            error: self.error,
            debug: None,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Route `path` with and without a trailing slash
///
/// NMOS clients address collections as `.../senders/`; both spellings answer.
pub(crate) fn route_both<S>(router: Router<S>, path: &str, method: MethodRouter<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .route(path, method.clone())
        .route(&format!("{path}/"), method)
}

/// Build the router with all routes
#[must_use]
pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new().route("/", get(|| async { Json(["x-nmos/"]) }));
    route_both(router, "/x-nmos", get(|| async { Json(["node/", "connection/"]) }))
        .merge(node::router(state.clone()))
        .merge(connection::router(state.clone()))
        .merge(health::router(state))
        .fallback(|| async { ApiError::not_found("no such resource") })
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Node API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    #[must_use]
    pub const fn new(state: Arc<ApiState>, port: u16) -> Self {
        Self { state, port }
    }

    /// Bind the listening socket
    ///
    /// # Errors
    ///
    /// Returns error if the port cannot be bound
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = format!("0.0.0.0:{}", self.port);
        TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind node API on {addr}: {e}")))
    }

    /// Serve on `listener` until `cancel` fires
    ///
    /// # Errors
    ///
    /// Returns error if the server fails while running
    pub async fn serve(self, listener: TcpListener, cancel: CancellationToken) -> Result<()> {
        let port = listener.local_addr().map_or(self.port, |a| a.port());
        tracing::info!(port, "node API listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .map_err(|e| crate::Error::Config(format!("node API server error: {e}")))?;

        tracing::debug!("node API stopped");
        Ok(())
    }

    /// Bind, then serve in a background task
    ///
    /// # Errors
    ///
    /// Returns error if the port cannot be bound
    pub async fn spawn(
        self,
        cancel: CancellationToken,
    ) -> Result<tokio::task::JoinHandle<Result<()>>> {
        let listener = self.bind().await?;
        Ok(tokio::spawn(self.serve(listener, cancel)))
    }
}
