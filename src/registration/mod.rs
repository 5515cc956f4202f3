//! Registration with an NMOS registry
//!
//! The [`RegistrationManager`] drives the lifecycle: discover a registry,
//! publish the resource graph in dependency order, heartbeat while
//! registered, and delete the node on the way out.

pub mod client;
pub mod heartbeat;
pub mod manager;
pub mod publish;
pub mod state;

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use client::{RegistryClient, RegistryEndpoint};
pub use heartbeat::{DEFAULT_HEARTBEAT_INTERVAL, HeartbeatMonitor, HeartbeatOutcome};
pub use manager::{RegistrationManager, select_candidate};
pub use publish::{PublicationLedger, Publisher};
pub use state::RegistrationState;

use crate::{Error, Result};

/// Default registration API version
pub const DEFAULT_API_VERSION: &str = "v1.3";

/// Tunables for the registration lifecycle
#[derive(Debug, Clone)]
pub struct RegistrationSettings {
    /// Registration API version used in request paths
    pub api_version: String,

    /// Interval between heartbeats
    pub heartbeat_interval: Duration,

    /// Deadline for every registry request
    pub request_timeout: Duration,

    /// How long to keep collecting candidates after the first one arrives
    pub selection_window: Duration,

    /// Pause before browsing again after a failed publication
    pub retry_delay: Duration,
}

impl Default for RegistrationSettings {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_API_VERSION.to_string(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            request_timeout: Duration::from_secs(5),
            selection_window: Duration::from_secs(1),
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// A successful registration against one registry
///
/// Produced once per completed publication and handed by value to the
/// heartbeat monitor and the shutdown path; never mutated.
#[derive(Debug, Clone)]
pub struct ActiveRegistration {
    pub endpoint: RegistryEndpoint,
    pub node_id: Uuid,
    pub registered_at: DateTime<Utc>,
}

impl ActiveRegistration {
    #[must_use]
    pub fn new(endpoint: RegistryEndpoint, node_id: Uuid) -> Self {
        Self {
            endpoint,
            node_id,
            registered_at: Utc::now(),
        }
    }
}

/// Run `fut` unless `cancel` fires first
async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        () = cancel.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}
