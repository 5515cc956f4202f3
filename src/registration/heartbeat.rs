//! Heartbeat monitor
//!
//! Keeps an active registration alive. The first failed heartbeat ends the
//! loop; re-discovery is the manager's job.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::cancellable;
use super::client::RegistryClient;
use super::ActiveRegistration;
use crate::Error;

/// Default interval between heartbeats
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Why a heartbeat loop ended
#[derive(Debug)]
pub enum HeartbeatOutcome {
    /// The shared cancellation signal fired
    Cancelled,
    /// The registry did not acknowledge a heartbeat
    Failed(Error),
}

/// Periodic liveness assertion for one registration
pub struct HeartbeatMonitor {
    client: RegistryClient,
    registration: ActiveRegistration,
    interval: Duration,
}

impl HeartbeatMonitor {
    #[must_use]
    pub const fn new(
        client: RegistryClient,
        registration: ActiveRegistration,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            registration,
            interval,
        }
    }

    /// Heartbeat until failure or cancellation
    ///
    /// The first beat is sent immediately.
    pub async fn run(self, cancel: CancellationToken) -> HeartbeatOutcome {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut beats: u64 = 0;

        tracing::debug!(
            registry = %self.registration.endpoint,
            node_id = %self.registration.node_id,
            interval = ?self.interval,
            "heartbeat started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!(beats, "heartbeat stopped");
                    return HeartbeatOutcome::Cancelled;
                }
                _ = ticker.tick() => {}
            }

            let beat = self
                .client
                .heartbeat(&self.registration.endpoint, self.registration.node_id);

            match cancellable(&cancel, beat).await {
                Ok(()) => {
                    beats += 1;
                    tracing::trace!(beats, "heartbeat acknowledged");
                }
                Err(Error::Cancelled) => {
                    tracing::debug!(beats, "heartbeat stopped");
                    return HeartbeatOutcome::Cancelled;
                }
                Err(e) => {
                    tracing::warn!(
                        registry = %self.registration.endpoint,
                        beats,
                        error = %e,
                        "heartbeat failed"
                    );
                    return HeartbeatOutcome::Failed(e);
                }
            }
        }
    }
}
