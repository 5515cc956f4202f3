//! Registration state machine

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::client::{RegistryClient, RegistryEndpoint};
use super::heartbeat::{HeartbeatMonitor, HeartbeatOutcome};
use super::publish::Publisher;
use super::state::RegistrationState;
use super::{ActiveRegistration, RegistrationSettings};
use crate::discovery::{RegistryBrowser, RegistryCandidate};
use crate::resource::{ResourceGraph, ResourceKind};
use crate::{Error, Result};

/// Owns the resource graph's relationship with a registry
///
/// One manager runs one sequential task, so at most one publication is in
/// flight and the graph is never registered with two registries at once.
pub struct RegistrationManager {
    graph: Arc<ResourceGraph>,
    browser: Arc<dyn RegistryBrowser>,
    client: RegistryClient,
    settings: RegistrationSettings,
    state: watch::Sender<RegistrationState>,
}

impl RegistrationManager {
    /// Create a manager in the `Idle` state
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(
        graph: Arc<ResourceGraph>,
        browser: Arc<dyn RegistryBrowser>,
        settings: RegistrationSettings,
    ) -> Result<Self> {
        let client = RegistryClient::new(settings.request_timeout)?;
        let (state, _) = watch::channel(RegistrationState::Idle);
        Ok(Self {
            graph,
            browser,
            client,
            settings,
            state,
        })
    }

    /// Observe state transitions
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RegistrationState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn state(&self) -> RegistrationState {
        *self.state.borrow()
    }

    /// Run until `cancel` fires, then deregister and terminate
    ///
    /// Steady-state failures (rejections, unreachable registries, missed
    /// heartbeats) send the machine back to discovery. Only a failure to
    /// start discovery is returned as an error, after the machine has
    /// reached `Terminated`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Discovery`] if browsing cannot be started
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let mut bound = None;
        let result = self.registration_loop(&cancel, &mut bound).await;

        if let Some(registration) = bound {
            self.transition(RegistrationState::Deregistering);
            self.deregister(&registration).await;
        }

        self.transition(RegistrationState::Terminated);
        result
    }

    async fn registration_loop(
        &self,
        cancel: &CancellationToken,
        bound: &mut Option<ActiveRegistration>,
    ) -> Result<()> {
        let mut backoff = false;

        loop {
            self.transition(RegistrationState::Discovering);

            if backoff && !pause(cancel, self.settings.retry_delay).await {
                return Ok(());
            }
            backoff = false;

            let Some(candidate) = self.discover(cancel).await? else {
                return Ok(());
            };

            self.transition(RegistrationState::Publishing);
            match self.publish(&candidate, cancel, bound).await {
                Ok(()) => {}
                Err(Error::Cancelled) => return Ok(()),
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(
                        registry = %candidate,
                        error = %e,
                        "publication failed, looking for a registry again"
                    );
                    *bound = None;
                    backoff = true;
                    continue;
                }
                Err(e) => return Err(e),
            }

            let Some(registration) = bound.clone() else {
                continue;
            };

            self.transition(RegistrationState::Registered);
            let monitor = HeartbeatMonitor::new(
                self.client.clone(),
                registration,
                self.settings.heartbeat_interval,
            );

            match monitor.run(cancel.child_token()).await {
                HeartbeatOutcome::Cancelled => return Ok(()),
                HeartbeatOutcome::Failed(e) => {
                    if cancel.is_cancelled() {
                        return Ok(());
                    }
                    tracing::warn!(
                        registry = %candidate,
                        error = %e,
                        "lost registry, looking for a registry again"
                    );
                    *bound = None;
                }
            }
        }
    }

    /// Browse until a usable candidate is selected, or cancellation
    async fn discover(&self, cancel: &CancellationToken) -> Result<Option<RegistryCandidate>> {
        let mut session = self.browser.browse(cancel.child_token())?;
        let api_version = self.settings.api_version.as_str();
        let mut candidates: Vec<RegistryCandidate> = Vec::new();

        // Wait for the first usable candidate, then keep collecting for the
        // selection window
        let window = tokio::time::sleep(Duration::MAX);
        tokio::pin!(window);

        let ended = loop {
            tokio::select! {
                () = cancel.cancelled() => break false,
                () = &mut window, if !candidates.is_empty() => break false,
                candidate = session.next() => match candidate {
                    Some(candidate) if !candidate.txt.supports(api_version) => {
                        tracing::debug!(
                            %candidate,
                            versions = ?candidate.txt.api_versions,
                            "ignoring registry without {api_version}"
                        );
                    }
                    Some(candidate) => {
                        if candidates.is_empty() {
                            let deadline =
                                tokio::time::Instant::now() + self.settings.selection_window;
                            window.as_mut().reset(deadline);
                        }
                        candidates.push(candidate);
                    }
                    None => break true,
                },
            }
        };

        session.finish().await;

        if cancel.is_cancelled() {
            return Ok(None);
        }

        match select_candidate(candidates) {
            Some(candidate) => {
                tracing::info!(registry = %candidate, "selected registry");
                Ok(Some(candidate))
            }
            None if ended => Err(Error::Discovery("browse ended unexpectedly".to_string())),
            None => Ok(None),
        }
    }

    /// Publish the whole graph against `candidate`
    ///
    /// `bound` is set as soon as the node is accepted so that a cancellation
    /// mid-sequence still deregisters it.
    async fn publish(
        &self,
        candidate: &RegistryCandidate,
        cancel: &CancellationToken,
        bound: &mut Option<ActiveRegistration>,
    ) -> Result<()> {
        let endpoint = RegistryEndpoint::new(candidate, &self.settings.api_version)?;
        let node_id = self.graph.node().id;
        let mut publisher = Publisher::new(&self.client, &endpoint);

        for envelope in self.graph.publication_order() {
            publisher.publish(&envelope, cancel).await?;
            if envelope.kind() == ResourceKind::Node {
                *bound = Some(ActiveRegistration::new(endpoint.clone(), node_id));
            }
        }

        tracing::info!(
            registry = %endpoint,
            node_id = %node_id,
            resources = publisher.ledger().accepted().len(),
            "resource graph registered"
        );

        Ok(())
    }

    /// Best-effort removal of the node; failures are logged, never retried
    async fn deregister(&self, registration: &ActiveRegistration) {
        match self
            .client
            .delete(&registration.endpoint, ResourceKind::Node, registration.node_id)
            .await
        {
            Ok(()) => tracing::info!(
                registry = %registration.endpoint,
                node_id = %registration.node_id,
                registered_secs = (Utc::now() - registration.registered_at).num_seconds(),
                "node deregistered"
            ),
            Err(e) => tracing::warn!(
                registry = %registration.endpoint,
                error = %e,
                "deregistration failed, registry will expire the node"
            ),
        }
    }

    fn transition(&self, next: RegistrationState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::info!(from = %previous, to = %next, "registration state changed");
        }
    }
}

/// Pick the registry to use: lowest `pri` wins, ties go to the first seen,
/// candidates without a priority rank last
#[must_use]
pub fn select_candidate(candidates: Vec<RegistryCandidate>) -> Option<RegistryCandidate> {
    candidates
        .into_iter()
        .enumerate()
        .min_by_key(|(seen, c)| (c.priority().unwrap_or(u32::MAX), *seen))
        .map(|(_, c)| c)
}

/// Sleep for `delay`; returns `false` if cancelled first
async fn pause(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}
