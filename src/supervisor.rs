//! Lifecycle supervisor
//!
//! Binds the node API, the mDNS advertisement and the registration manager
//! together under one cancellation token, and tears them down in order:
//! deregister, withdraw the advertisement, stop serving.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiServer, ApiState};
use crate::config::Config;
use crate::discovery::{MdnsDiscovery, RegistryBrowser, StaticBrowser, TxtRecords};
use crate::registration::{RegistrationManager, RegistrationState};
use crate::resource::ResourceGraph;
use crate::Result;

/// Requests shutdown of a running [`Supervisor`] and observes its state
#[derive(Clone)]
pub struct SupervisorHandle {
    cancel: CancellationToken,
    state: watch::Receiver<RegistrationState>,
}

impl SupervisorHandle {
    /// Start a graceful shutdown; returns immediately
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn state(&self) -> RegistrationState {
        *self.state.borrow()
    }

    /// Wait until the registration state satisfies `f`
    ///
    /// Returns `false` if the supervisor went away first.
    pub async fn wait_for(&mut self, f: impl FnMut(&RegistrationState) -> bool) -> bool {
        self.state.wait_for(f).await.is_ok()
    }
}

/// Top-level owner of every long-running task
pub struct Supervisor {
    config: Config,
    graph: Arc<ResourceGraph>,
    mdns: Option<MdnsDiscovery>,
    manager: RegistrationManager,
    cancel: CancellationToken,
}

impl Supervisor {
    /// Discover registries over mDNS, or use the configured static ones
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Discovery`] if the mDNS daemon cannot start
    pub fn new(config: Config, graph: ResourceGraph) -> Result<Self> {
        let needs_mdns = config.node.advertise || config.registration.static_registries.is_empty();
        let mdns = if needs_mdns {
            Some(MdnsDiscovery::new()?)
        } else {
            None
        };

        let browser: Arc<dyn RegistryBrowser> = match &mdns {
            Some(mdns) if config.registration.static_registries.is_empty() => {
                Arc::new(mdns.locator(&config.registration.service_type))
            }
            _ => {
                let txt = TxtRecords {
                    api_versions: vec![config.registration.settings.api_version.clone()],
                    ..TxtRecords::default()
                };
                tracing::info!(
                    registries = ?config.registration.static_registries,
                    "using static registries"
                );
                Arc::new(StaticBrowser::from_endpoints(
                    &config.registration.static_registries,
                    &txt,
                ))
            }
        };

        Self::assemble(config, graph, mdns, browser)
    }

    /// Use `browser` as the registry source
    ///
    /// mDNS is only started when the node advertisement is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Discovery`] if the mDNS daemon cannot start
    pub fn with_browser(
        config: Config,
        graph: ResourceGraph,
        browser: Arc<dyn RegistryBrowser>,
    ) -> Result<Self> {
        let mdns = if config.node.advertise {
            Some(MdnsDiscovery::new()?)
        } else {
            None
        };
        Self::assemble(config, graph, mdns, browser)
    }

    fn assemble(
        config: Config,
        graph: ResourceGraph,
        mdns: Option<MdnsDiscovery>,
        browser: Arc<dyn RegistryBrowser>,
    ) -> Result<Self> {
        let graph = Arc::new(graph);
        let manager = RegistrationManager::new(
            Arc::clone(&graph),
            browser,
            config.registration.settings.clone(),
        )?;

        Ok(Self {
            config,
            graph,
            mdns,
            manager,
            cancel: CancellationToken::new(),
        })
    }

    #[must_use]
    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            cancel: self.cancel.clone(),
            state: self.manager.subscribe(),
        }
    }

    /// Run until interrupted or shut down through a [`SupervisorHandle`]
    ///
    /// # Errors
    ///
    /// Returns error if the node API cannot be bound, or if discovery fails
    /// fatally
    pub async fn run(self) -> Result<()> {
        let Self {
            config,
            graph,
            mdns,
            manager,
            cancel,
        } = self;

        let node = graph.node();
        tracing::info!(
            node_id = %node.id,
            label = %node.label,
            href = %node.href,
            devices = graph.devices().len(),
            resources = graph.resource_count(),
            "starting node"
        );

        let state = Arc::new(ApiState::new(Arc::clone(&graph), manager.subscribe()));
        let server = ApiServer::new(state, config.node.port)
            .spawn(cancel.child_token())
            .await?;

        let advertiser = mdns.as_ref().map(MdnsDiscovery::advertiser);
        if let Some(advertiser) = &advertiser {
            let txt = TxtRecords::for_node(&config.node.api_versions, config.node.protocol);
            let instance = advertised_name(&config.node.hostname);
            if let Err(e) = advertiser.start(&instance, config.node.port, &txt).await {
                tracing::warn!(error = %e, "node advertisement failed, continuing without it");
            }
        }

        let signal = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    () = cancel.cancelled() => {}
                    result = tokio::signal::ctrl_c() => match result {
                        Ok(()) => {
                            tracing::info!("interrupt received, shutting down");
                            cancel.cancel();
                        }
                        Err(e) => tracing::warn!(error = %e, "failed to listen for interrupt"),
                    },
                }
            })
        };

        let outcome = match tokio::spawn(manager.run(cancel.clone())).await {
            Ok(result) => result,
            Err(e) => Err(crate::Error::Config(format!("registration task failed: {e}"))),
        };
        if let Err(e) = &outcome {
            tracing::error!(error = %e, "registration stopped");
        }

        // Covers the fatal path, where nothing cancelled yet
        cancel.cancel();

        if let Some(advertiser) = &advertiser {
            advertiser.stop().await;
        }

        let served = match server.await {
            Ok(result) => result,
            Err(e) => Err(crate::Error::Config(format!("node API task failed: {e}"))),
        };
        if let Err(e) = signal.await {
            tracing::debug!(error = %e, "signal task ended abnormally");
        }
        drop(mdns);

        tracing::info!("node stopped");
        outcome.and(served)
    }
}

/// Advertised instance name: the hostname without a `.local` suffix
fn advertised_name(hostname: &str) -> String {
    hostname
        .strip_suffix(".local")
        .unwrap_or(hostname)
        .to_string()
}
