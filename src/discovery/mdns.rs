//! mDNS browsing and advertisement
//!
//! One [`MdnsDiscovery`] owns the responder daemon. It hands out
//! [`RegistryLocator`]s (browse for a service type) and a [`NodeAdvertiser`]
//! (announce `_nmos-node._tcp`), all sharing the same daemon.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;

use super::txt::TxtRecords;
use super::{BrowseSession, NODE_SERVICE, RegistryBrowser, RegistryCandidate};
use crate::{Error, Result};

/// Owner of the mDNS daemon
pub struct MdnsDiscovery {
    daemon: ServiceDaemon,
}

impl MdnsDiscovery {
    /// Start the mDNS daemon
    ///
    /// # Errors
    ///
    /// Returns [`Error::Discovery`] if the daemon cannot be created; there is
    /// no fallback discovery mechanism, so callers treat this as fatal
    pub fn new() -> Result<Self> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| Error::Discovery(format!("failed to create mDNS daemon: {e}")))?;
        Ok(Self { daemon })
    }

    /// Browser for `service_type` (e.g. [`super::REGISTRATION_SERVICE`])
    #[must_use]
    pub fn locator(&self, service_type: &str) -> RegistryLocator {
        RegistryLocator {
            daemon: self.daemon.clone(),
            service_type: service_type.to_string(),
        }
    }

    #[must_use]
    pub fn advertiser(&self) -> NodeAdvertiser {
        NodeAdvertiser {
            daemon: self.daemon.clone(),
            registered_service: Arc::new(RwLock::new(None)),
        }
    }
}

impl Drop for MdnsDiscovery {
    fn drop(&mut self) {
        if let Err(e) = self.daemon.shutdown() {
            tracing::trace!(error = %e, "mDNS daemon shutdown error (expected on normal exit)");
        }
    }
}

/// Browses the local domain for one service type
#[derive(Clone)]
pub struct RegistryLocator {
    daemon: ServiceDaemon,
    service_type: String,
}

impl RegistryLocator {
    #[must_use]
    pub fn service_type(&self) -> &str {
        &self.service_type
    }
}

impl RegistryBrowser for RegistryLocator {
    fn browse(&self, cancel: CancellationToken) -> Result<BrowseSession> {
        let events = self.daemon.browse(&self.service_type).map_err(|e| {
            Error::Discovery(format!("failed to browse {}: {e}", self.service_type))
        })?;

        tracing::debug!(service_type = %self.service_type, "browsing for services");

        let (tx, rx) = mpsc::channel(16);
        let daemon = self.daemon.clone();
        let service_type = self.service_type.clone();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut seen: HashSet<(String, SocketAddr)> = HashSet::new();

            loop {
                let event = tokio::select! {
                    () = token.cancelled() => break,
                    event = events.recv_async() => match event {
                        Ok(event) => event,
                        Err(_) => {
                            tracing::debug!(%service_type, "mDNS event channel closed");
                            break;
                        }
                    },
                };

                match event {
                    ServiceEvent::ServiceResolved(info) => {
                        let Some(candidate) = candidate_from_info(&info) else {
                            tracing::debug!(
                                fullname = info.get_fullname(),
                                "resolved service has no address"
                            );
                            continue;
                        };

                        let key = (info.get_fullname().to_string(), candidate.socket_addr());
                        if !seen.insert(key) {
                            continue;
                        }

                        tracing::info!(
                            %service_type,
                            instance = %candidate.instance,
                            address = %candidate.socket_addr(),
                            priority = ?candidate.priority(),
                            "found service"
                        );

                        tokio::select! {
                            () = token.cancelled() => break,
                            sent = tx.send(candidate) => if sent.is_err() { break },
                        }
                    }
                    ServiceEvent::ServiceRemoved(_, fullname) => {
                        tracing::debug!(%fullname, "service removed");
                        seen.retain(|(name, _)| *name != fullname);
                    }
                    _ => {}
                }
            }

            if let Err(e) = daemon.stop_browse(&service_type) {
                tracing::trace!(error = %e, %service_type, "failed to stop browse");
            }
        });

        Ok(BrowseSession::new(rx, cancel, task))
    }
}

/// Build a candidate from a resolved service, preferring IPv4 addresses
fn candidate_from_info(info: &ServiceInfo) -> Option<RegistryCandidate> {
    let addresses = info.get_addresses();
    let address = pick_address(addresses.iter().copied())?;

    let txt = TxtRecords::from_pairs(
        ["pri", "api_ver", "api_proto", "api_auth"]
            .into_iter()
            .filter_map(|key| info.get_property_val_str(key).map(|v| (key, v))),
    );

    Some(RegistryCandidate {
        instance: info.get_fullname().to_string(),
        address,
        port: info.get_port(),
        txt,
    })
}

/// First IPv4 address in sorted order, falling back to IPv6
fn pick_address(addresses: impl Iterator<Item = IpAddr>) -> Option<IpAddr> {
    let mut all: Vec<IpAddr> = addresses.collect();
    all.sort();
    all.iter()
        .copied()
        .find(IpAddr::is_ipv4)
        .or_else(|| all.first().copied())
}

/// Announces the node API as `_nmos-node._tcp`
pub struct NodeAdvertiser {
    daemon: ServiceDaemon,

    /// Currently registered service (if any)
    registered_service: Arc<RwLock<Option<String>>>,
}

impl NodeAdvertiser {
    /// Start advertising the node API
    ///
    /// # Errors
    ///
    /// Returns error if the service cannot be registered
    pub async fn start(&self, instance_name: &str, port: u16, txt: &TxtRecords) -> Result<()> {
        let hostname = hostname::get()
            .map_or_else(|_| "nmos-node".to_string(), |h| h.to_string_lossy().to_string());
        let hostname = hostname.trim_end_matches(".local").to_string();

        let service = ServiceInfo::new(
            NODE_SERVICE,
            instance_name,
            &format!("{hostname}.local."),
            "",
            port,
            txt.to_properties(),
        )
        .map_err(|e| Error::Discovery(format!("failed to create service info: {e}")))?
        .enable_addr_auto();

        let fullname = service.get_fullname().to_string();

        self.daemon
            .register(service)
            .map_err(|e| Error::Discovery(format!("failed to register mDNS service: {e}")))?;

        {
            let mut registered = self.registered_service.write().await;
            *registered = Some(fullname);
        }

        tracing::info!(
            service_type = NODE_SERVICE,
            instance = instance_name,
            port,
            "mDNS node service registered"
        );

        Ok(())
    }

    /// Stop advertising the node API
    pub async fn stop(&self) {
        let fullname = {
            let mut registered = self.registered_service.write().await;
            registered.take()
        };

        if let Some(name) = fullname {
            if let Err(e) = self.daemon.unregister(&name) {
                tracing::warn!(error = %e, "failed to unregister mDNS service");
            } else {
                tracing::info!("mDNS node service unregistered");
            }
        }
    }
}

impl Drop for NodeAdvertiser {
    fn drop(&mut self) {
        if let Ok(guard) = self.registered_service.try_read() {
            if let Some(name) = guard.as_ref() {
                let _ = self.daemon.unregister(name);
            }
        }
    }
}
