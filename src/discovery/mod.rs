//! Service discovery using mDNS/DNS-SD
//!
//! Browses for NMOS registries (and query APIs) and advertises the node's
//! own API. The registration state machine only sees the [`RegistryBrowser`]
//! seam: a browse session that yields candidates until it is cancelled.

pub mod mdns;
pub mod txt;

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

pub use mdns::{MdnsDiscovery, NodeAdvertiser, RegistryLocator};
pub use txt::TxtRecords;

use crate::Result;

/// Service type registries advertise
pub const REGISTRATION_SERVICE: &str = "_nmos-register._tcp.local.";

/// Service type query APIs advertise
pub const QUERY_SERVICE: &str = "_nmos-query._tcp.local.";

/// Service type nodes advertise
pub const NODE_SERVICE: &str = "_nmos-node._tcp.local.";

/// A discovered service endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryCandidate {
    /// DNS-SD instance name
    pub instance: String,
    pub address: IpAddr,
    pub port: u16,
    pub txt: TxtRecords,
}

impl RegistryCandidate {
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    #[must_use]
    pub const fn priority(&self) -> Option<u32> {
        self.txt.priority
    }
}

impl std::fmt::Display for RegistryCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.txt.api_proto, self.socket_addr())?;
        if let Some(pri) = self.txt.priority {
            write!(f, " (pri={pri})")?;
        }
        Ok(())
    }
}

/// Source of registry candidates
pub trait RegistryBrowser: Send + Sync {
    /// Start a browse session scoped by `cancel`
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Discovery`] if browsing cannot be started
    fn browse(&self, cancel: CancellationToken) -> Result<BrowseSession>;
}

/// One running browse
///
/// Candidates arrive in discovery order, each at most once per session.
/// Dropping the session cancels the browse task; [`BrowseSession::finish`]
/// also waits for it.
pub struct BrowseSession {
    candidates: mpsc::Receiver<RegistryCandidate>,
    guard: DropGuard,
    task: JoinHandle<()>,
}

impl BrowseSession {
    #[must_use]
    pub fn new(
        candidates: mpsc::Receiver<RegistryCandidate>,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            candidates,
            guard: cancel.drop_guard(),
            task,
        }
    }

    /// Next candidate, or `None` once the browse has ended
    pub async fn next(&mut self) -> Option<RegistryCandidate> {
        self.candidates.recv().await
    }

    /// Stop browsing and wait for the browse task to exit
    pub async fn finish(self) {
        let Self {
            candidates,
            guard,
            task,
        } = self;
        drop(candidates);
        drop(guard);
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "browse task ended abnormally");
        }
    }
}

/// Browse for a bounded window and return everything found
///
/// # Errors
///
/// Returns error if the browse cannot be started
pub async fn discover_for(
    browser: &dyn RegistryBrowser,
    wait: Duration,
) -> Result<Vec<RegistryCandidate>> {
    let mut session = browser.browse(CancellationToken::new())?;
    let mut found = Vec::new();

    let deadline = tokio::time::sleep(wait);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = &mut deadline => break,
            candidate = session.next() => match candidate {
                Some(candidate) => {
                    tracing::debug!(%candidate, "discovered service");
                    found.push(candidate);
                }
                None => break,
            },
        }
    }

    session.finish().await;
    Ok(found)
}

/// Browser over a fixed list of endpoints
///
/// Used when multicast discovery is unavailable (endpoints from
/// configuration), and to script discovery timing. Each entry is delivered
/// after its delay, measured from the start of the session.
#[derive(Debug, Clone, Default)]
pub struct StaticBrowser {
    entries: Vec<(Duration, RegistryCandidate)>,
}

impl StaticBrowser {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Deliver `candidate` immediately
    #[must_use]
    pub fn with(self, candidate: RegistryCandidate) -> Self {
        self.with_delay(Duration::ZERO, candidate)
    }

    /// Deliver `candidate` after `delay`
    #[must_use]
    pub fn with_delay(mut self, delay: Duration, candidate: RegistryCandidate) -> Self {
        self.entries.push((delay, candidate));
        self.entries.sort_by_key(|(d, _)| *d);
        self
    }

    /// Build from configured `host:port` endpoints
    #[must_use]
    pub fn from_endpoints(endpoints: &[SocketAddr], txt: &TxtRecords) -> Self {
        endpoints.iter().fold(Self::new(), |browser, addr| {
            browser.with(RegistryCandidate {
                instance: format!("static-{addr}"),
                address: addr.ip(),
                port: addr.port(),
                txt: txt.clone(),
            })
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RegistryBrowser for StaticBrowser {
    fn browse(&self, cancel: CancellationToken) -> Result<BrowseSession> {
        let (tx, rx) = mpsc::channel(self.entries.len().max(1));
        let entries = self.entries.clone();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now();
            for (delay, candidate) in entries {
                tokio::select! {
                    () = token.cancelled() => return,
                    () = tokio::time::sleep_until(start + delay) => {}
                }
                if tx.send(candidate).await.is_err() {
                    return;
                }
            }
            // Keep the session open like a live browse that found nothing more
            token.cancelled().await;
        });

        Ok(BrowseSession::new(rx, cancel, task))
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn candidate(last_octet: u8, pri: u32) -> RegistryCandidate {
        RegistryCandidate {
            instance: format!("registry-{last_octet}"),
            address: IpAddr::V4(Ipv4Addr::new(10, 0, 0, last_octet)),
            port: 3210,
            txt: TxtRecords {
                priority: Some(pri),
                ..TxtRecords::default()
            },
        }
    }

    #[tokio::test]
    async fn static_browser_delivers_in_delay_order() {
        let browser = StaticBrowser::new()
            .with_delay(Duration::from_millis(30), candidate(9, 5))
            .with(candidate(5, 10));

        let found = discover_for(&browser, Duration::from_millis(200))
            .await
            .unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].address, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(found[1].priority(), Some(5));
    }

    #[tokio::test]
    async fn empty_window_is_not_an_error() {
        let found = discover_for(&StaticBrowser::new(), Duration::from_millis(20))
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn finishing_a_session_stops_the_browse_task() {
        let browser = StaticBrowser::new().with_delay(Duration::from_secs(60), candidate(5, 10));
        let cancel = CancellationToken::new();
        let session = browser.browse(cancel.clone()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), session.finish())
            .await
            .expect("browse task should observe cancellation");
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn candidate_display_includes_priority() {
        assert_eq!(candidate(5, 10).to_string(), "http://10.0.0.5:3210 (pri=10)");
    }
}
