//! Ordered publication of resources against one registry

use std::collections::HashSet;

use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::cancellable;
use super::client::{RegistryClient, RegistryEndpoint};
use crate::resource::{Envelope, ResourceKind};
use crate::{Error, Result};

/// Resources a registry has accepted during one publication sequence
///
/// Refuses a device whose node was not accepted, and a sender or receiver
/// whose device was not accepted.
#[derive(Debug, Default)]
pub struct PublicationLedger {
    nodes: HashSet<Uuid>,
    devices: HashSet<Uuid>,
    accepted: Vec<(ResourceKind, Uuid)>,
}

impl PublicationLedger {
    /// Check that `envelope`'s parent has already been accepted
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfOrder`] if the parent is missing
    pub fn check(&self, envelope: &Envelope) -> Result<()> {
        let Some(parent) = envelope.parent() else {
            return Ok(());
        };

        let parents = match envelope.kind() {
            ResourceKind::Node => return Ok(()),
            ResourceKind::Device => &self.nodes,
            ResourceKind::Sender | ResourceKind::Receiver => &self.devices,
        };

        if parents.contains(&parent) {
            Ok(())
        } else {
            Err(Error::OutOfOrder {
                kind: envelope.kind().as_str(),
                id: envelope.id(),
                parent,
            })
        }
    }

    pub fn record(&mut self, envelope: &Envelope) {
        match envelope.kind() {
            ResourceKind::Node => {
                self.nodes.insert(envelope.id());
            }
            ResourceKind::Device => {
                self.devices.insert(envelope.id());
            }
            ResourceKind::Sender | ResourceKind::Receiver => {}
        }
        self.accepted.push((envelope.kind(), envelope.id()));
    }

    /// Accepted resources in publication order
    #[must_use]
    pub fn accepted(&self) -> &[(ResourceKind, Uuid)] {
        &self.accepted
    }
}

/// Publishes envelopes one at a time, enforcing dependency order
pub struct Publisher<'a> {
    client: &'a RegistryClient,
    endpoint: &'a RegistryEndpoint,
    ledger: PublicationLedger,
}

impl<'a> Publisher<'a> {
    #[must_use]
    pub fn new(client: &'a RegistryClient, endpoint: &'a RegistryEndpoint) -> Self {
        Self {
            client,
            endpoint,
            ledger: PublicationLedger::default(),
        }
    }

    /// Publish one resource and wait for the registry to accept it
    ///
    /// Out-of-order resources are refused before any request is made.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfOrder`], [`Error::Cancelled`], a rejection or a
    /// transport error
    pub async fn publish(
        &mut self,
        envelope: &Envelope,
        cancel: &CancellationToken,
    ) -> Result<StatusCode> {
        self.ledger.check(envelope)?;

        let status = cancellable(cancel, self.client.register(self.endpoint, envelope)).await?;
        self.ledger.record(envelope);

        tracing::debug!(
            kind = %envelope.kind(),
            id = %envelope.id(),
            label = envelope.label(),
            %status,
            registry = %self.endpoint,
            "resource registered"
        );

        Ok(status)
    }

    #[must_use]
    pub const fn ledger(&self) -> &PublicationLedger {
        &self.ledger
    }
}
