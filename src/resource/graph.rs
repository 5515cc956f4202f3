//! The node's resource graph
//!
//! Built once at startup, then shared read-only. Every wire representation
//! is derived from it on demand.

use uuid::Uuid;

use super::device::{Device, NormalizedDevice, Receiver, Sender};
use super::envelope::Envelope;
use super::node::Node;

/// One node and the devices it hosts
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    node: Node,
    devices: Vec<Device>,
}

impl ResourceGraph {
    #[must_use]
    pub const fn new(node: Node) -> Self {
        Self {
            node,
            devices: Vec::new(),
        }
    }

    /// Attach a device to the graph's node
    ///
    /// The device and its children are re-parented so the back-references
    /// always point inside this graph.
    pub fn attach_device(&mut self, mut device: Device) -> Uuid {
        device.reparent(self.node.id);
        let id = device.id;
        self.devices.push(device);
        id
    }

    #[must_use]
    pub const fn node(&self) -> &Node {
        &self.node
    }

    #[must_use]
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    #[must_use]
    pub fn device(&self, id: Uuid) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }

    /// Wire form of every device
    #[must_use]
    pub fn normalized_devices(&self) -> Vec<NormalizedDevice> {
        self.devices.iter().map(Device::normalize).collect()
    }

    pub fn senders(&self) -> impl Iterator<Item = &Sender> {
        self.devices.iter().flat_map(|d| d.senders.iter())
    }

    pub fn receivers(&self) -> impl Iterator<Item = &Receiver> {
        self.devices.iter().flat_map(|d| d.receivers.iter())
    }

    #[must_use]
    pub fn sender(&self, id: Uuid) -> Option<&Sender> {
        self.senders().find(|s| s.id == id)
    }

    #[must_use]
    pub fn receiver(&self, id: Uuid) -> Option<&Receiver> {
        self.receivers().find(|r| r.id == id)
    }

    /// Total number of resources that a full registration publishes
    #[must_use]
    pub fn resource_count(&self) -> usize {
        1 + self
            .devices
            .iter()
            .map(|d| 1 + d.senders.len() + d.receivers.len())
            .sum::<usize>()
    }

    /// Envelopes in dependency order: node, then per device the device, its
    /// senders and its receivers
    #[must_use]
    pub fn publication_order(&self) -> Vec<Envelope> {
        let mut order = Vec::with_capacity(self.resource_count());
        order.push(Envelope::from(self.node.clone()));
        for device in &self.devices {
            order.push(Envelope::from(device));
            order.extend(device.senders.iter().cloned().map(Envelope::from));
            order.extend(device.receivers.iter().cloned().map(Envelope::from));
        }
        order
    }
}
