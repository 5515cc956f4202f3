//! Wire envelope for registry publication
//!
//! Every `POST .../resource` body is `{"type": <kind>, "data": <resource>}`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::device::{Device, NormalizedDevice, Receiver, Sender};
use super::node::Node;

/// Resource kinds the registry accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Node,
    Device,
    Sender,
    Receiver,
}

impl ResourceKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Device => "device",
            Self::Sender => "sender",
            Self::Receiver => "receiver",
        }
    }

    /// Path segment used by registry resource URLs (`resource/nodes/{id}`)
    #[must_use]
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Node => "nodes",
            Self::Device => "devices",
            Self::Sender => "senders",
            Self::Receiver => "receivers",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource wrapped for publication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Envelope {
    Node(Node),
    Device(NormalizedDevice),
    Sender(Sender),
    Receiver(Receiver),
}

impl Envelope {
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Node(_) => ResourceKind::Node,
            Self::Device(_) => ResourceKind::Device,
            Self::Sender(_) => ResourceKind::Sender,
            Self::Receiver(_) => ResourceKind::Receiver,
        }
    }

    /// Identifier of the wrapped resource
    #[must_use]
    pub const fn id(&self) -> Uuid {
        match self {
            Self::Node(n) => n.id,
            Self::Device(d) => d.id,
            Self::Sender(s) => s.id,
            Self::Receiver(r) => r.id,
        }
    }

    /// Identifier of the resource this one must be published after, if any
    #[must_use]
    pub const fn parent(&self) -> Option<Uuid> {
        match self {
            Self::Node(_) => None,
            Self::Device(d) => Some(d.node_id),
            Self::Sender(s) => Some(s.device_id),
            Self::Receiver(r) => Some(r.device_id),
        }
    }

    /// Human-readable label of the wrapped resource
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Node(n) => &n.label,
            Self::Device(d) => &d.label,
            Self::Sender(s) => &s.label,
            Self::Receiver(r) => &r.label,
        }
    }
}

impl From<Node> for Envelope {
    fn from(node: Node) -> Self {
        Self::Node(node)
    }
}

impl From<&Device> for Envelope {
    fn from(device: &Device) -> Self {
        Self::Device(device.normalize())
    }
}

impl From<NormalizedDevice> for Envelope {
    fn from(device: NormalizedDevice) -> Self {
        Self::Device(device)
    }
}

impl From<Sender> for Envelope {
    fn from(sender: Sender) -> Self {
        Self::Sender(sender)
    }
}

impl From<Receiver> for Envelope {
    fn from(receiver: Receiver) -> Self {
        Self::Receiver(receiver)
    }
}
