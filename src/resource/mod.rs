//! NMOS resource model
//!
//! Typed node, device, sender and receiver resources, the `{type, data}`
//! publication envelope, version tokens, and the graph that owns them.

pub mod device;
pub mod envelope;
pub mod graph;
pub mod node;
pub mod version;

use std::collections::BTreeMap;

pub use device::{
    Control, Device, NormalizedDevice, Receiver, ReceiverSubscription, Sender,
    SenderSubscription,
};
pub use envelope::{Envelope, ResourceKind};
pub use graph::ResourceGraph;
pub use node::{
    Clock, Endpoint, HostInterface, NetworkInterface, Node, NodeApi, NodeService, Protocol,
};
pub use version::{Version, Versioned};

/// Free-form resource tags: key to list of values
pub type Tags = BTreeMap<String, Vec<String>>;

/// Capability map; contents are format-specific
pub type Caps = BTreeMap<String, serde_json::Value>;
