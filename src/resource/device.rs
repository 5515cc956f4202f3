//! Device, sender and receiver resources

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::version::{Version, Versioned};
use super::{Caps, Tags};

/// Generic device type URN
pub const DEVICE_TYPE_GENERIC: &str = "urn:x-nmos:device:generic";

/// RTP multicast transport URN
pub const TRANSPORT_RTP_MCAST: &str = "urn:x-nmos:transport:rtp.mcast";

/// Video format URN
pub const FORMAT_VIDEO: &str = "urn:x-nmos:format:video";

/// IS-05 connection control type
pub const CONTROL_CONNECTION: &str = "urn:x-nmos:control:sr-ctrl/v1.1";

/// A logical function hosted by the node, with its senders and receivers
///
/// This is the aggregate form held in memory. It is deliberately not
/// serializable: the registry only ever sees [`NormalizedDevice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: Uuid,
    pub version: Version,
    pub label: String,
    pub description: String,
    pub tags: Tags,
    pub device_type: String,
    pub node_id: Uuid,
    pub controls: Vec<Control>,
    pub senders: Vec<Sender>,
    pub receivers: Vec<Receiver>,
}

/// Control endpoint of a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    #[serde(rename = "type")]
    pub control_type: String,
    pub href: String,
}

/// Wire form of a device: children replaced by their identifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedDevice {
    pub id: Uuid,
    pub version: Version,
    pub label: String,
    pub description: String,
    #[serde(default)]
    pub tags: Tags,
    #[serde(rename = "type")]
    pub device_type: String,
    pub node_id: Uuid,
    pub senders: Vec<Uuid>,
    pub receivers: Vec<Uuid>,
    #[serde(default)]
    pub controls: Vec<Control>,
}

/// Logical transmit endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub id: Uuid,
    pub version: Version,
    pub label: String,
    pub description: String,
    #[serde(default)]
    pub tags: Tags,
    pub flow_id: Option<Uuid>,
    pub transport: String,
    pub device_id: Uuid,
    pub manifest_href: Option<String>,
    #[serde(default)]
    pub interface_bindings: Vec<String>,
    pub subscription: SenderSubscription,
}

/// Receiver currently bound to a sender
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderSubscription {
    pub receiver_id: Option<Uuid>,
    pub active: bool,
}

/// Logical receive endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receiver {
    pub id: Uuid,
    pub version: Version,
    pub label: String,
    pub description: String,
    #[serde(default)]
    pub tags: Tags,
    pub format: String,
    #[serde(default)]
    pub caps: Caps,
    pub transport: String,
    pub device_id: Uuid,
    #[serde(default)]
    pub interface_bindings: Vec<String>,
    pub subscription: ReceiverSubscription,
}

/// Sender currently feeding a receiver
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverSubscription {
    pub sender_id: Option<Uuid>,
    pub active: bool,
}

impl Device {
    /// Create an empty device owned by `node_id`
    #[must_use]
    pub fn new(node_id: Uuid, label: impl Into<String>, device_type: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            id: Uuid::new_v4(),
            version: Version::now(),
            description: label.clone(),
            label,
            tags: Tags::new(),
            device_type: device_type.into(),
            node_id,
            controls: Vec::new(),
            senders: Vec::new(),
            receivers: Vec::new(),
        }
    }

    /// Add a sender, binding it to this device
    pub fn add_sender(&mut self, mut sender: Sender) -> Uuid {
        sender.device_id = self.id;
        let id = sender.id;
        self.senders.push(sender);
        id
    }

    /// Add a receiver, binding it to this device
    pub fn add_receiver(&mut self, mut receiver: Receiver) -> Uuid {
        receiver.device_id = self.id;
        let id = receiver.id;
        self.receivers.push(receiver);
        id
    }

    /// Move the device (and its children) under another node
    pub fn reparent(&mut self, node_id: Uuid) {
        self.node_id = node_id;
        for sender in &mut self.senders {
            sender.device_id = self.id;
        }
        for receiver in &mut self.receivers {
            receiver.device_id = self.id;
        }
    }

    /// Project into the wire form with bare sender/receiver ids
    #[must_use]
    pub fn normalize(&self) -> NormalizedDevice {
        NormalizedDevice {
            id: self.id,
            version: self.version,
            label: self.label.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            device_type: self.device_type.clone(),
            node_id: self.node_id,
            senders: self.senders.iter().map(|s| s.id).collect(),
            receivers: self.receivers.iter().map(|r| r.id).collect(),
            controls: self.controls.clone(),
        }
    }
}

impl Sender {
    /// Create an unbound sender using the given transport
    #[must_use]
    pub fn new(label: impl Into<String>, transport: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            id: Uuid::new_v4(),
            version: Version::now(),
            description: label.clone(),
            label,
            tags: Tags::new(),
            flow_id: None,
            transport: transport.into(),
            device_id: Uuid::nil(),
            manifest_href: None,
            interface_bindings: Vec::new(),
            subscription: SenderSubscription::default(),
        }
    }

    /// Point the manifest at the SDP file served from `host`
    pub fn set_manifest_host(&mut self, host: &str) {
        self.manifest_href = Some(format!(
            "http://{host}/x-manufacturer/senders/{}/stream.sdp",
            self.id
        ));
    }
}

impl Receiver {
    /// Create an unbound receiver for the given format and transport
    #[must_use]
    pub fn new(
        label: impl Into<String>,
        format: impl Into<String>,
        transport: impl Into<String>,
    ) -> Self {
        let label = label.into();
        Self {
            id: Uuid::new_v4(),
            version: Version::now(),
            description: label.clone(),
            label,
            tags: Tags::new(),
            format: format.into(),
            caps: Caps::new(),
            transport: transport.into(),
            device_id: Uuid::nil(),
            interface_bindings: Vec::new(),
            subscription: ReceiverSubscription::default(),
        }
    }
}

macro_rules! impl_versioned {
    ($($ty:ty),+) => {
        $(
            impl Versioned for $ty {
                fn version(&self) -> Version {
                    self.version
                }

                fn version_mut(&mut self) -> &mut Version {
                    &mut self.version
                }
            }
        )+
    };
}

impl_versioned!(Device, Sender, Receiver);
