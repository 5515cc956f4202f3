//! Node resource: identity and reachability of this agent

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::version::{Version, Versioned};
use super::{Caps, Tags};

/// The node resource published to the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: Uuid,
    pub version: Version,
    pub label: String,
    pub description: String,
    #[serde(default)]
    pub tags: Tags,
    pub href: String,
    pub hostname: String,
    pub api: NodeApi,
    #[serde(default)]
    pub caps: Caps,
    #[serde(default)]
    pub services: Vec<NodeService>,
    #[serde(default)]
    pub clocks: Vec<Clock>,
    #[serde(default)]
    pub interfaces: Vec<NetworkInterface>,
}

/// API versions and endpoints the node API is reachable on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeApi {
    pub versions: Vec<String>,
    pub endpoints: Vec<Endpoint>,
}

/// One reachable node API endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
}

/// API transport protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Protocol {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            other => Err(crate::Error::Config(format!("unknown api protocol: {other}"))),
        }
    }
}

/// Additional service hosted by the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeService {
    pub href: String,
    #[serde(rename = "type")]
    pub service_type: String,
}

/// Clock available to the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "ref_type", rename_all = "lowercase")]
pub enum Clock {
    Internal {
        name: String,
    },
    Ptp {
        name: String,
        traceable: bool,
        version: String,
        gmid: String,
        locked: bool,
    },
}

/// Network interface declared by the node
///
/// `chassis_id`/`port_id` carry the LLDP identity (MAC addresses in
/// `aa-bb-cc-dd-ee-ff` form) when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub name: String,
    pub chassis_id: Option<String>,
    pub port_id: Option<String>,
}

impl NetworkInterface {
    /// Interface identified by its MAC address
    ///
    /// The MAC is used for both `chassis_id` and `port_id`, normalized to
    /// dash form. Without one, neither is set.
    #[must_use]
    pub fn new(name: impl Into<String>, mac: Option<&str>) -> Self {
        let mac = mac.map(normalize_mac);
        Self {
            name: name.into(),
            chassis_id: mac.clone(),
            port_id: mac,
        }
    }

    /// Same interface with its identifiers in dash form
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            name: self.name,
            chassis_id: self.chassis_id.as_deref().map(normalize_mac),
            port_id: self.port_id.as_deref().map(normalize_mac),
        }
    }
}

/// Normalize a MAC address to the dash-separated lowercase form NMOS expects
#[must_use]
pub fn normalize_mac(mac: &str) -> String {
    mac.trim().replace(':', "-").to_ascii_lowercase()
}

/// A usable interface of this host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInterface {
    pub name: String,
    pub address: IpAddr,
    /// Hardware address as reported by the OS, if it has one
    pub mac: Option<String>,
}

impl Node {
    /// Create a node with a fresh identifier
    #[must_use]
    pub fn new(hostname: impl Into<String>, label: impl Into<String>) -> Self {
        let hostname = hostname.into();
        let label = label.into();
        Self {
            id: Uuid::new_v4(),
            version: Version::now(),
            description: format!("{label}-node"),
            label,
            tags: BTreeMap::new(),
            href: String::new(),
            hostname,
            api: NodeApi {
                versions: vec!["v1.3".to_string()],
                endpoints: Vec::new(),
            },
            caps: Caps::new(),
            services: Vec::new(),
            clocks: Vec::new(),
            interfaces: Vec::new(),
        }
    }

    /// Add a reachable API endpoint; the first endpoint also sets `href`
    pub fn add_endpoint(&mut self, host: IpAddr, port: u16, protocol: Protocol) {
        let host = host.to_string();
        if self.href.is_empty() {
            self.href = format!("{protocol}://{host}:{port}/");
        }
        self.api.endpoints.push(Endpoint {
            host,
            port,
            protocol,
        });
    }

    /// Declare a network interface, ignoring duplicates by name
    pub fn add_interface(&mut self, interface: NetworkInterface) {
        if self.interfaces.iter().all(|i| i.name != interface.name) {
            self.interfaces.push(interface);
        }
    }
}

impl Versioned for Node {
    fn version(&self) -> Version {
        self.version
    }

    fn version_mut(&mut self) -> &mut Version {
        &mut self.version
    }
}

/// Enumerate non-loopback IPv4 interfaces of this host with their MACs
///
/// Results are in discovery order.
#[must_use]
pub fn detect_host_interfaces() -> Vec<HostInterface> {
    let list = match local_ip_address::list_afinet_netifas() {
        Ok(list) => list,
        Err(e) => {
            tracing::warn!(error = %e, "failed to enumerate network interfaces");
            return Vec::new();
        }
    };

    list.into_iter()
        .filter(|(_, ip)| ip.is_ipv4() && !ip.is_loopback())
        .map(|(name, address)| {
            let mac = match mac_address::mac_address_by_name(&name) {
                Ok(mac) => mac.map(|m| m.to_string()),
                Err(e) => {
                    tracing::debug!(interface = %name, error = %e, "no hardware address");
                    None
                }
            };
            HostInterface { name, address, mac }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn first_endpoint_sets_href() {
        let mut node = Node::new("studio-1.local", "studio-1");
        node.add_endpoint(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), 8889, Protocol::Http);
        node.add_endpoint(IpAddr::V4(Ipv4Addr::new(10, 0, 1, 2)), 8889, Protocol::Http);

        assert_eq!(node.href, "http://10.0.0.2:8889/");
        assert_eq!(node.api.endpoints.len(), 2);
        assert_eq!(node.description, "studio-1-node");
    }

    #[test]
    fn duplicate_interfaces_are_ignored() {
        let mut node = Node::new("host", "host");
        node.add_interface(NetworkInterface::new("eth0", None));
        node.add_interface(NetworkInterface::new("eth0", None));
        node.add_interface(NetworkInterface::new("eth1", None));

        assert_eq!(node.interfaces.len(), 2);
    }

    #[test]
    fn bump_changes_version_not_id() {
        let mut node = Node::new("host", "host");
        let id = node.id;
        let before = node.version;

        node.label = "renamed".to_string();
        node.bump_version();

        assert_eq!(node.id, id);
        assert!(node.version > before);
    }

    #[test]
    fn clock_serializes_with_ref_type() {
        let clock = Clock::Internal {
            name: "clk0".to_string(),
        };
        let json = serde_json::to_value(&clock).unwrap();
        assert_eq!(json["ref_type"], "internal");
        assert_eq!(json["name"], "clk0");
    }

    #[test]
    fn normalizes_mac_addresses() {
        assert_eq!(normalize_mac("AA:BB:CC:00:11:22"), "aa-bb-cc-00-11-22");
        assert_eq!(normalize_mac(" aa-bb-cc-00-11-22 "), "aa-bb-cc-00-11-22");
    }

    #[test]
    fn interface_mac_fills_both_identifiers() {
        let interface = NetworkInterface::new("eth0", Some("00:1B:44:11:3A:B7"));
        assert_eq!(interface.chassis_id.as_deref(), Some("00-1b-44-11-3a-b7"));
        assert_eq!(interface.port_id.as_deref(), Some("00-1b-44-11-3a-b7"));

        let bare = NetworkInterface::new("lo", None);
        assert!(bare.chassis_id.is_none() && bare.port_id.is_none());
    }

    #[test]
    fn configured_identifiers_are_normalized() {
        let interface = NetworkInterface {
            name: "eth0".to_string(),
            chassis_id: Some("AA:BB:CC:DD:EE:FF".to_string()),
            port_id: Some("AA:BB:CC:DD:EE:01".to_string()),
        }
        .normalized();

        assert_eq!(interface.chassis_id.as_deref(), Some("aa-bb-cc-dd-ee-ff"));
        assert_eq!(interface.port_id.as_deref(), Some("aa-bb-cc-dd-ee-01"));
    }
}
