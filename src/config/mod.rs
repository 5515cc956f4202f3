//! Configuration management for the node agent
//!
//! Precedence, lowest first: built-in defaults, the TOML file, environment
//! variables, then command-line flags (applied by the binary).

pub mod file;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use file::{DeviceFileConfig, NodeConfigFile};

use crate::discovery::REGISTRATION_SERVICE;
use crate::registration::{DEFAULT_API_VERSION, RegistrationSettings};
use crate::resource::device::{
    CONTROL_CONNECTION, DEVICE_TYPE_GENERIC, FORMAT_VIDEO, TRANSPORT_RTP_MCAST,
};
use crate::resource::node::{HostInterface, detect_host_interfaces};
use crate::resource::{
    Control, Device, NetworkInterface, Node, Protocol, Receiver, ResourceGraph, Sender, Tags,
};
use crate::{Error, Result};

/// Default node API port
pub const DEFAULT_PORT: u16 = 8889;

/// Node agent configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Node identity and API surface
    pub node: NodeConfig,

    /// Registry discovery and registration
    pub registration: RegistrationConfig,

    /// Devices published under the node
    pub devices: Vec<DeviceFileConfig>,
}

/// Node identity and API surface
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub label: String,
    pub description: Option<String>,
    pub hostname: String,

    /// Port the node API listens on
    pub port: u16,

    /// Node API versions served and advertised
    pub api_versions: Vec<String>,

    pub protocol: Protocol,

    /// Address used for `href`; detected when unset
    pub href_host: Option<IpAddr>,

    /// Advertise `_nmos-node._tcp` over mDNS
    pub advertise: bool,

    pub tags: Tags,

    /// Declared interfaces; detected when empty
    pub interfaces: Vec<NetworkInterface>,
}

/// Registry discovery and registration
#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    pub settings: RegistrationSettings,

    /// DNS-SD service type to browse
    pub service_type: String,

    /// Registries to use instead of mDNS discovery
    pub static_registries: Vec<SocketAddr>,
}

impl Default for Config {
    fn default() -> Self {
        let hostname = system_hostname();
        Self {
            node: NodeConfig {
                label: hostname.clone(),
                description: None,
                hostname,
                port: DEFAULT_PORT,
                api_versions: vec![DEFAULT_API_VERSION.to_string()],
                protocol: Protocol::Http,
                href_host: None,
                advertise: true,
                tags: Tags::new(),
                interfaces: Vec::new(),
            },
            registration: RegistrationConfig {
                settings: RegistrationSettings::default(),
                service_type: REGISTRATION_SERVICE.to_string(),
                static_registries: Vec::new(),
            },
            devices: vec![example_device()],
        }
    }
}

impl Config {
    /// Load configuration: defaults, then the TOML file, then the environment
    ///
    /// # Errors
    ///
    /// Returns error if an explicit config file cannot be loaded, or if a
    /// value is invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(path)?;
        let mut config = Self::from_file(fc);
        config.overlay_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply a parsed config file on top of defaults
    #[must_use]
    pub fn from_file(fc: NodeConfigFile) -> Self {
        let defaults = Self::default();
        let NodeConfigFile {
            node,
            registration,
            devices,
        } = fc;

        let settings = RegistrationSettings {
            api_version: registration
                .api_version
                .unwrap_or(defaults.registration.settings.api_version),
            heartbeat_interval: registration
                .heartbeat_secs
                .map_or(defaults.registration.settings.heartbeat_interval, Duration::from_secs),
            request_timeout: registration
                .request_timeout_secs
                .map_or(defaults.registration.settings.request_timeout, Duration::from_secs),
            selection_window: registration
                .selection_window_ms
                .map_or(defaults.registration.settings.selection_window, Duration::from_millis),
            retry_delay: registration
                .retry_delay_secs
                .map_or(defaults.registration.settings.retry_delay, Duration::from_secs),
        };

        let hostname = node.hostname.unwrap_or(defaults.node.hostname);

        Self {
            node: NodeConfig {
                label: node.label.unwrap_or_else(|| hostname.clone()),
                description: node.description,
                hostname,
                port: node.port.unwrap_or(defaults.node.port),
                api_versions: node.api_versions.unwrap_or(defaults.node.api_versions),
                protocol: defaults.node.protocol,
                href_host: node.href_host,
                advertise: node.advertise.unwrap_or(defaults.node.advertise),
                tags: node.tags,
                interfaces: node
                    .interfaces
                    .into_iter()
                    .map(|i| {
                        NetworkInterface {
                            name: i.name,
                            chassis_id: i.chassis_id,
                            port_id: i.port_id,
                        }
                        .normalized()
                    })
                    .collect(),
            },
            registration: RegistrationConfig {
                settings,
                service_type: registration
                    .service_type
                    .unwrap_or(defaults.registration.service_type),
                static_registries: registration.static_registries,
            },
            devices: devices.unwrap_or(defaults.devices),
        }
    }

    /// Overlay environment variables read through `var`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable holds an unparseable value
    pub fn overlay_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = var("NMOS_NODE_PORT") {
            self.node.port = port
                .parse()
                .map_err(|_| Error::Config(format!("NMOS_NODE_PORT is not a port: {port}")))?;
        }
        if let Some(label) = var("NMOS_NODE_LABEL") {
            self.node.label = label;
        }
        if let Some(version) = var("NMOS_REGISTRY_VERSION") {
            self.registration.settings.api_version = version;
        }
        if let Some(secs) = var("NMOS_HEARTBEAT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                Error::Config(format!("NMOS_HEARTBEAT_SECS is not a number: {secs}"))
            })?;
            self.registration.settings.heartbeat_interval = Duration::from_secs(secs);
        }
        Ok(())
    }

    /// Check values that would only fail later at runtime
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        let api_version = &self.registration.settings.api_version;
        if !is_api_version(api_version) {
            return Err(Error::Config(format!(
                "registration api_version must look like v1.3, got {api_version}"
            )));
        }
        if let Some(bad) = self.node.api_versions.iter().find(|v| !is_api_version(v)) {
            return Err(Error::Config(format!(
                "node api_versions must look like v1.3, got {bad}"
            )));
        }
        if self.node.api_versions.is_empty() {
            return Err(Error::Config("node api_versions is empty".to_string()));
        }
        if self.registration.settings.heartbeat_interval.is_zero() {
            return Err(Error::Config("heartbeat interval must be positive".to_string()));
        }
        Ok(())
    }

    /// Build the resource graph described by this configuration
    ///
    /// Interfaces and endpoints are detected from the host when not
    /// configured.
    #[must_use]
    pub fn build_graph(&self) -> ResourceGraph {
        let detected = detect_host_interfaces();
        self.build_graph_with(&detected)
    }

    /// Build the resource graph against an explicit interface list
    ///
    /// Detected interfaces without a hardware address are left out of the
    /// interface list; their addresses still become endpoints.
    #[must_use]
    pub fn build_graph_with(&self, detected: &[HostInterface]) -> ResourceGraph {
        let cfg = &self.node;
        let mut node = Node::new(cfg.hostname.clone(), cfg.label.clone());
        if let Some(description) = &cfg.description {
            node.description.clone_from(description);
        }
        node.tags = cfg.tags.clone();
        node.api.versions = cfg.api_versions.clone();

        if cfg.interfaces.is_empty() {
            for host in detected {
                match &host.mac {
                    Some(mac) => {
                        node.add_interface(NetworkInterface::new(&host.name, Some(mac.as_str())));
                    }
                    None => tracing::debug!(
                        interface = %host.name,
                        "skipping interface without a hardware address"
                    ),
                }
            }
        } else {
            for interface in &cfg.interfaces {
                node.add_interface(interface.clone().normalized());
            }
        }

        let mut hosts: Vec<IpAddr> = match cfg.href_host {
            Some(host) => vec![host],
            None => detected.iter().map(|host| host.address).collect(),
        };
        hosts.dedup();
        if hosts.is_empty() {
            tracing::warn!("no usable network interface found, advertising loopback");
            hosts.push(IpAddr::V4(Ipv4Addr::LOCALHOST));
        }
        for host in &hosts {
            node.add_endpoint(*host, cfg.port, cfg.protocol);
        }

        let manifest_host = format!("{}:{}", hosts[0], cfg.port);
        let connection_href = format!("{}x-nmos/connection/v1.1/", node.href);

        let mut graph = ResourceGraph::new(node);
        for device in &self.devices {
            graph.attach_device(build_device(device, &manifest_host, &connection_href));
        }
        graph
    }
}

fn build_device(cfg: &DeviceFileConfig, manifest_host: &str, connection_href: &str) -> Device {
    let device_type = cfg.device_type.as_deref().unwrap_or(DEVICE_TYPE_GENERIC);
    let mut device = Device::new(uuid::Uuid::nil(), cfg.label.clone(), device_type);
    if let Some(description) = &cfg.description {
        device.description.clone_from(description);
    }
    device.tags = cfg.tags.clone();

    device.controls = cfg
        .controls
        .iter()
        .map(|c| Control {
            href: if c.href.is_empty() && c.control_type == CONTROL_CONNECTION {
                connection_href.to_string()
            } else {
                c.href.clone()
            },
            control_type: c.control_type.clone(),
        })
        .collect();

    for s in &cfg.senders {
        let mut sender = Sender::new(
            s.label.clone(),
            s.transport.as_deref().unwrap_or(TRANSPORT_RTP_MCAST),
        );
        if let Some(description) = &s.description {
            sender.description.clone_from(description);
        }
        sender.tags = s.tags.clone();
        sender.flow_id = s.flow_id;
        sender.interface_bindings = s.interface_bindings.clone();
        sender.set_manifest_host(manifest_host);
        device.add_sender(sender);
    }

    for r in &cfg.receivers {
        let mut receiver = Receiver::new(
            r.label.clone(),
            r.format.as_deref().unwrap_or(FORMAT_VIDEO),
            r.transport.as_deref().unwrap_or(TRANSPORT_RTP_MCAST),
        );
        if let Some(description) = &r.description {
            receiver.description.clone_from(description);
        }
        receiver.tags = r.tags.clone();
        receiver.caps = r.caps.clone();
        receiver.interface_bindings = r.interface_bindings.clone();
        device.add_receiver(receiver);
    }

    device
}

/// A generic device with one test-card sender, used when no devices are
/// configured
#[must_use]
pub fn example_device() -> DeviceFileConfig {
    DeviceFileConfig {
        label: "Test".to_string(),
        description: Some("test".to_string()),
        device_type: Some(DEVICE_TYPE_GENERIC.to_string()),
        tags: Tags::new(),
        controls: vec![file::ControlFileConfig {
            control_type: CONTROL_CONNECTION.to_string(),
            href: String::new(),
        }],
        senders: vec![file::SenderFileConfig {
            label: "Test Card".to_string(),
            description: None,
            transport: Some(TRANSPORT_RTP_MCAST.to_string()),
            flow_id: Some(uuid::Uuid::new_v4()),
            tags: Tags::new(),
            interface_bindings: Vec::new(),
        }],
        receivers: Vec::new(),
    }
}

fn system_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "nmos-node".to_string())
}

/// `v<major>.<minor>`
fn is_api_version(version: &str) -> bool {
    version
        .strip_prefix('v')
        .and_then(|rest| rest.split_once('.'))
        .is_some_and(|(major, minor)| {
            !major.is_empty()
                && !minor.is_empty()
                && major.bytes().all(|b| b.is_ascii_digit())
                && minor.bytes().all(|b| b.is_ascii_digit())
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::resource::Envelope;

    fn eth0() -> Vec<HostInterface> {
        vec![HostInterface {
            name: "eth0".to_string(),
            address: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
            mac: Some("00:1B:44:11:3A:B7".to_string()),
        }]
    }

    #[test]
    fn defaults_publish_the_example_device() {
        let config = Config::default();
        assert_eq!(config.node.port, 8889);
        assert_eq!(config.registration.settings.api_version, "v1.3");
        assert_eq!(config.registration.service_type, "_nmos-register._tcp.local.");

        let graph = config.build_graph_with(&eth0());
        assert_eq!(graph.devices().len(), 1);
        assert_eq!(graph.senders().count(), 1);
        assert_eq!(graph.resource_count(), 3);
    }

    #[test]
    fn file_overlays_defaults() {
        let fc = file::parse_config(
            r#"
            [node]
            label = "studio-a"
            hostname = "studio-a.local"

            [registration]
            heartbeat_secs = 2
            selection_window_ms = 250

            [[devices]]
            label = "encoder"
            "#,
        )
        .unwrap();
        let config = Config::from_file(fc);

        assert_eq!(config.node.label, "studio-a");
        assert_eq!(config.node.hostname, "studio-a.local");
        assert_eq!(config.node.port, DEFAULT_PORT);
        assert_eq!(
            config.registration.settings.heartbeat_interval,
            Duration::from_secs(2)
        );
        assert_eq!(
            config.registration.settings.selection_window,
            Duration::from_millis(250)
        );
        assert_eq!(config.registration.settings.retry_delay, Duration::from_secs(5));
        assert_eq!(config.devices[0].label, "encoder");
    }

    #[test]
    fn empty_device_list_means_no_devices() {
        let fc = file::parse_config("devices = []").unwrap();
        assert!(Config::from_file(fc).devices.is_empty());
    }

    #[test]
    fn environment_overrides_file() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("NMOS_NODE_PORT", "9100"),
            ("NMOS_NODE_LABEL", "from-env"),
            ("NMOS_REGISTRY_VERSION", "v1.2"),
            ("NMOS_HEARTBEAT_SECS", "3"),
        ]);
        let mut config = Config::default();
        config
            .overlay_env(|k| vars.get(k).map(ToString::to_string))
            .unwrap();

        assert_eq!(config.node.port, 9100);
        assert_eq!(config.node.label, "from-env");
        assert_eq!(config.registration.settings.api_version, "v1.2");
        assert_eq!(
            config.registration.settings.heartbeat_interval,
            Duration::from_secs(3)
        );
    }

    #[test]
    fn bad_environment_value_is_rejected() {
        let mut config = Config::default();
        let err = config
            .overlay_env(|k| (k == "NMOS_NODE_PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn api_versions_are_validated() {
        let mut config = Config::default();
        config.validate().unwrap();

        config.registration.settings.api_version = "1.3".to_string();
        assert!(config.validate().is_err());

        config.registration.settings.api_version = "v1.3".to_string();
        config.node.api_versions = vec!["v1.x".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn graph_uses_detected_interfaces() {
        let graph = Config::default().build_graph_with(&eth0());
        let node = graph.node();

        assert_eq!(node.href, "http://192.168.1.20:8889/");
        assert_eq!(node.interfaces[0].name, "eth0");
        assert_eq!(node.api.endpoints[0].port, 8889);

        let sender = graph.senders().next().unwrap();
        assert_eq!(
            sender.manifest_href.as_deref(),
            Some(
                format!(
                    "http://192.168.1.20:8889/x-manufacturer/senders/{}/stream.sdp",
                    sender.id
                )
                .as_str()
            )
        );
        assert_eq!(
            graph.devices()[0].controls[0].href,
            "http://192.168.1.20:8889/x-nmos/connection/v1.1/"
        );
    }

    #[test]
    fn published_interfaces_carry_dash_form_macs() {
        let graph = Config::default().build_graph_with(&eth0());
        let envelope = serde_json::to_value(Envelope::from(graph.node().clone())).unwrap();

        let interfaces = envelope["data"]["interfaces"].as_array().unwrap();
        assert_eq!(interfaces.len(), 1);
        for interface in interfaces {
            let port_id = interface["port_id"].as_str().unwrap();
            assert_eq!(port_id, "00-1b-44-11-3a-b7");
            assert_eq!(interface["chassis_id"], port_id);
        }
    }

    #[test]
    fn interfaces_without_mac_are_not_declared() {
        let mut detected = eth0();
        detected.push(HostInterface {
            name: "tun0".to_string(),
            address: IpAddr::V4(Ipv4Addr::new(10, 8, 0, 2)),
            mac: None,
        });

        let graph = Config::default().build_graph_with(&detected);
        let node = graph.node();
        assert_eq!(node.interfaces.len(), 1);
        assert_eq!(node.interfaces[0].name, "eth0");
        assert_eq!(node.api.endpoints.len(), 2);
    }

    #[test]
    fn configured_macs_are_normalized() {
        let fc = file::parse_config(
            r#"
            [[node.interfaces]]
            name = "eth1"
            chassis_id = "AA:BB:CC:DD:EE:FF"
            port_id = "AA:BB:CC:DD:EE:01"
            "#,
        )
        .unwrap();
        let config = Config::from_file(fc);
        let graph = config.build_graph_with(&eth0());
        let interface = &graph.node().interfaces[0];

        assert_eq!(interface.name, "eth1");
        assert_eq!(interface.chassis_id.as_deref(), Some("aa-bb-cc-dd-ee-ff"));
        assert_eq!(interface.port_id.as_deref(), Some("aa-bb-cc-dd-ee-01"));
    }

    #[test]
    fn href_host_overrides_detection() {
        let mut config = Config::default();
        config.node.href_host = Some(IpAddr::V4(Ipv4Addr::new(10, 1, 1, 1)));

        let graph = config.build_graph_with(&eth0());
        assert_eq!(graph.node().href, "http://10.1.1.1:8889/");
        assert_eq!(graph.node().api.endpoints.len(), 1);
    }

    #[test]
    fn no_interfaces_falls_back_to_loopback() {
        let graph = Config::default().build_graph_with(&[]);
        assert_eq!(graph.node().href, "http://127.0.0.1:8889/");
        assert!(graph.node().interfaces.is_empty());
    }

    #[test]
    fn devices_are_parented_to_the_node() {
        let graph = Config::default().build_graph_with(&eth0());
        let node_id = graph.node().id;
        let device = &graph.devices()[0];

        assert_eq!(device.node_id, node_id);
        assert!(device.senders.iter().all(|s| s.device_id == device.id));
    }
}
