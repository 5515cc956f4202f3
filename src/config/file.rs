//! TOML configuration file loading
//!
//! Supports `~/.config/nmos-node/config.toml` as a persistent config source.
//! Every field is optional; the file is a partial overlay on top of defaults.

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use uuid::Uuid;

use crate::resource::Tags;
use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct NodeConfigFile {
    /// Node identity and API surface
    #[serde(default)]
    pub node: NodeFileConfig,

    /// Registry discovery and registration
    #[serde(default)]
    pub registration: RegistrationFileConfig,

    /// Devices published under the node; an absent list means the example
    /// device, an empty one means none
    pub devices: Option<Vec<DeviceFileConfig>>,
}

/// `[node]` section
#[derive(Debug, Default, Deserialize)]
pub struct NodeFileConfig {
    pub label: Option<String>,
    pub description: Option<String>,

    /// Overrides the system hostname
    pub hostname: Option<String>,

    /// Node API port
    pub port: Option<u16>,

    /// Node API versions served and advertised
    pub api_versions: Option<Vec<String>>,

    /// Host used in `href` and sender manifests instead of the first detected
    /// interface address
    pub href_host: Option<IpAddr>,

    /// Skip the `_nmos-node._tcp` advertisement
    pub advertise: Option<bool>,

    #[serde(default)]
    pub tags: Tags,

    /// Network interfaces; detected when empty
    #[serde(default)]
    pub interfaces: Vec<InterfaceFileConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InterfaceFileConfig {
    pub name: String,
    pub chassis_id: Option<String>,
    pub port_id: Option<String>,
}

/// `[registration]` section
#[derive(Debug, Default, Deserialize)]
pub struct RegistrationFileConfig {
    /// Registration API version (e.g. "v1.3")
    pub api_version: Option<String>,

    /// DNS-SD service type to browse
    pub service_type: Option<String>,

    pub heartbeat_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub selection_window_ms: Option<u64>,
    pub retry_delay_secs: Option<u64>,

    /// Registries to use instead of mDNS discovery
    #[serde(default)]
    pub static_registries: Vec<SocketAddr>,
}

/// `[[devices]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceFileConfig {
    pub label: String,
    pub description: Option<String>,

    /// Device type URN
    #[serde(rename = "type")]
    pub device_type: Option<String>,

    #[serde(default)]
    pub tags: Tags,

    #[serde(default)]
    pub controls: Vec<ControlFileConfig>,

    #[serde(default)]
    pub senders: Vec<SenderFileConfig>,

    #[serde(default)]
    pub receivers: Vec<ReceiverFileConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlFileConfig {
    #[serde(rename = "type")]
    pub control_type: String,

    #[serde(default)]
    pub href: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SenderFileConfig {
    pub label: String,
    pub description: Option<String>,

    /// Transport URN
    pub transport: Option<String>,

    pub flow_id: Option<Uuid>,

    #[serde(default)]
    pub tags: Tags,

    #[serde(default)]
    pub interface_bindings: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReceiverFileConfig {
    pub label: String,
    pub description: Option<String>,

    /// Format URN
    pub format: Option<String>,

    /// Transport URN
    pub transport: Option<String>,

    #[serde(default)]
    pub tags: Tags,

    #[serde(default)]
    pub caps: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub interface_bindings: Vec<String>,
}

/// Load the TOML config file
///
/// An explicit path must exist and parse. The standard path is optional: a
/// missing file yields defaults, and an unreadable one is logged and ignored.
///
/// # Errors
///
/// Returns error if an explicitly requested file cannot be read or parsed
pub fn load_config_file(explicit: Option<&Path>) -> Result<NodeConfigFile> {
    if let Some(path) = explicit {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = parse_config(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");
        return Ok(config);
    }

    let Some(path) = config_file_path() else {
        return Ok(NodeConfigFile::default());
    };

    if !path.exists() {
        return Ok(NodeConfigFile::default());
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match parse_config(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                Ok(config)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                Ok(NodeConfigFile::default())
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            Ok(NodeConfigFile::default())
        }
    }
}

/// Parse config file contents
///
/// # Errors
///
/// Returns [`Error::Toml`] on malformed input
pub fn parse_config(content: &str) -> Result<NodeConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Return the config file path: `~/.config/nmos-node/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("nmos-node").join("config.toml"))
}
