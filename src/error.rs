//! Error types for the NMOS node agent

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for node agent operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the node agent
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Service discovery could not be started
    #[error("discovery error: {0}")]
    Discovery(String),

    /// Registry refused a call
    #[error("registry rejected {operation} with {status}: {body}")]
    Rejected {
        /// Operation that was refused (e.g. "node registration")
        operation: String,
        /// HTTP status returned by the registry
        status: StatusCode,
        /// Decoded or raw response body
        body: RegistryErrorBody,
    },

    /// A resource was offered for publication before its parent
    #[error("{kind} {id} published before its parent {parent}")]
    OutOfOrder {
        /// Kind of the offending resource
        kind: &'static str,
        /// Offending resource id
        id: uuid::Uuid,
        /// Parent id that has not been accepted yet
        parent: uuid::Uuid,
    },

    /// Malformed version token
    #[error("invalid version token: {0}")]
    InvalidVersion(String),

    /// A network call exceeded its deadline
    #[error("timed out: {0}")]
    Timeout(String),

    /// The shared cancellation signal fired during an operation
    #[error("operation cancelled")]
    Cancelled,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL construction error
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Whether the registration state machine can recover from this error
    /// by going back to discovery
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Rejected { .. } | Self::Http(_) | Self::Timeout(_) | Self::OutOfOrder { .. }
        )
    }
}

/// Error body returned by NMOS APIs
///
/// Registries answer failed calls with `{"code": .., "error": .., "debug": ..}`.
/// Bodies that don't match the schema are kept verbatim in `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryErrorBody {
    pub code: u16,
    pub error: String,
    #[serde(default)]
    pub debug: Option<String>,
}

impl RegistryErrorBody {
    /// Decode a response body, falling back to the raw text
    #[must_use]
    pub fn decode(status: StatusCode, body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_else(|_| Self {
            code: status.as_u16(),
            error: body.trim().to_string(),
            debug: None,
        })
    }
}

impl std::fmt::Display for RegistryErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.error)?;
        if let Some(debug) = &self.debug {
            write!(f, " ({debug})")?;
        }
        Ok(())
    }
}
