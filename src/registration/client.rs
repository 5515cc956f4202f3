//! HTTP client for the IS-04 registration API

use std::net::SocketAddr;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{CONNECTION, HeaderValue};
use url::Url;
use uuid::Uuid;

use crate::discovery::RegistryCandidate;
use crate::error::RegistryErrorBody;
use crate::resource::{Envelope, ResourceKind};
use crate::{Error, Result};

/// Base URL of one registry's registration API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEndpoint {
    address: SocketAddr,
    base: Url,
}

impl RegistryEndpoint {
    /// `{proto}://{host}:{port}/x-nmos/registration/{version}/`
    ///
    /// # Errors
    ///
    /// Returns error if the resulting URL is invalid (e.g. a malformed
    /// version string)
    pub fn new(candidate: &RegistryCandidate, api_version: &str) -> Result<Self> {
        let address = candidate.socket_addr();
        let base = Url::parse(&format!(
            "{}://{address}/x-nmos/registration/{api_version}/",
            candidate.txt.api_proto
        ))?;
        Ok(Self { address, base })
    }

    #[must_use]
    pub const fn address(&self) -> SocketAddr {
        self.address
    }

    #[must_use]
    pub const fn base(&self) -> &Url {
        &self.base
    }

    /// `POST` target for resource registration
    ///
    /// # Errors
    ///
    /// Returns error if the URL cannot be joined
    pub fn resource_url(&self) -> Result<Url> {
        Ok(self.base.join("resource")?)
    }

    /// `POST` target for node heartbeats
    ///
    /// # Errors
    ///
    /// Returns error if the URL cannot be joined
    pub fn health_url(&self, node_id: Uuid) -> Result<Url> {
        Ok(self.base.join(&format!("health/nodes/{node_id}"))?)
    }

    /// `DELETE` target for a registered resource
    ///
    /// # Errors
    ///
    /// Returns error if the URL cannot be joined
    pub fn resource_item_url(&self, kind: ResourceKind, id: Uuid) -> Result<Url> {
        Ok(self
            .base
            .join(&format!("resource/{}/{id}", kind.collection()))?)
    }
}

impl std::fmt::Display for RegistryEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.base.fmt(f)
    }
}

/// Registration API client
///
/// Every call is bounded by the client-wide request timeout.
#[derive(Clone)]
pub struct RegistryClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl RegistryClient {
    /// Create a client whose requests time out after `timeout`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("nmos-node/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, timeout })
    }

    /// Register one resource
    ///
    /// `201 Created` is the normal answer; `200 OK` means the registry
    /// already held the resource and updated it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Rejected`] on any other status, or a transport error
    pub async fn register(
        &self,
        endpoint: &RegistryEndpoint,
        envelope: &Envelope,
    ) -> Result<StatusCode> {
        let url = endpoint.resource_url()?;
        let response = self
            .client
            .post(url)
            .json(envelope)
            .send()
            .await
            .map_err(|e| self.transport_error(e, "resource registration"))?;

        let status = response.status();
        if status == StatusCode::CREATED || status == StatusCode::OK {
            return Ok(status);
        }

        Err(rejection(
            format!("{} registration", envelope.kind()),
            response,
        )
        .await)
    }

    /// Assert node liveness
    ///
    /// The connection is closed after the call so sustained heartbeating
    /// doesn't accumulate idle sockets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Rejected`] on any status but `200 OK`, or a transport
    /// error
    pub async fn heartbeat(&self, endpoint: &RegistryEndpoint, node_id: Uuid) -> Result<()> {
        let url = endpoint.health_url(node_id)?;
        let response = self
            .client
            .post(url)
            .header(CONNECTION, HeaderValue::from_static("close"))
            .send()
            .await
            .map_err(|e| self.transport_error(e, "heartbeat"))?;

        if response.status() == StatusCode::OK {
            return Ok(());
        }

        Err(rejection("heartbeat".to_string(), response).await)
    }

    /// Remove a registered resource
    ///
    /// # Errors
    ///
    /// Returns [`Error::Rejected`] on any status but `204 No Content`, or a
    /// transport error
    pub async fn delete(
        &self,
        endpoint: &RegistryEndpoint,
        kind: ResourceKind,
        id: Uuid,
    ) -> Result<()> {
        let url = endpoint.resource_item_url(kind, id)?;
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(|e| self.transport_error(e, "deregistration"))?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(());
        }

        Err(rejection(format!("{kind} deletion"), response).await)
    }

    fn transport_error(&self, e: reqwest::Error, operation: &str) -> Error {
        if e.is_timeout() {
            Error::Timeout(format!("{operation} after {:?}", self.timeout))
        } else {
            Error::Http(e)
        }
    }
}

/// Turn a non-success response into [`Error::Rejected`], decoding the body
pub(crate) async fn rejection(operation: String, response: reqwest::Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Error::Rejected {
        operation,
        status,
        body: RegistryErrorBody::decode(status, &body),
    }
}
