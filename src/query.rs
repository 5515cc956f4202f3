//! IS-04 query API client
//!
//! Lists the nodes a registry knows about. Used by the `explore` command to
//! inspect what is registered on the network.

use std::time::Duration;

use reqwest::StatusCode;
use url::Url;

use crate::discovery::RegistryCandidate;
use crate::registration::client::rejection;
use crate::resource::Node;
use crate::Result;

/// Read-only client for a registry's query API
#[derive(Clone)]
pub struct QueryClient {
    client: reqwest::Client,
}

impl QueryClient {
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("nmos-node/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// `{proto}://{host}:{port}/x-nmos/query/{version}/nodes`
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid
    pub fn nodes_url(candidate: &RegistryCandidate, api_version: &str) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{}://{}/x-nmos/query/{api_version}/nodes",
            candidate.txt.api_proto,
            candidate.socket_addr()
        ))?)
    }

    /// Fetch every node registered with `candidate`
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Rejected`] on a non-200 answer, or a transport
    /// or decoding error
    pub async fn nodes(
        &self,
        candidate: &RegistryCandidate,
        api_version: &str,
    ) -> Result<Vec<Node>> {
        let url = Self::nodes_url(candidate, api_version)?;
        let response = self.client.get(url).send().await?;

        if response.status() != StatusCode::OK {
            return Err(rejection("node query".to_string(), response).await);
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}
