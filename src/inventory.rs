//! Network inventory.
//!
//! The allocator needs two facts about a network: its address space (the
//! parent ranges) and the prefixes of the subnets already carved out of it.
//! [`NetworkInventory`] is the seam through which a provider obtains them.
//! Cloud-backed implementations live outside this crate; [`StaticInventory`]
//! serves the same data from memory or a JSON file.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProviderError;
use crate::platform::VirtualNetworkId;

/// One page of subnet prefixes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetPage {
    /// Address prefixes of the subnets on this page.
    pub address_prefixes: Vec<String>,
    /// Token for the next page, `None` on the last page.
    pub next_page_token: Option<String>,
}

/// Source of address space and subnet data for a network.
#[async_trait]
pub trait NetworkInventory: Send + Sync + 'static {
    /// The network's CIDR blocks in declaration order.
    async fn address_space(&self, network_id: &str) -> Result<Vec<String>, ProviderError>;

    /// One page of the network's existing subnet prefixes.
    ///
    /// Pass `None` for the first page and the returned token for the rest.
    async fn list_subnets(
        &self,
        network_id: &str,
        page_token: Option<String>,
    ) -> Result<SubnetPage, ProviderError>;
}

/// Drain every page of [`NetworkInventory::list_subnets`].
///
/// # Errors
///
/// Propagates inventory errors, and fails with
/// [`ProviderError::Unavailable`] if the inventory hands out the same page
/// token twice.
pub async fn collect_subnet_prefixes<I>(
    inventory: &I,
    network_id: &str,
) -> Result<Vec<String>, ProviderError>
where
    I: NetworkInventory + ?Sized,
{
    let mut prefixes = Vec::new();
    let mut seen_tokens = HashSet::new();
    let mut page_token = None;

    loop {
        let page = inventory.list_subnets(network_id, page_token).await?;
        debug!(
            network_id,
            count = page.address_prefixes.len(),
            "Fetched subnet page"
        );
        prefixes.extend(page.address_prefixes);

        match page.next_page_token {
            Some(token) => {
                if !seen_tokens.insert(token.clone()) {
                    return Err(ProviderError::Unavailable(format!(
                        "subnet listing for '{}' repeated page token '{}'",
                        network_id, token
                    )));
                }
                page_token = Some(token);
            },
            None => return Ok(prefixes),
        }
    }
}

/// A network as stored in a [`StaticInventory`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticNetwork {
    /// The network's CIDR blocks.
    #[serde(default)]
    pub address_space: Vec<String>,
    /// Prefixes of existing subnets.
    #[serde(default)]
    pub subnets: Vec<String>,
}

fn default_page_size() -> usize {
    100
}

/// In-memory inventory keyed by network ID.
///
/// The JSON form is:
///
/// ```json
/// {
///   "page_size": 100,
///   "networks": {
///     "vpc-0a1b2c": { "address_space": ["10.0.0.0/16"], "subnets": ["10.0.0.0/24"] }
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticInventory {
    /// Number of subnets returned per page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Networks by ID.
    #[serde(default)]
    pub networks: BTreeMap<String, StaticNetwork>,
}

impl Default for StaticInventory {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            networks: BTreeMap::new(),
        }
    }
}

impl StaticInventory {
    /// Create an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a network.
    pub fn with_network(
        mut self,
        network_id: impl Into<String>,
        address_space: impl IntoIterator<Item = impl Into<String>>,
        subnets: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.networks.insert(
            network_id.into(),
            StaticNetwork {
                address_space: address_space.into_iter().map(Into::into).collect(),
                subnets: subnets.into_iter().map(Into::into).collect(),
            },
        );
        self
    }

    /// Set the page size used by [`NetworkInventory::list_subnets`].
    ///
    /// A page size of zero is treated as one.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Load an inventory from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Configuration`] if the file cannot be read
    /// and [`ProviderError::Serialization`] if it is not valid JSON.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ProviderError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::Configuration(format!(
                "cannot read network inventory '{}': {}",
                path.display(),
                e
            ))
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    // Azure resource IDs compare case-insensitively, VPC IDs exactly.
    fn network(&self, network_id: &str) -> Result<&StaticNetwork, ProviderError> {
        self.networks
            .get(network_id)
            .or_else(|| {
                let wanted = network_id.parse::<VirtualNetworkId>().ok()?;
                self.networks
                    .iter()
                    .find(|(id, _)| id.parse::<VirtualNetworkId>().ok().as_ref() == Some(&wanted))
                    .map(|(_, network)| network)
            })
            .ok_or_else(|| ProviderError::NotFound(format!("network '{}'", network_id)))
    }
}

#[async_trait]
impl NetworkInventory for StaticInventory {
    async fn address_space(&self, network_id: &str) -> Result<Vec<String>, ProviderError> {
        Ok(self.network(network_id)?.address_space.clone())
    }

    async fn list_subnets(
        &self,
        network_id: &str,
        page_token: Option<String>,
    ) -> Result<SubnetPage, ProviderError> {
        let network = self.network(network_id)?;
        let start = match page_token {
            Some(token) => token.parse::<usize>().map_err(|_| {
                ProviderError::InvalidRequest(format!("invalid page token '{}'", token))
            })?,
            None => 0,
        };

        let page_size = self.page_size.max(1);
        let end = start.saturating_add(page_size).min(network.subnets.len());
        let address_prefixes = network
            .subnets
            .get(start..end)
            .map(<[String]>::to_vec)
            .unwrap_or_default();
        let next_page_token = (end < network.subnets.len()).then(|| end.to_string());

        Ok(SubnetPage {
            address_prefixes,
            next_page_token,
        })
    }
}
