//! Cloud platform variants.
//!
//! The AWS and Azure flavours of the provider share the allocator and differ
//! only in how the parent network is identified, how long a prefix the cloud
//! accepts, and how the resource ID is derived.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ProviderError;

/// Errors produced when parsing a network ID.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkIdError {
    /// Not of the form `vpc-<alphanumerics>`.
    #[error("invalid VPC ID '{0}': expected 'vpc-' followed by letters and digits")]
    Vpc(String),

    /// Not a virtual network resource ID.
    #[error(
        "invalid virtual network ID '{0}': expected '/subscriptions/{{subscriptionId}}/resourceGroups/{{resourceGroupName}}/providers/Microsoft.Network/virtualNetworks/{{vnetName}}'"
    )]
    VirtualNetwork(String),
}

/// A parsed Azure virtual network resource ID.
///
/// Azure resource IDs are case-insensitive; components are stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirtualNetworkId {
    /// Subscription the network belongs to.
    pub subscription_id: String,
    /// Resource group holding the network.
    pub resource_group_name: String,
    /// Network name.
    pub name: String,
}

impl FromStr for VirtualNetworkId {
    type Err = NetworkIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_lowercase();
        let parts = lowered.split('/').collect::<Vec<_>>();

        match parts.as_slice() {
            ["", "subscriptions", subscription, "resourcegroups", group, "providers", "microsoft.network", "virtualnetworks", name]
                if !subscription.is_empty() && !group.is_empty() && !name.is_empty() =>
            {
                Ok(Self {
                    subscription_id: (*subscription).to_string(),
                    resource_group_name: (*group).to_string(),
                    name: (*name).to_string(),
                })
            },
            _ => Err(NetworkIdError::VirtualNetwork(s.to_string())),
        }
    }
}

/// Check that `id` is an AWS VPC ID.
pub fn parse_vpc_id(id: &str) -> Result<&str, NetworkIdError> {
    match id.strip_prefix("vpc-") {
        Some(rest) if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric()) => {
            Ok(id)
        },
        _ => Err(NetworkIdError::Vpc(id.to_string())),
    }
}

/// The cloud a provider instance allocates for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Subnets inside an AWS VPC.
    #[default]
    Aws,
    /// Subnets inside an Azure virtual network.
    Azure,
}

impl Platform {
    /// Name of the attribute holding the parent network ID.
    pub fn network_attribute(&self) -> &'static str {
        match self {
            Self::Aws => "vpc_id",
            Self::Azure => "virtual_network_id",
        }
    }

    /// Longest subnet prefix the cloud accepts.
    pub fn max_prefix_length(&self) -> u8 {
        match self {
            Self::Aws => 28,
            Self::Azure => 29,
        }
    }

    /// Name of the provider configuration attribute for the location.
    pub fn location_attribute(&self) -> &'static str {
        match self {
            Self::Aws => "region",
            Self::Azure => "location",
        }
    }

    /// Description of the network attribute, for schemas.
    pub fn network_description(&self) -> &'static str {
        match self {
            Self::Aws => "The ID of the VPC to allocate the subnet CIDR from.",
            Self::Azure => "The resource ID of the virtual network to allocate the subnet CIDR from.",
        }
    }

    /// Validate a configured prefix length and narrow it to `u8`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Validation`] outside `1..=max_prefix_length()`.
    pub fn check_prefix_length(&self, prefix_length: i64) -> Result<u8, ProviderError> {
        let max = self.max_prefix_length();
        u8::try_from(prefix_length)
            .ok()
            .filter(|len| (1..=max).contains(len))
            .ok_or_else(|| {
                ProviderError::Validation(format!(
                    "prefix_length must be between 1 and {}, got {}",
                    max, prefix_length
                ))
            })
    }

    /// Validate a network ID for this platform.
    pub fn validate_network_id(&self, network_id: &str) -> Result<(), NetworkIdError> {
        match self {
            Self::Aws => parse_vpc_id(network_id).map(|_| ()),
            Self::Azure => network_id.parse::<VirtualNetworkId>().map(|_| ()),
        }
    }

    /// The ID recorded for an allocated subnet CIDR.
    pub fn resource_id(
        &self,
        network_id: &str,
        prefix_length: u8,
        cidr_block: &str,
    ) -> String {
        match self {
            Self::Aws => format!("{}/{}", network_id, prefix_length),
            Self::Azure => format!(
                "{}_{}_{}",
                network_id.replace('/', "_"),
                prefix_length,
                cidr_block.replace('/', "_")
            ),
        }
    }
}

impl FromStr for Platform {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" => Ok(Self::Aws),
            "azure" => Ok(Self::Azure),
            other => Err(ProviderError::Configuration(format!(
                "unknown platform '{}', expected 'aws' or 'azure'",
                other
            ))),
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Aws => write!(f, "aws"),
            Self::Azure => write!(f, "azure"),
        }
    }
}
