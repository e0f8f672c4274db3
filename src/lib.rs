//! DX Provider
//!
//! An infrastructure provider that finds free subnet CIDR blocks inside an
//! AWS VPC or an Azure virtual network. It exposes one resource and one data
//! source, both named `dx_available_subnet_cidr`, over a gRPC plugin protocol.
//!
//! # Overview
//!
//! - **Allocator** ([`allocator`]): given parent ranges, a prefix length and
//!   the ranges already in use, returns the lowest-addressed free block
//! - **Address ranges** ([`cidr`]): IPv4 and IPv6 CIDR values
//! - **Network inventory** ([`inventory`]): where parent and used ranges come from
//! - **Platforms** ([`platform`]): AWS and Azure ID formats and limits
//! - **Provider** ([`provider`]): the resource and data source
//! - **Server** ([`server`]): the gRPC service and handshake
//!
//! # Allocating without the server
//!
//! ```
//! use dx_provider::find_available_block;
//!
//! let block = find_available_block(
//!     &["10.0.0.0/16"],
//!     24,
//!     &["10.0.0.0/24", "10.0.1.0/24"],
//! ).unwrap();
//! assert_eq!(block.to_string(), "10.0.2.0/24");
//! ```
//!
//! # Running the provider
//!
//! ```ignore
//! use dx_provider::{init_logging, serve, DxProvider, Platform, StaticInventory};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!     let inventory = StaticInventory::from_json_file("networks.json")?;
//!     serve(DxProvider::new(Platform::Aws, inventory)).await
//! }
//! ```
//!
//! # Handshake Protocol
//!
//! On startup [`serve`] prints one line to stdout:
//!
//! ```text
//! DX_PROVIDER|1|127.0.0.1:50051
//! ```
//!
//! Format: `DX_PROVIDER|<protocol_version>|<address>`. The engine spawns the
//! provider as a subprocess, reads this line and connects over gRPC.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod allocator;
pub mod cidr;
pub mod config;
pub mod error;
pub mod inventory;
pub mod logging;
pub mod platform;
pub mod provider;
pub mod schema;
pub mod server;
pub mod testing;
pub mod types;
pub mod validation;

#[allow(missing_docs)]
#[allow(clippy::all)]
pub mod generated;

pub use allocator::{allocate, find_available_block, AllocationError, AllocationRequest};
pub use cidr::AddressRange;
pub use config::ProviderConfig;
pub use error::ProviderError;
pub use inventory::{NetworkInventory, StaticInventory};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use platform::Platform;
pub use provider::DxProvider;
pub use schema::ProviderSchema;
pub use server::{
    handshake_line, serve, serve_on, serve_on_with_options, serve_with_options, ProviderService,
    ServeOptions,
};
pub use types::{
    AttributeChange, PlanResult, ProviderMetadata, ServerCapabilities, HANDSHAKE_PREFIX,
    PROTOCOL_VERSION,
};
pub use validation::{is_valid, validate, validate_result};

pub use async_trait::async_trait;

pub use serde_json;
pub use tonic;
pub use tracing;
