//! `dx-provider` binary.
//!
//! Environment:
//!
//! - `DX_PLATFORM`: `aws` (default) or `azure`
//! - `DX_NETWORK_INVENTORY`: path to a JSON network inventory; empty when unset
//! - `DX_LOG` / `RUST_LOG`: log filter

use dx_provider::{init_logging, serve, DxProvider, Platform, StaticInventory};
use tracing::info;

const PLATFORM_ENV: &str = "DX_PLATFORM";
const INVENTORY_ENV: &str = "DX_NETWORK_INVENTORY";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let platform = match std::env::var(PLATFORM_ENV) {
        Ok(value) => value.parse::<Platform>()?,
        Err(_) => Platform::default(),
    };

    let inventory = match std::env::var_os(INVENTORY_ENV) {
        Some(path) => {
            let inventory = StaticInventory::from_json_file(&path)?;
            info!(
                path = %path.to_string_lossy(),
                networks = inventory.networks.len(),
                "Loaded network inventory"
            );
            inventory
        },
        None => StaticInventory::new(),
    };

    info!(%platform, version = env!("CARGO_PKG_VERSION"), "Starting dx provider");
    serve(DxProvider::new(platform, inventory)).await
}
