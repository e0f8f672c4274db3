//! The `dx_available_subnet_cidr` resource and data source.
//!
//! Both ask the network inventory for the parent network's address space and
//! existing subnets, then hand them to the allocator. The resource records
//! the result once and never recomputes it: later plans with unchanged
//! inputs keep the prior `cidr_block`, and any change to the network or the
//! prefix length replaces the resource. Reads return stored state as-is,
//! and deletes have nothing to release. The data source allocates afresh on
//! every read and stores nothing.
//!
//! # Example
//!
//! ```
//! use dx_provider::{DxProvider, Platform, StaticInventory};
//! use dx_provider::provider::AVAILABLE_SUBNET_CIDR;
//! use dx_provider::testing::ProviderTester;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let inventory = StaticInventory::new()
//!     .with_network("vpc-0a1b2c", ["10.0.0.0/16"], ["10.0.0.0/24"]);
//! let tester = ProviderTester::new(DxProvider::new(Platform::Aws, inventory));
//!
//! let state = tester
//!     .lifecycle_create(AVAILABLE_SUBNET_CIDR, json!({"vpc_id": "vpc-0a1b2c", "prefix_length": 24}))
//!     .await
//!     .unwrap();
//! assert_eq!(state["cidr_block"], "10.0.1.0/24");
//! assert_eq!(state["id"], "vpc-0a1b2c/24");
//! # });
//! ```

use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::allocator::{find_available_block, AllocationError};
use crate::cidr::AddressRange;
use crate::config::{provider_schema, ProviderConfig};
use crate::error::ProviderError;
use crate::inventory::{collect_subnet_prefixes, NetworkInventory};
use crate::platform::Platform;
use crate::schema::{has_errors, Attribute, Diagnostic, ProviderSchema, Schema};
use crate::server::ProviderService;
use crate::types::{AttributeChange, PlanResult, ProviderMetadata, ServerCapabilities};
use crate::validation::validate;

/// Type name of the resource and of the data source.
pub const AVAILABLE_SUBNET_CIDR: &str = "dx_available_subnet_cidr";

const PREFIX_LENGTH: &str = "prefix_length";
const CIDR_BLOCK: &str = "cidr_block";
const ID: &str = "id";

/// Validated inputs of a subnet CIDR request.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SubnetRequest {
    network_id: String,
    prefix_length: u8,
}

/// The DX provider for one cloud platform.
pub struct DxProvider<I: NetworkInventory> {
    platform: Platform,
    inventory: I,
    config: RwLock<Option<ProviderConfig>>,
}

impl<I: NetworkInventory> DxProvider<I> {
    /// Create a provider for `platform` backed by `inventory`.
    pub fn new(platform: Platform, inventory: I) -> Self {
        Self {
            platform,
            inventory,
            config: RwLock::new(None),
        }
    }

    /// The platform this provider allocates for.
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// The network inventory.
    pub fn inventory(&self) -> &I {
        &self.inventory
    }

    /// The configuration stored by the last successful Configure call.
    pub async fn config(&self) -> Option<ProviderConfig> {
        self.config.read().await.clone()
    }

    fn resource_schema(&self) -> Schema {
        let network = self.platform.network_attribute();
        Schema::v0()
            .with_description(format!(
                "Finds an available CIDR block for a new subnet in the network given by `{}`. \
                 The block is allocated once and kept until the resource is replaced.",
                network
            ))
            .with_attribute(
                ID,
                Attribute::computed_string().with_description("Identifier of the allocation"),
            )
            .with_attribute(
                network,
                Attribute::required_string()
                    .with_description(self.platform.network_description())
                    .with_force_new(),
            )
            .with_attribute(
                PREFIX_LENGTH,
                Attribute::required_int64()
                    .with_description(format!(
                        "The desired prefix length of the subnet CIDR (between 1 and {}).",
                        self.platform.max_prefix_length()
                    ))
                    .with_force_new(),
            )
            .with_attribute(
                CIDR_BLOCK,
                Attribute::computed_string().with_description("The allocated subnet CIDR block"),
            )
    }

    fn data_source_schema(&self) -> Schema {
        let network = self.platform.network_attribute();
        Schema::v0()
            .with_description(format!(
                "Finds an available CIDR block for a new subnet in the network given by `{}`. \
                 The block is computed on every read.",
                network
            ))
            .with_attribute(
                ID,
                Attribute::computed_string().with_description("Identifier of the lookup"),
            )
            .with_attribute(
                network,
                Attribute::required_string().with_description(self.platform.network_description()),
            )
            .with_attribute(
                PREFIX_LENGTH,
                Attribute::required_int64().with_description(format!(
                    "The desired prefix length of the subnet CIDR (between 1 and {}).",
                    self.platform.max_prefix_length()
                )),
            )
            .with_attribute(
                CIDR_BLOCK,
                Attribute::computed_string().with_description("An available subnet CIDR block"),
            )
    }

    /// Schema, network ID and prefix length checks, as diagnostics.
    ///
    /// Null values are left alone: they are either reported as missing by
    /// the schema check or not yet known.
    fn validate_request(&self, schema: &Schema, config: &Value) -> Vec<Diagnostic> {
        let mut diagnostics = validate(schema, config);
        let network = self.platform.network_attribute();

        if let Some(id) = config.get(network).and_then(Value::as_str) {
            if let Err(e) = self.platform.validate_network_id(id) {
                diagnostics.push(
                    Diagnostic::error(format!("Invalid {}", network))
                        .with_detail(e.to_string())
                        .with_attribute(network),
                );
            }
        }

        if let Some(len) = config.get(PREFIX_LENGTH).and_then(integer) {
            if let Err(e) = self.platform.check_prefix_length(len) {
                diagnostics.push(
                    Diagnostic::error("Invalid prefix_length")
                        .with_detail(e.message().to_string())
                        .with_attribute(PREFIX_LENGTH),
                );
            }
        }

        diagnostics
    }

    fn parse_request(&self, value: &Value) -> Result<SubnetRequest, ProviderError> {
        let network = self.platform.network_attribute();
        let network_id = value
            .get(network)
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::Validation(format!("'{}' must be a string", network)))?;
        self.platform
            .validate_network_id(network_id)
            .map_err(|e| ProviderError::Validation(e.to_string()))?;

        let prefix_length = value
            .get(PREFIX_LENGTH)
            .and_then(integer)
            .ok_or_else(|| {
                ProviderError::Validation(format!("'{}' must be an integer", PREFIX_LENGTH))
            })?;
        let prefix_length = self.platform.check_prefix_length(prefix_length)?;

        Ok(SubnetRequest {
            network_id: network_id.to_string(),
            prefix_length,
        })
    }

    async fn allocate(&self, request: &SubnetRequest) -> Result<AddressRange, ProviderError> {
        let network_id = request.network_id.as_str();
        let parents = self.inventory.address_space(network_id).await?;
        if parents.is_empty() {
            return Err(ProviderError::FailedPrecondition(format!(
                "network '{}' has no address space",
                network_id
            )));
        }
        let used = collect_subnet_prefixes(&self.inventory, network_id).await?;

        debug!(
            network_id,
            prefix_length = request.prefix_length,
            parents = parents.len(),
            used = used.len(),
            "Allocating subnet CIDR"
        );

        match find_available_block(&parents, request.prefix_length, &used) {
            Ok(block) => {
                info!(
                    network_id,
                    prefix_length = request.prefix_length,
                    cidr_block = %block,
                    "Allocated subnet CIDR"
                );
                Ok(block)
            },
            Err(AllocationError::NotFound(exhausted)) => {
                warn!(network_id, prefix_length = request.prefix_length, "No subnet CIDR available");
                Err(ProviderError::ResourceExhausted(format!(
                    "{} of network '{}'; request a smaller subnet (a longer prefix_length) or use a different network",
                    exhausted, network_id
                )))
            },
            Err(e) => Err(e.into()),
        }
    }

    fn state(&self, request: &SubnetRequest, cidr_block: Option<&AddressRange>) -> Value {
        let (id, cidr) = match cidr_block {
            Some(block) => {
                let cidr = block.to_string();
                let id = self
                    .platform
                    .resource_id(&request.network_id, request.prefix_length, &cidr);
                (Value::String(id), Value::String(cidr))
            },
            None => (Value::Null, Value::Null),
        };

        json!({
            ID: id,
            self.platform.network_attribute(): request.network_id,
            PREFIX_LENGTH: request.prefix_length,
            CIDR_BLOCK: cidr,
        })
    }

    /// Replacement-forcing attributes whose value differs between two states.
    fn replaced_attributes(&self, prior: &Value, proposed: &Value) -> Vec<AttributeChange> {
        let schema = self.resource_schema();
        schema
            .force_new_attributes()
            .filter_map(|name| {
                let before = prior.get(name).cloned().unwrap_or(Value::Null);
                let after = proposed.get(name).cloned().unwrap_or(Value::Null);
                (!same_value(&before, &after))
                    .then(|| AttributeChange::modified(name, before, after))
            })
            .collect()
    }

    fn check_resource(&self, resource_type: &str) -> Result<(), ProviderError> {
        if resource_type == AVAILABLE_SUBNET_CIDR {
            Ok(())
        } else {
            Err(ProviderError::UnknownResource(resource_type.to_string()))
        }
    }

    fn check_data_source(&self, data_source_type: &str) -> Result<(), ProviderError> {
        if data_source_type == AVAILABLE_SUBNET_CIDR {
            Ok(())
        } else {
            Err(ProviderError::UnknownResource(format!(
                "Unknown data source type: {}",
                data_source_type
            )))
        }
    }
}

/// Read an integer, accepting whole floats.
fn integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
            .map(|f| f as i64)
    })
}

/// Equality that treats `24` and `24.0` as the same value.
fn same_value(a: &Value, b: &Value) -> bool {
    match (integer(a), integer(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

#[async_trait::async_trait]
impl<I: NetworkInventory> ProviderService for DxProvider<I> {
    fn schema(&self) -> ProviderSchema {
        ProviderSchema::new()
            .with_provider_config(provider_schema(self.platform))
            .with_resource(AVAILABLE_SUBNET_CIDR, self.resource_schema())
            .with_data_source(AVAILABLE_SUBNET_CIDR, self.data_source_schema())
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            resources: vec![AVAILABLE_SUBNET_CIDR.to_string()],
            data_sources: vec![AVAILABLE_SUBNET_CIDR.to_string()],
            capabilities: ServerCapabilities { plan_destroy: true },
        }
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let mut diagnostics = validate(&provider_schema(self.platform), &config);
        if has_errors(&diagnostics) {
            return Ok(diagnostics);
        }
        diagnostics.extend(ProviderConfig::from_value(config)?.check_values(self.platform));
        Ok(diagnostics)
    }

    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let mut diagnostics = validate(&provider_schema(self.platform), &config);
        if has_errors(&diagnostics) {
            return Ok(diagnostics);
        }

        let config = ProviderConfig::from_value(config)?;
        diagnostics.extend(config.validate(self.platform));
        if has_errors(&diagnostics) {
            warn!(platform = %self.platform, "Provider configuration rejected");
            return Ok(diagnostics);
        }

        info!(
            platform = %self.platform,
            environment = config.environment.as_deref().unwrap_or_default(),
            "Provider configured"
        );
        *self.config.write().await = Some(config);
        Ok(diagnostics)
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        self.check_resource(resource_type)?;
        Ok(self.validate_request(&self.resource_schema(), &config))
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.check_resource(resource_type)?;

        if proposed_state.is_null() {
            debug!("Planning destroy");
            return Ok(PlanResult::destroy());
        }

        let request = self.parse_request(&proposed_state)?;
        let planned = self.state(&request, None);

        match prior_state {
            None => {
                let network = self.platform.network_attribute();
                let changes = vec![
                    AttributeChange::added(network, planned[network].clone()),
                    AttributeChange::added(PREFIX_LENGTH, planned[PREFIX_LENGTH].clone()),
                    AttributeChange::new(CIDR_BLOCK, None, None),
                ];
                Ok(PlanResult::with_changes(planned, changes, false))
            },
            Some(prior) => {
                let changes = self.replaced_attributes(&prior, &proposed_state);
                if changes.is_empty() {
                    Ok(PlanResult::no_change(prior))
                } else {
                    debug!(
                        network_id = %request.network_id,
                        prefix_length = request.prefix_length,
                        "Inputs changed, planning replacement"
                    );
                    Ok(PlanResult::with_changes(planned, changes, true))
                }
            },
        }
    }

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        self.check_resource(resource_type)?;
        let request = self.parse_request(&planned_state)?;
        let block = self.allocate(&request).await?;
        Ok(self.state(&request, Some(&block)))
    }

    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        self.check_resource(resource_type)?;
        Ok(current_state)
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.check_resource(resource_type)?;
        let changes = self.replaced_attributes(&prior_state, &planned_state);
        if !changes.is_empty() {
            let names = changes.iter().map(|c| c.path.as_str()).collect::<Vec<_>>();
            return Err(ProviderError::FailedPrecondition(format!(
                "changing {} requires replacing the resource",
                names.join(", ")
            )));
        }
        Ok(prior_state)
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.check_resource(resource_type)?;
        info!(
            id = current_state.get(ID).and_then(serde_json::Value::as_str).unwrap_or_default(),
            "Releasing subnet CIDR allocation"
        );
        Ok(())
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        self.check_data_source(data_source_type)?;
        Ok(self.validate_request(&self.data_source_schema(), &config))
    }

    async fn read_data_source(&self, data_source_type: &str, config: Value) -> Result<Value, ProviderError> {
        self.check_data_source(data_source_type)?;
        let request = self.parse_request(&config)?;
        let block = self.allocate(&request).await?;
        Ok(self.state(&request, Some(&block)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::StaticInventory;
    use crate::testing::{
        assert_error_contains, assert_no_errors, assert_plan_changes_attribute,
        assert_plan_creates, assert_plan_no_changes, assert_plan_replaces, ProviderTester,
        TestError,
    };
    use tokio_test::{assert_err, assert_ok};

    const VNET: &str = "/subscriptions/0000/resourceGroups/rg-net/providers/Microsoft.Network/virtualNetworks/vnet-hub";

    fn aws() -> ProviderTester<DxProvider<StaticInventory>> {
        let inventory = StaticInventory::new()
            .with_network("vpc-main", ["10.0.0.0/16"], ["10.0.0.0/24"])
            .with_network("vpc-small", ["192.168.0.0/30"], ["192.168.0.0/31", "192.168.0.2/31"])
            .with_network("vpc-pair", ["10.0.0.0/24", "10.1.0.0/24"], ["10.0.0.0/25"])
            .with_network("vpc-empty", Vec::<String>::new(), Vec::<String>::new())
            .with_network("vpc-corrupt", ["10.0.0.0/16"], ["10.0.0.0/24", "garbage"])
            .with_network("vpc-bad", ["10.0.0/16", "nope"], Vec::<String>::new())
            .with_page_size(1);
        ProviderTester::new(DxProvider::new(Platform::Aws, inventory))
    }

    fn azure() -> ProviderTester<DxProvider<StaticInventory>> {
        let inventory = StaticInventory::new().with_network(
            VNET,
            ["10.10.0.0/24"],
            ["10.10.0.0/26", "10.10.0.64/27"],
        );
        ProviderTester::new(DxProvider::new(Platform::Azure, inventory))
    }

    fn request(vpc_id: &str, prefix_length: i64) -> Value {
        json!({"vpc_id": vpc_id, "prefix_length": prefix_length})
    }

    #[tokio::test]
    async fn test_schema_per_platform() {
        let schema = aws().schema();
        let resource = &schema.resources[AVAILABLE_SUBNET_CIDR];
        assert!(resource.block.attributes["vpc_id"].force_new);
        assert!(resource.block.attributes[CIDR_BLOCK].flags.computed);
        assert!(schema.data_sources.contains_key(AVAILABLE_SUBNET_CIDR));

        let schema = azure().schema();
        let resource = &schema.resources[AVAILABLE_SUBNET_CIDR];
        assert!(resource.block.attributes.contains_key("virtual_network_id"));
        assert!(!resource.block.attributes.contains_key("vpc_id"));
    }

    #[tokio::test]
    async fn test_metadata_supports_plan_destroy() {
        let tester = aws();
        assert_eq!(tester.resource_types(), vec![AVAILABLE_SUBNET_CIDR]);
        assert!(tester.provider().metadata().capabilities.plan_destroy);
    }

    #[tokio::test]
    async fn test_create_allocates_first_free_block() {
        let state = assert_ok!(aws().lifecycle_create(AVAILABLE_SUBNET_CIDR, request("vpc-main", 24)).await);
        assert_eq!(state[CIDR_BLOCK], "10.0.1.0/24");
        assert_eq!(state[ID], "vpc-main/24");
        assert_eq!(state["vpc_id"], "vpc-main");
        assert_eq!(state[PREFIX_LENGTH], 24);
    }

    #[tokio::test]
    async fn test_create_searches_parents_in_order() {
        let tester = aws();
        let state = assert_ok!(tester.create(AVAILABLE_SUBNET_CIDR, request("vpc-pair", 25)).await);
        assert_eq!(state[CIDR_BLOCK], "10.0.0.128/25");
    }

    #[tokio::test]
    async fn test_create_reports_exhaustion() {
        let err = assert_err!(aws().create(AVAILABLE_SUBNET_CIDR, request("vpc-small", 28)).await);
        assert!(matches!(err, ProviderError::ResourceExhausted(_)));
        let message = err.message();
        assert!(message.contains("vpc-small"), "{message}");
        assert!(message.contains("192.168.0.0/30"), "{message}");
        assert!(message.contains("/28"), "{message}");
        assert!(message.contains("smaller subnet"), "{message}");
    }

    #[tokio::test]
    async fn test_create_without_address_space() {
        let err = assert_err!(aws().create(AVAILABLE_SUBNET_CIDR, request("vpc-empty", 24)).await);
        assert!(matches!(err, ProviderError::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn test_create_fails_closed_on_malformed_subnet() {
        let err = assert_err!(aws().create(AVAILABLE_SUBNET_CIDR, request("vpc-corrupt", 24)).await);
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
        assert!(err.message().contains("garbage"));
    }

    #[tokio::test]
    async fn test_create_with_unparseable_address_space() {
        let err = assert_err!(aws().create(AVAILABLE_SUBNET_CIDR, request("vpc-bad", 24)).await);
        assert!(matches!(err, ProviderError::InvalidRequest(_)), "{err}");
        let message = err.message();
        assert!(message.contains("10.0.0/16, nope"), "{message}");
        assert!(!message.contains("smaller subnet"), "{message}");
    }

    #[tokio::test]
    async fn test_create_unknown_network() {
        let err = assert_err!(aws().create(AVAILABLE_SUBNET_CIDR, request("vpc-nope", 24)).await);
        assert!(matches!(err, ProviderError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_out_of_range_prefix() {
        for len in [0, 29, -4] {
            let err = assert_err!(aws().create(AVAILABLE_SUBNET_CIDR, request("vpc-main", len)).await);
            assert!(matches!(err, ProviderError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_azure_create() {
        let config = json!({"virtual_network_id": VNET, "prefix_length": 29});
        let state = assert_ok!(azure().lifecycle_create(AVAILABLE_SUBNET_CIDR, config).await);
        assert_eq!(state[CIDR_BLOCK], "10.10.0.96/29");
        assert_eq!(
            state[ID],
            format!("{}_29_10.10.0.96_29", VNET.replace('/', "_"))
        );
    }

    #[tokio::test]
    async fn test_azure_network_id_case_is_ignored() {
        let tester = azure();
        let config = json!({"virtual_network_id": VNET.to_lowercase(), "prefix_length": 29});
        assert_ok!(tester.validate_resource_config(AVAILABLE_SUBNET_CIDR, config.clone()).await);

        let state = assert_ok!(tester.create(AVAILABLE_SUBNET_CIDR, config).await);
        assert_eq!(state[CIDR_BLOCK], "10.10.0.96/29");

        let upper = json!({"virtual_network_id": VNET.to_uppercase(), "prefix_length": 27});
        let state = assert_ok!(tester.read_data_source(AVAILABLE_SUBNET_CIDR, upper).await);
        assert_eq!(state[CIDR_BLOCK], "10.10.0.96/27");
    }

    #[tokio::test]
    async fn test_aws_network_id_case_is_significant() {
        let err = assert_err!(aws().create(AVAILABLE_SUBNET_CIDR, request("vpc-MAIN", 24)).await);
        assert!(matches!(err, ProviderError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_plan_create_leaves_computed_unknown() {
        let plan = assert_ok!(aws().plan_create(AVAILABLE_SUBNET_CIDR, request("vpc-main", 24)).await);
        assert_plan_creates(&plan);
        assert_plan_changes_attribute(&plan, "vpc_id");
        assert_plan_changes_attribute(&plan, PREFIX_LENGTH);
        assert!(plan.planned_state[CIDR_BLOCK].is_null());
        assert!(plan.planned_state[ID].is_null());
    }

    #[tokio::test]
    async fn test_plan_unchanged_keeps_prior_allocation() {
        let tester = aws();
        let state = assert_ok!(tester.lifecycle_create(AVAILABLE_SUBNET_CIDR, request("vpc-main", 24)).await);

        let plan = assert_ok!(
            tester
                .plan_update(AVAILABLE_SUBNET_CIDR, state.clone(), request("vpc-main", 24))
                .await
        );
        assert_plan_no_changes(&plan);
        assert_eq!(plan.planned_state, state);

        let updated = assert_ok!(tester.lifecycle_update(AVAILABLE_SUBNET_CIDR, state.clone(), request("vpc-main", 24)).await);
        assert_eq!(updated, state);
    }

    #[tokio::test]
    async fn test_plan_changed_prefix_replaces() {
        let tester = aws();
        let state = assert_ok!(tester.lifecycle_create(AVAILABLE_SUBNET_CIDR, request("vpc-main", 24)).await);

        let plan = assert_ok!(
            tester
                .plan_update(AVAILABLE_SUBNET_CIDR, state.clone(), request("vpc-main", 26))
                .await
        );
        assert_plan_replaces(&plan);
        assert_plan_changes_attribute(&plan, PREFIX_LENGTH);
        assert!(plan.planned_state[CIDR_BLOCK].is_null());

        let replaced = assert_ok!(tester.lifecycle_update(AVAILABLE_SUBNET_CIDR, state, request("vpc-main", 26)).await);
        assert_eq!(replaced[CIDR_BLOCK], "10.0.1.0/26");
    }

    #[tokio::test]
    async fn test_plan_treats_whole_floats_as_equal() {
        let tester = aws();
        let state = assert_ok!(tester.lifecycle_create(AVAILABLE_SUBNET_CIDR, request("vpc-main", 24)).await);
        let proposed = json!({"vpc_id": "vpc-main", "prefix_length": 24.0});
        let plan = assert_ok!(tester.plan_update(AVAILABLE_SUBNET_CIDR, state, proposed).await);
        assert_plan_no_changes(&plan);
    }

    #[tokio::test]
    async fn test_plan_destroy() {
        let tester = aws();
        let plan = assert_ok!(tester.plan_delete(AVAILABLE_SUBNET_CIDR, request("vpc-main", 24)).await);
        assert!(plan.planned_state.is_null());
    }

    #[tokio::test]
    async fn test_update_rejects_replacement_changes() {
        let tester = aws();
        let prior = json!({"id": "vpc-main/24", "vpc_id": "vpc-main", "prefix_length": 24, "cidr_block": "10.0.1.0/24"});
        let err = assert_err!(
            tester
                .update(AVAILABLE_SUBNET_CIDR, prior, request("vpc-other", 24))
                .await
        );
        assert!(matches!(err, ProviderError::FailedPrecondition(_)));
        assert!(err.message().contains("vpc_id"));
    }

    #[tokio::test]
    async fn test_read_and_delete_are_passive() {
        let tester = aws();
        let state = json!({"id": "vpc-main/24", "vpc_id": "vpc-main", "prefix_length": 24, "cidr_block": "10.0.1.0/24"});
        assert_eq!(assert_ok!(tester.read(AVAILABLE_SUBNET_CIDR, state.clone()).await), state);
        assert_ok!(tester.delete(AVAILABLE_SUBNET_CIDR, state).await);
    }

    #[tokio::test]
    async fn test_unknown_resource_type() {
        let err = assert_err!(aws().create("dx_subnet", request("vpc-main", 24)).await);
        assert!(matches!(err, ProviderError::UnknownResource(_)));
    }

    #[tokio::test]
    async fn test_validate_resource_config() {
        let tester = aws();
        assert_ok!(tester.validate_resource_config(AVAILABLE_SUBNET_CIDR, request("vpc-main", 24)).await);

        let diagnostics = tester
            .provider()
            .validate_resource_config(AVAILABLE_SUBNET_CIDR, request("subnet-1", 30))
            .await
            .unwrap();
        assert_error_contains(&diagnostics, "Invalid vpc_id");
        assert_error_contains(&diagnostics, "Invalid prefix_length");

        let diagnostics = tester
            .provider()
            .validate_resource_config(AVAILABLE_SUBNET_CIDR, json!({"vpc_id": null, "prefix_length": 24}))
            .await
            .unwrap();
        assert_error_contains(&diagnostics, "Missing required attribute 'vpc_id'");
    }

    #[tokio::test]
    async fn test_validate_azure_prefix_bound() {
        let tester = azure();
        let config = json!({"virtual_network_id": VNET, "prefix_length": 29});
        assert_ok!(tester.validate_resource_config(AVAILABLE_SUBNET_CIDR, config).await);

        let config = json!({"virtual_network_id": VNET, "prefix_length": 30});
        let err = assert_err!(tester.validate_resource_config(AVAILABLE_SUBNET_CIDR, config).await);
        assert!(matches!(err, TestError::Diagnostics(_)));
    }

    #[tokio::test]
    async fn test_data_source_allocates_every_read() {
        let tester = aws();
        assert_ok!(
            tester
                .validate_data_source_config(AVAILABLE_SUBNET_CIDR, request("vpc-main", 26))
                .await
        );
        let first = assert_ok!(tester.read_data_source(AVAILABLE_SUBNET_CIDR, request("vpc-main", 26)).await);
        let second = assert_ok!(tester.read_data_source(AVAILABLE_SUBNET_CIDR, request("vpc-main", 26)).await);
        assert_eq!(first[CIDR_BLOCK], "10.0.1.0/26");
        assert_eq!(first, second);

        let err = assert_err!(tester.read_data_source("dx_other", request("vpc-main", 26)).await);
        assert!(matches!(err, ProviderError::UnknownResource(_)));
    }

    #[tokio::test]
    async fn test_configure_stores_valid_config() {
        let tester = aws();
        assert_ok!(tester.configure(json!({"prefix": "dx", "environment": "d", "region": "eu-west-1"})).await);
        let stored = tester.provider().config().await.unwrap();
        assert_eq!(stored.region.as_deref(), Some("eu-west-1"));
    }

    #[tokio::test]
    async fn test_configure_rejects_invalid_config() {
        let tester = azure();
        let err = assert_err!(tester.configure(json!({"prefix": "dx"})).await);
        match err {
            TestError::Diagnostics(diagnostics) => {
                assert_error_contains(&diagnostics, "Missing configuration");
            },
            other => panic!("unexpected error: {other}"),
        }
        assert!(tester.provider().config().await.is_none());

        let diagnostics = tester
            .provider()
            .configure(json!({"prefix": 42}))
            .await
            .unwrap();
        assert_error_contains(&diagnostics, "Invalid type");
    }

    #[tokio::test]
    async fn test_validate_provider_config_does_not_require_fields() {
        let tester = azure();
        let diagnostics = tester
            .provider()
            .validate_provider_config(json!({"prefix": "dx"}))
            .await
            .unwrap();
        assert_no_errors(&diagnostics);
    }
}
