//! In-process harness for exercising a [`ProviderService`].
//!
//! [`ProviderTester`] drives the provider the way the engine does (plan,
//! then apply, then read back) without a gRPC server in between. The
//! `assert_*` helpers panic with the offending paths or summaries listed.
//!
//! # Example
//!
//! ```
//! use dx_provider::provider::AVAILABLE_SUBNET_CIDR;
//! use dx_provider::testing::{assert_plan_replaces, ProviderTester};
//! use dx_provider::{DxProvider, Platform, StaticInventory};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let inventory = StaticInventory::new().with_network("vpc-1a2b", ["10.20.0.0/16"], ["10.20.0.0/20"]);
//! let tester = ProviderTester::new(DxProvider::new(Platform::Aws, inventory));
//! tester.configure(json!({"environment": "d"})).await.unwrap();
//!
//! let state = tester
//!     .lifecycle_create(AVAILABLE_SUBNET_CIDR, json!({"vpc_id": "vpc-1a2b", "prefix_length": 20}))
//!     .await
//!     .unwrap();
//! assert_eq!(state["cidr_block"], "10.20.16.0/20");
//!
//! let plan = tester
//!     .plan_update(AVAILABLE_SUBNET_CIDR, state, json!({"vpc_id": "vpc-1a2b", "prefix_length": 22}))
//!     .await
//!     .unwrap();
//! assert_plan_replaces(&plan);
//! # });
//! ```

use std::fmt::{Display, Formatter};

use serde_json::Value;

use crate::error::ProviderError;
use crate::schema::{Diagnostic, ProviderSchema};
use crate::server::ProviderService;
use crate::types::PlanResult;

/// Wraps a provider and calls it directly.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Wrap `provider`.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Resource type names from the metadata.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    /// Data source type names from the metadata.
    pub fn data_source_types(&self) -> Vec<String> {
        self.provider.metadata().data_sources
    }

    /// Validate provider configuration, failing on any error diagnostic.
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Configure the provider, failing on any error diagnostic.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    /// Validate a resource configuration, failing on any error diagnostic.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a creation. The configuration doubles as the proposed state.
    pub async fn plan_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, config.clone(), config)
            .await
    }

    /// Plan a change from `prior_state` to the new configuration.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), config.clone(), config)
            .await
    }

    /// Plan the destruction of `prior_state`.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    /// Create a resource from its planned state.
    pub async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read a resource back.
    pub async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Apply an in-place update.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Validate a data source configuration, failing on any error diagnostic.
    pub async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_data_source_config(data_source_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Read the data source.
    pub async fn read_data_source(&self, data_source_type: &str, config: Value) -> Result<Value, ProviderError> {
        self.provider
            .read_data_source(data_source_type, config)
            .await
    }

    /// Plan, create and read back. Returns the state after the read.
    pub async fn lifecycle_create(&self, resource_type: &str, config: Value) -> Result<Value, ProviderError> {
        let plan = self.plan_create(resource_type, config).await?;
        let created = self.create(resource_type, plan.planned_state).await?;
        self.read(resource_type, created).await
    }

    /// Plan a change and apply it. Returns the state after the read.
    ///
    /// A plan that requires replacement is applied as delete then create;
    /// a plan without changes goes through `update` with the planned state.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self
            .plan_update(resource_type, prior_state.clone(), config)
            .await?;

        let applied = if plan.requires_replace {
            self.delete(resource_type, prior_state).await?;
            self.create(resource_type, plan.planned_state).await?
        } else {
            self.update(resource_type, prior_state, plan.planned_state)
                .await?
        };

        self.read(resource_type, applied).await
    }

    /// Plan a destroy and delete.
    pub async fn lifecycle_delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let plan = self
            .plan_delete(resource_type, current_state.clone())
            .await?;
        if !plan.planned_state.is_null() {
            return Err(ProviderError::Internal(format!(
                "destroy plan for {} kept a state",
                resource_type
            )));
        }
        self.delete(resource_type, current_state).await
    }

    /// Create, change, then delete. Returns the state after the change.
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_config: Value,
        updated_config: Value,
    ) -> Result<Value, ProviderError> {
        let created = self.lifecycle_create(resource_type, initial_config).await?;
        let updated = self
            .lifecycle_update(resource_type, created, updated_config)
            .await?;
        self.lifecycle_delete(resource_type, updated.clone()).await?;
        Ok(updated)
    }
}

/// Failure of a harness call.
#[derive(Debug)]
pub enum TestError {
    /// The provider answered with error diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The provider returned an error.
    Provider(ProviderError),
}

impl Display for TestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Diagnostics(diagnostics) => {
                writeln!(f, "{} error diagnostic(s):", diagnostics.len())?;
                for d in diagnostics {
                    write!(f, "  {}", d.summary)?;
                    if let Some(detail) = &d.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attribute) = &d.attribute {
                        write!(f, " (at {})", attribute)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            },
            Self::Provider(e) => write!(f, "provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        Self::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors = diagnostics
        .into_iter()
        .filter(Diagnostic::is_error)
        .collect::<Vec<_>>();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

fn changed_paths(plan: &PlanResult) -> Vec<&str> {
    plan.changes.iter().map(|c| c.path.as_str()).collect()
}

fn error_summaries(diagnostics: &[Diagnostic]) -> Vec<&str> {
    diagnostics
        .iter()
        .filter(|d| d.is_error())
        .map(|d| d.summary.as_str())
        .collect()
}

/// Assert that a plan creates the resource in place.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(!plan.changes.is_empty(), "expected a create plan, got no changes");
    assert!(!plan.requires_replace, "expected a create plan, got a replacement");
}

/// Assert that a plan changes nothing.
///
/// # Panics
///
/// Panics if the plan has changes or requires replacement.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        !plan.has_changes(),
        "expected no changes, got {:?} (replace: {})",
        changed_paths(plan),
        plan.requires_replace
    );
}

/// Assert that a plan requires replacing the resource.
///
/// # Panics
///
/// Panics otherwise.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "expected a replacement, got changes {:?} in place",
        changed_paths(plan)
    );
}

/// Assert that a plan changes the attribute at `path`.
///
/// # Panics
///
/// Panics otherwise.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.changes.iter().any(|c| c.path == path),
        "expected '{}' to change, changed attributes: {:?}",
        path,
        changed_paths(plan)
    );
}

/// Assert that diagnostics hold no errors. Warnings are allowed.
///
/// # Panics
///
/// Panics if any diagnostic is an error.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors = error_summaries(diagnostics);
    assert!(errors.is_empty(), "expected no errors, got {:?}", errors);
}

/// Assert that some error diagnostic's summary contains `substring`.
///
/// # Panics
///
/// Panics otherwise.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let errors = error_summaries(diagnostics);
    assert!(
        errors.iter().any(|s| s.contains(substring)),
        "expected an error containing '{}', got {:?}",
        substring,
        errors
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::StaticInventory;
    use crate::platform::Platform;
    use crate::provider::{DxProvider, AVAILABLE_SUBNET_CIDR};
    use crate::types::AttributeChange;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn tester() -> ProviderTester<DxProvider<StaticInventory>> {
        let inventory = StaticInventory::new().with_network(
            "vpc-lab",
            ["172.16.0.0/20"],
            ["172.16.0.0/22", "172.16.8.0/24"],
        );
        ProviderTester::new(DxProvider::new(Platform::Aws, inventory))
    }

    #[tokio::test]
    async fn test_configure_surfaces_error_diagnostics() {
        let tester = tester();
        assert_ok!(tester.configure(json!({"prefix": "dx"})).await);
        assert_ok!(tester.validate_provider_config(json!({"region": "eu"})).await);

        let err = assert_err!(tester.configure(json!({"prefix": "toolong"})).await);
        assert!(matches!(err, TestError::Diagnostics(ref d) if d.len() == 1));
    }

    #[tokio::test]
    async fn test_type_names_come_from_metadata() {
        let tester = tester();
        assert_eq!(tester.resource_types(), vec![AVAILABLE_SUBNET_CIDR.to_string()]);
        assert_eq!(tester.data_source_types(), vec![AVAILABLE_SUBNET_CIDR.to_string()]);
        assert!(tester.schema().resources.contains_key(AVAILABLE_SUBNET_CIDR));
        assert_ok!(tester.stop().await);
    }

    #[tokio::test]
    async fn test_lifecycle_crud_replaces_on_change() {
        let tester = tester();
        let state = assert_ok!(
            tester
                .lifecycle_crud(
                    AVAILABLE_SUBNET_CIDR,
                    json!({"vpc_id": "vpc-lab", "prefix_length": 22}),
                    json!({"vpc_id": "vpc-lab", "prefix_length": 24}),
                )
                .await
        );
        assert_eq!(state["cidr_block"], "172.16.4.0/24");
        assert_eq!(state["id"], "vpc-lab/24");
    }

    #[tokio::test]
    async fn test_lifecycle_delete() {
        let tester = tester();
        let state = assert_ok!(
            tester
                .lifecycle_create(AVAILABLE_SUBNET_CIDR, json!({"vpc_id": "vpc-lab", "prefix_length": 22}))
                .await
        );
        assert_eq!(state["cidr_block"], "172.16.4.0/22");
        assert_ok!(tester.lifecycle_delete(AVAILABLE_SUBNET_CIDR, state).await);
    }

    #[tokio::test]
    async fn test_data_source_validation_errors() {
        let tester = tester();
        let err = assert_err!(
            tester
                .validate_data_source_config(AVAILABLE_SUBNET_CIDR, json!({"vpc_id": "vpc-lab"}))
                .await
        );
        assert!(err.to_string().contains("prefix_length"));
    }

    #[test]
    fn test_plan_assertions() {
        let plan = PlanResult::with_changes(
            json!({"prefix_length": 26}),
            vec![AttributeChange::modified("prefix_length", json!(24), json!(26))],
            true,
        );
        assert_plan_replaces(&plan);
        assert_plan_changes_attribute(&plan, "prefix_length");
        assert_plan_no_changes(&PlanResult::no_change(json!({})));
    }

    #[test]
    #[should_panic(expected = "expected no changes")]
    fn test_assert_plan_no_changes_fails_on_replace() {
        assert_plan_no_changes(&PlanResult::with_changes(json!({}), vec![], true));
    }

    #[test]
    fn test_diagnostic_assertions() {
        let diagnostics = vec![
            Diagnostic::warning("Attribute 'region' is ignored"),
            Diagnostic::error("Invalid vpc_id"),
        ];
        assert_error_contains(&diagnostics, "vpc_id");
        assert_no_errors(&diagnostics[..1]);
    }

    #[test]
    #[should_panic(expected = "expected no errors")]
    fn test_assert_no_errors_fails() {
        assert_no_errors(&[Diagnostic::error("Invalid prefix_length")]);
    }

    #[test]
    fn test_test_error_display() {
        let err = TestError::Diagnostics(vec![
            Diagnostic::error("Invalid vpc_id").with_attribute("vpc_id"),
            Diagnostic::error("Invalid prefix_length").with_detail("prefix_length must be between 1 and 28, got 30"),
        ]);
        let display = err.to_string();
        assert!(display.starts_with("2 error diagnostic(s)"));
        assert!(display.contains("(at vpc_id)"));
        assert!(display.contains("got 30"));
    }
}
