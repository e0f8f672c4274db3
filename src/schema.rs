//! Schema types for describing provider, resource and data source structure.
//!
//! Schemas describe the shape of the provider configuration and of the
//! `dx_available_subnet_cidr` resource and data source. They drive
//! validation, plan replacement decisions, and the GetSchema RPC.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The type of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// A string value.
    String,
    /// A 64-bit integer.
    Int64,
}

/// Describes how an attribute can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttributeFlags {
    /// The attribute is required in configuration.
    pub required: bool,
    /// The attribute is optional in configuration.
    pub optional: bool,
    /// The attribute is computed by the provider (read-only).
    pub computed: bool,
}

impl AttributeFlags {
    /// Must be set in configuration.
    pub fn required() -> Self {
        Self { required: true, optional: false, computed: false }
    }

    /// May be set in configuration.
    pub fn optional() -> Self {
        Self { required: false, optional: true, computed: false }
    }

    /// Set by the provider, never by configuration.
    pub fn computed() -> Self {
        Self { required: false, optional: false, computed: true }
    }

    /// Whether the attribute is set only by the provider.
    pub fn is_computed_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }
}

/// One attribute of a schema. Serialized with its flags inlined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// Value type.
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    /// Required, optional or computed.
    #[serde(flatten)]
    pub flags: AttributeFlags,
    /// Shown to users in generated docs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// A changed value replaces the resource instead of updating it.
    #[serde(default)]
    pub force_new: bool,
}

impl Attribute {
    /// An attribute with no description that updates in place.
    pub fn new(attr_type: AttributeType, flags: AttributeFlags) -> Self {
        Self {
            attr_type,
            flags,
            description: None,
            force_new: false,
        }
    }

    /// `String`, required.
    pub fn required_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::required())
    }

    /// `String`, optional.
    pub fn optional_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::optional())
    }

    /// `String`, computed.
    pub fn computed_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::computed())
    }

    /// `Int64`, required.
    pub fn required_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::required())
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark the attribute as replacement-forcing.
    pub fn with_force_new(mut self) -> Self {
        self.force_new = true;
        self
    }
}

/// A set of named attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Block {
    /// The attributes within this block, ordered by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Attribute>,
    /// Description of the whole block.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Block {
    /// An empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the attribute `name`.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }
}

/// Schema for a resource, data source or the provider itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Bumped when stored state changes shape.
    #[serde(default)]
    pub version: u64,
    /// Top-level attributes.
    #[serde(flatten)]
    pub block: Block,
}

impl Schema {
    /// An empty schema at `version`.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            block: Block::new(),
        }
    }

    /// An empty schema at version 0.
    pub fn v0() -> Self {
        Self::new(0)
    }

    /// Add or replace the top-level attribute `name`.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.block = self.block.with_attribute(name, attr);
        self
    }

    /// Describe the schema.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.block.description = Some(description.into());
        self
    }

    /// Names of the attributes whose change forces replacement.
    pub fn force_new_attributes(&self) -> impl Iterator<Item = &str> {
        self.block
            .attributes
            .iter()
            .filter(|(_, attr)| attr.force_new)
            .map(|(name, _)| name.as_str())
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::v0()
    }
}

/// Schemas for everything a provider exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProviderSchema {
    /// The provider configuration block.
    #[serde(default)]
    pub provider: Schema,
    /// Resource schemas by type name.
    #[serde(default)]
    pub resources: BTreeMap<String, Schema>,
    /// Data source schemas by type name.
    #[serde(default)]
    pub data_sources: BTreeMap<String, Schema>,
}

impl ProviderSchema {
    /// No provider config, resources or data sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the provider configuration schema.
    pub fn with_provider_config(mut self, schema: Schema) -> Self {
        self.provider = schema;
        self
    }

    /// Register a resource type.
    pub fn with_resource(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.resources.insert(name.into(), schema);
        self
    }

    /// Register a data source type.
    pub fn with_data_source(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.data_sources.insert(name.into(), schema);
        self
    }
}

/// How serious a [`Diagnostic`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// The operation cannot go ahead.
    Error,
    /// Reported to the user; the operation continues.
    Warning,
}

/// A problem reported back to the user, optionally tied to an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Error or warning.
    pub severity: DiagnosticSeverity,
    /// One-line description.
    pub summary: String,
    /// Longer explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Name of the offending attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    fn with_severity(severity: DiagnosticSeverity, summary: impl Into<String>) -> Self {
        Self {
            severity,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// An error diagnostic.
    pub fn error(summary: impl Into<String>) -> Self {
        Self::with_severity(DiagnosticSeverity::Error, summary)
    }

    /// A warning diagnostic.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self::with_severity(DiagnosticSeverity::Warning, summary)
    }

    /// Attach a longer explanation.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Point the diagnostic at `attribute`.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Whether this is an error diagnostic.
    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

/// Whether any diagnostic in the list is an error.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_computed_flags_are_computed_only() {
        assert!(AttributeFlags::computed().is_computed_only());
        assert!(!AttributeFlags::required().is_computed_only());
        assert!(!AttributeFlags::optional().is_computed_only());

        let both = AttributeFlags { optional: true, computed: true, ..AttributeFlags::default() };
        assert!(!both.is_computed_only());
    }

    #[test]
    fn test_attribute_builders() {
        let attr = Attribute::required_int64()
            .with_description("Prefix length of the subnet")
            .with_force_new();

        assert_eq!(attr.attr_type, AttributeType::Int64);
        assert!(attr.flags.required);
        assert_eq!(
            attr.description,
            Some("Prefix length of the subnet".to_string())
        );
        assert!(attr.force_new);
    }

    #[test]
    fn test_force_new_attributes() {
        let schema = Schema::v0()
            .with_attribute("vpc_id", Attribute::required_string().with_force_new())
            .with_attribute("prefix_length", Attribute::required_int64().with_force_new())
            .with_attribute("cidr_block", Attribute::computed_string());

        let names = schema.force_new_attributes().collect::<Vec<_>>();
        assert_eq!(names, vec!["prefix_length", "vpc_id"]);
    }

    #[test]
    fn test_provider_schema() {
        let provider_schema = ProviderSchema::new()
            .with_provider_config(
                Schema::v0().with_attribute("prefix", Attribute::optional_string()),
            )
            .with_resource(
                "dx_available_subnet_cidr",
                Schema::v0().with_attribute("id", Attribute::computed_string()),
            )
            .with_data_source(
                "dx_available_subnet_cidr",
                Schema::v0().with_description("Finds a free subnet CIDR"),
            );

        assert!(provider_schema
            .provider
            .block
            .attributes
            .contains_key("prefix"));
        assert!(provider_schema
            .resources
            .contains_key("dx_available_subnet_cidr"));
        assert_eq!(
            provider_schema.data_sources["dx_available_subnet_cidr"]
                .block
                .description
                .as_deref(),
            Some("Finds a free subnet CIDR")
        );
    }

    #[test]
    fn test_schema_serializes_flags_flat() {
        let json = serde_json::to_value(Attribute::computed_string()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "string",
                "required": false,
                "optional": false,
                "computed": true,
                "force_new": false
            })
        );
    }

    #[test]
    fn test_diagnostic_builders() {
        let err = Diagnostic::error("Invalid prefix_length")
            .with_detail("prefix_length must be between 1 and 28, got 0")
            .with_attribute("prefix_length");

        assert!(err.is_error());
        assert_eq!(err.detail.as_deref(), Some("prefix_length must be between 1 and 28, got 0"));
        assert_eq!(err.attribute.as_deref(), Some("prefix_length"));
        assert!(!Diagnostic::warning("Attribute 'region' is ignored").is_error());

        assert!(has_errors(&[Diagnostic::warning("w"), err]));
        assert!(!has_errors(&[Diagnostic::warning("w")]));
    }
}
