//! Provider configuration.
//!
//! The `dx` provider block carries naming context shared by every resource:
//! a two-letter `prefix`, an optional `domain`, the `environment` and the
//! cloud location (`region` on AWS, `location` on Azure). None of it affects
//! allocation; it is validated and kept for the lifetime of the process.

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::platform::Platform;
use crate::schema::{Attribute, Diagnostic, Schema};

/// Accepted `environment` values (case-insensitive).
pub const ENVIRONMENTS: &[&str] = &["d", "u", "p"];

/// Accepted AWS `region` values.
pub const AWS_REGIONS: &[&str] = &[
    "eu",
    "eu-west-1",
    "euc1",
    "eu-central-1",
    "euw3",
    "eu-west-3",
    "eun1",
    "eu-north-1",
    "eus1",
    "eu-south-1",
];

/// Accepted Azure `location` values (case-insensitive).
pub const AZURE_LOCATIONS: &[&str] = &["weu", "itn", "westeurope", "italynorth"];

/// The provider configuration block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Two-character prefix identifying the repository domain.
    pub prefix: Option<String>,
    /// Team domain name.
    pub domain: Option<String>,
    /// Deployment environment: `d`, `u` or `p`.
    pub environment: Option<String>,
    /// AWS region.
    pub region: Option<String>,
    /// Azure location.
    pub location: Option<String>,
}

impl ProviderConfig {
    /// Decode a configuration value; `null` yields an empty configuration.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ProviderError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Check everything required to configure the provider on `platform`.
    ///
    /// On Azure `prefix`, `environment` and `location` must be set; on both
    /// platforms every value present must pass [`Self::check_values`].
    pub fn validate(&self, platform: Platform) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        if platform == Platform::Azure {
            for (name, value) in [
                ("prefix", &self.prefix),
                ("environment", &self.environment),
                ("location", &self.location),
            ] {
                if value.is_none() {
                    diagnostics.push(
                        Diagnostic::error("Missing configuration")
                            .with_detail(format!("The '{}' configuration is required.", name))
                            .with_attribute(name),
                    );
                }
            }
        }

        diagnostics.extend(self.check_values(platform));
        diagnostics
    }

    /// Check the values that are present, without requiring any.
    pub fn check_values(&self, platform: Platform) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        if let Some(prefix) = &self.prefix {
            if prefix.chars().count() != 2 {
                diagnostics.push(
                    Diagnostic::error("Prefix length error")
                        .with_detail("The 'prefix' configuration must be 2 characters long.")
                        .with_attribute("prefix"),
                );
            }
        }

        if let Some(environment) = &self.environment {
            if !ENVIRONMENTS.contains(&environment.to_lowercase().as_str()) {
                diagnostics.push(
                    Diagnostic::error("Environment value error")
                        .with_detail("The 'environment' configuration must be 'd', 'u' or 'p'.")
                        .with_attribute("environment"),
                );
            }
        }

        match platform {
            Platform::Aws => {
                if let Some(region) = &self.region {
                    if !AWS_REGIONS.contains(&region.as_str()) {
                        diagnostics.push(
                            Diagnostic::error("Region value error")
                                .with_detail(format!(
                                    "The 'region' configuration must be one of: {}.",
                                    quoted_list(AWS_REGIONS)
                                ))
                                .with_attribute("region"),
                        );
                    }
                }
                if self.location.is_some() {
                    diagnostics.push(ignored_attribute("location", platform));
                }
            },
            Platform::Azure => {
                if let Some(location) = &self.location {
                    if !AZURE_LOCATIONS.contains(&location.to_lowercase().as_str()) {
                        diagnostics.push(
                            Diagnostic::error("Location value error")
                                .with_detail(format!(
                                    "The 'location' configuration must be one of: {}.",
                                    quoted_list(AZURE_LOCATIONS)
                                ))
                                .with_attribute("location"),
                        );
                    }
                }
                if self.region.is_some() {
                    diagnostics.push(ignored_attribute("region", platform));
                }
            },
        }

        diagnostics
    }
}

/// Schema of the provider configuration block for `platform`.
pub fn provider_schema(platform: Platform) -> Schema {
    let location = match platform {
        Platform::Aws => "AWS region where the resources will be deployed",
        Platform::Azure => "Location where the resources will be deployed",
    };

    Schema::v0()
        .with_description(format!(
            "The dx provider allocates subnet CIDR blocks on {}.",
            match platform {
                Platform::Aws => "AWS",
                Platform::Azure => "Azure",
            }
        ))
        .with_attribute(
            "prefix",
            Attribute::optional_string().with_description("Prefix that defines the repository domain"),
        )
        .with_attribute(
            "domain",
            Attribute::optional_string().with_description("The team domain name"),
        )
        .with_attribute(
            "environment",
            Attribute::optional_string()
                .with_description("Environment where the resources will be deployed"),
        )
        .with_attribute(
            platform.location_attribute(),
            Attribute::optional_string().with_description(location),
        )
}

fn ignored_attribute(name: &str, platform: Platform) -> Diagnostic {
    Diagnostic::warning(format!("Attribute '{}' is ignored", name))
        .with_detail(format!("The '{}' configuration has no effect on {}.", name, platform))
        .with_attribute(name)
}

fn quoted_list(values: &[&str]) -> String {
    values
        .iter()
        .map(|v| format!("'{}'", v))
        .collect::<Vec<_>>()
        .join(", ")
}
