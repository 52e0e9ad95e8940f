//! canary.toml configuration and validated run configuration.
//!
//! Settings come from three layers: the optional TOML file, then
//! environment variables, then command-line flags. Each layer is a
//! `*Section` of optional values; [`RollSection::merge`] stacks them
//! and `TryFrom` turns the result into a validated config.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactUri;
use crate::error::{CoreError, CoreResult};
use crate::types::CanaryWeight;

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_OLD_VARIANT: &str = "AllTraffic";
pub const DEFAULT_NEW_VARIANT: &str = "Canary";
pub const DEFAULT_INSTANCE_TYPE: &str = "ml.m5.large";

/// Parsed canary.toml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub roll: RollSection,
    pub deploy: DeploySection,
    pub poll: PollSection,
}

impl ConfigFile {
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ConfigFile = toml::from_str(&content)?;
        tracing::debug!(?path, "config file loaded");
        Ok(config)
    }
}

/// `[roll]` table: unvalidated canary roll settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollSection {
    pub region: Option<String>,
    pub endpoint_name: Option<String>,
    pub model_artifact: Option<String>,
    pub execution_role: Option<String>,
    pub old_variant: Option<String>,
    pub new_variant: Option<String>,
    pub canary_weight: Option<f64>,
    pub image_uri: Option<String>,
}

impl RollSection {
    /// Stack `over` on top of `self`; values set in `over` win.
    pub fn merge(self, over: RollSection) -> RollSection {
        RollSection {
            region: over.region.or(self.region),
            endpoint_name: over.endpoint_name.or(self.endpoint_name),
            model_artifact: over.model_artifact.or(self.model_artifact),
            execution_role: over.execution_role.or(self.execution_role),
            old_variant: over.old_variant.or(self.old_variant),
            new_variant: over.new_variant.or(self.new_variant),
            canary_weight: over.canary_weight.or(self.canary_weight),
            image_uri: over.image_uri.or(self.image_uri),
        }
    }
}

/// `[deploy]` table: unvalidated initial-deploy settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploySection {
    pub region: Option<String>,
    pub endpoint_name: Option<String>,
    pub model_artifact: Option<String>,
    pub execution_role: Option<String>,
    pub variant_name: Option<String>,
    pub instance_count: Option<u32>,
    pub instance_type: Option<String>,
    pub image_uri: Option<String>,
}

impl DeploySection {
    pub fn merge(self, over: DeploySection) -> DeploySection {
        DeploySection {
            region: over.region.or(self.region),
            endpoint_name: over.endpoint_name.or(self.endpoint_name),
            model_artifact: over.model_artifact.or(self.model_artifact),
            execution_role: over.execution_role.or(self.execution_role),
            variant_name: over.variant_name.or(self.variant_name),
            instance_count: over.instance_count.or(self.instance_count),
            instance_type: over.instance_type.or(self.instance_type),
            image_uri: over.image_uri.or(self.image_uri),
        }
    }
}

/// `[poll]` table: status wait tuning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSection {
    pub interval_secs: Option<u64>,
    /// 0 means no attempt limit.
    pub max_attempts: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub cleanup_on_failure: Option<bool>,
}

impl PollSection {
    pub fn merge(self, over: PollSection) -> PollSection {
        PollSection {
            interval_secs: over.interval_secs.or(self.interval_secs),
            max_attempts: over.max_attempts.or(self.max_attempts),
            timeout_secs: over.timeout_secs.or(self.timeout_secs),
            cleanup_on_failure: over.cleanup_on_failure.or(self.cleanup_on_failure),
        }
    }
}

/// Validated settings for one canary roll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollConfig {
    pub region: String,
    pub endpoint_name: String,
    pub model_artifact: ArtifactUri,
    pub execution_role: String,
    /// Name the live variant is expected to carry.
    pub old_variant: String,
    pub new_variant: String,
    pub canary_weight: CanaryWeight,
    /// Serving image; the region's XGBoost image when unset.
    pub image_uri: Option<String>,
}

impl RollConfig {
    /// Build with defaults for region, variant names and image.
    pub fn new(
        endpoint_name: &str,
        model_artifact: &str,
        execution_role: &str,
        canary_weight: f64,
    ) -> CoreResult<Self> {
        RollConfig::try_from(RollSection {
            endpoint_name: Some(endpoint_name.to_string()),
            model_artifact: Some(model_artifact.to_string()),
            execution_role: Some(execution_role.to_string()),
            canary_weight: Some(canary_weight),
            ..Default::default()
        })
    }

    pub fn validate(&self) -> CoreResult<()> {
        validate_resource_name("endpoint_name", &self.endpoint_name)?;
        validate_role(&self.execution_role)?;
        validate_resource_name("old_variant", &self.old_variant)?;
        validate_resource_name("new_variant", &self.new_variant)?;
        if self.old_variant == self.new_variant {
            return Err(CoreError::Invalid {
                field: "new_variant",
                reason: format!("must differ from old variant {:?}", self.old_variant),
            });
        }
        if self.region.trim().is_empty() {
            return Err(CoreError::Missing("region"));
        }
        Ok(())
    }
}

impl TryFrom<RollSection> for RollConfig {
    type Error = CoreError;

    fn try_from(section: RollSection) -> CoreResult<Self> {
        let model_artifact = section
            .model_artifact
            .ok_or(CoreError::Missing("model_artifact"))?;
        let config = RollConfig {
            region: section.region.unwrap_or_else(|| DEFAULT_REGION.to_string()),
            endpoint_name: section
                .endpoint_name
                .ok_or(CoreError::Missing("endpoint_name"))?,
            model_artifact: ArtifactUri::parse(&model_artifact)?,
            execution_role: section
                .execution_role
                .ok_or(CoreError::Missing("execution_role"))?,
            old_variant: section
                .old_variant
                .unwrap_or_else(|| DEFAULT_OLD_VARIANT.to_string()),
            new_variant: section
                .new_variant
                .unwrap_or_else(|| DEFAULT_NEW_VARIANT.to_string()),
            canary_weight: match section.canary_weight {
                Some(w) => CanaryWeight::new(w)?,
                None => CanaryWeight::default(),
            },
            image_uri: section.image_uri.filter(|s| !s.trim().is_empty()),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Validated settings for creating a fresh single-variant endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployConfig {
    pub region: String,
    pub endpoint_name: String,
    pub model_artifact: ArtifactUri,
    pub execution_role: String,
    pub variant_name: String,
    pub instance_count: u32,
    pub instance_type: String,
    pub image_uri: Option<String>,
}

impl TryFrom<DeploySection> for DeployConfig {
    type Error = CoreError;

    fn try_from(section: DeploySection) -> CoreResult<Self> {
        let model_artifact = section
            .model_artifact
            .ok_or(CoreError::Missing("model_artifact"))?;
        let config = DeployConfig {
            region: section.region.unwrap_or_else(|| DEFAULT_REGION.to_string()),
            endpoint_name: section
                .endpoint_name
                .ok_or(CoreError::Missing("endpoint_name"))?,
            model_artifact: ArtifactUri::parse(&model_artifact)?,
            execution_role: section
                .execution_role
                .ok_or(CoreError::Missing("execution_role"))?,
            variant_name: section
                .variant_name
                .unwrap_or_else(|| DEFAULT_OLD_VARIANT.to_string()),
            instance_count: section.instance_count.unwrap_or(1),
            instance_type: section
                .instance_type
                .unwrap_or_else(|| DEFAULT_INSTANCE_TYPE.to_string()),
            image_uri: section.image_uri.filter(|s| !s.trim().is_empty()),
        };
        validate_resource_name("endpoint_name", &config.endpoint_name)?;
        validate_role(&config.execution_role)?;
        validate_resource_name("variant_name", &config.variant_name)?;
        if config.instance_count == 0 {
            return Err(CoreError::Invalid {
                field: "instance_count",
                reason: "must be at least 1".to_string(),
            });
        }
        if config.instance_type.trim().is_empty() {
            return Err(CoreError::Missing("instance_type"));
        }
        Ok(config)
    }
}

/// Endpoint and variant names: 1-63 of `[a-zA-Z0-9-]`, no leading hyphen.
fn validate_resource_name(field: &'static str, name: &str) -> CoreResult<()> {
    if name.is_empty() {
        return Err(CoreError::Missing(field));
    }
    if name.len() > crate::naming::MAX_NAME_LEN {
        return Err(CoreError::Invalid {
            field,
            reason: format!("{name:?} is longer than {} characters", crate::naming::MAX_NAME_LEN),
        });
    }
    if name.starts_with('-') || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(CoreError::Invalid {
            field,
            reason: format!("{name:?} must be alphanumerics and hyphens"),
        });
    }
    Ok(())
}

fn validate_role(role: &str) -> CoreResult<()> {
    if role.trim().is_empty() {
        return Err(CoreError::Missing("execution_role"));
    }
    if !role.starts_with("arn:") {
        return Err(CoreError::Invalid {
            field: "execution_role",
            reason: format!("{role:?} is not an ARN"),
        });
    }
    Ok(())
}
