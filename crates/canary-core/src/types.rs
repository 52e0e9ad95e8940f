//! Shared types used across the canary crates.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Lifecycle status reported by the platform for a hosted endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum EndpointStatus {
    OutOfService,
    Creating,
    Updating,
    SystemUpdating,
    RollingBack,
    InService,
    Deleting,
    Failed,
    UpdateRollbackFailed,
    /// A status this crate does not know about yet.
    Other(String),
}

impl EndpointStatus {
    /// Whether a status wait should stop on this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EndpointStatus::InService | EndpointStatus::Failed)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, EndpointStatus::InService)
    }

    pub fn as_str(&self) -> &str {
        match self {
            EndpointStatus::OutOfService => "OutOfService",
            EndpointStatus::Creating => "Creating",
            EndpointStatus::Updating => "Updating",
            EndpointStatus::SystemUpdating => "SystemUpdating",
            EndpointStatus::RollingBack => "RollingBack",
            EndpointStatus::InService => "InService",
            EndpointStatus::Deleting => "Deleting",
            EndpointStatus::Failed => "Failed",
            EndpointStatus::UpdateRollbackFailed => "UpdateRollbackFailed",
            EndpointStatus::Other(s) => s,
        }
    }
}

impl From<&str> for EndpointStatus {
    fn from(s: &str) -> Self {
        match s {
            "OutOfService" => EndpointStatus::OutOfService,
            "Creating" => EndpointStatus::Creating,
            "Updating" => EndpointStatus::Updating,
            "SystemUpdating" => EndpointStatus::SystemUpdating,
            "RollingBack" => EndpointStatus::RollingBack,
            "InService" => EndpointStatus::InService,
            "Deleting" => EndpointStatus::Deleting,
            "Failed" => EndpointStatus::Failed,
            "UpdateRollbackFailed" => EndpointStatus::UpdateRollbackFailed,
            other => EndpointStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for EndpointStatus {
    fn from(s: String) -> Self {
        EndpointStatus::from(s.as_str())
    }
}

impl From<EndpointStatus> for String {
    fn from(status: EndpointStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A hosted inference endpoint as last described by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    /// Configuration currently applied. Absent only while the endpoint
    /// is still being created.
    pub config_name: Option<String>,
    pub status: EndpointStatus,
    pub failure_reason: Option<String>,
}

/// One weighted backend (model + compute) behind an endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    pub model_name: String,
    pub instance_count: u32,
    pub instance_type: String,
    pub weight: f64,
}

/// Immutable set of variants. Superseded, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfiguration {
    pub name: String,
    pub variants: Vec<Variant>,
}

impl EndpointConfiguration {
    pub fn total_weight(&self) -> f64 {
        self.variants.iter().map(|v| v.weight).sum()
    }
}

/// A model resource to create: container image plus trained weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub image: String,
    pub model_data_url: String,
    pub execution_role: String,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// Output of the most recent completed training job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingArtifact {
    pub job_name: String,
    /// `s3://` location of the trained model archive.
    pub model_artifact: String,
}

pub const CSV_CONTENT_TYPE: &str = "text/csv";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// One inference request against a live endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeRequest {
    pub endpoint: String,
    /// Route to this variant instead of the weighted split.
    pub target_variant: Option<String>,
    pub content_type: String,
    pub accept: String,
    pub body: String,
}

impl InvokeRequest {
    /// A single CSV feature row, answered as JSON.
    ///
    /// The row must be one non-empty line of numeric fields; a trailing
    /// newline is dropped.
    pub fn csv_row(
        endpoint: &str,
        row: &str,
        target_variant: Option<&str>,
    ) -> Result<Self, CoreError> {
        let row = row.trim_end_matches(['\r', '\n']).trim();
        if row.is_empty() {
            return Err(CoreError::Missing("body"));
        }
        if row.contains('\n') {
            return Err(CoreError::Invalid {
                field: "body",
                reason: "expected a single CSV row".to_string(),
            });
        }
        if let Some(bad) = row.split(',').find(|f| f.trim().parse::<f64>().is_err()) {
            return Err(CoreError::Invalid {
                field: "body",
                reason: format!("{bad:?} is not a numeric feature"),
            });
        }
        Ok(InvokeRequest {
            endpoint: endpoint.to_string(),
            target_variant: target_variant.map(str::to_string),
            content_type: CSV_CONTENT_TYPE.to_string(),
            accept: JSON_CONTENT_TYPE.to_string(),
            body: row.to_string(),
        })
    }
}

/// What the endpoint answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    /// Variant that served the request, when the platform says.
    pub invoked_variant: Option<String>,
    pub content_type: Option<String>,
    pub body: String,
}

/// Fraction of traffic routed to a canary, strictly inside (0, 1).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct CanaryWeight(f64);

impl CanaryWeight {
    pub fn new(value: f64) -> Result<Self, CoreError> {
        // NaN fails both comparisons.
        if value > 0.0 && value < 1.0 {
            Ok(CanaryWeight(value))
        } else {
            Err(CoreError::Weight(value))
        }
    }

    pub fn get(self) -> f64 {
        self.0
    }

    /// Weight left on the existing variant.
    pub fn complement(self) -> f64 {
        1.0 - self.0
    }
}

impl Default for CanaryWeight {
    fn default() -> Self {
        CanaryWeight(0.1)
    }
}

impl TryFrom<f64> for CanaryWeight {
    type Error = CoreError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        CanaryWeight::new(value)
    }
}

impl From<CanaryWeight> for f64 {
    fn from(weight: CanaryWeight) -> Self {
        weight.0
    }
}

impl FromStr for CanaryWeight {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f64 = s.trim().parse().map_err(|_| CoreError::Invalid {
            field: "canary_weight",
            reason: format!("{s:?} is not a number"),
        })?;
        CanaryWeight::new(value)
    }
}

impl fmt::Display for CanaryWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
