//! Error types for rollouts.

use std::time::Duration;

use thiserror::Error;

use canary_core::{CoreError, EndpointStatus};
use canary_platform::PlatformError;

use crate::ledger::CreatedResource;

/// Result type alias for rollout operations.
pub type RolloutResult<T> = Result<T, RolloutError>;

/// Errors that abort a roll, deploy or teardown.
#[derive(Debug, Error)]
pub enum RolloutError {
    #[error(transparent)]
    Config(#[from] CoreError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("endpoint {endpoint} is {status}; it must be InService before a roll")]
    NotReady {
        endpoint: String,
        status: EndpointStatus,
    },

    #[error("endpoint {0} has no endpoint config")]
    NoConfig(String),

    #[error("endpoint config {0} has no production variants")]
    NoVariants(String),

    #[error("endpoint config {config} has {count} variants; a canary roll needs exactly one")]
    MultipleVariants { config: String, count: usize },

    #[error("variant name {0} is already taken by the live variant")]
    VariantClash(String),

    #[error("endpoint {endpoint} settled in {status}: {}", .reason.as_deref().unwrap_or("no failure reason reported"))]
    UpdateFailed {
        endpoint: String,
        status: EndpointStatus,
        reason: Option<String>,
    },

    #[error("endpoint {endpoint} still {status} after {attempts} status checks")]
    AttemptsExhausted {
        endpoint: String,
        status: EndpointStatus,
        attempts: u32,
    },

    #[error("endpoint {endpoint} still {status} after {elapsed:?}")]
    TimedOut {
        endpoint: String,
        status: EndpointStatus,
        elapsed: Duration,
    },

    #[error("wait on endpoint {0} cancelled")]
    Cancelled(String),

    #[error("{cause}; left behind: {}", list(.orphans))]
    Aborted {
        cause: Box<RolloutError>,
        orphans: Vec<CreatedResource>,
    },
}

impl RolloutError {
    /// The underlying failure, looking through [`RolloutError::Aborted`].
    pub fn cause(&self) -> &RolloutError {
        match self {
            RolloutError::Aborted { cause, .. } => cause.cause(),
            other => other,
        }
    }

    /// Resources the failed run left on the platform.
    pub fn orphans(&self) -> &[CreatedResource] {
        match self {
            RolloutError::Aborted { orphans, .. } => orphans,
            _ => &[],
        }
    }
}

fn list(resources: &[CreatedResource]) -> String {
    resources
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
