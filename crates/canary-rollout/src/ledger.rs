//! Resources created during a run, and their cleanup on failure.

use std::fmt;

use tracing::{info, warn};

use canary_platform::ControlPlane;

use crate::error::RolloutError;
use crate::strategy::CleanupPolicy;

/// A platform resource a run created.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum CreatedResource {
    Model(String),
    EndpointConfig(String),
    Endpoint(String),
}

impl fmt::Display for CreatedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreatedResource::Model(name) => write!(f, "model {name}"),
            CreatedResource::EndpointConfig(name) => write!(f, "endpoint config {name}"),
            CreatedResource::Endpoint(name) => write!(f, "endpoint {name}"),
        }
    }
}

/// Creation-ordered record of what a run has put on the platform.
#[derive(Debug, Default)]
pub struct Ledger {
    created: Vec<CreatedResource>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, resource: CreatedResource) {
        self.created.push(resource);
    }

    pub fn resources(&self) -> &[CreatedResource] {
        &self.created
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
    }

    /// Delete everything recorded, newest first. Returns the resources
    /// that could not be deleted. Already-gone resources count as deleted.
    pub async fn unwind<P: ControlPlane + ?Sized>(self, platform: &P) -> Vec<CreatedResource> {
        let mut remaining = Vec::new();
        for resource in self.created.into_iter().rev() {
            let result = match &resource {
                CreatedResource::Model(name) => platform.delete_model(name).await,
                CreatedResource::EndpointConfig(name) => platform.delete_endpoint_config(name).await,
                CreatedResource::Endpoint(name) => platform.delete_endpoint(name).await,
            };
            match result {
                Ok(()) => info!(%resource, "deleted"),
                Err(e) if e.is_not_found() => info!(%resource, "already gone"),
                Err(e) => {
                    warn!(%resource, error = %e, "cleanup failed");
                    remaining.push(resource);
                }
            }
        }
        // Report in creation order.
        remaining.reverse();
        remaining
    }

    /// Turn a run failure into the error returned to the caller,
    /// cleaning up first when `policy` asks for it.
    ///
    /// `in_flight` means the endpoint may still be moving onto the
    /// recorded resources; they are never deleted in that case.
    pub async fn settle<P: ControlPlane + ?Sized>(
        self,
        platform: &P,
        policy: CleanupPolicy,
        in_flight: bool,
        cause: RolloutError,
    ) -> RolloutError {
        if self.is_empty() {
            return cause;
        }

        let orphans = match policy {
            CleanupPolicy::DeleteCreated if !in_flight => {
                info!(count = self.created.len(), "cleaning up after failed run");
                self.unwind(platform).await
            }
            CleanupPolicy::DeleteCreated => {
                warn!("endpoint may still reference new resources; skipping cleanup");
                self.created
            }
            CleanupPolicy::Keep => self.created,
        };

        if orphans.is_empty() {
            cause
        } else {
            for resource in &orphans {
                warn!(%resource, "left behind");
            }
            RolloutError::Aborted {
                cause: Box::new(cause),
                orphans,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canary_core::{EndpointConfiguration, ModelSpec};
    use canary_platform::{InMemoryPlatform, Operation};
    use std::collections::BTreeMap;

    async fn platform_with_model_and_config() -> InMemoryPlatform {
        let platform = InMemoryPlatform::new();
        platform
            .create_model(&ModelSpec {
                name: "m2".into(),
                image: "img".into(),
                model_data_url: "s3://b/k".into(),
                execution_role: "arn:aws:iam::1:role/r".into(),
                environment: BTreeMap::new(),
            })
            .await
            .unwrap();
        platform
            .create_endpoint_config(&EndpointConfiguration {
                name: "ec2".into(),
                variants: vec![canary_core::Variant {
                    name: "Canary".into(),
                    model_name: "m2".into(),
                    instance_count: 1,
                    instance_type: "ml.m5.large".into(),
                    weight: 1.0,
                }],
            })
            .await
            .unwrap();
        platform
    }

    fn ledger() -> Ledger {
        let mut ledger = Ledger::new();
        ledger.record(CreatedResource::Model("m2".into()));
        ledger.record(CreatedResource::EndpointConfig("ec2".into()));
        ledger
    }

    #[tokio::test]
    async fn unwind_deletes_newest_first() {
        let platform = platform_with_model_and_config().await;
        let remaining = ledger().unwind(&platform).await;

        assert!(remaining.is_empty());
        let deletes: Vec<_> = platform
            .calls()
            .into_iter()
            .filter(|c| matches!(c.operation, Operation::DeleteModel | Operation::DeleteEndpointConfig))
            .map(|c| c.operation)
            .collect();
        assert_eq!(deletes, vec![Operation::DeleteEndpointConfig, Operation::DeleteModel]);
        assert!(platform.model("m2").is_none());
    }

    #[tokio::test]
    async fn failed_delete_is_reported() {
        let platform = platform_with_model_and_config().await;
        platform.fail_on(Operation::DeleteModel, "AccessDenied");

        let remaining = ledger().unwind(&platform).await;
        assert_eq!(remaining, vec![CreatedResource::Model("m2".into())]);
    }

    #[tokio::test]
    async fn keep_policy_reports_orphans() {
        let platform = platform_with_model_and_config().await;
        let err = ledger()
            .settle(&platform, CleanupPolicy::Keep, false, RolloutError::Cancelled("ep".into()))
            .await;

        assert_eq!(err.orphans().len(), 2);
        assert!(matches!(err.cause(), RolloutError::Cancelled(_)));
        assert!(err.to_string().contains("left behind: model m2, endpoint config ec2"));
        assert_eq!(platform.call_count(Operation::DeleteModel), 0);
    }

    #[tokio::test]
    async fn in_flight_blocks_cleanup() {
        let platform = platform_with_model_and_config().await;
        let err = ledger()
            .settle(
                &platform,
                CleanupPolicy::DeleteCreated,
                true,
                RolloutError::Cancelled("ep".into()),
            )
            .await;

        assert_eq!(err.orphans().len(), 2);
        assert!(platform.endpoint_config("ec2").is_some());
    }

    #[tokio::test]
    async fn clean_unwind_returns_bare_cause() {
        let platform = platform_with_model_and_config().await;
        let err = ledger()
            .settle(
                &platform,
                CleanupPolicy::DeleteCreated,
                false,
                RolloutError::NoConfig("ep".into()),
            )
            .await;

        assert!(matches!(err, RolloutError::NoConfig(_)));
        assert!(platform.model_names().is_empty());
    }

    #[test]
    fn resource_serializes_tagged() {
        let json = serde_json::to_string(&CreatedResource::Model("m2".into())).unwrap();
        assert_eq!(json, r#"{"kind":"model","name":"m2"}"#);
    }
}
