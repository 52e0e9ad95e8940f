//! Endpoint lifecycle around rolls: first deploy, teardown, status.

use std::collections::BTreeMap;

use tokio::sync::watch;
use tracing::{info, warn};

use canary_core::image::resolve_image;
use canary_core::{
    DeployConfig, Endpoint, EndpointConfiguration, EndpointStatus, ModelSpec, NameGenerator,
    Variant,
};
use canary_platform::{ControlPlane, PlatformError};

use crate::error::{RolloutError, RolloutResult};
use crate::ledger::{CreatedResource, Ledger};
use crate::poller::{ensure_running, wait_for_terminal};
use crate::strategy::{CleanupPolicy, PollPolicy};
use crate::unique::create_fresh;

/// Result of a successful first deploy.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DeploySummary {
    pub endpoint: String,
    pub model: String,
    pub endpoint_config: String,
    pub status: EndpointStatus,
}

/// Endpoint status plus the variants it currently serves.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EndpointReport {
    #[serde(flatten)]
    pub endpoint: Endpoint,
    pub variants: Vec<Variant>,
}

/// What a teardown removed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TeardownSummary {
    pub endpoint: String,
    pub deleted_config: Option<String>,
}

/// Create a single-variant endpoint serving a new model and wait for it
/// to come up.
pub async fn deploy<P: ControlPlane + ?Sized>(
    platform: &P,
    config: &DeployConfig,
    names: &NameGenerator,
    poll: &PollPolicy,
    cleanup: CleanupPolicy,
    shutdown: &mut watch::Receiver<bool>,
) -> RolloutResult<DeploySummary> {
    let endpoint = &config.endpoint_name;
    match platform.describe_endpoint(endpoint).await {
        Ok(_) => {
            return Err(PlatformError::AlreadyExists {
                resource: "endpoint",
                name: endpoint.clone(),
            }
            .into());
        }
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e.into()),
    }
    let image = resolve_image(config.image_uri.as_deref(), &config.region)?;
    info!(endpoint = %endpoint, instance_type = %config.instance_type, "deploying endpoint");

    let mut ledger = Ledger::new();
    let mut in_flight = false;
    let result: RolloutResult<DeploySummary> = async {
        ensure_running(shutdown, endpoint)?;
        let template = ModelSpec {
            name: String::new(),
            image,
            model_data_url: config.model_artifact.to_string(),
            execution_role: config.execution_role.clone(),
            environment: BTreeMap::new(),
        };
        let model_name = create_fresh(
            || names.model_name(endpoint),
            |name| {
                let model = ModelSpec {
                    name,
                    ..template.clone()
                };
                async move { platform.create_model(&model).await }
            },
        )
        .await?;
        ledger.record(CreatedResource::Model(model_name.clone()));

        let variant = Variant {
            name: config.variant_name.clone(),
            model_name: model_name.clone(),
            instance_count: config.instance_count,
            instance_type: config.instance_type.clone(),
            weight: 1.0,
        };
        ensure_running(shutdown, endpoint)?;
        let config_name = create_fresh(
            || names.deploy_config_name(endpoint),
            |name| {
                let endpoint_config = EndpointConfiguration {
                    name,
                    variants: vec![variant.clone()],
                };
                async move { platform.create_endpoint_config(&endpoint_config).await }
            },
        )
        .await?;
        ledger.record(CreatedResource::EndpointConfig(config_name.clone()));

        ensure_running(shutdown, endpoint)?;
        platform.create_endpoint(endpoint, &config_name).await?;
        ledger.record(CreatedResource::Endpoint(endpoint.clone()));
        in_flight = true;

        let outcome = wait_for_terminal(platform, endpoint, poll, shutdown).await?;
        in_flight = false;
        if !outcome.endpoint.status.is_success() {
            return Err(RolloutError::UpdateFailed {
                endpoint: endpoint.clone(),
                status: outcome.endpoint.status,
                reason: outcome.endpoint.failure_reason,
            });
        }

        Ok(DeploySummary {
            endpoint: endpoint.clone(),
            model: model_name,
            endpoint_config: config_name,
            status: outcome.endpoint.status,
        })
    }
    .await;

    match result {
        Ok(summary) => {
            info!(endpoint = %endpoint, "endpoint in service");
            Ok(summary)
        }
        Err(cause) => {
            warn!(endpoint = %endpoint, error = %cause, "deploy failed");
            Err(ledger.settle(platform, cleanup, in_flight, cause).await)
        }
    }
}

/// Delete an endpoint and, when asked, the configuration it was serving.
pub async fn teardown<P: ControlPlane + ?Sized>(
    platform: &P,
    endpoint: &str,
    delete_config: bool,
) -> RolloutResult<TeardownSummary> {
    let config_name = if delete_config {
        platform.describe_endpoint(endpoint).await?.config_name
    } else {
        None
    };

    info!(endpoint, "deleting endpoint");
    platform.delete_endpoint(endpoint).await?;

    if let Some(name) = &config_name {
        info!(config = %name, "deleting endpoint config");
        platform.delete_endpoint_config(name).await?;
    }

    Ok(TeardownSummary {
        endpoint: endpoint.to_string(),
        deleted_config: config_name,
    })
}

/// Describe an endpoint and the variants of its current configuration.
pub async fn describe<P: ControlPlane + ?Sized>(
    platform: &P,
    endpoint: &str,
) -> RolloutResult<EndpointReport> {
    let current = platform.describe_endpoint(endpoint).await?;
    let variants = match &current.config_name {
        Some(name) => platform.describe_endpoint_config(name).await?.variants,
        None => Vec::new(),
    };
    Ok(EndpointReport {
        endpoint: current,
        variants,
    })
}
