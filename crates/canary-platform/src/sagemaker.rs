//! Amazon SageMaker backend.
//!
//! Wraps the AWS SDK control-plane and runtime clients. Credentials and
//! retry behavior come from the standard AWS provider chain; only the
//! region is set explicitly.

use std::collections::HashMap;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_sagemaker::Client;
use aws_sdk_sagemaker::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_sagemaker::types::{
    ContainerDefinition, ContainerMode, EndpointStatus as SdkEndpointStatus, ModelArtifacts,
    ProductionVariant, ProductionVariantInstanceType, SortBy, SortOrder, TrainingJobStatus,
    TrainingJobSummary,
};
use aws_sdk_sagemakerruntime::Client as RuntimeClient;
use aws_sdk_sagemakerruntime::primitives::Blob;
use tracing::debug;

use canary_core::config::DEFAULT_INSTANCE_TYPE;
use canary_core::{
    Endpoint, EndpointConfiguration, EndpointStatus, Invocation, InvokeRequest, ModelSpec,
    TrainingArtifact, Variant,
};

use crate::error::{PlatformError, PlatformResult};
use crate::plane::{ControlPlane, InferenceRuntime, Operation, PlatformFuture};

/// Control plane backed by the SageMaker API.
#[derive(Debug, Clone)]
pub struct SageMakerPlatform {
    client: Client,
}

impl SageMakerPlatform {
    /// Load AWS configuration from the environment and build a client
    /// for `region`.
    pub async fn connect(region: &str) -> Self {
        let config = load_config(region).await;
        debug!(region, "sagemaker client configured");
        Self::from_client(Client::new(&config))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

/// Inference runtime backed by the SageMaker runtime API.
#[derive(Debug, Clone)]
pub struct SageMakerRuntime {
    client: RuntimeClient,
}

impl SageMakerRuntime {
    pub async fn connect(region: &str) -> Self {
        let config = load_config(region).await;
        debug!(region, "sagemaker runtime client configured");
        Self::from_client(RuntimeClient::new(&config))
    }

    pub fn from_client(client: RuntimeClient) -> Self {
        Self { client }
    }
}

async fn load_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await
}

impl ControlPlane for SageMakerPlatform {
    fn describe_endpoint<'a>(&'a self, name: &'a str) -> PlatformFuture<'a, Endpoint> {
        Box::pin(async move {
            let op = Operation::DescribeEndpoint;
            let out = self
                .client
                .describe_endpoint()
                .endpoint_name(name)
                .send()
                .await
                .map_err(|e| service_error(op, "endpoint", name, e))?;

            let status = present::<&SdkEndpointStatus>(out.endpoint_status())
                .map(|s| EndpointStatus::from(s.as_str()))
                .ok_or_else(|| malformed(op, "missing EndpointStatus"))?;

            Ok(Endpoint {
                name: present::<&str>(out.endpoint_name()).unwrap_or(name).to_string(),
                config_name: present::<&str>(out.endpoint_config_name()).map(str::to_string),
                status,
                failure_reason: present::<&str>(out.failure_reason()).map(str::to_string),
            })
        })
    }

    fn describe_endpoint_config<'a>(
        &'a self,
        name: &'a str,
    ) -> PlatformFuture<'a, EndpointConfiguration> {
        Box::pin(async move {
            let op = Operation::DescribeEndpointConfig;
            let out = self
                .client
                .describe_endpoint_config()
                .endpoint_config_name(name)
                .send()
                .await
                .map_err(|e| service_error(op, "endpoint config", name, e))?;

            let variants = present::<&[ProductionVariant]>(out.production_variants())
                .unwrap_or_default()
                .iter()
                .map(|pv| variant_from_sdk(op, pv))
                .collect::<PlatformResult<Vec<_>>>()?;

            Ok(EndpointConfiguration {
                name: present::<&str>(out.endpoint_config_name()).unwrap_or(name).to_string(),
                variants,
            })
        })
    }

    fn create_model<'a>(&'a self, model: &'a ModelSpec) -> PlatformFuture<'a, ()> {
        Box::pin(async move {
            let op = Operation::CreateModel;
            let environment: HashMap<String, String> = model
                .environment
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let container = ContainerDefinition::builder()
                .image(&model.image)
                .mode(ContainerMode::SingleModel)
                .model_data_url(&model.model_data_url)
                .set_environment(Some(environment))
                .build();

            self.client
                .create_model()
                .model_name(&model.name)
                .primary_container(container)
                .execution_role_arn(&model.execution_role)
                .send()
                .await
                .map_err(|e| service_error(op, "model", &model.name, e))?;
            debug!(model = %model.name, "model created");
            Ok(())
        })
    }

    fn create_endpoint_config<'a>(
        &'a self,
        config: &'a EndpointConfiguration,
    ) -> PlatformFuture<'a, ()> {
        Box::pin(async move {
            let op = Operation::CreateEndpointConfig;
            let variants = config
                .variants
                .iter()
                .map(|v| variant_to_sdk(op, v))
                .collect::<PlatformResult<Vec<_>>>()?;

            self.client
                .create_endpoint_config()
                .endpoint_config_name(&config.name)
                .set_production_variants(Some(variants))
                .send()
                .await
                .map_err(|e| service_error(op, "endpoint config", &config.name, e))?;
            debug!(config = %config.name, "endpoint config created");
            Ok(())
        })
    }

    fn create_endpoint<'a>(
        &'a self,
        endpoint: &'a str,
        config_name: &'a str,
    ) -> PlatformFuture<'a, ()> {
        Box::pin(async move {
            self.client
                .create_endpoint()
                .endpoint_name(endpoint)
                .endpoint_config_name(config_name)
                .send()
                .await
                .map_err(|e| service_error(Operation::CreateEndpoint, "endpoint", endpoint, e))?;
            Ok(())
        })
    }

    fn update_endpoint<'a>(
        &'a self,
        endpoint: &'a str,
        config_name: &'a str,
    ) -> PlatformFuture<'a, ()> {
        Box::pin(async move {
            self.client
                .update_endpoint()
                .endpoint_name(endpoint)
                .endpoint_config_name(config_name)
                .send()
                .await
                .map_err(|e| service_error(Operation::UpdateEndpoint, "endpoint", endpoint, e))?;
            Ok(())
        })
    }

    fn delete_model<'a>(&'a self, name: &'a str) -> PlatformFuture<'a, ()> {
        Box::pin(async move {
            self.client
                .delete_model()
                .model_name(name)
                .send()
                .await
                .map_err(|e| service_error(Operation::DeleteModel, "model", name, e))?;
            Ok(())
        })
    }

    fn delete_endpoint_config<'a>(&'a self, name: &'a str) -> PlatformFuture<'a, ()> {
        Box::pin(async move {
            self.client
                .delete_endpoint_config()
                .endpoint_config_name(name)
                .send()
                .await
                .map_err(|e| {
                    service_error(Operation::DeleteEndpointConfig, "endpoint config", name, e)
                })?;
            Ok(())
        })
    }

    fn delete_endpoint<'a>(&'a self, name: &'a str) -> PlatformFuture<'a, ()> {
        Box::pin(async move {
            self.client
                .delete_endpoint()
                .endpoint_name(name)
                .send()
                .await
                .map_err(|e| service_error(Operation::DeleteEndpoint, "endpoint", name, e))?;
            Ok(())
        })
    }

    fn latest_training_artifact<'a>(
        &'a self,
        name_contains: Option<&'a str>,
    ) -> PlatformFuture<'a, TrainingArtifact> {
        Box::pin(async move {
            let op = Operation::ListTrainingJobs;
            let filter = name_contains.unwrap_or("*");
            let listed = self
                .client
                .list_training_jobs()
                .sort_by(SortBy::CreationTime)
                .sort_order(SortOrder::Descending)
                .status_equals(TrainingJobStatus::Completed)
                .set_name_contains(name_contains.map(str::to_string))
                .max_results(1)
                .send()
                .await
                .map_err(|e| service_error(op, "training job", filter, e))?;
            let job_name = present::<&[TrainingJobSummary]>(listed.training_job_summaries())
                .unwrap_or_default()
                .first()
                .and_then(|job| present::<&str>(job.training_job_name()))
                .map(str::to_string)
                .ok_or_else(|| PlatformError::NotFound {
                    resource: "completed training job",
                    name: filter.to_string(),
                })?;

            let op = Operation::DescribeTrainingJob;
            let described = self
                .client
                .describe_training_job()
                .training_job_name(&job_name)
                .send()
                .await
                .map_err(|e| service_error(op, "training job", &job_name, e))?;
            let model_artifact = present::<&ModelArtifacts>(described.model_artifacts())
                .and_then(|a| present::<&str>(a.s3_model_artifacts()))
                .ok_or_else(|| malformed(op, &format!("{job_name} has no model artifacts")))?
                .to_string();
            debug!(job = %job_name, artifact = %model_artifact, "latest training job");

            Ok(TrainingArtifact {
                job_name,
                model_artifact,
            })
        })
    }
}

impl InferenceRuntime for SageMakerRuntime {
    fn invoke<'a>(&'a self, request: &'a InvokeRequest) -> PlatformFuture<'a, Invocation> {
        Box::pin(async move {
            let op = Operation::InvokeEndpoint;
            let out = self
                .client
                .invoke_endpoint()
                .endpoint_name(&request.endpoint)
                .content_type(&request.content_type)
                .accept(&request.accept)
                .set_target_variant(request.target_variant.clone())
                .body(Blob::new(request.body.as_bytes()))
                .send()
                .await
                .map_err(|e| service_error(op, "endpoint", &request.endpoint, e))?;

            let bytes = present::<&Blob>(out.body())
                .map(|b| b.as_ref().to_vec())
                .unwrap_or_default();
            let body = String::from_utf8(bytes)
                .map_err(|_| malformed(op, "response body is not UTF-8"))?;
            Ok(Invocation {
                invoked_variant: present::<&str>(out.invoked_production_variant())
                    .map(str::to_string),
                content_type: present::<&str>(out.content_type()).map(str::to_string),
                body,
            })
        })
    }
}

/// Normalize an SDK getter to `Option`. Required output members are
/// generated as plain references, optional ones as `Option`.
fn present<T>(value: impl Into<Option<T>>) -> Option<T> {
    value.into()
}

fn variant_from_sdk(op: Operation, pv: &ProductionVariant) -> PlatformResult<Variant> {
    let name = present::<&str>(pv.variant_name())
        .ok_or_else(|| malformed(op, "production variant without VariantName"))?;
    let model_name = present::<&str>(pv.model_name())
        .ok_or_else(|| malformed(op, &format!("variant {name} has no ModelName")))?;
    let instance_count = present::<i32>(pv.initial_instance_count())
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(1);
    let instance_type = present::<&ProductionVariantInstanceType>(pv.instance_type())
        .map(|t| t.as_str().to_string())
        .unwrap_or_else(|| DEFAULT_INSTANCE_TYPE.to_string());
    let weight = present::<f32>(pv.initial_variant_weight()).map(f64::from).unwrap_or(1.0);

    Ok(Variant {
        name: name.to_string(),
        model_name: model_name.to_string(),
        instance_count,
        instance_type,
        weight,
    })
}

fn variant_to_sdk(op: Operation, variant: &Variant) -> PlatformResult<ProductionVariant> {
    let instance_count = i32::try_from(variant.instance_count)
        .map_err(|_| malformed(op, &format!("instance count {} too large", variant.instance_count)))?;
    Ok(ProductionVariant::builder()
        .variant_name(&variant.name)
        .model_name(&variant.model_name)
        .initial_instance_count(instance_count)
        .instance_type(ProductionVariantInstanceType::from(variant.instance_type.as_str()))
        .initial_variant_weight(variant.weight as f32)
        .build())
}

fn service_error<E, R>(
    operation: Operation,
    resource: &'static str,
    name: &str,
    err: SdkError<E, R>,
) -> PlatformError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let message = err.message().unwrap_or_default();
    if message.contains("Could not find") {
        return PlatformError::NotFound {
            resource,
            name: name.to_string(),
        };
    }
    if message.contains("already existing") || message.contains("already exists") {
        return PlatformError::AlreadyExists {
            resource,
            name: name.to_string(),
        };
    }
    match err.code() {
        Some("ValidationException") => PlatformError::Rejected {
            operation,
            message: message.to_string(),
        },
        _ => PlatformError::Service {
            operation,
            message: DisplayErrorContext(&err).to_string(),
        },
    }
}

fn malformed(operation: Operation, detail: &str) -> PlatformError {
    PlatformError::Malformed {
        operation,
        detail: detail.to_string(),
    }
}
