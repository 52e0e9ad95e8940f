//! The control-plane trait shared by all backends.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use canary_core::{
    Endpoint, EndpointConfiguration, Invocation, InvokeRequest, ModelSpec, TrainingArtifact,
};

use crate::error::PlatformResult;

/// Boxed future returned by [`ControlPlane`] methods.
pub type PlatformFuture<'a, T> = Pin<Box<dyn Future<Output = PlatformResult<T>> + Send + 'a>>;

/// A control-plane API call, named after the platform action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    DescribeEndpoint,
    DescribeEndpointConfig,
    CreateModel,
    CreateEndpointConfig,
    CreateEndpoint,
    UpdateEndpoint,
    DeleteModel,
    DeleteEndpointConfig,
    DeleteEndpoint,
    ListTrainingJobs,
    DescribeTrainingJob,
    InvokeEndpoint,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::DescribeEndpoint => "DescribeEndpoint",
            Operation::DescribeEndpointConfig => "DescribeEndpointConfig",
            Operation::CreateModel => "CreateModel",
            Operation::CreateEndpointConfig => "CreateEndpointConfig",
            Operation::CreateEndpoint => "CreateEndpoint",
            Operation::UpdateEndpoint => "UpdateEndpoint",
            Operation::DeleteModel => "DeleteModel",
            Operation::DeleteEndpointConfig => "DeleteEndpointConfig",
            Operation::DeleteEndpoint => "DeleteEndpoint",
            Operation::ListTrainingJobs => "ListTrainingJobs",
            Operation::DescribeTrainingJob => "DescribeTrainingJob",
            Operation::InvokeEndpoint => "InvokeEndpoint",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Describe/create/update/delete access to endpoints, endpoint
/// configurations and models.
///
/// Updates are asynchronous on the platform side: `update_endpoint` and
/// `create_endpoint` return once the request is accepted, and callers
/// observe progress through `describe_endpoint`.
pub trait ControlPlane: Send + Sync {
    fn describe_endpoint<'a>(&'a self, name: &'a str) -> PlatformFuture<'a, Endpoint>;

    fn describe_endpoint_config<'a>(
        &'a self,
        name: &'a str,
    ) -> PlatformFuture<'a, EndpointConfiguration>;

    fn create_model<'a>(&'a self, model: &'a ModelSpec) -> PlatformFuture<'a, ()>;

    fn create_endpoint_config<'a>(
        &'a self,
        config: &'a EndpointConfiguration,
    ) -> PlatformFuture<'a, ()>;

    fn create_endpoint<'a>(
        &'a self,
        endpoint: &'a str,
        config_name: &'a str,
    ) -> PlatformFuture<'a, ()>;

    /// Point `endpoint` at `config_name`.
    fn update_endpoint<'a>(
        &'a self,
        endpoint: &'a str,
        config_name: &'a str,
    ) -> PlatformFuture<'a, ()>;

    fn delete_model<'a>(&'a self, name: &'a str) -> PlatformFuture<'a, ()>;

    fn delete_endpoint_config<'a>(&'a self, name: &'a str) -> PlatformFuture<'a, ()>;

    fn delete_endpoint<'a>(&'a self, name: &'a str) -> PlatformFuture<'a, ()>;

    /// Artifact of the newest completed training job, optionally only
    /// among jobs whose name contains `name_contains`.
    fn latest_training_artifact<'a>(
        &'a self,
        name_contains: Option<&'a str>,
    ) -> PlatformFuture<'a, TrainingArtifact>;
}

/// Data-plane access: send one request to a live endpoint.
pub trait InferenceRuntime: Send + Sync {
    fn invoke<'a>(&'a self, request: &'a InvokeRequest) -> PlatformFuture<'a, Invocation>;
}

impl<T: InferenceRuntime + ?Sized> InferenceRuntime for Arc<T> {
    fn invoke<'a>(&'a self, request: &'a InvokeRequest) -> PlatformFuture<'a, Invocation> {
        (**self).invoke(request)
    }
}

impl<T: ControlPlane + ?Sized> ControlPlane for Arc<T> {
    fn describe_endpoint<'a>(&'a self, name: &'a str) -> PlatformFuture<'a, Endpoint> {
        (**self).describe_endpoint(name)
    }

    fn describe_endpoint_config<'a>(
        &'a self,
        name: &'a str,
    ) -> PlatformFuture<'a, EndpointConfiguration> {
        (**self).describe_endpoint_config(name)
    }

    fn create_model<'a>(&'a self, model: &'a ModelSpec) -> PlatformFuture<'a, ()> {
        (**self).create_model(model)
    }

    fn create_endpoint_config<'a>(
        &'a self,
        config: &'a EndpointConfiguration,
    ) -> PlatformFuture<'a, ()> {
        (**self).create_endpoint_config(config)
    }

    fn create_endpoint<'a>(
        &'a self,
        endpoint: &'a str,
        config_name: &'a str,
    ) -> PlatformFuture<'a, ()> {
        (**self).create_endpoint(endpoint, config_name)
    }

    fn update_endpoint<'a>(
        &'a self,
        endpoint: &'a str,
        config_name: &'a str,
    ) -> PlatformFuture<'a, ()> {
        (**self).update_endpoint(endpoint, config_name)
    }

    fn delete_model<'a>(&'a self, name: &'a str) -> PlatformFuture<'a, ()> {
        (**self).delete_model(name)
    }

    fn delete_endpoint_config<'a>(&'a self, name: &'a str) -> PlatformFuture<'a, ()> {
        (**self).delete_endpoint_config(name)
    }

    fn delete_endpoint<'a>(&'a self, name: &'a str) -> PlatformFuture<'a, ()> {
        (**self).delete_endpoint(name)
    }

    fn latest_training_artifact<'a>(
        &'a self,
        name_contains: Option<&'a str>,
    ) -> PlatformFuture<'a, TrainingArtifact> {
        (**self).latest_training_artifact(name_contains)
    }
}
