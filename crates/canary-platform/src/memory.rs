//! In-process control plane with scripted endpoint statuses.
//!
//! Mirrors the platform's observable behavior closely enough to drive
//! rollouts end to end: updates are accepted immediately and the endpoint
//! then walks through whatever statuses were scripted for it, either
//! immediately ([`InMemoryPlatform::script_statuses`]), from the next
//! update on ([`InMemoryPlatform::script_update`]) or from creation
//! ([`InMemoryPlatform::script_create`]). Reaching
//! `InService` swaps in the pending configuration; reaching `Failed` or
//! `RollingBack` keeps the previous one. Without a script, a
//! transitioning endpoint converges to `InService` on the next describe.
//!
//! Invocations are answered per model with [`InMemoryPlatform::set_prediction`].

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::ready;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use canary_core::{
    Endpoint, EndpointConfiguration, EndpointStatus, Invocation, InvokeRequest, ModelSpec,
    TrainingArtifact, Variant, JSON_CONTENT_TYPE,
};

use crate::error::{PlatformError, PlatformResult};
use crate::plane::{ControlPlane, InferenceRuntime, Operation, PlatformFuture};

/// One recorded control-plane call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: Operation,
    /// Primary resource name the call targeted.
    pub target: String,
}

#[derive(Debug)]
struct EndpointSlot {
    config_name: Option<String>,
    pending_config: Option<String>,
    status: EndpointStatus,
    failure_reason: Option<String>,
    script: VecDeque<EndpointStatus>,
    /// Script armed by the next update or create request.
    on_update: Option<VecDeque<EndpointStatus>>,
    /// Never converge on its own; only the script moves the status.
    held: bool,
}

impl EndpointSlot {
    fn snapshot(&self, name: &str) -> Endpoint {
        Endpoint {
            name: name.to_string(),
            config_name: self.config_name.clone(),
            status: self.status.clone(),
            failure_reason: self.failure_reason.clone(),
        }
    }

    /// Move to the next status and apply its side effects.
    fn step(&mut self) {
        let next = match self.script.pop_front() {
            Some(status) => status,
            None if self.held => return,
            None => match self.status {
                EndpointStatus::Creating
                | EndpointStatus::Updating
                | EndpointStatus::SystemUpdating => EndpointStatus::InService,
                _ => return,
            },
        };

        match next {
            EndpointStatus::InService => {
                if let Some(config) = self.pending_config.take() {
                    self.config_name = Some(config);
                }
                self.failure_reason = None;
            }
            EndpointStatus::Failed => {
                self.pending_config = None;
                self.failure_reason = Some("scripted failure".to_string());
            }
            EndpointStatus::RollingBack => {
                self.pending_config = None;
            }
            _ => {}
        }
        self.status = next;
    }
}

#[derive(Debug, Default)]
struct State {
    endpoints: HashMap<String, EndpointSlot>,
    configs: BTreeMap<String, EndpointConfiguration>,
    models: BTreeMap<String, ModelSpec>,
    calls: Vec<Call>,
    failures: HashMap<Operation, String>,
    /// Scripts for endpoints that don't exist yet.
    create_scripts: HashMap<String, VecDeque<EndpointStatus>>,
    /// Oldest first.
    training_jobs: Vec<TrainingJob>,
    /// Response body per model name.
    predictions: HashMap<String, String>,
}

#[derive(Debug)]
struct TrainingJob {
    name: String,
    completed: bool,
    model_artifact: String,
}

/// Answer for models without a configured prediction.
const DEFAULT_PREDICTION: &str = "0.0";

impl State {
    fn record(&mut self, operation: Operation, target: &str) -> PlatformResult<()> {
        self.calls.push(Call {
            operation,
            target: target.to_string(),
        });
        match self.failures.remove(&operation) {
            Some(message) => Err(PlatformError::Service { operation, message }),
            None => Ok(()),
        }
    }

    fn endpoint_mut(&mut self, name: &str) -> PlatformResult<&mut EndpointSlot> {
        self.endpoints
            .get_mut(name)
            .ok_or_else(|| not_found("endpoint", name))
    }
}

/// Control plane held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryPlatform {
    state: Mutex<State>,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Register an `InService` endpoint serving `config`. Models the
    /// variants reference are registered too.
    pub fn seed_endpoint(&self, endpoint: &str, config: EndpointConfiguration) {
        self.with_state(|state| {
            for variant in &config.variants {
                state
                    .models
                    .entry(variant.model_name.clone())
                    .or_insert_with(|| ModelSpec {
                        name: variant.model_name.clone(),
                        image: "seeded".to_string(),
                        model_data_url: "s3://seeded/model.tar.gz".to_string(),
                        execution_role: "arn:aws:iam::000000000000:role/seeded".to_string(),
                        environment: BTreeMap::new(),
                    });
            }
            state.endpoints.insert(
                endpoint.to_string(),
                EndpointSlot {
                    config_name: Some(config.name.clone()),
                    pending_config: None,
                    status: EndpointStatus::InService,
                    failure_reason: None,
                    script: VecDeque::new(),
                    on_update: None,
                    held: false,
                },
            );
            state.configs.insert(config.name.clone(), config);
        });
    }

    /// Statuses the endpoint reports on its next describes, in order.
    pub fn script_statuses(
        &self,
        endpoint: &str,
        statuses: impl IntoIterator<Item = EndpointStatus>,
    ) {
        self.with_state(|state| {
            if let Some(slot) = state.endpoints.get_mut(endpoint) {
                slot.script = statuses.into_iter().collect();
            }
        });
    }

    /// Statuses the endpoint reports once the next update is accepted.
    pub fn script_update(
        &self,
        endpoint: &str,
        statuses: impl IntoIterator<Item = EndpointStatus>,
    ) {
        self.with_state(|state| {
            if let Some(slot) = state.endpoints.get_mut(endpoint) {
                slot.on_update = Some(statuses.into_iter().collect());
            }
        });
    }

    /// Statuses a not-yet-created endpoint reports once it is created.
    pub fn script_create(
        &self,
        endpoint: &str,
        statuses: impl IntoIterator<Item = EndpointStatus>,
    ) {
        self.with_state(|state| {
            state
                .create_scripts
                .insert(endpoint.to_string(), statuses.into_iter().collect());
        });
    }

    /// Force the endpoint's current status and stop it converging.
    pub fn hold_status(&self, endpoint: &str, status: EndpointStatus) {
        self.with_state(|state| {
            if let Some(slot) = state.endpoints.get_mut(endpoint) {
                slot.status = status;
                slot.held = true;
            }
        });
    }

    /// Make the next call to `operation` fail with a service error.
    pub fn fail_on(&self, operation: Operation, message: &str) {
        self.with_state(|state| {
            state.failures.insert(operation, message.to_string());
        });
    }

    /// Register a training job; later registrations are newer.
    pub fn seed_training_job(&self, name: &str, model_artifact: &str, completed: bool) {
        self.with_state(|state| {
            state.training_jobs.push(TrainingJob {
                name: name.to_string(),
                completed,
                model_artifact: model_artifact.to_string(),
            });
        });
    }

    /// Body returned when a variant serving `model` is invoked.
    pub fn set_prediction(&self, model: &str, body: &str) {
        self.with_state(|state| {
            state.predictions.insert(model.to_string(), body.to_string());
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.with_state(|state| state.calls.clone())
    }

    pub fn call_count(&self, operation: Operation) -> usize {
        self.with_state(|state| {
            state
                .calls
                .iter()
                .filter(|c| c.operation == operation)
                .count()
        })
    }

    /// Current endpoint state, without advancing any script.
    pub fn endpoint(&self, name: &str) -> Option<Endpoint> {
        self.with_state(|state| state.endpoints.get(name).map(|slot| slot.snapshot(name)))
    }

    pub fn endpoint_config(&self, name: &str) -> Option<EndpointConfiguration> {
        self.with_state(|state| state.configs.get(name).cloned())
    }

    pub fn model(&self, name: &str) -> Option<ModelSpec> {
        self.with_state(|state| state.models.get(name).cloned())
    }

    pub fn model_names(&self) -> Vec<String> {
        self.with_state(|state| state.models.keys().cloned().collect())
    }

    pub fn config_names(&self) -> Vec<String> {
        self.with_state(|state| state.configs.keys().cloned().collect())
    }
}

impl ControlPlane for InMemoryPlatform {
    fn describe_endpoint<'a>(&'a self, name: &'a str) -> PlatformFuture<'a, Endpoint> {
        let result = self.with_state(|state| {
            state.record(Operation::DescribeEndpoint, name)?;
            let slot = state.endpoint_mut(name)?;
            slot.step();
            Ok(slot.snapshot(name))
        });
        Box::pin(ready(result))
    }

    fn describe_endpoint_config<'a>(
        &'a self,
        name: &'a str,
    ) -> PlatformFuture<'a, EndpointConfiguration> {
        let result = self.with_state(|state| {
            state.record(Operation::DescribeEndpointConfig, name)?;
            state
                .configs
                .get(name)
                .cloned()
                .ok_or_else(|| not_found("endpoint config", name))
        });
        Box::pin(ready(result))
    }

    fn create_model<'a>(&'a self, model: &'a ModelSpec) -> PlatformFuture<'a, ()> {
        let result = self.with_state(|state| {
            state.record(Operation::CreateModel, &model.name)?;
            if state.models.contains_key(&model.name) {
                return Err(already_exists("model", &model.name));
            }
            state.models.insert(model.name.clone(), model.clone());
            debug!(model = %model.name, "model created");
            Ok(())
        });
        Box::pin(ready(result))
    }

    fn create_endpoint_config<'a>(
        &'a self,
        config: &'a EndpointConfiguration,
    ) -> PlatformFuture<'a, ()> {
        let result = self.with_state(|state| {
            state.record(Operation::CreateEndpointConfig, &config.name)?;
            if state.configs.contains_key(&config.name) {
                return Err(already_exists("endpoint config", &config.name));
            }
            if config.variants.is_empty() {
                return Err(rejected(
                    Operation::CreateEndpointConfig,
                    "at least one production variant is required",
                ));
            }
            if let Some(missing) = config
                .variants
                .iter()
                .find(|v| !state.models.contains_key(&v.model_name))
            {
                return Err(rejected(
                    Operation::CreateEndpointConfig,
                    &format!("Could not find model \"{}\"", missing.model_name),
                ));
            }
            for (i, variant) in config.variants.iter().enumerate() {
                if config.variants[..i].iter().any(|v| v.name == variant.name) {
                    return Err(rejected(
                        Operation::CreateEndpointConfig,
                        &format!("duplicate variant name {}", variant.name),
                    ));
                }
                if !(0.0..=1.0).contains(&variant.weight) {
                    return Err(rejected(
                        Operation::CreateEndpointConfig,
                        &format!("variant weight {} out of range", variant.weight),
                    ));
                }
            }
            state.configs.insert(config.name.clone(), config.clone());
            debug!(config = %config.name, variants = config.variants.len(), "endpoint config created");
            Ok(())
        });
        Box::pin(ready(result))
    }

    fn create_endpoint<'a>(
        &'a self,
        endpoint: &'a str,
        config_name: &'a str,
    ) -> PlatformFuture<'a, ()> {
        let result = self.with_state(|state| {
            state.record(Operation::CreateEndpoint, endpoint)?;
            if state.endpoints.contains_key(endpoint) {
                return Err(already_exists("endpoint", endpoint));
            }
            if !state.configs.contains_key(config_name) {
                return Err(not_found("endpoint config", config_name));
            }
            let script = state.create_scripts.remove(endpoint).unwrap_or_default();
            state.endpoints.insert(
                endpoint.to_string(),
                EndpointSlot {
                    config_name: Some(config_name.to_string()),
                    pending_config: None,
                    status: EndpointStatus::Creating,
                    failure_reason: None,
                    script,
                    on_update: None,
                    held: false,
                },
            );
            Ok(())
        });
        Box::pin(ready(result))
    }

    fn update_endpoint<'a>(
        &'a self,
        endpoint: &'a str,
        config_name: &'a str,
    ) -> PlatformFuture<'a, ()> {
        let result = self.with_state(|state| {
            state.record(Operation::UpdateEndpoint, endpoint)?;
            if !state.configs.contains_key(config_name) {
                return Err(not_found("endpoint config", config_name));
            }
            let slot = state.endpoint_mut(endpoint)?;
            if !matches!(slot.status, EndpointStatus::InService | EndpointStatus::Failed) {
                return Err(rejected(
                    Operation::UpdateEndpoint,
                    &format!("Cannot update in-progress endpoint (status {})", slot.status),
                ));
            }
            slot.pending_config = Some(config_name.to_string());
            slot.status = EndpointStatus::Updating;
            slot.failure_reason = None;
            if let Some(script) = slot.on_update.take() {
                slot.script = script;
            }
            Ok(())
        });
        Box::pin(ready(result))
    }

    fn delete_model<'a>(&'a self, name: &'a str) -> PlatformFuture<'a, ()> {
        let result = self.with_state(|state| {
            state.record(Operation::DeleteModel, name)?;
            state
                .models
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| not_found("model", name))
        });
        Box::pin(ready(result))
    }

    fn delete_endpoint_config<'a>(&'a self, name: &'a str) -> PlatformFuture<'a, ()> {
        let result = self.with_state(|state| {
            state.record(Operation::DeleteEndpointConfig, name)?;
            state
                .configs
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| not_found("endpoint config", name))
        });
        Box::pin(ready(result))
    }

    fn delete_endpoint<'a>(&'a self, name: &'a str) -> PlatformFuture<'a, ()> {
        let result = self.with_state(|state| {
            state.record(Operation::DeleteEndpoint, name)?;
            state
                .endpoints
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| not_found("endpoint", name))
        });
        Box::pin(ready(result))
    }

    fn latest_training_artifact<'a>(
        &'a self,
        name_contains: Option<&'a str>,
    ) -> PlatformFuture<'a, TrainingArtifact> {
        let result = self.with_state(|state| {
            state.record(Operation::ListTrainingJobs, name_contains.unwrap_or("*"))?;
            let (name, model_artifact) = state
                .training_jobs
                .iter()
                .rev()
                .filter(|job| job.completed)
                .find(|job| name_contains.is_none_or(|needle| job.name.contains(needle)))
                .map(|job| (job.name.clone(), job.model_artifact.clone()))
                .ok_or_else(|| {
                    not_found("completed training job", name_contains.unwrap_or("*"))
                })?;
            state.record(Operation::DescribeTrainingJob, &name)?;
            Ok(TrainingArtifact {
                job_name: name,
                model_artifact,
            })
        });
        Box::pin(ready(result))
    }
}

impl InferenceRuntime for InMemoryPlatform {
    fn invoke<'a>(&'a self, request: &'a InvokeRequest) -> PlatformFuture<'a, Invocation> {
        let result = self.with_state(|state| {
            let op = Operation::InvokeEndpoint;
            state.record(op, &request.endpoint)?;
            let slot = state
                .endpoints
                .get(&request.endpoint)
                .ok_or_else(|| not_found("endpoint", &request.endpoint))?;
            let serving = matches!(
                slot.status,
                EndpointStatus::InService
                    | EndpointStatus::Updating
                    | EndpointStatus::SystemUpdating
                    | EndpointStatus::RollingBack
            );
            let config = slot
                .config_name
                .as_ref()
                .filter(|_| serving)
                .and_then(|name| state.configs.get(name))
                .ok_or_else(|| {
                    rejected(op, &format!("Endpoint {} is not serving", request.endpoint))
                })?;

            let variant = match &request.target_variant {
                Some(target) => config
                    .variants
                    .iter()
                    .find(|v| &v.name == target)
                    .ok_or_else(|| rejected(op, &format!("variant {target} not found")))?,
                None => heaviest(&config.variants)
                    .ok_or_else(|| rejected(op, "endpoint config has no variants"))?,
            };
            let body = state
                .predictions
                .get(&variant.model_name)
                .cloned()
                .unwrap_or_else(|| DEFAULT_PREDICTION.to_string());
            Ok(Invocation {
                invoked_variant: Some(variant.name.clone()),
                content_type: Some(JSON_CONTENT_TYPE.to_string()),
                body,
            })
        });
        Box::pin(ready(result))
    }
}

/// The variant taking the most traffic; the first on ties.
fn heaviest(variants: &[Variant]) -> Option<&Variant> {
    variants
        .iter()
        .fold(None, |best: Option<&Variant>, v| match best {
            Some(b) if b.weight >= v.weight => Some(b),
            _ => Some(v),
        })
}

fn not_found(resource: &'static str, name: &str) -> PlatformError {
    PlatformError::NotFound {
        resource,
        name: name.to_string(),
    }
}

fn already_exists(resource: &'static str, name: &str) -> PlatformError {
    PlatformError::AlreadyExists {
        resource,
        name: name.to_string(),
    }
}

fn rejected(operation: Operation, message: &str) -> PlatformError {
    PlatformError::Rejected {
        operation,
        message: message.to_string(),
    }
}
