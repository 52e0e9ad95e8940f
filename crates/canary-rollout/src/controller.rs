//! Canary roll controller. Shifts a slice of endpoint traffic onto a
//! new model.
//!
//! A roll never edits the live configuration. It creates a fresh model
//! and a fresh two-variant configuration, repoints the endpoint at it,
//! and waits for the platform to settle the endpoint.

use std::collections::BTreeMap;

use tokio::sync::watch;
use tracing::{info, warn};

use canary_core::image::resolve_image;
use canary_core::{
    EndpointConfiguration, EndpointStatus, ModelSpec, NameGenerator, RollConfig, Variant,
};
use canary_platform::ControlPlane;

use crate::error::{RolloutError, RolloutResult};
use crate::ledger::{CreatedResource, Ledger};
use crate::plan::plan_variants;
use crate::poller::{ensure_running, wait_for_terminal};
use crate::strategy::{CleanupPolicy, PollPolicy};
use crate::unique::create_fresh;

/// Outcome of a successful roll, printed for the operator.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RollSummary {
    pub new_model: String,
    pub endpoint_config: String,
    pub canary_weight: f64,
}

/// What preflight learned about the endpoint.
#[derive(Debug)]
struct LiveState {
    variant: Variant,
    image: String,
}

/// Drives one canary roll against a control plane.
pub struct CanaryRoll<P> {
    platform: P,
    config: RollConfig,
    poll: PollPolicy,
    cleanup: CleanupPolicy,
    names: NameGenerator,
}

impl<P: ControlPlane> CanaryRoll<P> {
    /// Create a roll with default polling, no cleanup, and the
    /// process-wide name generator.
    pub fn new(platform: P, config: RollConfig) -> Self {
        Self {
            platform,
            config,
            poll: PollPolicy::default(),
            cleanup: CleanupPolicy::default(),
            names: NameGenerator::shared(),
        }
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_cleanup(mut self, cleanup: CleanupPolicy) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn with_names(mut self, names: NameGenerator) -> Self {
        self.names = names;
        self
    }

    pub fn config(&self) -> &RollConfig {
        &self.config
    }

    /// Run the roll to completion.
    ///
    /// Nothing is created until preflight passes. After that, any failure
    /// hands the created resources to the cleanup policy.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> RolloutResult<RollSummary> {
        let endpoint = &self.config.endpoint_name;
        info!(
            endpoint = %endpoint,
            weight = %self.config.canary_weight,
            canary = %self.config.new_variant,
            "starting canary roll"
        );

        let live = self.preflight().await?;

        let mut ledger = Ledger::new();
        let mut in_flight = false;
        match self
            .apply(&live, &mut ledger, &mut in_flight, &mut shutdown)
            .await
        {
            Ok(summary) => {
                info!(
                    endpoint = %endpoint,
                    model = %summary.new_model,
                    config = %summary.endpoint_config,
                    "canary roll completed"
                );
                Ok(summary)
            }
            Err(cause) => {
                warn!(endpoint = %endpoint, error = %cause, "canary roll failed");
                Err(ledger
                    .settle(&self.platform, self.cleanup, in_flight, cause)
                    .await)
            }
        }
    }

    /// Check the endpoint can take a roll and find its live variant.
    async fn preflight(&self) -> RolloutResult<LiveState> {
        let endpoint_name = &self.config.endpoint_name;
        let endpoint = self.platform.describe_endpoint(endpoint_name).await?;
        if endpoint.status != EndpointStatus::InService {
            return Err(RolloutError::NotReady {
                endpoint: endpoint_name.clone(),
                status: endpoint.status,
            });
        }
        let config_name = endpoint
            .config_name
            .ok_or_else(|| RolloutError::NoConfig(endpoint_name.clone()))?;

        let live_config = self.platform.describe_endpoint_config(&config_name).await?;
        let variant = single_variant(live_config)?;
        if variant.name != self.config.old_variant {
            warn!(
                expected = %self.config.old_variant,
                live = %variant.name,
                "live variant name differs from configured old variant; keeping live name"
            );
        }
        if variant.name == self.config.new_variant {
            return Err(RolloutError::VariantClash(variant.name));
        }

        let image = resolve_image(self.config.image_uri.as_deref(), &self.config.region)?;
        info!(
            endpoint = %endpoint_name,
            config = %config_name,
            variant = %variant.name,
            model = %variant.model_name,
            instances = variant.instance_count,
            instance_type = %variant.instance_type,
            "live variant"
        );
        Ok(LiveState { variant, image })
    }

    async fn apply(
        &self,
        live: &LiveState,
        ledger: &mut Ledger,
        in_flight: &mut bool,
        shutdown: &mut watch::Receiver<bool>,
    ) -> RolloutResult<RollSummary> {
        let endpoint = &self.config.endpoint_name;

        ensure_running(shutdown, endpoint)?;
        let template = ModelSpec {
            name: String::new(),
            image: live.image.clone(),
            model_data_url: self.config.model_artifact.to_string(),
            execution_role: self.config.execution_role.clone(),
            environment: BTreeMap::new(),
        };
        let model_name = create_fresh(
            || self.names.model_name(endpoint),
            |name| {
                let model = ModelSpec {
                    name,
                    ..template.clone()
                };
                async move { self.platform.create_model(&model).await }
            },
        )
        .await?;
        ledger.record(CreatedResource::Model(model_name.clone()));
        info!(model = %model_name, artifact = %template.model_data_url, "model created");

        let variants = plan_variants(
            &live.variant,
            &model_name,
            &self.config.new_variant,
            self.config.canary_weight,
        )?;
        ensure_running(shutdown, endpoint)?;
        let config_name = create_fresh(
            || self.names.canary_config_name(endpoint),
            |name| {
                let config = EndpointConfiguration {
                    name,
                    variants: variants.to_vec(),
                };
                async move { self.platform.create_endpoint_config(&config).await }
            },
        )
        .await?;
        ledger.record(CreatedResource::EndpointConfig(config_name.clone()));
        info!(config = %config_name, "canary endpoint config created");

        ensure_running(shutdown, endpoint)?;
        self.platform.update_endpoint(endpoint, &config_name).await?;
        *in_flight = true;
        info!(endpoint = %endpoint, config = %config_name, "endpoint update requested");

        let outcome = wait_for_terminal(&self.platform, endpoint, &self.poll, shutdown).await?;
        *in_flight = false;

        if !outcome.endpoint.status.is_success() {
            return Err(RolloutError::UpdateFailed {
                endpoint: endpoint.clone(),
                status: outcome.endpoint.status,
                reason: outcome.endpoint.failure_reason,
            });
        }

        if outcome.endpoint.config_name.as_deref() != Some(config_name.as_str()) {
            warn!(
                endpoint = %endpoint,
                expected = %config_name,
                serving = outcome.endpoint.config_name.as_deref().unwrap_or("none"),
                "endpoint is InService on a different config; the update may have been rolled back"
            );
        }

        Ok(RollSummary {
            new_model: model_name,
            endpoint_config: config_name,
            canary_weight: self.config.canary_weight.get(),
        })
    }
}

/// The one variant of a live config, or why there isn't exactly one.
fn single_variant(config: EndpointConfiguration) -> RolloutResult<Variant> {
    let count = config.variants.len();
    let mut variants = config.variants.into_iter();
    match (variants.next(), count) {
        (None, _) => Err(RolloutError::NoVariants(config.name)),
        (Some(variant), 1) => Ok(variant),
        (Some(_), count) => Err(RolloutError::MultipleVariants {
            config: config.name,
            count,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use canary_core::{Endpoint, TrainingArtifact};
    use canary_platform::{InMemoryPlatform, Operation, PlatformFuture};

    use EndpointStatus::{Failed, InService, RollingBack, Updating};

    const ROLE: &str = "arn:aws:iam::123456789012:role/SageMakerExecutionRole";

    fn live_config() -> EndpointConfiguration {
        EndpointConfiguration {
            name: "ep-ec-1".into(),
            variants: vec![Variant {
                name: "AllTraffic".into(),
                model_name: "m1".into(),
                instance_count: 2,
                instance_type: "ml.c5.xlarge".into(),
                weight: 1.0,
            }],
        }
    }

    fn seeded() -> Arc<InMemoryPlatform> {
        let platform = Arc::new(InMemoryPlatform::new());
        platform.seed_endpoint("ep", live_config());
        platform
    }

    fn roll(platform: &Arc<InMemoryPlatform>, weight: f64) -> CanaryRoll<Arc<InMemoryPlatform>> {
        let config = RollConfig::new("ep", "s3://ml-bucket/model.tar.gz", ROLE, weight).unwrap();
        CanaryRoll::new(Arc::clone(platform), config)
            .with_names(NameGenerator::with_clock(Arc::new(|| 1_700_000_000)))
    }

    #[tokio::test(start_paused = true)]
    async fn roll_builds_two_variant_config() {
        let platform = seeded();
        platform.script_update("ep", [Updating, Updating, InService]);
        let (_tx, rx) = watch::channel(false);

        let summary = roll(&platform, 0.2).run(rx).await.unwrap();

        assert_eq!(
            summary,
            RollSummary {
                new_model: "ep-xgb-1700000000".into(),
                endpoint_config: "ep-canary-ec-1700000000".into(),
                canary_weight: 0.2,
            }
        );

        let config = platform.endpoint_config(&summary.endpoint_config).unwrap();
        assert_eq!(config.variants.len(), 2);
        assert_eq!(config.total_weight(), 1.0);
        assert_eq!(config.variants[0].name, "AllTraffic");
        assert_eq!(config.variants[0].model_name, "m1");
        assert_eq!(config.variants[0].weight, 0.8);
        assert_eq!(config.variants[1].name, "Canary");
        assert_eq!(config.variants[1].model_name, "ep-xgb-1700000000");
        assert_eq!(config.variants[1].weight, 0.2);
        for variant in &config.variants {
            assert_eq!(variant.instance_count, 2);
            assert_eq!(variant.instance_type, "ml.c5.xlarge");
        }

        let model = platform.model(&summary.new_model).unwrap();
        assert_eq!(model.model_data_url, "s3://ml-bucket/model.tar.gz");
        assert_eq!(model.execution_role, ROLE);
        assert!(model.image.ends_with("/sagemaker-xgboost:1.7-1"));

        let endpoint = platform.endpoint("ep").unwrap();
        assert_eq!(endpoint.config_name.as_deref(), Some("ep-canary-ec-1700000000"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_update_is_fatal_and_keeps_resources() {
        let platform = seeded();
        platform.script_update("ep", [Updating, Failed]);
        let (_tx, rx) = watch::channel(false);

        let err = roll(&platform, 0.1).run(rx).await.unwrap_err();

        assert!(matches!(
            err.cause(),
            RolloutError::UpdateFailed { status: Failed, .. }
        ));
        assert_eq!(err.orphans().len(), 2);
        assert!(platform.model("ep-xgb-1700000000").is_some());
        assert_eq!(
            platform.endpoint("ep").unwrap().config_name.as_deref(),
            Some("ep-ec-1")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_update_cleans_up_when_asked() {
        let platform = seeded();
        platform.script_update("ep", [Failed]);
        let (_tx, rx) = watch::channel(false);

        let err = roll(&platform, 0.1)
            .with_cleanup(CleanupPolicy::DeleteCreated)
            .run(rx)
            .await
            .unwrap_err();

        assert!(matches!(err, RolloutError::UpdateFailed { .. }));
        assert!(err.orphans().is_empty());
        assert!(platform.model("ep-xgb-1700000000").is_none());
        assert!(platform.endpoint_config("ep-canary-ec-1700000000").is_none());
        assert!(platform.endpoint_config("ep-ec-1").is_some());
    }

    #[tokio::test]
    async fn multi_variant_endpoint_rejected_before_creating() {
        let platform = Arc::new(InMemoryPlatform::new());
        let mut config = live_config();
        config.variants.push(Variant {
            name: "Shadow".into(),
            weight: 0.0,
            ..config.variants[0].clone()
        });
        platform.seed_endpoint("ep", config);
        let (_tx, rx) = watch::channel(false);

        let err = roll(&platform, 0.1).run(rx).await.unwrap_err();

        assert!(matches!(err, RolloutError::MultipleVariants { count: 2, .. }));
        assert_eq!(platform.call_count(Operation::CreateModel), 0);
    }

    #[tokio::test]
    async fn endpoint_must_be_in_service() {
        let platform = seeded();
        platform.hold_status("ep", Updating);
        let (_tx, rx) = watch::channel(false);

        let err = roll(&platform, 0.1).run(rx).await.unwrap_err();

        assert!(matches!(err, RolloutError::NotReady { status: Updating, .. }));
        assert_eq!(platform.call_count(Operation::CreateModel), 0);
    }

    #[tokio::test]
    async fn canary_name_clash_rejected() {
        let platform = seeded();
        let mut config = RollConfig::new("ep", "s3://b/k", ROLE, 0.1).unwrap();
        config.new_variant = "AllTraffic".into();
        config.old_variant = "Production".into();
        let (_tx, rx) = watch::channel(false);

        let err = CanaryRoll::new(Arc::clone(&platform), config)
            .run(rx)
            .await
            .unwrap_err();

        assert!(matches!(err, RolloutError::VariantClash(_)));
    }

    #[tokio::test]
    async fn create_config_failure_orphans_model() {
        let platform = seeded();
        platform.fail_on(Operation::CreateEndpointConfig, "ThrottlingException");
        let (_tx, rx) = watch::channel(false);

        let err = roll(&platform, 0.1).run(rx).await.unwrap_err();

        assert!(matches!(err.cause(), RolloutError::Platform(_)));
        assert_eq!(
            err.orphans(),
            &[CreatedResource::Model("ep-xgb-1700000000".into())]
        );
        assert_eq!(platform.call_count(Operation::UpdateEndpoint), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_wait_never_deletes() {
        let platform = seeded();
        platform.hold_status("ep", InService);
        let (tx, rx) = watch::channel(false);

        let roll = roll(&platform, 0.1).with_cleanup(CleanupPolicy::DeleteCreated);
        let handle = tokio::spawn(async move { roll.run(rx).await });
        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        tx.send(true).unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err.cause(), RolloutError::Cancelled(_)));
        assert_eq!(err.orphans().len(), 2);
        assert_eq!(platform.call_count(Operation::DeleteEndpointConfig), 0);
    }

    #[tokio::test]
    async fn shutdown_before_start_creates_nothing() {
        let platform = seeded();
        let (_tx, rx) = watch::channel(true);

        let err = roll(&platform, 0.1).run(rx).await.unwrap_err();

        assert!(matches!(err, RolloutError::Cancelled(_)));
        assert!(err.orphans().is_empty());
        assert_eq!(platform.call_count(Operation::CreateModel), 0);
        assert_eq!(platform.call_count(Operation::UpdateEndpoint), 0);
    }

    /// Flips the shutdown flag while the model is being created.
    struct InterruptOnModel {
        inner: Arc<InMemoryPlatform>,
        shutdown: watch::Sender<bool>,
    }

    impl ControlPlane for InterruptOnModel {
        fn describe_endpoint<'a>(&'a self, name: &'a str) -> PlatformFuture<'a, Endpoint> {
            self.inner.describe_endpoint(name)
        }
        fn describe_endpoint_config<'a>(
            &'a self,
            name: &'a str,
        ) -> PlatformFuture<'a, EndpointConfiguration> {
            self.inner.describe_endpoint_config(name)
        }
        fn create_model<'a>(&'a self, model: &'a ModelSpec) -> PlatformFuture<'a, ()> {
            let _ = self.shutdown.send(true);
            self.inner.create_model(model)
        }
        fn create_endpoint_config<'a>(
            &'a self,
            config: &'a EndpointConfiguration,
        ) -> PlatformFuture<'a, ()> {
            self.inner.create_endpoint_config(config)
        }
        fn create_endpoint<'a>(&'a self, endpoint: &'a str, config: &'a str) -> PlatformFuture<'a, ()> {
            self.inner.create_endpoint(endpoint, config)
        }
        fn update_endpoint<'a>(&'a self, endpoint: &'a str, config: &'a str) -> PlatformFuture<'a, ()> {
            self.inner.update_endpoint(endpoint, config)
        }
        fn delete_model<'a>(&'a self, name: &'a str) -> PlatformFuture<'a, ()> {
            self.inner.delete_model(name)
        }
        fn delete_endpoint_config<'a>(&'a self, name: &'a str) -> PlatformFuture<'a, ()> {
            self.inner.delete_endpoint_config(name)
        }
        fn delete_endpoint<'a>(&'a self, name: &'a str) -> PlatformFuture<'a, ()> {
            self.inner.delete_endpoint(name)
        }
        fn latest_training_artifact<'a>(
            &'a self,
            name_contains: Option<&'a str>,
        ) -> PlatformFuture<'a, TrainingArtifact> {
            self.inner.latest_training_artifact(name_contains)
        }
    }

    #[tokio::test]
    async fn shutdown_mid_roll_never_repoints_endpoint() {
        let inner = seeded();
        let (tx, rx) = watch::channel(false);
        let platform = InterruptOnModel {
            inner: Arc::clone(&inner),
            shutdown: tx,
        };
        let config = RollConfig::new("ep", "s3://ml-bucket/model.tar.gz", ROLE, 0.1).unwrap();

        let err = CanaryRoll::new(platform, config)
            .with_names(NameGenerator::with_clock(Arc::new(|| 1_700_000_000)))
            .with_cleanup(CleanupPolicy::DeleteCreated)
            .run(rx)
            .await
            .unwrap_err();

        assert!(matches!(err, RolloutError::Cancelled(_)));
        assert_eq!(inner.call_count(Operation::CreateEndpointConfig), 0);
        assert_eq!(inner.call_count(Operation::UpdateEndpoint), 0);
        // Nothing was in flight, so the model is cleaned up.
        assert!(inner.model("ep-xgb-1700000000").is_none());
        assert_eq!(inner.endpoint("ep").unwrap().config_name.as_deref(), Some("ep-ec-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn names_taken_by_another_run_are_skipped() {
        let platform = seeded();
        let (_tx, rx) = watch::channel(false);
        platform
            .create_model(&ModelSpec {
                name: "ep-xgb-1700000000".into(),
                image: "img".into(),
                model_data_url: "s3://other/model.tar.gz".into(),
                execution_role: ROLE.into(),
                environment: BTreeMap::new(),
            })
            .await
            .unwrap();

        let summary = roll(&platform, 0.1).run(rx).await.unwrap();

        assert_eq!(summary.new_model, "ep-xgb-1700000000-2");
        assert_eq!(summary.endpoint_config, "ep-canary-ec-1700000000");
        assert_eq!(
            platform.model("ep-xgb-1700000000").unwrap().model_data_url,
            "s3://other/model.tar.gz"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rolled_back_update_still_reports_in_service() {
        let platform = seeded();
        platform.script_update("ep", [Updating, RollingBack, InService]);
        let (_tx, rx) = watch::channel(false);

        let summary = roll(&platform, 0.1).run(rx).await.unwrap();

        assert_eq!(summary.endpoint_config, "ep-canary-ec-1700000000");
        assert_eq!(
            platform.endpoint("ep").unwrap().config_name.as_deref(),
            Some("ep-ec-1")
        );
    }
}
