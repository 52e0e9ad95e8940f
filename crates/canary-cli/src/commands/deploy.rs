use std::io::Write;

use anyhow::Context;
use tokio::sync::watch;
use tracing::info;

use canary_core::{DeployConfig, NameGenerator};
use canary_platform::ControlPlane;
use canary_rollout::{CleanupPolicy, PollPolicy};

use super::emit;

/// Create a fresh endpoint and print what was created.
pub async fn run<P: ControlPlane + ?Sized>(
    platform: &P,
    config: &DeployConfig,
    poll: &PollPolicy,
    cleanup: CleanupPolicy,
    mut shutdown: watch::Receiver<bool>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let names = NameGenerator::shared();
    let summary =
        canary_rollout::deploy(platform, config, &names, poll, cleanup, &mut shutdown).await?;
    emit(out, &summary)
}

/// Model archive written by the newest completed training job, optionally
/// among jobs whose name contains `name_contains`.
pub async fn latest_artifact<P: ControlPlane + ?Sized>(
    platform: &P,
    name_contains: Option<&str>,
) -> anyhow::Result<String> {
    let artifact = platform
        .latest_training_artifact(name_contains)
        .await
        .context("looking up the latest training job")?;
    info!(
        job = %artifact.job_name,
        artifact = %artifact.model_artifact,
        "deploying latest training output"
    );
    Ok(artifact.model_artifact)
}

#[cfg(test)]
mod tests {
    use super::*;

    use canary_core::config::DeploySection;
    use canary_core::EndpointStatus;
    use canary_platform::InMemoryPlatform;
    use canary_rollout::DeploySummary;

    use crate::commands::fixtures::{ARTIFACT, ROLE, production};

    fn config() -> DeployConfig {
        DeployConfig::try_from(DeploySection {
            endpoint_name: Some("fresh".into()),
            model_artifact: Some(ARTIFACT.into()),
            execution_role: Some(ROLE.into()),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn deploys_and_prints_summary() {
        let platform = InMemoryPlatform::new();
        platform.script_create(
            "fresh",
            [EndpointStatus::Creating, EndpointStatus::InService],
        );
        let (_tx, rx) = watch::channel(false);
        let mut out = Vec::new();

        run(
            &platform,
            &config(),
            &PollPolicy::default(),
            CleanupPolicy::Keep,
            rx,
            &mut out,
        )
        .await
        .unwrap();

        let summary: DeploySummary = serde_json::from_slice(&out).unwrap();
        assert_eq!(summary.endpoint, "fresh");
        assert_eq!(summary.status, EndpointStatus::InService);
        assert!(platform.model(&summary.model).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn existing_endpoint_is_refused() {
        let platform = InMemoryPlatform::new();
        production(&platform, "fresh");
        let (_tx, rx) = watch::channel(false);
        let mut out = Vec::new();

        let result = run(
            &platform,
            &config(),
            &PollPolicy::default(),
            CleanupPolicy::Keep,
            rx,
            &mut out,
        )
        .await;

        assert!(result.is_err());
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn latest_artifact_picks_newest_completed_job() {
        let platform = InMemoryPlatform::new();
        platform.seed_training_job("titanic-xgb-0901", "s3://titanic-ml/0901/model.tar.gz", true);
        platform.seed_training_job("titanic-xgb-0902", "s3://titanic-ml/0902/model.tar.gz", true);
        platform.seed_training_job("titanic-xgb-0903", "s3://titanic-ml/0903/model.tar.gz", false);

        let artifact = latest_artifact(&platform, Some("titanic")).await.unwrap();

        assert_eq!(artifact, "s3://titanic-ml/0902/model.tar.gz");
    }

    #[tokio::test]
    async fn no_training_jobs_is_an_error() {
        let platform = InMemoryPlatform::new();
        assert!(latest_artifact(&platform, None).await.is_err());
    }
}
