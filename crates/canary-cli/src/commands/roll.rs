use std::io::Write;

use tokio::sync::watch;
use tracing::{error, info};

use canary_core::RollConfig;
use canary_platform::ControlPlane;
use canary_rollout::{CanaryRoll, CleanupPolicy, PollPolicy};

use super::emit;

/// Run one canary roll and print its summary.
pub async fn run<P: ControlPlane>(
    platform: P,
    config: RollConfig,
    poll: PollPolicy,
    cleanup: CleanupPolicy,
    shutdown: watch::Receiver<bool>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let roll = CanaryRoll::new(platform, config)
        .with_poll_policy(poll)
        .with_cleanup(cleanup);

    match roll.run(shutdown).await {
        Ok(summary) => {
            info!(
                endpoint = %roll.config().endpoint_name,
                model = %summary.new_model,
                "canary roll complete"
            );
            emit(out, &summary)
        }
        Err(e) => {
            for orphan in e.orphans() {
                error!(resource = %orphan, "left behind by failed roll");
            }
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use canary_core::EndpointStatus;
    use canary_platform::InMemoryPlatform;
    use canary_rollout::RollSummary;

    use crate::commands::fixtures::{ARTIFACT, ROLE, production};

    #[tokio::test(start_paused = true)]
    async fn prints_summary_json() {
        let platform = Arc::new(InMemoryPlatform::new());
        production(&platform, "titanic");
        platform.script_update(
            "titanic",
            [EndpointStatus::Updating, EndpointStatus::InService],
        );
        let (_tx, rx) = watch::channel(false);
        let mut out = Vec::new();

        run(
            Arc::clone(&platform),
            RollConfig::new("titanic", ARTIFACT, ROLE, 0.2).unwrap(),
            PollPolicy::default(),
            CleanupPolicy::Keep,
            rx,
            &mut out,
        )
        .await
        .unwrap();

        let printed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        let keys: Vec<&str> = printed
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys.len(), 3);
        let summary: RollSummary = serde_json::from_value(printed).unwrap();
        assert_eq!(summary.canary_weight, 0.2);
        assert!(summary.new_model.starts_with("titanic-xgb-"));
        assert!(summary.endpoint_config.starts_with("titanic-canary-ec-"));
        assert_eq!(
            platform.endpoint("titanic").unwrap().config_name.as_deref(),
            Some(summary.endpoint_config.as_str())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_update_prints_nothing() {
        let platform = Arc::new(InMemoryPlatform::new());
        production(&platform, "titanic");
        platform.script_update("titanic", [EndpointStatus::Failed]);
        let (_tx, rx) = watch::channel(false);
        let mut out = Vec::new();

        let err = run(
            Arc::clone(&platform),
            RollConfig::new("titanic", ARTIFACT, ROLE, 0.1).unwrap(),
            PollPolicy::default(),
            CleanupPolicy::Keep,
            rx,
            &mut out,
        )
        .await
        .unwrap_err();

        assert!(out.is_empty());
        assert!(err.to_string().contains("Failed"), "{err}");
    }
}
