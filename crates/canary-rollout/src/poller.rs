//! Wait for an endpoint to reach a terminal status.
//!
//! The platform applies endpoint changes out of band, so the only way to
//! learn the outcome is to describe the endpoint until it reports
//! `InService` or `Failed`. Between checks the wait sleeps for the
//! policy interval; the shutdown watch interrupts the sleep.

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn};

use canary_core::Endpoint;
use canary_platform::ControlPlane;

use crate::error::{RolloutError, RolloutResult};
use crate::strategy::PollPolicy;

/// How a successful wait ended.
#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    /// Endpoint as last described; its status is terminal.
    pub endpoint: Endpoint,
    /// Status checks performed.
    pub attempts: u32,
    /// Sleeps taken between checks.
    pub sleeps: u32,
}

/// Describe `endpoint` until its status is terminal.
///
/// A terminal status is returned as `Ok` whether it is success or not;
/// callers decide what `Failed` means for them. Errors are describe
/// failures, exhausted attempts or time, and cancellation.
pub async fn wait_for_terminal<P: ControlPlane + ?Sized>(
    platform: &P,
    endpoint: &str,
    policy: &PollPolicy,
    shutdown: &mut watch::Receiver<bool>,
) -> RolloutResult<PollOutcome> {
    let started = Instant::now();
    let mut attempts = 0u32;
    let mut sleeps = 0u32;

    loop {
        let current = platform.describe_endpoint(endpoint).await?;
        attempts += 1;
        info!(endpoint, status = %current.status, attempt = attempts, "endpoint status");

        if current.status.is_terminal() {
            return Ok(PollOutcome {
                endpoint: current,
                attempts,
                sleeps,
            });
        }

        if let Some(max) = policy.max_attempts
            && attempts >= max
        {
            return Err(RolloutError::AttemptsExhausted {
                endpoint: endpoint.to_string(),
                status: current.status,
                attempts,
            });
        }

        let mut nap = policy.interval();
        if let Some(timeout) = policy.timeout() {
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(RolloutError::TimedOut {
                    endpoint: endpoint.to_string(),
                    status: current.status,
                    elapsed,
                });
            }
            nap = nap.min(timeout - elapsed);
        }

        tokio::select! {
            _ = tokio::time::sleep(nap) => sleeps += 1,
            _ = cancelled(shutdown) => {
                warn!(endpoint, status = %current.status, "wait cancelled");
                return Err(RolloutError::Cancelled(endpoint.to_string()));
            }
        }
    }
}

/// Fail with [`RolloutError::Cancelled`] if shutdown was already
/// requested. Checked before each step that changes the platform.
pub(crate) fn ensure_running(
    shutdown: &watch::Receiver<bool>,
    endpoint: &str,
) -> RolloutResult<()> {
    if *shutdown.borrow() {
        warn!(endpoint, "shutdown requested; not starting the next step");
        return Err(RolloutError::Cancelled(endpoint.to_string()));
    }
    Ok(())
}

/// Resolves once the shutdown flag is set. A dropped sender never
/// cancels.
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use canary_core::{EndpointConfiguration, EndpointStatus, Variant};
    use canary_platform::{InMemoryPlatform, Operation};

    use EndpointStatus::{Failed, InService, Updating};

    fn platform() -> InMemoryPlatform {
        let platform = InMemoryPlatform::new();
        platform.seed_endpoint(
            "ep",
            EndpointConfiguration {
                name: "ep-ec-1".into(),
                variants: vec![Variant {
                    name: "AllTraffic".into(),
                    model_name: "m1".into(),
                    instance_count: 1,
                    instance_type: "ml.m5.large".into(),
                    weight: 1.0,
                }],
            },
        );
        platform
    }

    fn unbounded() -> PollPolicy {
        PollPolicy {
            max_attempts: None,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn already_in_service_returns_without_sleeping() {
        let platform = platform();
        let (_tx, mut rx) = watch::channel(false);
        let before = Instant::now();

        let outcome = wait_for_terminal(&platform, "ep", &unbounded(), &mut rx).await.unwrap();

        assert_eq!(outcome.endpoint.status, InService);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.sleeps, 0);
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn already_failed_returns_without_sleeping() {
        let platform = platform();
        platform.script_statuses("ep", [Failed]);
        let (_tx, mut rx) = watch::channel(false);

        let outcome = wait_for_terminal(&platform, "ep", &unbounded(), &mut rx).await.unwrap();

        assert_eq!(outcome.endpoint.status, Failed);
        assert_eq!(outcome.sleeps, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn two_updating_then_in_service_sleeps_twice() {
        let platform = platform();
        platform.script_statuses("ep", [Updating, Updating, InService]);
        let (_tx, mut rx) = watch::channel(false);
        let before = Instant::now();

        let outcome = wait_for_terminal(&platform, "ep", &unbounded(), &mut rx).await.unwrap();

        assert_eq!(outcome.endpoint.status, InService);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.sleeps, 2);
        assert_eq!(before.elapsed(), Duration::from_secs(60));
        assert_eq!(platform.call_count(Operation::DescribeEndpoint), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_terminal_statuses_keep_polling() {
        let platform = platform();
        platform.script_statuses(
            "ep",
            [EndpointStatus::SystemUpdating, EndpointStatus::RollingBack, InService],
        );
        let (_tx, mut rx) = watch::channel(false);

        let outcome = wait_for_terminal(&platform, "ep", &unbounded(), &mut rx).await.unwrap();
        assert_eq!(outcome.sleeps, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_are_bounded() {
        let platform = platform();
        platform.hold_status("ep", Updating);
        let (_tx, mut rx) = watch::channel(false);
        let policy = PollPolicy {
            max_attempts: Some(4),
            ..Default::default()
        };

        let err = wait_for_terminal(&platform, "ep", &policy, &mut rx).await.unwrap_err();

        assert!(matches!(err, RolloutError::AttemptsExhausted { attempts: 4, .. }));
        assert_eq!(platform.call_count(Operation::DescribeEndpoint), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_enforced() {
        let platform = platform();
        platform.hold_status("ep", Updating);
        let (_tx, mut rx) = watch::channel(false);
        let policy = PollPolicy {
            interval_secs: 30,
            max_attempts: None,
            timeout_secs: Some(75),
        };
        let before = Instant::now();

        let err = wait_for_terminal(&platform, "ep", &policy, &mut rx).await.unwrap_err();

        assert!(matches!(err, RolloutError::TimedOut { .. }));
        // Checks at 0s, 30s, 60s and 75s.
        assert_eq!(platform.call_count(Operation::DescribeEndpoint), 4);
        assert_eq!(before.elapsed(), Duration::from_secs(75));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_sleep() {
        let platform = platform();
        platform.hold_status("ep", Updating);
        let (tx, mut rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(45)).await;
            let _ = tx.send(true);
        });

        let err = wait_for_terminal(&platform, "ep", &unbounded(), &mut rx).await.unwrap_err();

        assert!(matches!(err, RolloutError::Cancelled(_)));
        assert_eq!(platform.call_count(Operation::DescribeEndpoint), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_sender_does_not_cancel() {
        let platform = platform();
        platform.script_statuses("ep", [Updating, InService]);
        let (tx, mut rx) = watch::channel(false);
        drop(tx);

        let outcome = wait_for_terminal(&platform, "ep", &unbounded(), &mut rx).await.unwrap();
        assert_eq!(outcome.sleeps, 1);
    }

    #[test]
    fn ensure_running_follows_the_flag() {
        let (tx, rx) = watch::channel(false);
        assert!(ensure_running(&rx, "ep").is_ok());
        tx.send(true).unwrap();
        assert!(matches!(
            ensure_running(&rx, "ep"),
            Err(RolloutError::Cancelled(ref e)) if e == "ep"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn describe_error_propagates() {
        let platform = platform();
        platform.fail_on(Operation::DescribeEndpoint, "ThrottlingException");
        let (_tx, mut rx) = watch::channel(false);

        let err = wait_for_terminal(&platform, "ep", &unbounded(), &mut rx).await.unwrap_err();
        assert!(matches!(err, RolloutError::Platform(_)));
    }
}
