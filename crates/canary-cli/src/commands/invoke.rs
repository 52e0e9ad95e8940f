use std::io::Write;

use anyhow::Context;

use canary_core::InvokeRequest;
use canary_platform::InferenceRuntime;

use super::emit;

/// One Titanic passenger: pclass, sex, age, sibsp, parch, fare, embarked.
pub const SAMPLE_ROW: &str = "3,1,22,1,0,7.25,0";

/// Send one CSV row to an endpoint and print the prediction.
pub async fn run<R: InferenceRuntime + ?Sized>(
    runtime: &R,
    endpoint: &str,
    row: &str,
    variant: Option<&str>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let request = InvokeRequest::csv_row(endpoint, row, variant).context("invalid request body")?;
    let report = canary_rollout::invoke(runtime, &request).await?;
    emit(out, &report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use canary_platform::{InMemoryPlatform, Operation};
    use canary_rollout::InvocationReport;

    use crate::commands::fixtures::production;

    #[tokio::test]
    async fn prints_prediction_from_target_variant() {
        let platform = InMemoryPlatform::new();
        production(&platform, "titanic");
        platform.set_prediction("titanic-xgb-1", "[0.27]");
        let mut out = Vec::new();

        run(&platform, "titanic", SAMPLE_ROW, Some("AllTraffic"), &mut out)
            .await
            .unwrap();

        let report: InvocationReport = serde_json::from_slice(&out).unwrap();
        assert_eq!(report.variant.as_deref(), Some("AllTraffic"));
        assert_eq!(report.prediction, serde_json::json!([0.27]));
    }

    #[tokio::test]
    async fn unknown_variant_is_an_error() {
        let platform = InMemoryPlatform::new();
        production(&platform, "titanic");
        let mut out = Vec::new();

        let result = run(&platform, "titanic", SAMPLE_ROW, Some("Canary"), &mut out).await;

        assert!(result.is_err());
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn bad_row_never_reaches_the_endpoint() {
        let platform = InMemoryPlatform::new();
        production(&platform, "titanic");
        let mut out = Vec::new();

        let result = run(&platform, "titanic", "3,male,22", None, &mut out).await;

        assert!(result.is_err());
        assert_eq!(platform.call_count(Operation::InvokeEndpoint), 0);
    }
}
