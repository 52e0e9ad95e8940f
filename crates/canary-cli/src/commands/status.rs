use std::io::Write;

use canary_platform::ControlPlane;

use super::emit;

/// Print an endpoint's status and traffic split.
pub async fn run<P: ControlPlane + ?Sized>(
    platform: &P,
    endpoint: &str,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let report = canary_rollout::describe(platform, endpoint).await?;
    emit(out, &report)
}
