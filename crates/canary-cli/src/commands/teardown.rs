use std::io::Write;

use tracing::info;

use canary_platform::ControlPlane;

use super::emit;

pub async fn run<P: ControlPlane + ?Sized>(
    platform: &P,
    endpoint: &str,
    delete_config: bool,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let summary = canary_rollout::teardown(platform, endpoint, delete_config).await?;
    info!(endpoint, "endpoint deleted");
    emit(out, &summary)
}
