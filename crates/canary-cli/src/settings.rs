//! Layer canary.toml under environment and flag values.
//!
//! clap already folds the environment into the flags, so there are two
//! layers here: the file, then whatever the command line resolved.

use std::path::Path;

use anyhow::Context;

use canary_core::config::{ConfigFile, DEFAULT_REGION, DeploySection, PollSection, RollSection};
use canary_core::{DeployConfig, RollConfig};
use canary_rollout::{CleanupPolicy, PollPolicy};

use crate::{DeployArgs, PollArgs, RollArgs};

const DEFAULT_CONFIG_FILE: &str = "canary.toml";

/// Read `path`, or `./canary.toml` when present, or fall back to an
/// empty file.
pub fn load_file(path: Option<&Path>) -> anyhow::Result<ConfigFile> {
    if let Some(path) = path {
        return ConfigFile::from_file(path)
            .with_context(|| format!("reading config {}", path.display()));
    }
    let local = Path::new(DEFAULT_CONFIG_FILE);
    if local.is_file() {
        return ConfigFile::from_file(local)
            .with_context(|| format!("reading config {}", local.display()));
    }
    Ok(ConfigFile::default())
}

pub fn roll(
    file: &ConfigFile,
    region: Option<String>,
    args: RollArgs,
) -> anyhow::Result<(RollConfig, PollPolicy, CleanupPolicy)> {
    let section = file.roll.clone().merge(RollSection {
        region,
        endpoint_name: args.endpoint,
        model_artifact: args.model_artifact,
        execution_role: args.role,
        old_variant: args.old_variant,
        new_variant: args.new_variant,
        canary_weight: args.weight,
        image_uri: args.image_uri,
    });
    let config = RollConfig::try_from(section).context("invalid roll settings")?;
    let (poll, cleanup) = poll(&file.poll, args.poll)?;
    Ok((config, poll, cleanup))
}

pub fn deploy(
    file: &ConfigFile,
    region: Option<String>,
    args: DeployArgs,
) -> anyhow::Result<(DeployConfig, PollPolicy, CleanupPolicy)> {
    let section = file.deploy.clone().merge(DeploySection {
        region,
        endpoint_name: args.endpoint,
        model_artifact: args.model_artifact,
        execution_role: args.role,
        variant_name: args.variant,
        instance_count: args.instance_count,
        instance_type: args.instance_type,
        image_uri: args.image_uri,
    });
    let config = DeployConfig::try_from(section).context("invalid deploy settings")?;
    let (poll, cleanup) = poll(&file.poll, args.poll)?;
    Ok((config, poll, cleanup))
}

/// Region for commands that only need a client: flag or env, then the
/// file's `[roll]` table, then the default.
pub fn region(file: &ConfigFile, region: Option<String>) -> String {
    region
        .or_else(|| file.roll.region.clone())
        .or_else(|| file.deploy.region.clone())
        .unwrap_or_else(|| DEFAULT_REGION.to_string())
}

/// Region for a deploy: flag or env, then the file's `[deploy]` table,
/// then the default. Matches what [`deploy`] resolves.
pub fn deploy_region(file: &ConfigFile, region: Option<String>) -> String {
    region
        .or_else(|| file.deploy.region.clone())
        .unwrap_or_else(|| DEFAULT_REGION.to_string())
}

fn poll(file: &PollSection, args: PollArgs) -> anyhow::Result<(PollPolicy, CleanupPolicy)> {
    let section = file.clone().merge(PollSection {
        interval_secs: args.poll_interval,
        max_attempts: args.max_attempts,
        timeout_secs: args.timeout,
        // An absent flag must not override `cleanup_on_failure = true`.
        cleanup_on_failure: args.cleanup_on_failure.then_some(true),
    });
    let policy = PollPolicy::from_section(&section).context("invalid poll settings")?;
    let cleanup = CleanupPolicy::from_flag(section.cleanup_on_failure.unwrap_or(false));
    Ok((policy, cleanup))
}
