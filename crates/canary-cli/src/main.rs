//! canaryctl: operator CLI for hosted inference endpoints.
//!
//! ```text
//! canaryctl deploy   --endpoint titanic-xgboost-endpoint --model-artifact s3://... --role arn:...
//! canaryctl roll     --endpoint titanic-xgboost-endpoint --model-artifact s3://... --weight 0.1
//! canaryctl deploy   --endpoint titanic-xgboost-endpoint --latest-training-job --role arn:...
//! canaryctl status   titanic-xgboost-endpoint
//! canaryctl invoke   titanic-xgboost-endpoint --variant Canary
//! canaryctl teardown titanic-xgboost-endpoint --delete-config
//! ```
//!
//! Every setting can also come from the environment or a canary.toml;
//! flags win over environment, environment over the file.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::info;

use canary_platform::{SageMakerPlatform, SageMakerRuntime};

mod commands;
mod settings;

#[derive(Parser)]
#[command(
    name = "canaryctl",
    about = "Deploy and canary-roll models on hosted inference endpoints",
    version,
    propagate_version = true
)]
struct Cli {
    /// canary.toml with [roll], [deploy] and [poll] tables
    #[arg(long, global = true, env = "CANARY_CONFIG")]
    config: Option<PathBuf>,

    /// Platform region (default us-east-1)
    #[arg(long, global = true, env = "AWS_REGION")]
    region: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Shift a slice of traffic on an endpoint to a new model
    Roll(RollArgs),
    /// Create a new single-variant endpoint
    Deploy(DeployArgs),
    /// Send one CSV row to an endpoint and print the prediction
    Invoke(InvokeArgs),
    /// Show an endpoint's status and traffic split
    Status {
        /// Endpoint name
        #[arg(env = "SAGEMAKER_ENDPOINT_NAME")]
        endpoint: String,
    },
    /// Delete an endpoint
    Teardown {
        /// Endpoint name
        #[arg(env = "SAGEMAKER_ENDPOINT_NAME")]
        endpoint: String,
        /// Also delete the endpoint config it was serving
        #[arg(long)]
        delete_config: bool,
    },
}

#[derive(Args, Debug, Default)]
struct RollArgs {
    /// Endpoint to roll onto; must be InService with one variant
    #[arg(long, env = "SAGEMAKER_ENDPOINT_NAME")]
    endpoint: Option<String>,
    /// s3:// location of the new model archive
    #[arg(long, env = "MODEL_ARTIFACT_S3")]
    model_artifact: Option<String>,
    /// Execution role ARN for the new model
    #[arg(long, env = "SAGEMAKER_ROLE_ARN")]
    role: Option<String>,
    /// Expected name of the live variant
    #[arg(long, env = "VARIANT_OLD")]
    old_variant: Option<String>,
    /// Name of the canary variant
    #[arg(long, env = "VARIANT_NEW")]
    new_variant: Option<String>,
    /// Fraction of traffic for the canary, strictly between 0 and 1
    #[arg(long, env = "CANARY_WEIGHT")]
    weight: Option<f64>,
    /// Serving image (default: the region's XGBoost 1.7-1 image)
    #[arg(long, env = "CANARY_IMAGE_URI")]
    image_uri: Option<String>,
    #[command(flatten)]
    poll: PollArgs,
}

#[derive(Args, Debug, Default)]
struct DeployArgs {
    /// Endpoint to create
    #[arg(long, env = "SAGEMAKER_ENDPOINT_NAME")]
    endpoint: Option<String>,
    /// s3:// location of the model archive
    #[arg(long, env = "MODEL_ARTIFACT_S3")]
    model_artifact: Option<String>,
    /// Execution role ARN for the model
    #[arg(long, env = "SAGEMAKER_ROLE_ARN")]
    role: Option<String>,
    /// Variant name (default AllTraffic)
    #[arg(long)]
    variant: Option<String>,
    /// Instance count (default 1)
    #[arg(long)]
    instance_count: Option<u32>,
    /// Instance type (default ml.m5.large)
    #[arg(long)]
    instance_type: Option<String>,
    /// Serving image (default: the region's XGBoost 1.7-1 image)
    #[arg(long, env = "CANARY_IMAGE_URI")]
    image_uri: Option<String>,
    /// Deploy the output of the newest completed training job instead of
    /// --model-artifact
    #[arg(long)]
    latest_training_job: bool,
    /// Only consider training jobs whose name contains this
    #[arg(long, requires = "latest_training_job")]
    training_job_filter: Option<String>,
    #[command(flatten)]
    poll: PollArgs,
}

#[derive(Args, Debug)]
struct InvokeArgs {
    /// Endpoint name
    #[arg(env = "SAGEMAKER_ENDPOINT_NAME")]
    endpoint: String,
    /// Send to this variant instead of the weighted split
    #[arg(long)]
    variant: Option<String>,
    /// One CSV row of numeric features
    #[arg(long, default_value = commands::invoke::SAMPLE_ROW)]
    body: String,
}

#[derive(Args, Debug, Default)]
struct PollArgs {
    /// Seconds between status checks (default 30)
    #[arg(long)]
    poll_interval: Option<u64>,
    /// Status checks before giving up; 0 waits forever (default 120)
    #[arg(long)]
    max_attempts: Option<u32>,
    /// Seconds before giving up on the wait
    #[arg(long)]
    timeout: Option<u64>,
    /// Delete created resources if the run fails
    #[arg(long)]
    cleanup_on_failure: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let file = settings::load_file(cli.config.as_deref())?;

    let mut stdout = std::io::stdout();

    match cli.command {
        Commands::Roll(args) => {
            let (config, poll, cleanup) = settings::roll(&file, cli.region, args)?;
            let platform = SageMakerPlatform::connect(&config.region).await;
            let shutdown = shutdown_on_ctrl_c();
            commands::roll::run(platform, config, poll, cleanup, shutdown, &mut stdout).await
        }
        Commands::Deploy(mut args) => {
            let region = settings::deploy_region(&file, cli.region.clone());
            let platform = SageMakerPlatform::connect(&region).await;
            if args.latest_training_job {
                let artifact = commands::deploy::latest_artifact(
                    &platform,
                    args.training_job_filter.as_deref(),
                )
                .await?;
                args.model_artifact = Some(artifact);
            }
            let (config, poll, cleanup) = settings::deploy(&file, cli.region, args)?;
            let shutdown = shutdown_on_ctrl_c();
            commands::deploy::run(&platform, &config, &poll, cleanup, shutdown, &mut stdout).await
        }
        Commands::Invoke(args) => {
            let region = settings::region(&file, cli.region);
            let runtime = SageMakerRuntime::connect(&region).await;
            commands::invoke::run(
                &runtime,
                &args.endpoint,
                &args.body,
                args.variant.as_deref(),
                &mut stdout,
            )
            .await
        }
        Commands::Status { endpoint } => {
            let region = settings::region(&file, cli.region);
            let platform = SageMakerPlatform::connect(&region).await;
            commands::status::run(&platform, &endpoint, &mut stdout).await
        }
        Commands::Teardown {
            endpoint,
            delete_config,
        } => {
            let region = settings::region(&file, cli.region);
            let platform = SageMakerPlatform::connect(&region).await;
            commands::teardown::run(&platform, &endpoint, delete_config, &mut stdout).await
        }
    }
}

/// Flip the returned flag on Ctrl-C. Only commands that can be left
/// half-done install this; the rest keep the default SIGINT exit.
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received; finishing the current step");
            let _ = tx.send(true);
        }
    });
    rx
}

/// Logs go to stderr so stdout carries only the JSON result.
fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("info,canaryctl=debug,canary_rollout=debug")
    });
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
