//! ecs-imager: build Alibaba Cloud ECS images from a JSON template

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ecs_imager_builder::ecs::{Credentials, EcsClient, EcsContext};
use ecs_imager_builder::pipeline::LogReporter;
use ecs_imager_builder::pipeline::steps::{Provisioner, ShellProvisioner};
use ecs_imager_builder::{BuildConfig, BuildOutcome, build_image};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "ecs-imager")]
#[command(about = "Build Alibaba Cloud ECS machine images")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct BuildArgs {
    /// Path to the JSON build template
    #[arg(short, long)]
    template: PathBuf,

    /// Override the template's region
    #[arg(long)]
    region: Option<String>,

    /// Delete an existing image with the same name
    #[arg(long)]
    force: bool,

    /// Skip checking regions against the provider's region list
    #[arg(long)]
    skip_region_validation: bool,

    /// Exit successfully if the image already exists
    #[arg(long)]
    skip_if_exists: bool,

    /// Shell command run against the booted instance before imaging
    #[arg(long)]
    provision_command: Option<String>,

    /// Access key ID
    #[arg(long, env = "ALICLOUD_ACCESS_KEY", hide_env_values = true)]
    access_key: String,

    /// Access key secret
    #[arg(long, env = "ALICLOUD_SECRET_KEY", hide_env_values = true)]
    secret_key: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build an image
    Build(Box<BuildArgs>),

    /// Validate a template without calling the provider
    Validate {
        /// Path to the JSON build template
        #[arg(short, long)]
        template: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    match args.command {
        Command::Build(build_args) => handle_build(*build_args).await,
        Command::Validate { template } => {
            let config = BuildConfig::load(&template)?;
            println!(
                "Template OK: image '{}' in {} on {}",
                config.image.name,
                config.region(),
                config.instance.instance_type
            );
            Ok(())
        }
    }
}

async fn handle_build(args: BuildArgs) -> Result<()> {
    let mut config = BuildConfig::load(&args.template)?;
    if let Some(region) = args.region {
        config.access.region = region;
    }
    config.image.force_delete |= args.force;
    config.access.skip_region_validation |= args.skip_region_validation;
    config.image.skip_if_exists |= args.skip_if_exists;

    let context = EcsContext::new(
        Credentials::new(args.access_key, args.secret_key),
        config.region(),
    )
    .with_endpoints(
        config.access.ecs_endpoint.clone(),
        config.access.vpc_endpoint.clone(),
    );
    let client = EcsClient::new(context).context("Failed to create provider client")?;

    let provisioner = args
        .provision_command
        .map(|cmd| Arc::new(ShellProvisioner::new(cmd)) as Arc<dyn Provisioner>);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling build and cleaning up");
            on_signal.cancel();
        }
    });

    let outcome = build_image(
        config,
        Arc::new(client),
        Arc::new(LogReporter),
        provisioner,
        cancel,
    )
    .await?;

    match outcome {
        BuildOutcome::Built {
            image_id,
            region,
            copies,
        } => {
            info!(image_id = %image_id, region = %region, "Build finished");
            println!("{region}: {image_id}");
            for (region, image_id) in copies {
                println!("{region}: {image_id}");
            }
        }
        BuildOutcome::Skipped { image_name } => {
            println!("Image '{image_name}' already exists, nothing to build");
        }
    }
    Ok(())
}
