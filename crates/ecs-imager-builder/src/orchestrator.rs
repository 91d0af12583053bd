//! Build orchestration
//!
//! Assembles the step list for a template, runs it, and turns the result into
//! a [`BuildOutcome`]. Every transient resource is deleted before this
//! returns, whether the build succeeded, failed or was cancelled.

use crate::config::BuildConfig;
use crate::ecs::EcsApi;
use crate::error::BuildError;
use crate::pipeline::steps::{
    CheckSourceImage, ConfigSecurityGroup, ConfigVSwitch, ConfigVpc, CopyImage, CreateImage,
    CreateInstance, DeleteExistingImages, PreValidate, Provision, Provisioner, StartInstance,
    StopInstance,
};
use crate::pipeline::{BuildState, ProgressReporter, Runner, Step};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// What a finished build produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// A new image, plus its copies keyed by destination region
    Built {
        image_id: String,
        region: String,
        copies: BTreeMap<String, String>,
    },
    /// The image name was taken and the template asked to skip
    Skipped { image_name: String },
}

/// The full step list, in execution order
pub fn default_steps(provisioner: Option<Arc<dyn Provisioner>>) -> Vec<Box<dyn Step>> {
    let mut steps: Vec<Box<dyn Step>> = vec![
        Box::new(PreValidate),
        Box::new(CheckSourceImage),
        Box::new(ConfigVpc::default()),
        Box::new(ConfigVSwitch::new()),
        Box::new(ConfigSecurityGroup::default()),
        Box::new(CreateInstance::new()),
        Box::new(StartInstance),
    ];
    if let Some(provisioner) = provisioner {
        steps.push(Box::new(Provision::new(provisioner)));
    }
    steps.extend([
        Box::new(StopInstance) as Box<dyn Step>,
        Box::new(DeleteExistingImages),
        Box::new(CreateImage::default()),
        Box::new(CopyImage::default()),
    ]);
    steps
}

/// Build one image from a validated template
///
/// # Arguments
/// * `config` - The build template
/// * `api` - Provider client
/// * `reporter` - Progress sink
/// * `provisioner` - Optional hook run against the booted instance
/// * `cancel` - Stops the build between steps and interrupts waits
pub async fn build_image(
    config: BuildConfig,
    api: Arc<dyn EcsApi>,
    reporter: Arc<dyn ProgressReporter>,
    provisioner: Option<Arc<dyn Provisioner>>,
    cancel: CancellationToken,
) -> Result<BuildOutcome, BuildError> {
    config.validate()?;

    let build_id = uuid::Uuid::now_v7().to_string();
    let skip_if_exists = config.image.skip_if_exists;
    info!(
        build_id = %build_id,
        region = %config.access.region,
        image_name = %config.image.name,
        instance_type = %config.instance.instance_type,
        "Starting image build"
    );

    let mut state = BuildState::new(Arc::new(config), api, reporter, cancel, build_id);
    let mut runner = Runner::new(default_steps(provisioner));

    match runner.run(&mut state).await {
        Ok(()) => {
            let image_id = state.require_image_id()?.to_string();
            info!(image_id = %image_id, copies = state.copied_images.len(), "Image build complete");
            Ok(BuildOutcome::Built {
                image_id,
                region: state.config.access.region.clone(),
                copies: std::mem::take(&mut state.copied_images),
            })
        }
        Err(BuildError::ImageAlreadyExists { name }) if skip_if_exists => {
            info!(image_name = %name, "Image already exists, skipping build");
            Ok(BuildOutcome::Skipped { image_name: name })
        }
        Err(e) => Err(e),
    }
}
