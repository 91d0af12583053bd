//! Replace images that already use the target name

use crate::ecs::ImageFilter;
use crate::ecs::classify::retry_on;
use crate::error::BuildError;
use crate::pipeline::{BuildState, Step};
use crate::wait::poll_until_expected;
use async_trait::async_trait;
use ecs_imager_common::RetryCodes;
use tracing::info;

use super::delete_with_retry;

/// Delete every image in the build region named like the target
///
/// Only runs with `force_delete`. Deleted images are gone for good, so there
/// is nothing to undo.
#[derive(Debug, Default)]
pub struct DeleteExistingImages;

#[async_trait]
impl Step for DeleteExistingImages {
    fn name(&self) -> &'static str {
        "delete_existing_images"
    }

    async fn run(&mut self, state: &mut BuildState) -> Result<(), BuildError> {
        let config = state.config.clone();
        if !config.image.force_delete {
            return Ok(());
        }

        let api = state.api.as_ref();
        let region = config.region();
        let filter = ImageFilter {
            region_id: region.to_string(),
            image_id: None,
            image_name: Some(config.image.name.clone()),
        };
        let no_codes = RetryCodes::default();
        let images = poll_until_expected(
            &config.retry.call_poll(),
            Some(&state.cancel),
            "describe images to replace",
            || api.describe_images(filter.clone()),
            retry_on(&no_codes),
        )
        .await?;

        let targets: Vec<_> = images
            .into_iter()
            .filter(|i| i.image_name == config.image.name)
            .collect();
        if targets.is_empty() {
            return Ok(());
        }

        state.reporter.say(&format!(
            "Deleting {} existing image(s) named {}...",
            targets.len(),
            config.image.name
        ));
        for image in &targets {
            delete_with_retry(state, "delete existing image", &state.retry.image.delete, || {
                api.delete_image(region, &image.image_id)
            })
            .await?;
            info!(image_id = %image.image_id, "Deleted existing image");
            state
                .reporter
                .message(&format!("Deleted image {}", image.image_id));
        }
        Ok(())
    }

    async fn cleanup(&mut self, _state: &mut BuildState) -> Result<(), BuildError> {
        Ok(())
    }
}
