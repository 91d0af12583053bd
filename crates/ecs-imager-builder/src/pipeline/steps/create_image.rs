//! Snapshot the build instance into an image

use crate::ecs::CreateImageRequest;
use crate::ecs::classify::{retry_on, until_status};
use crate::error::BuildError;
use crate::pipeline::{BuildState, Lifecycle, Step};
use crate::wait::poll_until_expected;
use async_trait::async_trait;
use ecs_imager_common::ResourceStatus;
use tracing::{info, warn};

use super::{delete_with_retry, find_image, new_client_token};

/// Create the target image and wait until it is available
///
/// The image is the build's product: cleanup keeps it when the build
/// succeeded and deletes it when any step failed.
#[derive(Debug, Default)]
pub struct CreateImage {
    lifecycle: Lifecycle<String>,
}

impl CreateImage {
    async fn delete(state: &BuildState, image_id: &str) -> Result<(), BuildError> {
        let api = state.api.as_ref();
        let region = state.config.region();
        delete_with_retry(state, "delete image", &state.retry.image.delete, || {
            api.delete_image(region, image_id)
        })
        .await
    }
}

#[async_trait]
impl Step for CreateImage {
    fn name(&self) -> &'static str {
        "create_image"
    }

    async fn run(&mut self, state: &mut BuildState) -> Result<(), BuildError> {
        let config = state.config.clone();
        let instance_id = state.require_instance()?.instance_id.clone();
        let request = CreateImageRequest {
            instance_id,
            image_name: config.image.name.clone(),
            description: config.image.description.clone(),
            tags: state.resource_tags(&config.image.tags),
            client_token: new_client_token(),
        };

        state
            .reporter
            .say(&format!("Creating image {}...", config.image.name));
        let api = state.api.as_ref();
        let image_id = poll_until_expected(
            &config.retry.call_poll(),
            Some(&state.cancel),
            "create image",
            || api.create_image(request.clone()),
            retry_on(&state.retry.image.create),
        )
        .await?;

        let ready = poll_until_expected(
            &config.retry.image_wait(),
            Some(&state.cancel),
            "image to become available",
            || find_image(api, config.region(), &image_id),
            until_status(ResourceStatus::Available),
        )
        .await;

        if let Err(e) = ready {
            if let Err(cleanup) = Self::delete(state, &image_id).await {
                warn!(image_id = %image_id, error = %cleanup, "Failed to delete unfinished image");
            }
            return Err(e.into());
        }

        info!(image_id = %image_id, name = %config.image.name, "Image available");
        state
            .reporter
            .message(&format!("Image {image_id} is available"));
        state.image_id = Some(image_id.clone());
        self.lifecycle = Lifecycle::owned(image_id);
        Ok(())
    }

    async fn cleanup(&mut self, state: &mut BuildState) -> Result<(), BuildError> {
        if !state.failed() {
            if let Some(image_id) = self.lifecycle.release() {
                info!(image_id = %image_id, "Keeping image");
            }
            return Ok(());
        }

        let Some(image_id) = self.lifecycle.take_owned() else {
            return Ok(());
        };
        state
            .reporter
            .say(&format!("Build failed, deleting image {image_id}..."));
        Self::delete(state, &image_id).await?;
        state.image_id = None;
        Ok(())
    }
}
