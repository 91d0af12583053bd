//! Copy the image to destination regions

use crate::ecs::CopyImageRequest;
use crate::ecs::classify::{retry_on, until_status};
use crate::error::BuildError;
use crate::pipeline::{BuildState, Lifecycle, Step};
use crate::wait::poll_until_expected;
use async_trait::async_trait;
use ecs_imager_common::ResourceStatus;
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::{delete_with_retry, find_image, new_client_token};

/// Copy the built image into every destination region
///
/// All copies are started first, then awaited. If any copy fails, the copies
/// already started are deleted before the error is returned.
#[derive(Debug, Default)]
pub struct CopyImage {
    lifecycle: Lifecycle<BTreeMap<String, String>>,
}

async fn delete_copies(state: &BuildState, copies: &BTreeMap<String, String>) -> Option<BuildError> {
    let api = state.api.as_ref();
    let mut first_error = None;
    for (region, image_id) in copies {
        state
            .reporter
            .message(&format!("Deleting copied image {image_id} in {region}"));
        if let Err(e) = delete_with_retry(state, "delete copied image", &state.retry.image.delete, || {
            api.delete_image(region, image_id)
        })
        .await
        {
            warn!(region = %region, image_id = %image_id, error = %e, "Failed to delete copied image");
            first_error.get_or_insert(e);
        }
    }
    first_error
}

impl CopyImage {
    async fn copy_all(
        &self,
        state: &BuildState,
        image_id: &str,
        copies: &mut BTreeMap<String, String>,
    ) -> Result<(), BuildError> {
        let config = &state.config;
        let api = state.api.as_ref();

        for region in &config.image.destination_regions {
            state
                .reporter
                .message(&format!("Copying image {image_id} to {region}"));
            let request = CopyImageRequest {
                source_region_id: config.region().to_string(),
                image_id: image_id.to_string(),
                destination_region_id: region.clone(),
                destination_image_name: config.image.name.clone(),
                destination_description: config.image.description.clone(),
                client_token: new_client_token(),
            };
            let copy_id = poll_until_expected(
                &config.retry.call_poll(),
                Some(&state.cancel),
                "copy image",
                || api.copy_image(request.clone()),
                retry_on(&state.retry.image.create),
            )
            .await?;
            copies.insert(region.clone(), copy_id);
        }

        for (region, copy_id) in copies.iter() {
            poll_until_expected(
                &config.retry.image_wait(),
                Some(&state.cancel),
                "copied image to become available",
                || find_image(api, region, copy_id),
                until_status(ResourceStatus::Available),
            )
            .await?;
            info!(region = %region, image_id = %copy_id, "Copied image available");
        }
        Ok(())
    }
}

#[async_trait]
impl Step for CopyImage {
    fn name(&self) -> &'static str {
        "copy_image"
    }

    async fn run(&mut self, state: &mut BuildState) -> Result<(), BuildError> {
        if state.config.image.destination_regions.is_empty() {
            return Ok(());
        }
        let image_id = state.require_image_id()?.to_string();

        state.reporter.say(&format!(
            "Copying image to {} region(s)...",
            state.config.image.destination_regions.len()
        ));
        let mut copies = BTreeMap::new();
        if let Err(e) = self.copy_all(state, &image_id, &mut copies).await {
            delete_copies(state, &copies).await;
            return Err(e);
        }

        state.copied_images = copies.clone();
        self.lifecycle = Lifecycle::owned(copies);
        Ok(())
    }

    async fn cleanup(&mut self, state: &mut BuildState) -> Result<(), BuildError> {
        if !state.failed() {
            self.lifecycle.release();
            return Ok(());
        }

        let Some(copies) = self.lifecycle.take_owned() else {
            return Ok(());
        };
        let first_error = delete_copies(state, &copies).await;
        state.copied_images.clear();
        first_error.map_or(Ok(()), Err)
    }
}
