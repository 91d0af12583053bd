//! Pre-flight checks before anything is created

use crate::ecs::ImageFilter;
use crate::ecs::classify::retry_on;
use crate::error::BuildError;
use crate::pipeline::{BuildState, Step};
use crate::wait::poll_until_expected;
use async_trait::async_trait;
use ecs_imager_common::RetryCodes;
use std::collections::HashSet;

/// Validate regions and the target image name
///
/// An existing image with the target name yields the
/// [`BuildError::ImageAlreadyExists`] sentinel unless `force_delete` is set.
#[derive(Debug, Default)]
pub struct PreValidate;

impl PreValidate {
    async fn validate_regions(&self, state: &BuildState) -> Result<(), BuildError> {
        let config = &state.config;
        if config.access.skip_region_validation {
            state
                .reporter
                .message("Skipping region validation as requested");
            return Ok(());
        }

        state
            .reporter
            .say("Prevalidating source region and copied regions...");
        let api = state.api.as_ref();
        let no_codes = RetryCodes::default();
        let regions = poll_until_expected(
            &config.retry.call_poll(),
            Some(&state.cancel),
            "describe regions",
            || api.describe_regions(),
            retry_on(&no_codes),
        )
        .await?;

        let known: HashSet<&str> = regions.iter().map(|r| r.region_id.as_str()).collect();
        let invalid: Vec<String> = std::iter::once(&config.access.region)
            .chain(&config.image.destination_regions)
            .filter(|r| !known.contains(r.as_str()))
            .cloned()
            .collect();

        if invalid.is_empty() {
            Ok(())
        } else {
            Err(BuildError::InvalidRegions(invalid))
        }
    }

    async fn validate_image_name(&self, state: &BuildState) -> Result<(), BuildError> {
        let config = &state.config;
        if config.image.force_delete {
            state
                .reporter
                .message("Force delete flag found, skipping prevalidating image name");
            return Ok(());
        }

        state.reporter.say("Prevalidating image name...");
        let api = state.api.as_ref();
        let filter = ImageFilter {
            region_id: config.access.region.clone(),
            image_id: None,
            image_name: Some(config.image.name.clone()),
        };
        let no_codes = RetryCodes::default();
        let images = poll_until_expected(
            &config.retry.call_poll(),
            Some(&state.cancel),
            "describe images",
            || api.describe_images(filter.clone()),
            retry_on(&no_codes),
        )
        .await?;

        match images.iter().find(|i| i.image_name == config.image.name) {
            Some(existing) => {
                state.reporter.message(&format!(
                    "Image {} already uses the name {}",
                    existing.image_id, existing.image_name
                ));
                Err(BuildError::ImageAlreadyExists {
                    name: config.image.name.clone(),
                })
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Step for PreValidate {
    fn name(&self) -> &'static str {
        "pre_validate"
    }

    async fn run(&mut self, state: &mut BuildState) -> Result<(), BuildError> {
        self.validate_regions(state).await?;
        self.validate_image_name(state).await
    }

    async fn cleanup(&mut self, _state: &mut BuildState) -> Result<(), BuildError> {
        Ok(())
    }
}
