//! Source image lookup

use crate::ecs::classify::retry_on;
use crate::error::BuildError;
use crate::pipeline::{BuildState, Step};
use crate::wait::poll_until_expected;
use async_trait::async_trait;
use ecs_imager_common::{ResourceKind, RetryCodes};

use super::find_image;

/// Confirm the source image exists in the build region
///
/// Skipped when an image family is configured; the provider resolves the
/// family's latest image at instance creation.
#[derive(Debug, Default)]
pub struct CheckSourceImage;

#[async_trait]
impl Step for CheckSourceImage {
    fn name(&self) -> &'static str {
        "check_source_image"
    }

    async fn run(&mut self, state: &mut BuildState) -> Result<(), BuildError> {
        let config = state.config.clone();
        let Some(image_id) = config.instance.source_image.as_deref() else {
            state.reporter.message(&format!(
                "Using image family {}",
                config.instance.image_family.as_deref().unwrap_or_default()
            ));
            return Ok(());
        };
        if config.instance.image_family.is_some() {
            state
                .reporter
                .message("Image family set, source image is resolved by the provider");
            return Ok(());
        }

        let api = state.api.as_ref();
        let no_codes = RetryCodes::default();
        let image = poll_until_expected(
            &config.retry.call_poll(),
            Some(&state.cancel),
            "describe source image",
            || find_image(api, config.region(), image_id),
            retry_on(&no_codes),
        )
        .await?
        .ok_or_else(|| BuildError::PinnedResourceNotFound {
            kind: ResourceKind::Image,
            id: image_id.to_string(),
        })?;

        state
            .reporter
            .message(&format!("Found source image {}", image.image_id));
        state.source_image = Some(image);
        Ok(())
    }

    async fn cleanup(&mut self, _state: &mut BuildState) -> Result<(), BuildError> {
        Ok(())
    }
}
