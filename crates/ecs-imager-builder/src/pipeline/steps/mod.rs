//! Pipeline steps, in build order
//!
//! Every create, delete and status wait goes through the poller with the
//! retry codes for that resource and direction.

mod copy_image;
mod create_image;
mod delete_images;
mod instance;
mod pre_validate;
mod provision;
mod security_group;
mod source_image;
mod start_instance;
mod stop_instance;
mod vpc;
mod vswitch;

pub use copy_image::CopyImage;
pub use create_image::CreateImage;
pub use delete_images::DeleteExistingImages;
pub use instance::CreateInstance;
pub use pre_validate::PreValidate;
pub use provision::{Provision, Provisioner, ShellProvisioner};
pub use security_group::ConfigSecurityGroup;
pub use source_image::CheckSourceImage;
pub use start_instance::StartInstance;
pub use stop_instance::StopInstance;
pub use vpc::ConfigVpc;
pub use vswitch::ConfigVSwitch;

use crate::ecs::classify::retry_on;
use crate::ecs::{EcsApi, Image, ImageFilter, VSwitch, VSwitchFilter, Vpc, VpcFilter};
use crate::error::{ApiError, BuildError, ignore_not_found};
use crate::wait::poll_until_expected;
use ecs_imager_common::RetryCodes;
use std::future::Future;

use super::BuildState;

/// Fresh idempotency token; reused across retries of one create call
pub(crate) fn new_client_token() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Delete through the poller with delete-class codes
///
/// A resource that is already gone counts as deleted. Runs without the
/// build's cancellation token so teardown completes after a cancel.
pub(crate) async fn delete_with_retry<F, Fut>(
    state: &BuildState,
    what: &str,
    codes: &RetryCodes,
    mut delete: F,
) -> Result<(), BuildError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), ApiError>>,
{
    poll_until_expected(
        &state.config.retry.call_poll(),
        None,
        what,
        || {
            let call = delete();
            async move { ignore_not_found(call.await).map(|_| ()) }
        },
        retry_on(codes),
    )
    .await?;
    Ok(())
}

pub(crate) async fn find_vpc(api: &dyn EcsApi, vpc_id: &str) -> Result<Option<Vpc>, ApiError> {
    let vpcs = api
        .describe_vpcs(VpcFilter {
            vpc_id: Some(vpc_id.to_string()),
            ..Default::default()
        })
        .await?;
    Ok(vpcs.into_iter().find(|v| v.vpc_id == vpc_id))
}

pub(crate) async fn find_vswitch(
    api: &dyn EcsApi,
    vpc_id: &str,
    vswitch_id: &str,
) -> Result<Option<VSwitch>, ApiError> {
    let vswitches = api
        .describe_vswitches(VSwitchFilter {
            vpc_id: Some(vpc_id.to_string()),
            vswitch_id: Some(vswitch_id.to_string()),
            ..Default::default()
        })
        .await?;
    Ok(vswitches.into_iter().find(|v| v.vswitch_id == vswitch_id))
}

pub(crate) async fn find_image(
    api: &dyn EcsApi,
    region_id: &str,
    image_id: &str,
) -> Result<Option<Image>, ApiError> {
    let images = api
        .describe_images(ImageFilter {
            region_id: region_id.to_string(),
            image_id: Some(image_id.to_string()),
            image_name: None,
        })
        .await?;
    Ok(images.into_iter().find(|i| i.image_id == image_id))
}
