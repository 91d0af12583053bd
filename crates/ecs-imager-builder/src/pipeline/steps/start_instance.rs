//! Boot the build instance

use crate::ecs::classify::{retry_on, until_status};
use crate::error::BuildError;
use crate::pipeline::{BuildState, Step};
use crate::wait::poll_until_expected;
use async_trait::async_trait;
use ecs_imager_common::ResourceStatus;
use tracing::info;

/// Start the instance and wait until it is running
///
/// Nothing to undo: deleting the instance is the instance step's job.
#[derive(Debug, Default)]
pub struct StartInstance;

#[async_trait]
impl Step for StartInstance {
    fn name(&self) -> &'static str {
        "start_instance"
    }

    async fn run(&mut self, state: &mut BuildState) -> Result<(), BuildError> {
        let instance_id = state.require_instance()?.instance_id.clone();
        let api = state.api.as_ref();
        let retry = &state.config.retry;

        state.reporter.say(&format!("Starting instance {instance_id}..."));
        poll_until_expected(
            &retry.call_poll(),
            Some(&state.cancel),
            "start instance",
            || api.start_instance(&instance_id),
            retry_on(&state.retry.instance_power),
        )
        .await?;

        let running = poll_until_expected(
            &retry.instance_wait(),
            Some(&state.cancel),
            "instance to start",
            || api.describe_instance(&instance_id),
            until_status(ResourceStatus::Running),
        )
        .await?;

        info!(
            instance_id = %running.instance_id,
            private_ip = ?running.private_ip,
            public_ip = ?running.public_ip,
            "Instance running"
        );
        state.instance = Some(running);
        Ok(())
    }

    async fn cleanup(&mut self, _state: &mut BuildState) -> Result<(), BuildError> {
        Ok(())
    }
}
