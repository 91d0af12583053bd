//! Stop the build instance before imaging

use crate::ecs::classify::{retry_on, until_found, until_status};
use crate::error::BuildError;
use crate::pipeline::{BuildState, Step};
use crate::wait::poll_until_expected;
use async_trait::async_trait;
use ecs_imager_common::ResourceStatus;

/// Stop the instance so the snapshot is consistent
///
/// Skipped when `disable_stop` is set or the instance is already stopped.
#[derive(Debug, Default)]
pub struct StopInstance;

#[async_trait]
impl Step for StopInstance {
    fn name(&self) -> &'static str {
        "stop_instance"
    }

    async fn run(&mut self, state: &mut BuildState) -> Result<(), BuildError> {
        let config = state.config.clone();
        let instance_id = state.require_instance()?.instance_id.clone();

        if config.instance.disable_stop {
            state
                .reporter
                .message("Stop disabled, imaging the running instance");
            return Ok(());
        }

        let api = state.api.as_ref();
        let current = poll_until_expected(
            &config.retry.short_wait(),
            Some(&state.cancel),
            "describe instance",
            || api.describe_instance(&instance_id),
            until_found(),
        )
        .await?;
        if ResourceStatus::Stopped.matches(&current.status) {
            state
                .reporter
                .message(&format!("Instance {instance_id} is already stopped"));
            state.instance = Some(current);
            return Ok(());
        }

        state.reporter.say(&format!("Stopping instance {instance_id}..."));
        let force = config.instance.force_stop;
        poll_until_expected(
            &config.retry.call_poll(),
            Some(&state.cancel),
            "stop instance",
            || api.stop_instance(&instance_id, force),
            retry_on(&state.retry.instance_power),
        )
        .await?;

        let stopped = poll_until_expected(
            &config.retry.instance_wait(),
            Some(&state.cancel),
            "instance to stop",
            || api.describe_instance(&instance_id),
            until_status(ResourceStatus::Stopped),
        )
        .await?;
        state.reporter.message(&format!("Instance {instance_id} stopped"));
        state.instance = Some(stopped);
        Ok(())
    }

    async fn cleanup(&mut self, _state: &mut BuildState) -> Result<(), BuildError> {
        Ok(())
    }
}
