//! Instance creation with per-zone retry and sold-out fallback

use crate::config::DiskConfig;
use crate::ecs::classify::{retry_on, until_status};
use crate::ecs::{CreateInstanceRequest, DiskSpec, Instance, VSwitch};
use crate::error::BuildError;
use crate::pipeline::fallback::{FallbackPlacement, place_in_recommended_zone};
use crate::pipeline::{BuildState, Lifecycle, Step};
use crate::wait::poll_until_expected;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ecs_imager_common::{ResourceKind, ResourceStatus};
use tracing::{info, warn};

use super::{delete_with_retry, new_client_token};

fn disk_spec(disk: &DiskConfig) -> DiskSpec {
    DiskSpec {
        category: disk.category.clone(),
        size: disk.size,
        name: disk.name.clone(),
        snapshot_id: disk.snapshot_id.clone(),
        delete_with_instance: disk.delete_with_instance,
    }
}

/// Create the build instance in one of the placed vswitches
///
/// Zones are tried in vswitch order. When every zone fails and at least one
/// failure was a sold-out code, alternate zones recommended by the provider
/// are tried through [`place_in_recommended_zone`].
#[derive(Debug)]
pub struct CreateInstance {
    /// Overrides the template's instance type
    instance_type: Option<String>,
    allow_fallback: bool,
    lifecycle: Lifecycle<Instance>,
    fallback: Option<FallbackPlacement>,
}

impl Default for CreateInstance {
    fn default() -> Self {
        Self::new()
    }
}

impl CreateInstance {
    pub fn new() -> Self {
        Self {
            instance_type: None,
            allow_fallback: true,
            lifecycle: Lifecycle::NotStarted,
            fallback: None,
        }
    }

    /// Fixed instance type, no nested fallback
    pub fn without_fallback(instance_type: impl Into<String>) -> Self {
        Self {
            instance_type: Some(instance_type.into()),
            allow_fallback: false,
            lifecycle: Lifecycle::NotStarted,
            fallback: None,
        }
    }

    fn request(
        &self,
        state: &BuildState,
        vswitch: &VSwitch,
        instance_type: &str,
    ) -> Result<CreateInstanceRequest, BuildError> {
        let config = &state.config;
        let instance = &config.instance;
        let image_id = match &instance.image_family {
            Some(_) => None,
            None => state
                .source_image
                .as_ref()
                .map(|i| i.image_id.clone())
                .or_else(|| instance.source_image.clone()),
        };

        Ok(CreateInstanceRequest {
            zone_id: vswitch.zone_id.clone(),
            vswitch_id: vswitch.vswitch_id.clone(),
            security_group_id: state.require_security_group_id()?.to_string(),
            instance_type: instance_type.to_string(),
            instance_name: instance
                .instance_name
                .clone()
                .unwrap_or_else(|| state.generated_name("instance")),
            image_id,
            image_family: instance.image_family.clone(),
            internet_charge_type: instance.internet_charge_type.clone(),
            internet_max_bandwidth_out: instance.internet_max_bandwidth_out,
            io_optimized: instance.io_optimized,
            password: instance.password.clone(),
            ram_role_name: instance.ram_role_name.clone(),
            security_enhancement_strategy: instance.security_enhancement_strategy.clone(),
            user_data: instance.user_data.as_ref().map(|d| STANDARD.encode(d)),
            system_disk: disk_spec(&instance.system_disk),
            data_disks: instance.data_disks.iter().map(disk_spec).collect(),
            tags: state.resource_tags(&instance.tags),
            client_token: new_client_token(),
        })
    }

    /// Create in one vswitch and wait for the initial Stopped state
    async fn create_in(
        &self,
        state: &BuildState,
        vswitch: &VSwitch,
        instance_type: &str,
    ) -> Result<Instance, BuildError> {
        let api = state.api.as_ref();
        let retry = &state.config.retry;
        let codes = &state.retry.instance;
        let request = self.request(state, vswitch, instance_type)?;

        let instance_id = poll_until_expected(
            &retry.call_poll(),
            Some(&state.cancel),
            "create instance",
            || api.create_instance(request.clone()),
            retry_on(&codes.create),
        )
        .await?;

        let ready = poll_until_expected(
            &retry.instance_wait(),
            Some(&state.cancel),
            "instance to be created",
            || api.describe_instance(&instance_id),
            until_status(ResourceStatus::Stopped),
        )
        .await;

        match ready {
            Ok(instance) => Ok(instance),
            Err(e) => {
                if let Err(cleanup) = delete_with_retry(state, "delete instance", &codes.delete, || {
                    api.delete_instance(&instance_id, true)
                })
                .await
                {
                    warn!(instance_id = %instance_id, error = %cleanup, "Failed to delete instance that never came up");
                }
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl Step for CreateInstance {
    fn name(&self) -> &'static str {
        "create_instance"
    }

    async fn run(&mut self, state: &mut BuildState) -> Result<(), BuildError> {
        let instance_type = self
            .instance_type
            .clone()
            .unwrap_or_else(|| state.config.instance.instance_type.clone());
        if state.vswitches.is_empty() {
            return Err(BuildError::MissingState("vswitches"));
        }

        state.reporter.say("Creating instance...");
        let vswitches = state.vswitches.clone();
        let mut tried = Vec::with_capacity(vswitches.len());
        let mut saw_no_stock = false;
        let mut last_error = None;

        for vswitch in &vswitches {
            match self.create_in(state, vswitch, &instance_type).await {
                Ok(instance) => {
                    info!(instance_id = %instance.instance_id, zone = %instance.zone_id, "Created instance");
                    state
                        .reporter
                        .message(&format!("Created instance {}", instance.instance_id));
                    state.instance = Some(instance.clone());
                    self.lifecycle = Lifecycle::owned(instance);
                    return Ok(());
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!(zone = %vswitch.zone_id, error = %e, "Instance creation failed in zone");
                    state.reporter.message(&format!(
                        "Instance creation in zone {} failed: {e}",
                        vswitch.zone_id
                    ));
                    saw_no_stock |= e.is_no_stock();
                    tried.push(vswitch.zone_id.clone());
                    last_error = Some(Box::new(e));
                }
            }
        }

        let exhausted = BuildError::ZonesExhausted {
            kind: ResourceKind::Instance,
            zones: tried.clone(),
            last_error,
        };
        if !(saw_no_stock && self.allow_fallback && state.config.fallback_enabled()) {
            return Err(exhausted);
        }

        state.reporter.say(&format!(
            "Instance type {instance_type} is sold out, trying recommended zones"
        ));
        let placement = place_in_recommended_zone(state, &instance_type, &tried, exhausted).await?;
        let instance = placement
            .state
            .instance
            .clone()
            .ok_or(BuildError::MissingState("fallback instance"))?;

        info!(
            instance_id = %instance.instance_id,
            zone = %placement.zone_id,
            "Created instance in recommended zone"
        );
        state
            .vswitches
            .extend(placement.state.vswitches.iter().cloned());
        state.instance = Some(instance.clone());
        // The nested pipeline owns and deletes this instance
        self.lifecycle = Lifecycle::reused(instance);
        self.fallback = Some(placement);
        Ok(())
    }

    async fn cleanup(&mut self, state: &mut BuildState) -> Result<(), BuildError> {
        if let Some(mut placement) = self.fallback.take() {
            let nested: Vec<String> = placement
                .state
                .vswitches
                .iter()
                .map(|v| v.vswitch_id.clone())
                .collect();
            placement.runner.cleanup(&mut placement.state).await;
            state.vswitches.retain(|v| !nested.contains(&v.vswitch_id));
        }

        if let Some(instance) = self.lifecycle.take_owned() {
            state
                .reporter
                .say(&format!("Deleting instance {}...", instance.instance_id));
            let api = state.api.as_ref();
            delete_with_retry(
                state,
                "delete instance",
                &state.retry.instance.delete,
                || api.delete_instance(&instance.instance_id, true),
            )
            .await?;
        }
        state.instance = None;
        Ok(())
    }
}
