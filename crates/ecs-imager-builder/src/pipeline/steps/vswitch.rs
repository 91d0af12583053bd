//! VSwitch placement
//!
//! 1. A pinned vswitch ID must resolve to exactly one vswitch, reused as-is.
//!    With a pinned zone, the vswitch must also live in that zone.
//! 2. Candidate zones come from the pinned zone or the provider's list of
//!    zones selling the instance type.
//! 3. A name filter reuses matching vswitches inside candidate zones. No
//!    match is fatal.
//! 4. Otherwise a vswitch is created in the first candidate zone that yields
//!    an available one. A single address block cannot be spread over zones,
//!    so only one zone is ever committed.

use crate::ecs::classify::{retry_on, until_status};
use crate::ecs::{CreateVSwitchRequest, VSwitch, VSwitchFilter};
use crate::error::BuildError;
use crate::pipeline::zones::candidate_zones;
use crate::pipeline::{BuildState, Lifecycle, Step};
use crate::wait::poll_until_expected;
use async_trait::async_trait;
use ecs_imager_common::{ResourceKind, ResourceStatus, RetryCodes};
use tracing::{info, warn};

use super::{delete_with_retry, find_vswitch, new_client_token};

#[derive(Debug, Clone)]
enum Placement {
    /// Follow the template's network section
    Configured,
    /// Create in one zone with a given block; used by the zone fallback
    Zone { zone_id: String, cidr_block: String },
}

/// Reuse or create the vswitch(es) the instance is placed on
#[derive(Debug)]
pub struct ConfigVSwitch {
    placement: Placement,
    lifecycle: Lifecycle<Vec<VSwitch>>,
}

impl Default for ConfigVSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigVSwitch {
    pub fn new() -> Self {
        Self {
            placement: Placement::Configured,
            lifecycle: Lifecycle::NotStarted,
        }
    }

    /// Always create, in exactly `zone_id`, with `cidr_block`
    pub fn for_zone(zone_id: impl Into<String>, cidr_block: impl Into<String>) -> Self {
        Self {
            placement: Placement::Zone {
                zone_id: zone_id.into(),
                cidr_block: cidr_block.into(),
            },
            lifecycle: Lifecycle::NotStarted,
        }
    }

    /// Whether this step created (and will delete) its vswitches
    pub fn owns(&self) -> bool {
        self.lifecycle.owns()
    }

    async fn find_pinned(
        &self,
        state: &BuildState,
        vpc_id: &str,
        vswitch_id: &str,
        zone_id: Option<&str>,
    ) -> Result<VSwitch, BuildError> {
        let api = state.api.as_ref();
        let filter = VSwitchFilter {
            vpc_id: Some(vpc_id.to_string()),
            vswitch_id: Some(vswitch_id.to_string()),
            zone_id: zone_id.map(str::to_string),
            ..Default::default()
        };
        let no_codes = RetryCodes::default();
        let mut found = poll_until_expected(
            &state.config.retry.call_poll(),
            Some(&state.cancel),
            "describe pinned vswitch",
            || api.describe_vswitches(filter.clone()),
            retry_on(&no_codes),
        )
        .await?;
        found.retain(|v| zone_id.is_none_or(|zone| v.zone_id == zone));

        match found.len() {
            1 => Ok(found.remove(0)),
            0 => Err(BuildError::PinnedResourceNotFound {
                kind: ResourceKind::VSwitch,
                id: vswitch_id.to_string(),
            }),
            count => Err(BuildError::AmbiguousResource {
                kind: ResourceKind::VSwitch,
                id: vswitch_id.to_string(),
                count,
            }),
        }
    }

    async fn find_named(
        &self,
        state: &BuildState,
        vpc_id: &str,
        name: &str,
        zones: &[String],
    ) -> Result<Vec<VSwitch>, BuildError> {
        let api = state.api.as_ref();
        let filter = VSwitchFilter {
            vpc_id: Some(vpc_id.to_string()),
            vswitch_name: Some(name.to_string()),
            ..Default::default()
        };
        let no_codes = RetryCodes::default();
        let found = poll_until_expected(
            &state.config.retry.call_poll(),
            Some(&state.cancel),
            "describe vswitches by name",
            || api.describe_vswitches(filter.clone()),
            retry_on(&no_codes),
        )
        .await?;

        Ok(found
            .into_iter()
            .filter(|v| v.vswitch_name == name && zones.contains(&v.zone_id))
            .collect())
    }

    /// Create in one zone and wait until available
    ///
    /// A vswitch that was created but never became available is deleted
    /// before returning the error.
    async fn create_in_zone(
        &self,
        state: &BuildState,
        vpc_id: &str,
        zone_id: &str,
        cidr_block: &str,
        name: &str,
    ) -> Result<VSwitch, BuildError> {
        let api = state.api.as_ref();
        let retry = &state.config.retry;
        let codes = &state.retry.vswitch;
        let request = CreateVSwitchRequest {
            vpc_id: vpc_id.to_string(),
            zone_id: zone_id.to_string(),
            cidr_block: cidr_block.to_string(),
            vswitch_name: name.to_string(),
            description: "Temporary vswitch created by ecs-imager".to_string(),
            client_token: new_client_token(),
        };

        let vswitch_id = poll_until_expected(
            &retry.call_poll(),
            Some(&state.cancel),
            "create vswitch",
            || api.create_vswitch(request.clone()),
            retry_on(&codes.create),
        )
        .await?;

        let ready = poll_until_expected(
            &retry.network_wait(),
            Some(&state.cancel),
            "vswitch to become available",
            || find_vswitch(api, vpc_id, &vswitch_id),
            until_status(ResourceStatus::Available),
        )
        .await;

        match ready {
            Ok(vswitch) => Ok(vswitch),
            Err(e) => {
                if let Err(cleanup) = delete_with_retry(state, "delete vswitch", &codes.delete, || {
                    api.delete_vswitch(&vswitch_id)
                })
                .await
                {
                    warn!(vswitch_id = %vswitch_id, error = %cleanup, "Failed to delete unready vswitch");
                }
                Err(e.into())
            }
        }
    }

    /// Try zones in order; first available vswitch wins
    async fn create_in_first_zone(
        &self,
        state: &BuildState,
        vpc_id: &str,
        zones: &[String],
        cidr_block: &str,
        name: &str,
    ) -> Result<VSwitch, BuildError> {
        let mut tried = Vec::with_capacity(zones.len());
        let mut last_error = None;

        for zone_id in zones {
            state.reporter.message(&format!(
                "Creating vswitch {name} ({cidr_block}) in zone {zone_id}"
            ));
            match self
                .create_in_zone(state, vpc_id, zone_id, cidr_block, name)
                .await
            {
                Ok(vswitch) => return Ok(vswitch),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!(zone = %zone_id, error = %e, "Failed to create vswitch, trying next zone");
                    state
                        .reporter
                        .message(&format!("Zone {zone_id} failed: {e}"));
                    tried.push(zone_id.clone());
                    last_error = Some(Box::new(e));
                }
            }
        }

        Err(BuildError::ZonesExhausted {
            kind: ResourceKind::VSwitch,
            zones: tried,
            last_error,
        })
    }

    fn complete(&mut self, state: &mut BuildState, vswitches: Vec<VSwitch>, owned: bool) {
        state.vswitches = vswitches.clone();
        self.lifecycle = if owned {
            Lifecycle::owned(vswitches)
        } else {
            Lifecycle::reused(vswitches)
        };
    }
}

#[async_trait]
impl Step for ConfigVSwitch {
    fn name(&self) -> &'static str {
        "config_vswitch"
    }

    async fn run(&mut self, state: &mut BuildState) -> Result<(), BuildError> {
        let config = state.config.clone();
        let network = &config.network;
        let vpc_id = state.require_vpc_id()?.to_string();
        let name = network
            .vswitch_name
            .clone()
            .unwrap_or_else(|| state.generated_name("vsw"));

        if let Placement::Zone {
            zone_id,
            cidr_block,
        } = &self.placement
        {
            let vswitch = self
                .create_in_first_zone(state, &vpc_id, std::slice::from_ref(zone_id), cidr_block, &name)
                .await?;
            info!(vswitch_id = %vswitch.vswitch_id, zone = %vswitch.zone_id, "Created fallback vswitch");
            self.complete(state, vec![vswitch], true);
            return Ok(());
        }

        if let Some(vswitch_id) = network.vswitch_id.as_deref() {
            let vswitch = self
                .find_pinned(state, &vpc_id, vswitch_id, network.zone_id.as_deref())
                .await?;
            state.reporter.message(&format!(
                "Using existing vswitch {} in zone {}",
                vswitch.vswitch_id, vswitch.zone_id
            ));
            self.complete(state, vec![vswitch], false);
            return Ok(());
        }

        let zones = candidate_zones(
            state,
            &config.instance.instance_type,
            network.zone_id.as_deref(),
        )
        .await?;

        if let Some(wanted) = network.vswitch_name.as_deref() {
            let matches = self.find_named(state, &vpc_id, wanted, &zones).await?;
            if matches.is_empty() {
                return Err(BuildError::PinnedResourceNotFound {
                    kind: ResourceKind::VSwitch,
                    id: wanted.to_string(),
                });
            }
            state.reporter.message(&format!(
                "Using {} existing vswitch(es) named {wanted}",
                matches.len()
            ));
            self.complete(state, matches, false);
            return Ok(());
        }

        state.reporter.say("Creating vswitch...");
        let vswitch = self
            .create_in_first_zone(state, &vpc_id, &zones, network.vswitch_cidr(), &name)
            .await?;
        info!(vswitch_id = %vswitch.vswitch_id, zone = %vswitch.zone_id, "Created vswitch");
        state.reporter.message(&format!(
            "Created vswitch {} in zone {}",
            vswitch.vswitch_id, vswitch.zone_id
        ));
        self.complete(state, vec![vswitch], true);
        Ok(())
    }

    async fn cleanup(&mut self, state: &mut BuildState) -> Result<(), BuildError> {
        let Some(vswitches) = self.lifecycle.take_owned() else {
            return Ok(());
        };

        let api = state.api.as_ref();
        let mut first_error = None;
        for vswitch in &vswitches {
            state
                .reporter
                .say(&format!("Deleting vswitch {}...", vswitch.vswitch_id));
            let result = delete_with_retry(
                state,
                "delete vswitch",
                &state.retry.vswitch.delete,
                || api.delete_vswitch(&vswitch.vswitch_id),
            )
            .await;
            if let Err(e) = result {
                warn!(vswitch_id = %vswitch.vswitch_id, error = %e, "Failed to delete vswitch");
                first_error.get_or_insert(e);
            }
        }

        state
            .vswitches
            .retain(|v| !vswitches.iter().any(|mine| mine.vswitch_id == v.vswitch_id));
        first_error.map_or(Ok(()), Err)
    }
}
