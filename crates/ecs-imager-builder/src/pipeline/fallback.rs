//! Zone fallback on capacity exhaustion
//!
//! When instance creation fails with a sold-out code in every vswitch zone,
//! the provider is asked for alternate zone/instance-type pairings and a fresh
//! two-step pipeline (vswitch + instance) is run per pairing. The first
//! pairing that produces a stopped instance wins; failed attempts unwind
//! themselves before the next one starts. Nested instance steps have the
//! fallback disabled, so this never recurses past one level.

use crate::config::ConfigError;
use crate::error::BuildError;
use ecs_imager_common::ResourceKind;
use tracing::{info, warn};

use super::cidr::fallback_cidr;
use super::steps::{ConfigVSwitch, CreateInstance};
use super::zones::recommended_zones;
use super::{BuildState, Runner, Step};

/// A nested pipeline that produced an instance
///
/// The parent keeps it and unwinds it from its own cleanup.
pub struct FallbackPlacement {
    pub runner: Runner,
    pub state: BuildState,
    pub zone_id: String,
}

impl std::fmt::Debug for FallbackPlacement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackPlacement")
            .field("zone_id", &self.zone_id)
            .field("steps", &self.runner.completed_steps())
            .finish()
    }
}

/// Try recommended zones one at a time until an instance is placed
///
/// `tried` are the zones that already failed; `cause` is returned inside the
/// final error when nothing else works.
pub async fn place_in_recommended_zone(
    state: &BuildState,
    instance_type: &str,
    tried: &[String],
    cause: BuildError,
) -> Result<FallbackPlacement, BuildError> {
    let remaining = recommended_zones(state, instance_type, tried).await?;
    if remaining.is_empty() {
        warn!(instance_type, "No alternate zones recommended");
        return Err(cause);
    }

    let configured_cidr = state.config.network.vswitch_cidr().to_string();
    let mut attempted = Vec::with_capacity(remaining.len());
    let mut last_error = cause;

    for (n, recommendation) in (1u32..).zip(remaining) {
        let zone = recommendation.zone_id;
        state.reporter.say(&format!(
            "Trying instance type {} in zone {zone}",
            recommendation.instance_type
        ));

        let cidr = fallback_cidr(&configured_cidr, n).map_err(|_| ConfigError::InvalidCidr {
            field: "network.vswitch_cidr_block",
            value: configured_cidr.clone(),
        })?;

        let steps: Vec<Box<dyn Step>> = vec![
            Box::new(ConfigVSwitch::for_zone(zone.clone(), cidr)),
            Box::new(CreateInstance::without_fallback(
                recommendation.instance_type,
            )),
        ];
        let mut runner = Runner::new(steps);
        let mut child = state.fork();

        match runner.execute(&mut child).await {
            Ok(()) => {
                info!(zone = %zone, "Instance placed in recommended zone");
                return Ok(FallbackPlacement {
                    runner,
                    state: child,
                    zone_id: zone,
                });
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!(zone = %zone, error = %e, "Recommended zone failed");
                attempted.push(zone);
                last_error = e;
            }
        }
    }

    Err(BuildError::ZonesExhausted {
        kind: ResourceKind::Instance,
        zones: attempted,
        last_error: Some(Box::new(last_error)),
    })
}
