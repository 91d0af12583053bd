//! Placement zone selection

use crate::ecs::classify::retry_on;
use crate::ecs::{RecommendRequest, RecommendedZone, ZoneAvailability};
use crate::error::BuildError;
use crate::wait::poll_until_expected;
use ecs_imager_common::{ResourceStatus, RetryCodes};
use std::collections::HashSet;
use tracing::debug;

use super::BuildState;

/// Check whether a zone currently sells the requested resource
pub fn is_sellable(zone: &ZoneAvailability) -> bool {
    ResourceStatus::Available.matches(&zone.status)
        && zone
            .resources
            .iter()
            .any(|r| ResourceStatus::Available.matches(&r.status))
}

/// Zones to try, in provider order
///
/// A pinned zone is the only candidate. Otherwise the provider is asked which
/// zones sell `instance_type` right now; none is fatal.
pub async fn candidate_zones(
    state: &BuildState,
    instance_type: &str,
    pinned: Option<&str>,
) -> Result<Vec<String>, BuildError> {
    if let Some(zone) = pinned {
        return Ok(vec![zone.to_string()]);
    }

    let api = state.api.as_ref();
    let no_codes = RetryCodes::default();
    let zones = poll_until_expected(
        &state.config.retry.call_poll(),
        Some(&state.cancel),
        "describe available zones",
        || api.describe_available_zones(instance_type),
        retry_on(&no_codes),
    )
    .await?;

    let candidates: Vec<String> = zones
        .iter()
        .filter(|z| is_sellable(z))
        .map(|z| z.zone_id.clone())
        .collect();
    debug!(instance_type, zones = ?candidates, "Candidate zones");

    if candidates.is_empty() {
        return Err(BuildError::NoCandidateZones {
            instance_type: instance_type.to_string(),
        });
    }
    Ok(candidates)
}

/// Provider recommendations for a sold-out instance type
///
/// One pairing per zone, first suggestion wins, zones in `tried` skipped.
pub async fn recommended_zones(
    state: &BuildState,
    instance_type: &str,
    tried: &[String],
) -> Result<Vec<RecommendedZone>, BuildError> {
    let api = state.api.as_ref();
    let request = RecommendRequest {
        instance_type: instance_type.to_string(),
        zone_id: None,
        charge_type: "PostPaid".to_string(),
        system_disk_category: state
            .config
            .instance
            .system_disk
            .category
            .clone()
            .unwrap_or_else(|| "cloud_essd".to_string()),
        priority_strategy: "PriceFirst".to_string(),
        scene: "CREATE".to_string(),
    };
    let no_codes = RetryCodes::default();
    let recommendations = poll_until_expected(
        &state.config.retry.call_poll(),
        Some(&state.cancel),
        "describe recommended instance types",
        || api.describe_recommended_zones(request.clone()),
        retry_on(&no_codes),
    )
    .await?;

    let mut seen: HashSet<String> = tried.iter().cloned().collect();
    Ok(recommendations
        .into_iter()
        .filter(|r| seen.insert(r.zone_id.clone()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::SupportedResource;

    fn zone(status: &str, resource_status: &str) -> ZoneAvailability {
        ZoneAvailability {
            zone_id: "cn-hangzhou-a".to_string(),
            status: status.to_string(),
            resources: vec![SupportedResource {
                value: "ecs.g6.large".to_string(),
                status: resource_status.to_string(),
            }],
        }
    }

    #[test]
    fn test_sellable_requires_both_statuses() {
        assert!(is_sellable(&zone("Available", "Available")));
        assert!(!is_sellable(&zone("Available", "SoldOut")));
        assert!(!is_sellable(&zone("SoldOut", "Available")));

        let mut empty = zone("Available", "Available");
        empty.resources.clear();
        assert!(!is_sellable(&empty));
    }
}
