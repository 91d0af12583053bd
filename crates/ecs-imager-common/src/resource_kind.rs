//! Cloud resource kinds managed by ecs-imager
//!
//! Each kind knows the provider's "not found" code for it, which cleanup uses
//! to treat an already-deleted resource as success.

use serde::Deserialize;

/// Types of resources a build may create or reuse
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResourceKind {
    /// Virtual private cloud
    Vpc,
    /// Zone-scoped subnet inside a VPC
    #[strum(serialize = "vswitch")]
    #[serde(rename = "vswitch")]
    VSwitch,
    /// Security group (depends on instances being deleted)
    SecurityGroup,
    /// Compute instance
    Instance,
    /// Machine image
    Image,
}

impl ResourceKind {
    /// Human-readable name used in progress messages
    pub fn display_name(self) -> &'static str {
        match self {
            ResourceKind::Vpc => "VPC",
            ResourceKind::VSwitch => "vswitch",
            ResourceKind::SecurityGroup => "security group",
            ResourceKind::Instance => "instance",
            ResourceKind::Image => "image",
        }
    }

    /// Provider error code returned when a resource of this kind does not exist
    pub fn not_found_code(self) -> &'static str {
        match self {
            ResourceKind::Vpc => "InvalidVpcId.NotFound",
            ResourceKind::VSwitch => "InvalidVSwitchId.NotFound",
            ResourceKind::SecurityGroup => "InvalidSecurityGroupId.NotFound",
            ResourceKind::Instance => "InvalidInstanceId.NotFound",
            ResourceKind::Image => "InvalidImageId.NotFound",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_parse_from_template_keys() {
        assert_eq!(ResourceKind::from_str("vswitch").unwrap(), ResourceKind::VSwitch);
        assert_eq!(
            ResourceKind::from_str("security_group").unwrap(),
            ResourceKind::SecurityGroup
        );
        assert!(ResourceKind::from_str("bucket").is_err());
    }

    #[test]
    fn test_deserialize_matches_display() {
        for kind in [
            ResourceKind::Vpc,
            ResourceKind::VSwitch,
            ResourceKind::SecurityGroup,
            ResourceKind::Instance,
            ResourceKind::Image,
        ] {
            let json = format!("\"{kind}\"");
            let parsed: ResourceKind = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_not_found_codes_are_distinct() {
        assert_eq!(ResourceKind::VSwitch.not_found_code(), "InvalidVSwitchId.NotFound");
        assert_ne!(
            ResourceKind::Vpc.not_found_code(),
            ResourceKind::Instance.not_found_code()
        );
    }
}
