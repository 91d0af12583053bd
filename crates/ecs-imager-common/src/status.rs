//! Provider status strings
//!
//! Responses carry status as free-form strings; these are the values the
//! builder waits for.

/// Resource states the builder polls for
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::AsRefStr,
)]
pub enum ResourceStatus {
    /// VPC, vswitch or image ready for use
    Available,
    /// Network resource still being provisioned
    Pending,
    /// Image snapshot in progress
    Creating,
    /// Instance powered on
    Running,
    /// Instance powering on
    Starting,
    /// Instance powering off
    Stopping,
    /// Instance powered off
    Stopped,
}

impl ResourceStatus {
    /// Check whether a provider status string names this state
    pub fn matches(self, status: &str) -> bool {
        self.as_ref() == status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_is_exact() {
        assert!(ResourceStatus::Available.matches("Available"));
        assert!(!ResourceStatus::Available.matches("available"));
        assert!(!ResourceStatus::Stopped.matches("Stopping"));
    }

    #[test]
    fn test_parse_roundtrip() {
        let parsed: ResourceStatus = "Running".parse().unwrap();
        assert_eq!(parsed, ResourceStatus::Running);
        assert_eq!(parsed.to_string(), "Running");
    }
}
