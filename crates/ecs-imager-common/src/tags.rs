//! Tag constants for ecs-imager
//!
//! Instances and images created by a build are tagged so an operator can
//! trace a leftover resource back to the build that made it.
//!
//! ## Tag Schema
//!
//! | Tag Key | Description |
//! |---------|-------------|
//! | `ecs-imager:tool` | Static identifier ("ecs-imager") |
//! | `ecs-imager:build-id` | Unique build identifier (UUIDv7) |
//! | `ecs-imager:created-at` | RFC 3339 creation timestamp |

/// Tag key for tool identification
pub const TAG_TOOL: &str = "ecs-imager:tool";

/// Tag value for tool identification
pub const TAG_TOOL_VALUE: &str = "ecs-imager";

/// Tag key for the build ID
pub const TAG_BUILD_ID: &str = "ecs-imager:build-id";

/// Tag key for creation timestamp (RFC 3339 format)
pub const TAG_CREATED_AT: &str = "ecs-imager:created-at";

/// Helper to format creation timestamp for tags
pub fn format_created_at(time: chrono::DateTime<chrono::Utc>) -> String {
    time.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_created_at() {
        let time = chrono::Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(format_created_at(time), "2024-03-01T12:30:00Z");
    }

    #[test]
    fn test_keys_share_prefix() {
        for key in [TAG_TOOL, TAG_BUILD_ID, TAG_CREATED_AT] {
            assert!(key.starts_with("ecs-imager:"), "{key}");
        }
    }
}
