//! Build template configuration
//!
//! A build is described by a JSON template with one section per concern.
//! Credentials never appear here; they come from the command line or the
//! environment.

use anyhow::{Context, Result};
use ecs_imager_common::defaults::{
    DEFAULT_VPC_CIDR_BLOCK, DEFAULT_VSWITCH_CIDR_BLOCK, default_image_wait_secs,
    default_instance_wait_secs, default_internet_charge_type, default_retry_attempts,
    default_retry_interval_secs, default_short_retry_attempts,
};
use ecs_imager_common::{ResourceKind, RetryPolicy};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::pipeline::cidr::parse_block;
use crate::wait::PollConfig;

/// Template validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// image.name is empty
    #[error("image.name cannot be empty")]
    EmptyImageName,

    /// access.region is empty
    #[error("access.region cannot be empty")]
    EmptyRegion,

    /// instance.instance_type is empty
    #[error("instance.instance_type cannot be empty")]
    EmptyInstanceType,

    /// Neither a source image nor an image family
    #[error("one of instance.source_image or instance.image_family is required")]
    MissingSourceImage,

    /// CIDR block could not be parsed
    #[error("{field} is not a valid IPv4 CIDR block: {value}")]
    InvalidCidr { field: &'static str, value: String },

    /// A pinned vswitch needs its VPC
    #[error("network.vpc_id is required when network.vswitch_id or network.vswitch_name is set")]
    VSwitchWithoutVpc,

    /// A retry ceiling of zero would never issue a request
    #[error("retry.{0} must be at least 1")]
    ZeroRetryAttempts(&'static str),

    /// Destination region repeats the source region
    #[error("image.destination_regions must not contain the source region {0}")]
    DestinationIsSource(String),
}

/// Top-level build template
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    pub access: AccessConfig,
    pub image: ImageConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    pub instance: InstanceConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Region and endpoint selection
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessConfig {
    /// Region the build runs in
    pub region: String,
    /// Skip checking regions against the provider's region list
    #[serde(default)]
    pub skip_region_validation: bool,
    /// ECS endpoint override (host or full URL)
    #[serde(default)]
    pub ecs_endpoint: Option<String>,
    /// VPC endpoint override (host or full URL)
    #[serde(default)]
    pub vpc_endpoint: Option<String>,
}

/// Target image settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Regions the finished image is copied to
    #[serde(default)]
    pub destination_regions: Vec<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Delete an existing image with the same name instead of stopping
    #[serde(default)]
    pub force_delete: bool,
    /// Treat an existing image with the same name as success
    #[serde(default)]
    pub skip_if_exists: bool,
}

/// Network placement; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    pub vpc_id: Option<String>,
    pub vpc_name: Option<String>,
    pub vpc_cidr_block: Option<String>,
    pub vswitch_id: Option<String>,
    pub vswitch_name: Option<String>,
    pub vswitch_cidr_block: Option<String>,
    pub zone_id: Option<String>,
    pub security_group_id: Option<String>,
    pub security_group_name: Option<String>,
}

impl NetworkConfig {
    /// CIDR for a created VPC
    pub fn vpc_cidr(&self) -> &str {
        self.vpc_cidr_block.as_deref().unwrap_or(DEFAULT_VPC_CIDR_BLOCK)
    }

    /// CIDR for a created vswitch
    pub fn vswitch_cidr(&self) -> &str {
        self.vswitch_cidr_block
            .as_deref()
            .unwrap_or(DEFAULT_VSWITCH_CIDR_BLOCK)
    }
}

/// Disk settings
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DiskConfig {
    pub category: Option<String>,
    /// Size in GiB
    pub size: Option<u32>,
    pub name: Option<String>,
    pub snapshot_id: Option<String>,
    #[serde(default)]
    pub delete_with_instance: Option<bool>,
}

/// Build instance settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceConfig {
    pub instance_type: String,
    #[serde(default)]
    pub instance_name: Option<String>,
    #[serde(default)]
    pub source_image: Option<String>,
    #[serde(default)]
    pub image_family: Option<String>,
    #[serde(default)]
    pub user_data: Option<String>,
    /// File whose contents replace `user_data`
    #[serde(default)]
    pub user_data_file: Option<PathBuf>,
    #[serde(default)]
    pub ram_role_name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_internet_charge_type")]
    pub internet_charge_type: String,
    #[serde(default)]
    pub internet_max_bandwidth_out: u32,
    #[serde(default)]
    pub io_optimized: Option<bool>,
    #[serde(default)]
    pub system_disk: DiskConfig,
    #[serde(default)]
    pub data_disks: Vec<DiskConfig>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub security_enhancement_strategy: Option<String>,
    /// Force the stop before imaging
    #[serde(default)]
    pub force_stop: bool,
    /// Image the running instance without stopping it
    #[serde(default)]
    pub disable_stop: bool,
}

/// Extra retryable codes for one resource kind
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtraCodes {
    #[serde(default)]
    pub create: Vec<String>,
    #[serde(default)]
    pub delete: Vec<String>,
}

/// Retry ceilings, intervals and code overrides
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Attempts for create/delete calls and network waits
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,
    /// Attempts for waits that settle quickly
    #[serde(default = "default_short_retry_attempts")]
    pub short_attempts: u32,
    #[serde(default = "default_retry_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_instance_wait_secs")]
    pub instance_wait_secs: u64,
    #[serde(default = "default_image_wait_secs")]
    pub image_wait_secs: u64,
    /// Codes added to the built-in retry tables
    #[serde(default)]
    pub extra_codes: BTreeMap<ResourceKind, ExtraCodes>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            short_attempts: default_short_retry_attempts(),
            interval_secs: default_retry_interval_secs(),
            instance_wait_secs: default_instance_wait_secs(),
            image_wait_secs: default_image_wait_secs(),
            extra_codes: BTreeMap::new(),
        }
    }
}

impl RetryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Poller settings for create and delete calls
    pub fn call_poll(&self) -> PollConfig {
        PollConfig::fixed(self.max_attempts, self.interval())
    }

    /// Poller settings for network resources reaching Available
    pub fn network_wait(&self) -> PollConfig {
        PollConfig::fixed(self.max_attempts, self.interval())
    }

    /// Poller settings for short waits
    pub fn short_wait(&self) -> PollConfig {
        PollConfig::fixed(self.short_attempts, self.interval())
    }

    /// Poller settings for instance power state changes
    pub fn instance_wait(&self) -> PollConfig {
        PollConfig::until(Duration::from_secs(self.instance_wait_secs), self.interval())
    }

    /// Poller settings for image snapshot and copy completion
    pub fn image_wait(&self) -> PollConfig {
        PollConfig::until(Duration::from_secs(self.image_wait_secs), self.interval())
    }

    /// Built-in retry tables plus any template additions
    pub fn policy(&self) -> RetryPolicy {
        let mut policy = RetryPolicy::default();
        for (kind, extra) in &self.extra_codes {
            policy.extend(*kind, &extra.create, &extra.delete);
        }
        policy
    }
}

impl BuildConfig {
    /// Load a template from a JSON file and validate it
    ///
    /// A `user_data_file` is read here and replaces inline `user_data`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read build template: {}", path.display()))?;

        let mut config = Self::from_json(&content)
            .with_context(|| format!("Failed to parse build template: {}", path.display()))?;

        if let Some(file) = &config.instance.user_data_file {
            let user_data = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read user data file: {}", file.display()))?;
            config.instance.user_data = Some(user_data);
        }

        config
            .validate()
            .with_context(|| format!("Invalid build template: {}", path.display()))?;
        Ok(config)
    }

    /// Parse a template without touching the filesystem
    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    /// Validate the template
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.image.name.trim().is_empty() {
            return Err(ConfigError::EmptyImageName);
        }
        if self.access.region.trim().is_empty() {
            return Err(ConfigError::EmptyRegion);
        }
        if self.instance.instance_type.trim().is_empty() {
            return Err(ConfigError::EmptyInstanceType);
        }
        if self.instance.source_image.is_none() && self.instance.image_family.is_none() {
            return Err(ConfigError::MissingSourceImage);
        }
        let pins_vswitch =
            self.network.vswitch_id.is_some() || self.network.vswitch_name.is_some();
        if pins_vswitch && self.network.vpc_id.is_none() {
            return Err(ConfigError::VSwitchWithoutVpc);
        }
        for (field, value) in [
            ("network.vpc_cidr_block", &self.network.vpc_cidr_block),
            ("network.vswitch_cidr_block", &self.network.vswitch_cidr_block),
        ] {
            if let Some(value) = value {
                if parse_block(value).is_err() {
                    return Err(ConfigError::InvalidCidr {
                        field,
                        value: value.clone(),
                    });
                }
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroRetryAttempts("max_attempts"));
        }
        if self.retry.short_attempts == 0 {
            return Err(ConfigError::ZeroRetryAttempts("short_attempts"));
        }
        if self
            .image
            .destination_regions
            .iter()
            .any(|r| *r == self.access.region)
        {
            return Err(ConfigError::DestinationIsSource(self.access.region.clone()));
        }
        Ok(())
    }

    /// Region the build runs in
    pub fn region(&self) -> &str {
        &self.access.region
    }

    /// Whether the zone fallback may run for this template
    ///
    /// A pinned vswitch fixes the zone, so there is nothing to fall back to.
    pub fn fallback_enabled(&self) -> bool {
        self.network.vswitch_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"{
        "access": { "region": "cn-hangzhou" },
        "image": { "name": "my-image" },
        "instance": { "instance_type": "ecs.g6.large", "source_image": "centos_7" }
    }"#;

    #[test]
    fn test_minimal_template_defaults() {
        let config = BuildConfig::from_json(MINIMAL).unwrap();
        config.validate().unwrap();
        assert_eq!(config.retry.max_attempts, 12);
        assert_eq!(config.retry.interval_secs, 5);
        assert_eq!(config.network.vswitch_cidr(), "172.16.0.0/24");
        assert_eq!(config.instance.internet_charge_type, "PayByTraffic");
        assert!(config.fallback_enabled());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let json = MINIMAL.replace("\"my-image\"", "\"my-image\", \"colour\": \"blue\"");
        assert!(BuildConfig::from_json(&json).is_err());
    }

    #[test]
    fn test_validation_errors() {
        let mut config = BuildConfig::from_json(MINIMAL).unwrap();
        config.instance.source_image = None;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingSourceImage)
        ));

        let mut config = BuildConfig::from_json(MINIMAL).unwrap();
        config.network.vswitch_id = Some("vsw-123".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::VSwitchWithoutVpc)
        ));

        let mut config = BuildConfig::from_json(MINIMAL).unwrap();
        config.network.vswitch_name = Some("team-vsw".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::VSwitchWithoutVpc)
        ));

        let mut config = BuildConfig::from_json(MINIMAL).unwrap();
        config.network.vswitch_cidr_block = Some("172.16.0.0/33".to_string());
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "network.vswitch_cidr_block is not a valid IPv4 CIDR block: 172.16.0.0/33"
        );

        let mut config = BuildConfig::from_json(MINIMAL).unwrap();
        config.retry.max_attempts = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroRetryAttempts("max_attempts"))
        ));

        let mut config = BuildConfig::from_json(MINIMAL).unwrap();
        config.image.destination_regions = vec!["cn-hangzhou".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DestinationIsSource(_))
        ));
    }

    #[test]
    fn test_extra_codes_extend_policy() {
        let json = MINIMAL.replace(
            "\"instance\":",
            r#""retry": { "extra_codes": { "vswitch": { "delete": ["OperationConflict"] } } },
               "instance":"#,
        );
        let config = BuildConfig::from_json(&json).unwrap();
        let policy = config.retry.policy();
        assert!(policy.vswitch.delete.contains("OperationConflict"));
        assert!(policy.vswitch.delete.contains("DependencyViolation"));
        assert!(!policy.vpc.delete.contains("OperationConflict"));
    }

    #[test]
    fn test_load_reads_user_data_file() {
        let mut user_data = NamedTempFile::new().unwrap();
        write!(user_data, "#!/bin/sh\necho hello\n").unwrap();

        let mut template = NamedTempFile::new().unwrap();
        write!(
            template,
            r#"{{
                "access": {{ "region": "cn-hangzhou" }},
                "image": {{ "name": "my-image" }},
                "instance": {{
                    "instance_type": "ecs.g6.large",
                    "image_family": "acs:centos_7",
                    "user_data": "ignored",
                    "user_data_file": {:?}
                }}
            }}"#,
            user_data.path()
        )
        .unwrap();

        let config = BuildConfig::load(template.path()).unwrap();
        assert_eq!(
            config.instance.user_data.as_deref(),
            Some("#!/bin/sh\necho hello\n")
        );
    }

    #[test]
    fn test_load_reports_path() {
        let err = BuildConfig::load(Path::new("/nonexistent/template.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/template.json"));
    }

    #[test]
    fn test_instance_wait_uses_timeout() {
        let retry = RetryConfig::default();
        let poll = retry.instance_wait();
        assert_eq!(poll.timeout, Some(Duration::from_secs(600)));
        assert_eq!(poll.max_attempts, 120);
    }
}
