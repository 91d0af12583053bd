//! Shared build state
//!
//! The only channel between steps. Each field is written by exactly one step
//! and read by the steps after it; `require_*` accessors turn a missing
//! upstream value into [`BuildError::MissingState`].

use crate::config::BuildConfig;
use crate::ecs::{EcsApi, Image, Instance, VSwitch};
use crate::error::BuildError;
use ecs_imager_common::RetryPolicy;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::progress::ProgressReporter;

/// State threaded through one pipeline run
pub struct BuildState {
    pub config: Arc<BuildConfig>,
    pub api: Arc<dyn EcsApi>,
    pub reporter: Arc<dyn ProgressReporter>,
    pub cancel: CancellationToken,
    /// Retry code sets, fixed for the whole run
    pub retry: Arc<RetryPolicy>,
    /// Unique per build, stamped on the instance and image
    pub build_id: String,

    pub source_image: Option<Image>,
    pub vpc_id: Option<String>,
    pub vswitches: Vec<VSwitch>,
    pub security_group_id: Option<String>,
    pub instance: Option<Instance>,
    pub image_id: Option<String>,
    /// Destination region -> copied image ID
    pub copied_images: BTreeMap<String, String>,

    /// Message of the error that halted the run
    pub failure: Option<String>,
}

impl BuildState {
    pub fn new(
        config: Arc<BuildConfig>,
        api: Arc<dyn EcsApi>,
        reporter: Arc<dyn ProgressReporter>,
        cancel: CancellationToken,
        build_id: impl Into<String>,
    ) -> Self {
        let retry = Arc::new(config.retry.policy());
        Self {
            config,
            api,
            reporter,
            cancel,
            retry,
            build_id: build_id.into(),
            source_image: None,
            vpc_id: None,
            vswitches: Vec::new(),
            security_group_id: None,
            instance: None,
            image_id: None,
            copied_images: BTreeMap::new(),
            failure: None,
        }
    }

    /// Child state for a nested pipeline
    ///
    /// Shares clients, config and the network placed so far; starts without
    /// vswitches or an instance so the nested run only sees what it creates.
    pub fn fork(&self) -> Self {
        Self {
            config: self.config.clone(),
            api: self.api.clone(),
            reporter: self.reporter.clone(),
            cancel: self.cancel.clone(),
            retry: self.retry.clone(),
            build_id: self.build_id.clone(),
            source_image: self.source_image.clone(),
            vpc_id: self.vpc_id.clone(),
            vswitches: Vec::new(),
            security_group_id: self.security_group_id.clone(),
            instance: None,
            image_id: None,
            copied_images: BTreeMap::new(),
            failure: None,
        }
    }

    pub fn record_failure(&mut self, error: &BuildError) {
        self.failure = Some(error.to_string());
    }

    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn require_vpc_id(&self) -> Result<&str, BuildError> {
        self.vpc_id.as_deref().ok_or(BuildError::MissingState("vpc id"))
    }

    pub fn require_security_group_id(&self) -> Result<&str, BuildError> {
        self.security_group_id
            .as_deref()
            .ok_or(BuildError::MissingState("security group id"))
    }

    pub fn require_instance(&self) -> Result<&Instance, BuildError> {
        self.instance
            .as_ref()
            .ok_or(BuildError::MissingState("instance"))
    }

    pub fn require_image_id(&self) -> Result<&str, BuildError> {
        self.image_id
            .as_deref()
            .ok_or(BuildError::MissingState("image id"))
    }

    /// Tags stamped on every instance and image the build creates
    pub fn resource_tags(&self, user: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        use ecs_imager_common::tags;

        let mut all = user.clone();
        all.insert(tags::TAG_TOOL.to_string(), tags::TAG_TOOL_VALUE.to_string());
        all.insert(tags::TAG_BUILD_ID.to_string(), self.build_id.clone());
        all.insert(
            tags::TAG_CREATED_AT.to_string(),
            tags::format_created_at(chrono::Utc::now()),
        );
        all
    }

    /// Name for a resource the build creates, e.g. `ecs-imager-vsw-9f3b2c1a`
    pub fn generated_name(&self, kind: &str) -> String {
        let hex: String = self.build_id.chars().filter(|c| *c != '-').collect();
        let short = &hex[hex.len().saturating_sub(8)..];
        format!("ecs-imager-{kind}-{short}")
    }
}

impl std::fmt::Debug for BuildState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildState")
            .field("build_id", &self.build_id)
            .field("vpc_id", &self.vpc_id)
            .field("vswitches", &self.vswitches)
            .field("security_group_id", &self.security_group_id)
            .field("instance", &self.instance)
            .field("image_id", &self.image_id)
            .field("copied_images", &self.copied_images)
            .field("failure", &self.failure)
            .finish_non_exhaustive()
    }
}
