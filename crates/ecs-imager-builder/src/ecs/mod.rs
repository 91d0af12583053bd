//! Alibaba Cloud ECS/VPC API boundary
//!
//! Orchestration depends only on [`EcsApi`]: typed responses on success and an
//! [`ApiError`] carrying the provider error code on failure.
//!
//! - [`client`]: HTTP implementation over the signed RPC API
//! - [`classify`]: Transient-error classification and evaluation functions
//! - [`context`]: Credentials and endpoint selection
//! - [`signing`]: RPC request signatures

pub mod classify;
pub mod client;
pub mod context;
pub mod signing;
pub mod types;

pub use client::EcsClient;
pub use context::{Credentials, EcsContext};
pub use types::*;

use crate::error::ApiError;
use async_trait::async_trait;

/// Trait for provider operations that can be faked in tests.
///
/// Regional calls run in the configured region unless the request names
/// another one.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EcsApi: Send + Sync {
    async fn describe_regions(&self) -> Result<Vec<Region>, ApiError>;

    async fn describe_images(&self, filter: ImageFilter) -> Result<Vec<Image>, ApiError>;

    async fn create_image(&self, request: CreateImageRequest) -> Result<String, ApiError>;

    /// Start copying an image to another region; returns the new image ID
    async fn copy_image(&self, request: CopyImageRequest) -> Result<String, ApiError>;

    async fn delete_image(&self, region_id: &str, image_id: &str) -> Result<(), ApiError>;

    /// Zones and their availability for an instance type
    async fn describe_available_zones(
        &self,
        instance_type: &str,
    ) -> Result<Vec<ZoneAvailability>, ApiError>;

    async fn describe_recommended_zones(
        &self,
        request: RecommendRequest,
    ) -> Result<Vec<RecommendedZone>, ApiError>;

    async fn create_vpc(&self, request: CreateVpcRequest) -> Result<String, ApiError>;

    async fn describe_vpcs(&self, filter: VpcFilter) -> Result<Vec<Vpc>, ApiError>;

    async fn delete_vpc(&self, vpc_id: &str) -> Result<(), ApiError>;

    async fn create_vswitch(&self, request: CreateVSwitchRequest) -> Result<String, ApiError>;

    async fn describe_vswitches(&self, filter: VSwitchFilter) -> Result<Vec<VSwitch>, ApiError>;

    async fn delete_vswitch(&self, vswitch_id: &str) -> Result<(), ApiError>;

    async fn create_security_group(
        &self,
        request: CreateSecurityGroupRequest,
    ) -> Result<String, ApiError>;

    async fn describe_security_groups(
        &self,
        filter: SecurityGroupFilter,
    ) -> Result<Vec<SecurityGroup>, ApiError>;

    async fn authorize_security_group(&self, rule: IngressRule) -> Result<(), ApiError>;

    async fn delete_security_group(&self, security_group_id: &str) -> Result<(), ApiError>;

    async fn create_instance(&self, request: CreateInstanceRequest) -> Result<String, ApiError>;

    async fn describe_instance(&self, instance_id: &str) -> Result<Option<Instance>, ApiError>;

    async fn start_instance(&self, instance_id: &str) -> Result<(), ApiError>;

    async fn stop_instance(&self, instance_id: &str, force: bool) -> Result<(), ApiError>;

    async fn delete_instance(&self, instance_id: &str, force: bool) -> Result<(), ApiError>;
}
