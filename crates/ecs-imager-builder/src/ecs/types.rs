//! Provider resource and request types
//!
//! Only the fields orchestration reads are modeled: IDs, names, status and
//! zone. Wire decoding lives in the client.

use std::collections::BTreeMap;

/// A region offered by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub region_id: String,
    pub local_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub image_id: String,
    pub image_name: String,
    pub status: String,
}

/// Zone availability for a requested instance type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneAvailability {
    pub zone_id: String,
    pub status: String,
    pub resources: Vec<SupportedResource>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedResource {
    pub value: String,
    pub status: String,
}

/// An instance type the provider suggests in place of a sold-out one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecommendedZone {
    pub zone_id: String,
    pub instance_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vpc {
    pub vpc_id: String,
    pub vpc_name: String,
    pub cidr_block: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VSwitch {
    pub vswitch_id: String,
    pub vswitch_name: String,
    pub vpc_id: String,
    pub zone_id: String,
    pub cidr_block: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroup {
    pub security_group_id: String,
    pub security_group_name: String,
    pub vpc_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub instance_id: String,
    pub instance_name: String,
    pub instance_type: String,
    pub zone_id: String,
    pub vswitch_id: String,
    pub status: String,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
}

/// Image lookup filter; empty fields are not sent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageFilter {
    pub region_id: String,
    pub image_id: Option<String>,
    pub image_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VpcFilter {
    pub vpc_id: Option<String>,
    pub vpc_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VSwitchFilter {
    pub vpc_id: Option<String>,
    pub vswitch_id: Option<String>,
    pub vswitch_name: Option<String>,
    pub zone_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityGroupFilter {
    pub vpc_id: Option<String>,
    pub security_group_id: Option<String>,
    pub security_group_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateVpcRequest {
    pub vpc_name: String,
    pub cidr_block: String,
    pub description: String,
    pub client_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateVSwitchRequest {
    pub vpc_id: String,
    pub zone_id: String,
    pub cidr_block: String,
    pub vswitch_name: String,
    pub description: String,
    pub client_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSecurityGroupRequest {
    pub vpc_id: String,
    pub security_group_name: String,
    pub description: String,
    pub client_token: String,
}

/// Ingress rule on a security group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressRule {
    pub security_group_id: String,
    pub ip_protocol: String,
    /// "from/to", e.g. "22/22"
    pub port_range: String,
    pub source_cidr_ip: String,
    pub nic_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskSpec {
    pub category: Option<String>,
    pub size: Option<u32>,
    pub name: Option<String>,
    pub snapshot_id: Option<String>,
    pub delete_with_instance: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateInstanceRequest {
    pub zone_id: String,
    pub vswitch_id: String,
    pub security_group_id: String,
    pub instance_type: String,
    pub instance_name: String,
    pub image_id: Option<String>,
    pub image_family: Option<String>,
    pub internet_charge_type: String,
    pub internet_max_bandwidth_out: u32,
    pub io_optimized: Option<bool>,
    pub password: Option<String>,
    pub ram_role_name: Option<String>,
    pub security_enhancement_strategy: Option<String>,
    /// Base64-encoded user data
    pub user_data: Option<String>,
    pub system_disk: DiskSpec,
    pub data_disks: Vec<DiskSpec>,
    pub tags: BTreeMap<String, String>,
    pub client_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateImageRequest {
    pub instance_id: String,
    pub image_name: String,
    pub description: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub client_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyImageRequest {
    pub source_region_id: String,
    pub image_id: String,
    pub destination_region_id: String,
    pub destination_image_name: String,
    pub destination_description: Option<String>,
    pub client_token: String,
}

/// Query for instance types to use when the requested one is sold out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecommendRequest {
    pub instance_type: String,
    pub zone_id: Option<String>,
    pub charge_type: String,
    pub system_disk_category: String,
    pub priority_strategy: String,
    pub scene: String,
}
