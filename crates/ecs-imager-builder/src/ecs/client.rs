//! HTTP client for the ECS and VPC RPC APIs

use super::EcsApi;
use super::context::{EcsContext, Service};
use super::signing::{SIGNATURE_METHOD, SIGNATURE_VERSION, sign_query};
use super::types::*;
use crate::error::ApiError;
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Image statuses requested from DescribeImages; the API defaults to Available only
const ALL_IMAGE_STATUSES: &str = "Creating,Waiting,Available,UnAvailable,CreateFailed";

/// Request parameters, kept sorted for signing
#[derive(Debug, Default)]
struct Params(BTreeMap<String, String>);

impl Params {
    fn new() -> Self {
        Self::default()
    }

    fn set(mut self, key: &str, value: impl Into<String>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    fn opt(self, key: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.set(key, v),
            None => self,
        }
    }

    fn tags(mut self, tags: &BTreeMap<String, String>) -> Self {
        for (n, (key, value)) in tags.iter().enumerate() {
            self = self
                .set(&format!("Tag.{}.Key", n + 1), key.clone())
                .set(&format!("Tag.{}.Value", n + 1), value.clone());
        }
        self
    }

    fn disk(self, prefix: &str, disk: &DiskSpec) -> Self {
        self.opt(&format!("{prefix}.Category"), disk.category.clone())
            .opt(&format!("{prefix}.Size"), disk.size.map(|s| s.to_string()))
            .opt(&format!("{prefix}.DiskName"), disk.name.clone())
            .opt(&format!("{prefix}.SnapshotId"), disk.snapshot_id.clone())
            .opt(
                &format!("{prefix}.DeleteWithInstance"),
                disk.delete_with_instance.map(|d| d.to_string()),
            )
    }
}

/// Error body returned with non-2xx responses
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorBody {
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    request_id: String,
}

/// Signed RPC client implementing [`EcsApi`]
#[derive(Debug, Clone)]
pub struct EcsClient {
    http: reqwest::Client,
    context: EcsContext,
}

impl EcsClient {
    pub fn new(context: EcsContext) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self { http, context })
    }

    pub fn region(&self) -> &str {
        &self.context.region
    }

    async fn call<T: DeserializeOwned>(
        &self,
        service: Service,
        region: &str,
        action: &str,
        params: Params,
    ) -> Result<T, ApiError> {
        let mut params = params
            .set("Action", action)
            .set("Format", "JSON")
            .set("Version", service.api_version())
            .set("AccessKeyId", self.context.credentials.access_key_id.clone())
            .set("SignatureMethod", SIGNATURE_METHOD)
            .set("SignatureVersion", SIGNATURE_VERSION)
            .set("SignatureNonce", uuid::Uuid::new_v4().to_string())
            .set(
                "Timestamp",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            )
            .set("RegionId", region)
            .0;

        let query = sign_query(&mut params, self.context.credentials.secret())?;
        let url = format!("{}/?{query}", self.context.endpoint(service, region));
        debug!(action, region, "Calling provider API");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<ErrorBody>(&body) {
                Ok(err) => ApiError::Service {
                    code: err.code,
                    message: err.message,
                    request_id: err.request_id,
                },
                Err(_) => ApiError::Transport(format!("HTTP {status}: {body}")),
            });
        }

        serde_json::from_str(&body).map_err(|e| ApiError::Decode(format!("{action}: {e}")))
    }

    async fn ecs<T: DeserializeOwned>(&self, action: &str, params: Params) -> Result<T, ApiError> {
        self.call(Service::Ecs, &self.context.region, action, params)
            .await
    }

    async fn vpc<T: DeserializeOwned>(&self, action: &str, params: Params) -> Result<T, ApiError> {
        self.call(Service::Vpc, &self.context.region, action, params)
            .await
    }
}

// Wire shapes. Collections come wrapped one level deep, e.g. {"Vpcs": {"Vpc": [...]}}.

#[derive(Deserialize)]
struct Empty {}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RegionsResponse {
    regions: RegionList,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RegionList {
    #[serde(default)]
    region: Vec<RegionItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RegionItem {
    region_id: String,
    #[serde(default)]
    local_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImagesResponse {
    images: ImageList,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImageList {
    #[serde(default)]
    image: Vec<ImageItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImageItem {
    image_id: String,
    #[serde(default)]
    image_name: String,
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImageIdResponse {
    image_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AvailableResourceResponse {
    #[serde(default)]
    available_zones: Option<ZoneList>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ZoneList {
    #[serde(default)]
    available_zone: Vec<ZoneItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ZoneItem {
    zone_id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    available_resources: Option<AvailableResourceList>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AvailableResourceList {
    #[serde(default)]
    available_resource: Vec<AvailableResourceItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AvailableResourceItem {
    #[serde(default)]
    supported_resources: Option<SupportedResourceList>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SupportedResourceList {
    #[serde(default)]
    supported_resource: Vec<SupportedResourceItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SupportedResourceItem {
    #[serde(default)]
    value: String,
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RecommendResponse {
    #[serde(default)]
    data: Option<RecommendList>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RecommendList {
    #[serde(default)]
    recommend_instance_type: Vec<RecommendItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RecommendItem {
    zone_id: String,
    instance_type: RecommendInstanceType,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RecommendInstanceType {
    instance_type: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VpcIdResponse {
    vpc_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VpcsResponse {
    vpcs: VpcList,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VpcList {
    #[serde(default)]
    vpc: Vec<VpcItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VpcItem {
    vpc_id: String,
    #[serde(default)]
    vpc_name: String,
    #[serde(default)]
    cidr_block: String,
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
struct VSwitchIdResponse {
    #[serde(rename = "VSwitchId")]
    vswitch_id: String,
}

#[derive(Deserialize)]
struct VSwitchesResponse {
    #[serde(rename = "VSwitches")]
    vswitches: VSwitchList,
}

#[derive(Deserialize)]
struct VSwitchList {
    #[serde(rename = "VSwitch", default)]
    vswitch: Vec<VSwitchItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VSwitchItem {
    #[serde(rename = "VSwitchId")]
    vswitch_id: String,
    #[serde(rename = "VSwitchName", default)]
    vswitch_name: String,
    #[serde(default)]
    vpc_id: String,
    #[serde(default)]
    zone_id: String,
    #[serde(default)]
    cidr_block: String,
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SecurityGroupIdResponse {
    security_group_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SecurityGroupsResponse {
    security_groups: SecurityGroupList,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SecurityGroupList {
    #[serde(default)]
    security_group: Vec<SecurityGroupItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SecurityGroupItem {
    security_group_id: String,
    #[serde(default)]
    security_group_name: String,
    #[serde(default)]
    vpc_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceIdResponse {
    instance_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstancesResponse {
    instances: InstanceList,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceList {
    #[serde(default)]
    instance: Vec<InstanceItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IpAddressList {
    #[serde(default)]
    ip_address: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VpcAttributes {
    #[serde(rename = "VSwitchId", default)]
    vswitch_id: String,
    #[serde(default)]
    private_ip_address: Option<IpAddressList>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceItem {
    instance_id: String,
    #[serde(default)]
    instance_name: String,
    #[serde(default)]
    instance_type: String,
    #[serde(default)]
    zone_id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    vpc_attributes: Option<VpcAttributes>,
    #[serde(default)]
    public_ip_address: Option<IpAddressList>,
}

impl From<InstanceItem> for Instance {
    fn from(item: InstanceItem) -> Self {
        let (vswitch_id, private_ip) = match item.vpc_attributes {
            Some(attrs) => (
                attrs.vswitch_id,
                attrs
                    .private_ip_address
                    .and_then(|ips| ips.ip_address.into_iter().next()),
            ),
            None => (String::new(), None),
        };
        Instance {
            instance_id: item.instance_id,
            instance_name: item.instance_name,
            instance_type: item.instance_type,
            zone_id: item.zone_id,
            vswitch_id,
            status: item.status,
            private_ip,
            public_ip: item
                .public_ip_address
                .and_then(|ips| ips.ip_address.into_iter().next()),
        }
    }
}

fn json_id_list(id: &str) -> String {
    serde_json::json!([id]).to_string()
}

#[async_trait]
impl EcsApi for EcsClient {
    async fn describe_regions(&self) -> Result<Vec<Region>, ApiError> {
        let resp: RegionsResponse = self.ecs("DescribeRegions", Params::new()).await?;
        Ok(resp
            .regions
            .region
            .into_iter()
            .map(|r| Region {
                region_id: r.region_id,
                local_name: r.local_name,
            })
            .collect())
    }

    async fn describe_images(&self, filter: ImageFilter) -> Result<Vec<Image>, ApiError> {
        let params = Params::new()
            .opt("ImageId", filter.image_id)
            .opt("ImageName", filter.image_name)
            .set("Status", ALL_IMAGE_STATUSES)
            .set("PageSize", "100");
        let resp: ImagesResponse = self
            .call(Service::Ecs, &filter.region_id, "DescribeImages", params)
            .await?;
        Ok(resp
            .images
            .image
            .into_iter()
            .map(|i| Image {
                image_id: i.image_id,
                image_name: i.image_name,
                status: i.status,
            })
            .collect())
    }

    async fn create_image(&self, request: CreateImageRequest) -> Result<String, ApiError> {
        let params = Params::new()
            .set("InstanceId", request.instance_id)
            .set("ImageName", request.image_name)
            .opt("Description", request.description)
            .set("ClientToken", request.client_token)
            .tags(&request.tags);
        let resp: ImageIdResponse = self.ecs("CreateImage", params).await?;
        Ok(resp.image_id)
    }

    async fn copy_image(&self, request: CopyImageRequest) -> Result<String, ApiError> {
        let params = Params::new()
            .set("ImageId", request.image_id)
            .set("DestinationRegionId", request.destination_region_id)
            .set("DestinationImageName", request.destination_image_name)
            .opt("DestinationDescription", request.destination_description)
            .set("ClientToken", request.client_token);
        let resp: ImageIdResponse = self
            .call(Service::Ecs, &request.source_region_id, "CopyImage", params)
            .await?;
        Ok(resp.image_id)
    }

    async fn delete_image(&self, region_id: &str, image_id: &str) -> Result<(), ApiError> {
        let params = Params::new().set("ImageId", image_id);
        let _: Empty = self
            .call(Service::Ecs, region_id, "DeleteImage", params)
            .await?;
        Ok(())
    }

    async fn describe_available_zones(
        &self,
        instance_type: &str,
    ) -> Result<Vec<ZoneAvailability>, ApiError> {
        let params = Params::new()
            .set("DestinationResource", "InstanceType")
            .set("InstanceType", instance_type)
            .set("InstanceChargeType", "PostPaid")
            .set("IoOptimized", "optimized");
        let resp: AvailableResourceResponse =
            self.ecs("DescribeAvailableResource", params).await?;
        let zones = resp.available_zones.map(|z| z.available_zone).unwrap_or_default();
        Ok(zones
            .into_iter()
            .map(|zone| ZoneAvailability {
                zone_id: zone.zone_id,
                status: zone.status,
                resources: zone
                    .available_resources
                    .into_iter()
                    .flat_map(|r| r.available_resource)
                    .filter_map(|r| r.supported_resources)
                    .flat_map(|s| s.supported_resource)
                    .map(|s| SupportedResource {
                        value: s.value,
                        status: s.status,
                    })
                    .collect(),
            })
            .collect())
    }

    async fn describe_recommended_zones(
        &self,
        request: RecommendRequest,
    ) -> Result<Vec<RecommendedZone>, ApiError> {
        let params = Params::new()
            .set("InstanceType", request.instance_type)
            .opt("ZoneId", request.zone_id)
            .set("InstanceChargeType", request.charge_type)
            .set("SystemDiskCategory", request.system_disk_category)
            .set("PriorityStrategy", request.priority_strategy)
            .set("Scene", request.scene)
            .set("NetworkType", "vpc")
            .set("IoOptimized", "optimized");
        let resp: RecommendResponse = self.ecs("DescribeRecommendInstanceType", params).await?;
        Ok(resp
            .data
            .map(|d| d.recommend_instance_type)
            .unwrap_or_default()
            .into_iter()
            .map(|r| RecommendedZone {
                zone_id: r.zone_id,
                instance_type: r.instance_type.instance_type,
            })
            .collect())
    }

    async fn create_vpc(&self, request: CreateVpcRequest) -> Result<String, ApiError> {
        let params = Params::new()
            .set("VpcName", request.vpc_name)
            .set("CidrBlock", request.cidr_block)
            .set("Description", request.description)
            .set("ClientToken", request.client_token);
        let resp: VpcIdResponse = self.vpc("CreateVpc", params).await?;
        Ok(resp.vpc_id)
    }

    async fn describe_vpcs(&self, filter: VpcFilter) -> Result<Vec<Vpc>, ApiError> {
        let params = Params::new()
            .opt("VpcId", filter.vpc_id)
            .opt("VpcName", filter.vpc_name)
            .set("PageSize", "50");
        let resp: VpcsResponse = self.vpc("DescribeVpcs", params).await?;
        Ok(resp
            .vpcs
            .vpc
            .into_iter()
            .map(|v| Vpc {
                vpc_id: v.vpc_id,
                vpc_name: v.vpc_name,
                cidr_block: v.cidr_block,
                status: v.status,
            })
            .collect())
    }

    async fn delete_vpc(&self, vpc_id: &str) -> Result<(), ApiError> {
        let _: Empty = self
            .vpc("DeleteVpc", Params::new().set("VpcId", vpc_id))
            .await?;
        Ok(())
    }

    async fn create_vswitch(&self, request: CreateVSwitchRequest) -> Result<String, ApiError> {
        let params = Params::new()
            .set("VpcId", request.vpc_id)
            .set("ZoneId", request.zone_id)
            .set("CidrBlock", request.cidr_block)
            .set("VSwitchName", request.vswitch_name)
            .set("Description", request.description)
            .set("ClientToken", request.client_token);
        let resp: VSwitchIdResponse = self.vpc("CreateVSwitch", params).await?;
        Ok(resp.vswitch_id)
    }

    async fn describe_vswitches(&self, filter: VSwitchFilter) -> Result<Vec<VSwitch>, ApiError> {
        let params = Params::new()
            .opt("VpcId", filter.vpc_id)
            .opt("VSwitchId", filter.vswitch_id)
            .opt("VSwitchName", filter.vswitch_name)
            .opt("ZoneId", filter.zone_id)
            .set("PageSize", "50");
        let resp: VSwitchesResponse = self.vpc("DescribeVSwitches", params).await?;
        Ok(resp
            .vswitches
            .vswitch
            .into_iter()
            .map(|v| VSwitch {
                vswitch_id: v.vswitch_id,
                vswitch_name: v.vswitch_name,
                vpc_id: v.vpc_id,
                zone_id: v.zone_id,
                cidr_block: v.cidr_block,
                status: v.status,
            })
            .collect())
    }

    async fn delete_vswitch(&self, vswitch_id: &str) -> Result<(), ApiError> {
        let _: Empty = self
            .vpc("DeleteVSwitch", Params::new().set("VSwitchId", vswitch_id))
            .await?;
        Ok(())
    }

    async fn create_security_group(
        &self,
        request: CreateSecurityGroupRequest,
    ) -> Result<String, ApiError> {
        let params = Params::new()
            .set("VpcId", request.vpc_id)
            .set("SecurityGroupName", request.security_group_name)
            .set("Description", request.description)
            .set("ClientToken", request.client_token);
        let resp: SecurityGroupIdResponse = self.ecs("CreateSecurityGroup", params).await?;
        Ok(resp.security_group_id)
    }

    async fn describe_security_groups(
        &self,
        filter: SecurityGroupFilter,
    ) -> Result<Vec<SecurityGroup>, ApiError> {
        let params = Params::new()
            .opt("VpcId", filter.vpc_id)
            .opt(
                "SecurityGroupIds",
                filter.security_group_id.as_deref().map(json_id_list),
            )
            .opt("SecurityGroupName", filter.security_group_name)
            .set("PageSize", "50");
        let resp: SecurityGroupsResponse = self.ecs("DescribeSecurityGroups", params).await?;
        Ok(resp
            .security_groups
            .security_group
            .into_iter()
            .map(|g| SecurityGroup {
                security_group_id: g.security_group_id,
                security_group_name: g.security_group_name,
                vpc_id: g.vpc_id,
            })
            .collect())
    }

    async fn authorize_security_group(&self, rule: IngressRule) -> Result<(), ApiError> {
        let params = Params::new()
            .set("SecurityGroupId", rule.security_group_id)
            .set("IpProtocol", rule.ip_protocol)
            .set("PortRange", rule.port_range)
            .set("SourceCidrIp", rule.source_cidr_ip)
            .set("NicType", rule.nic_type);
        let _: Empty = self.ecs("AuthorizeSecurityGroup", params).await?;
        Ok(())
    }

    async fn delete_security_group(&self, security_group_id: &str) -> Result<(), ApiError> {
        let params = Params::new().set("SecurityGroupId", security_group_id);
        let _: Empty = self.ecs("DeleteSecurityGroup", params).await?;
        Ok(())
    }

    async fn create_instance(&self, request: CreateInstanceRequest) -> Result<String, ApiError> {
        let mut params = Params::new()
            .set("ZoneId", request.zone_id)
            .set("VSwitchId", request.vswitch_id)
            .set("SecurityGroupId", request.security_group_id)
            .set("InstanceType", request.instance_type)
            .set("InstanceName", request.instance_name)
            .set("InstanceChargeType", "PostPaid")
            .opt("ImageId", request.image_id)
            .opt("ImageFamily", request.image_family)
            .set("InternetChargeType", request.internet_charge_type)
            .set(
                "InternetMaxBandwidthOut",
                request.internet_max_bandwidth_out.to_string(),
            )
            .opt(
                "IoOptimized",
                request
                    .io_optimized
                    .map(|io| if io { "optimized" } else { "none" }),
            )
            .opt("Password", request.password)
            .opt("RamRoleName", request.ram_role_name)
            .opt(
                "SecurityEnhancementStrategy",
                request.security_enhancement_strategy,
            )
            .opt("UserData", request.user_data)
            .set("ClientToken", request.client_token)
            .disk("SystemDisk", &request.system_disk)
            .tags(&request.tags);
        for (n, disk) in request.data_disks.iter().enumerate() {
            params = params.disk(&format!("DataDisk.{}", n + 1), disk);
        }
        let resp: InstanceIdResponse = self.ecs("CreateInstance", params).await?;
        Ok(resp.instance_id)
    }

    async fn describe_instance(&self, instance_id: &str) -> Result<Option<Instance>, ApiError> {
        let params = Params::new().set("InstanceIds", json_id_list(instance_id));
        let resp: InstancesResponse = self.ecs("DescribeInstances", params).await?;
        Ok(resp.instances.instance.into_iter().next().map(Instance::from))
    }

    async fn start_instance(&self, instance_id: &str) -> Result<(), ApiError> {
        let _: Empty = self
            .ecs("StartInstance", Params::new().set("InstanceId", instance_id))
            .await?;
        Ok(())
    }

    async fn stop_instance(&self, instance_id: &str, force: bool) -> Result<(), ApiError> {
        let params = Params::new()
            .set("InstanceId", instance_id)
            .set("ForceStop", force.to_string());
        let _: Empty = self.ecs("StopInstance", params).await?;
        Ok(())
    }

    async fn delete_instance(&self, instance_id: &str, force: bool) -> Result<(), ApiError> {
        let params = Params::new()
            .set("InstanceId", instance_id)
            .set("Force", force.to_string());
        let _: Empty = self.ecs("DeleteInstance", params).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_tags_are_numbered() {
        let tags = BTreeMap::from([
            ("env".to_string(), "ci".to_string()),
            ("team".to_string(), "infra".to_string()),
        ]);
        let params = Params::new().tags(&tags).0;
        assert_eq!(params["Tag.1.Key"], "env");
        assert_eq!(params["Tag.1.Value"], "ci");
        assert_eq!(params["Tag.2.Key"], "team");
    }

    #[test]
    fn test_params_disk_skips_unset_fields() {
        let disk = DiskSpec {
            category: Some("cloud_essd".to_string()),
            size: Some(40),
            name: None,
            snapshot_id: None,
            delete_with_instance: None,
        };
        let params = Params::new().disk("DataDisk.1", &disk).0;
        assert_eq!(params.len(), 2);
        assert_eq!(params["DataDisk.1.Size"], "40");
    }

    #[test]
    fn test_decode_vswitches() {
        let body = r#"{
            "RequestId": "r-1",
            "VSwitches": { "VSwitch": [{
                "VSwitchId": "vsw-123", "VSwitchName": "build", "VpcId": "vpc-1",
                "ZoneId": "cn-beijing-a", "CidrBlock": "172.16.0.0/24", "Status": "Available"
            }] }
        }"#;
        let resp: VSwitchesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.vswitches.vswitch[0].vswitch_id, "vsw-123");
        assert_eq!(resp.vswitches.vswitch[0].zone_id, "cn-beijing-a");
    }

    #[test]
    fn test_decode_instance_ips() {
        let body = r#"{
            "Instances": { "Instance": [{
                "InstanceId": "i-1", "Status": "Running", "ZoneId": "cn-beijing-a",
                "VpcAttributes": { "VSwitchId": "vsw-1", "PrivateIpAddress": { "IpAddress": ["172.16.0.5"] } },
                "PublicIpAddress": { "IpAddress": [] }
            }] }
        }"#;
        let resp: InstancesResponse = serde_json::from_str(body).unwrap();
        let instance = Instance::from(resp.instances.instance.into_iter().next().unwrap());
        assert_eq!(instance.vswitch_id, "vsw-1");
        assert_eq!(instance.private_ip.as_deref(), Some("172.16.0.5"));
        assert!(instance.public_ip.is_none());
    }
}
