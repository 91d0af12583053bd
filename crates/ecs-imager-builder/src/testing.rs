//! Test doubles for the provider API and the progress sink
//!
//! [`FakeEcs`] keeps resources in memory, hands out sequential IDs, and lets a
//! test script error codes per operation or per (operation, zone). Newly
//! created resources report a transitional status for a configurable number
//! of describes before settling.

use crate::config::BuildConfig;
use crate::ecs::*;
use crate::error::ApiError;
use crate::pipeline::ProgressReporter;
use async_trait::async_trait;
use ecs_imager_common::ResourceKind;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

/// Template used across tests: one region, one instance type, a source image
pub fn sample_config() -> BuildConfig {
    BuildConfig::from_json(
        r#"{
            "access": { "region": "cn-hangzhou" },
            "image": { "name": "my-image" },
            "instance": {
                "instance_type": "ecs.g6.large",
                "source_image": "m-source"
            }
        }"#,
    )
    .expect("sample template parses")
}

/// Progress reporter that keeps every line
#[derive(Debug, Default)]
pub struct RecordingReporter {
    lines: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter_map(|l| l.strip_prefix("error: ").map(str::to_string))
            .collect()
    }
}

impl ProgressReporter for RecordingReporter {
    fn say(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("say: {message}"));
    }

    fn message(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("message: {message}"));
    }

    fn error(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("error: {message}"));
    }
}

#[derive(Debug, Clone)]
struct Settling {
    describes_left: u32,
    status: &'static str,
}

#[derive(Debug, Default)]
struct FakeState {
    regions: Vec<Region>,
    zones: Vec<ZoneAvailability>,
    recommendations: Vec<RecommendedZone>,
    /// image ID -> (region, image)
    images: BTreeMap<String, (String, Image)>,
    vpcs: BTreeMap<String, Vpc>,
    vswitches: BTreeMap<String, VSwitch>,
    security_groups: BTreeMap<String, SecurityGroup>,
    instances: BTreeMap<String, Instance>,
    settling: HashMap<String, Settling>,
    scripted: HashMap<String, VecDeque<ApiError>>,
    calls: Vec<String>,
    next_id: u32,
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:04}", self.next_id)
    }

    /// Pop a scripted error for `op`, preferring the zone-specific queue
    fn scripted(&mut self, op: &str, zone: Option<&str>) -> Result<(), ApiError> {
        let keys = zone
            .map(|z| format!("{op}@{z}"))
            .into_iter()
            .chain(std::iter::once(op.to_string()));
        for key in keys {
            if let Some(err) = self.scripted.get_mut(&key).and_then(VecDeque::pop_front) {
                return Err(err);
            }
        }
        Ok(())
    }

    /// Advance a resource toward its settled status; returns the status to report
    fn observe(&mut self, id: &str, current: &str) -> String {
        let Some(settling) = self.settling.get_mut(id) else {
            return current.to_string();
        };
        if settling.describes_left == 0 {
            let status = settling.status;
            self.settling.remove(id);
            status.to_string()
        } else {
            settling.describes_left -= 1;
            current.to_string()
        }
    }
}

fn not_found(kind: ResourceKind, id: &str) -> ApiError {
    ApiError::service(kind.not_found_code(), format!("{id} does not exist"))
}

/// In-memory provider
#[derive(Debug)]
pub struct FakeEcs {
    region: String,
    settle_after: u32,
    state: Mutex<FakeState>,
}

impl Default for FakeEcs {
    fn default() -> Self {
        Self::new("cn-hangzhou")
    }
}

impl FakeEcs {
    /// A provider for `region` that sells the sample instance type in two zones
    pub fn new(region: &str) -> Self {
        let fake = Self {
            region: region.to_string(),
            settle_after: 1,
            state: Mutex::new(FakeState::default()),
        };
        fake.add_region(region);
        fake.add_zone(&format!("{region}-a"), true);
        fake.add_zone(&format!("{region}-b"), true);
        fake.add_image(region, "m-source", "source-image", "Available");
        fake
    }

    /// Number of describes a new resource stays transitional for
    pub fn with_settle_after(mut self, describes: u32) -> Self {
        self.settle_after = describes;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn record(&self, state: &mut FakeState, call: String) {
        state.calls.push(call);
    }

    pub fn add_region(&self, region_id: &str) {
        self.lock().regions.push(Region {
            region_id: region_id.to_string(),
            local_name: region_id.to_string(),
        });
    }

    /// Replace the zone list
    pub fn set_zones(&self, zones: &[(&str, bool)]) {
        let mut state = self.lock();
        state.zones.clear();
        drop(state);
        for (zone, sellable) in zones {
            self.add_zone(zone, *sellable);
        }
    }

    pub fn add_zone(&self, zone_id: &str, sellable: bool) {
        let status = if sellable { "Available" } else { "SoldOut" };
        self.lock().zones.push(ZoneAvailability {
            zone_id: zone_id.to_string(),
            status: "Available".to_string(),
            resources: vec![SupportedResource {
                value: "ecs.g6.large".to_string(),
                status: status.to_string(),
            }],
        });
    }

    pub fn add_recommendation(&self, zone_id: &str, instance_type: &str) {
        self.lock().recommendations.push(RecommendedZone {
            zone_id: zone_id.to_string(),
            instance_type: instance_type.to_string(),
        });
    }

    pub fn add_image(&self, region: &str, image_id: &str, name: &str, status: &str) {
        self.lock().images.insert(
            image_id.to_string(),
            (
                region.to_string(),
                Image {
                    image_id: image_id.to_string(),
                    image_name: name.to_string(),
                    status: status.to_string(),
                },
            ),
        );
    }

    pub fn add_vpc(&self, vpc_id: &str, name: &str) {
        self.lock().vpcs.insert(
            vpc_id.to_string(),
            Vpc {
                vpc_id: vpc_id.to_string(),
                vpc_name: name.to_string(),
                cidr_block: "172.16.0.0/16".to_string(),
                status: "Available".to_string(),
            },
        );
    }

    pub fn add_vswitch(&self, vswitch_id: &str, vpc_id: &str, zone_id: &str, name: &str) {
        self.lock().vswitches.insert(
            vswitch_id.to_string(),
            VSwitch {
                vswitch_id: vswitch_id.to_string(),
                vswitch_name: name.to_string(),
                vpc_id: vpc_id.to_string(),
                zone_id: zone_id.to_string(),
                cidr_block: "172.16.0.0/24".to_string(),
                status: "Available".to_string(),
            },
        );
    }

    pub fn add_security_group(&self, group_id: &str, vpc_id: &str, name: &str) {
        self.lock().security_groups.insert(
            group_id.to_string(),
            SecurityGroup {
                security_group_id: group_id.to_string(),
                security_group_name: name.to_string(),
                vpc_id: vpc_id.to_string(),
            },
        );
    }

    /// Queue error codes returned by the next calls to `op`
    ///
    /// `op` is the trait method name, optionally suffixed with `@zone` for
    /// zone-scoped creates (`create_vswitch`, `create_instance`).
    pub fn fail(&self, op: &str, codes: &[&str]) {
        let mut state = self.lock();
        let queue = state.scripted.entry(op.to_string()).or_default();
        queue.extend(codes.iter().map(|c| ApiError::service(*c, "scripted failure")));
    }

    /// Every call made so far, as `op` or `op:detail`
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn vpcs(&self) -> Vec<Vpc> {
        self.lock().vpcs.values().cloned().collect()
    }

    pub fn vswitches(&self) -> Vec<VSwitch> {
        self.lock().vswitches.values().cloned().collect()
    }

    pub fn security_groups(&self) -> Vec<SecurityGroup> {
        self.lock().security_groups.values().cloned().collect()
    }

    pub fn instances(&self) -> Vec<Instance> {
        self.lock().instances.values().cloned().collect()
    }

    /// Images in `region`
    pub fn images(&self, region: &str) -> Vec<Image> {
        self.lock()
            .images
            .values()
            .filter(|(r, _)| r == region)
            .map(|(_, i)| i.clone())
            .collect()
    }

    fn settle(&self, state: &mut FakeState, id: &str, status: &'static str) {
        state.settling.insert(
            id.to_string(),
            Settling {
                describes_left: self.settle_after,
                status,
            },
        );
    }
}

#[async_trait]
impl EcsApi for FakeEcs {
    async fn describe_regions(&self) -> Result<Vec<Region>, ApiError> {
        let mut state = self.lock();
        self.record(&mut state, "describe_regions".to_string());
        state.scripted("describe_regions", None)?;
        Ok(state.regions.clone())
    }

    async fn describe_images(&self, filter: ImageFilter) -> Result<Vec<Image>, ApiError> {
        let mut state = self.lock();
        self.record(&mut state, format!("describe_images:{}", filter.region_id));
        state.scripted("describe_images", None)?;

        let matching: Vec<Image> = state
            .images
            .values()
            .filter(|(region, _)| *region == filter.region_id)
            .map(|(_, image)| image.clone())
            .filter(|i| filter.image_id.as_ref().is_none_or(|id| *id == i.image_id))
            // the provider's name filter is a prefix match
            .filter(|i| {
                filter
                    .image_name
                    .as_ref()
                    .is_none_or(|n| i.image_name.starts_with(n.as_str()))
            })
            .collect();

        Ok(matching
            .into_iter()
            .map(|mut image| {
                image.status = state.observe(&image.image_id, &image.status);
                if let Some((_, stored)) = state.images.get_mut(&image.image_id) {
                    stored.status = image.status.clone();
                }
                image
            })
            .collect())
    }

    async fn create_image(&self, request: CreateImageRequest) -> Result<String, ApiError> {
        let mut state = self.lock();
        self.record(&mut state, format!("create_image:{}", request.image_name));
        state.scripted("create_image", None)?;
        if !state.instances.contains_key(&request.instance_id) {
            return Err(not_found(ResourceKind::Instance, &request.instance_id));
        }
        let image_id = state.next_id("m");
        state.images.insert(
            image_id.clone(),
            (
                self.region.clone(),
                Image {
                    image_id: image_id.clone(),
                    image_name: request.image_name,
                    status: "Creating".to_string(),
                },
            ),
        );
        self.settle(&mut state, &image_id, "Available");
        Ok(image_id)
    }

    async fn copy_image(&self, request: CopyImageRequest) -> Result<String, ApiError> {
        let mut state = self.lock();
        self.record(
            &mut state,
            format!("copy_image:{}", request.destination_region_id),
        );
        state.scripted("copy_image", None)?;
        if !state.images.contains_key(&request.image_id) {
            return Err(not_found(ResourceKind::Image, &request.image_id));
        }
        let image_id = state.next_id("m");
        state.images.insert(
            image_id.clone(),
            (
                request.destination_region_id,
                Image {
                    image_id: image_id.clone(),
                    image_name: request.destination_image_name,
                    status: "Creating".to_string(),
                },
            ),
        );
        self.settle(&mut state, &image_id, "Available");
        Ok(image_id)
    }

    async fn delete_image(&self, region_id: &str, image_id: &str) -> Result<(), ApiError> {
        let mut state = self.lock();
        self.record(&mut state, format!("delete_image:{image_id}"));
        state.scripted("delete_image", None)?;
        match state.images.get(image_id) {
            Some((region, _)) if region == region_id => {
                state.images.remove(image_id);
                Ok(())
            }
            _ => Err(not_found(ResourceKind::Image, image_id)),
        }
    }

    async fn describe_available_zones(
        &self,
        instance_type: &str,
    ) -> Result<Vec<ZoneAvailability>, ApiError> {
        let mut state = self.lock();
        self.record(&mut state, format!("describe_available_zones:{instance_type}"));
        state.scripted("describe_available_zones", None)?;
        Ok(state.zones.clone())
    }

    async fn describe_recommended_zones(
        &self,
        request: RecommendRequest,
    ) -> Result<Vec<RecommendedZone>, ApiError> {
        let mut state = self.lock();
        self.record(
            &mut state,
            format!("describe_recommended_zones:{}", request.instance_type),
        );
        state.scripted("describe_recommended_zones", None)?;
        Ok(state.recommendations.clone())
    }

    async fn create_vpc(&self, request: CreateVpcRequest) -> Result<String, ApiError> {
        let mut state = self.lock();
        self.record(&mut state, format!("create_vpc:{}", request.vpc_name));
        state.scripted("create_vpc", None)?;
        let vpc_id = state.next_id("vpc");
        state.vpcs.insert(
            vpc_id.clone(),
            Vpc {
                vpc_id: vpc_id.clone(),
                vpc_name: request.vpc_name,
                cidr_block: request.cidr_block,
                status: "Pending".to_string(),
            },
        );
        self.settle(&mut state, &vpc_id, "Available");
        Ok(vpc_id)
    }

    async fn describe_vpcs(&self, filter: VpcFilter) -> Result<Vec<Vpc>, ApiError> {
        let mut state = self.lock();
        self.record(&mut state, "describe_vpcs".to_string());
        state.scripted("describe_vpcs", None)?;
        let matching: Vec<Vpc> = state
            .vpcs
            .values()
            .filter(|v| filter.vpc_id.as_ref().is_none_or(|id| *id == v.vpc_id))
            .filter(|v| filter.vpc_name.as_ref().is_none_or(|n| *n == v.vpc_name))
            .cloned()
            .collect();
        Ok(matching
            .into_iter()
            .map(|mut vpc| {
                vpc.status = state.observe(&vpc.vpc_id, &vpc.status);
                if let Some(stored) = state.vpcs.get_mut(&vpc.vpc_id) {
                    stored.status = vpc.status.clone();
                }
                vpc
            })
            .collect())
    }

    async fn delete_vpc(&self, vpc_id: &str) -> Result<(), ApiError> {
        let mut state = self.lock();
        self.record(&mut state, format!("delete_vpc:{vpc_id}"));
        state.scripted("delete_vpc", None)?;
        if state.vswitches.values().any(|v| v.vpc_id == vpc_id)
            || state.security_groups.values().any(|g| g.vpc_id == vpc_id)
        {
            return Err(ApiError::service(
                "DependencyViolation.VSwitch",
                "VPC still has dependents",
            ));
        }
        state
            .vpcs
            .remove(vpc_id)
            .map(|_| ())
            .ok_or_else(|| not_found(ResourceKind::Vpc, vpc_id))
    }

    async fn create_vswitch(&self, request: CreateVSwitchRequest) -> Result<String, ApiError> {
        let mut state = self.lock();
        self.record(&mut state, format!("create_vswitch:{}", request.zone_id));
        state.scripted("create_vswitch", Some(&request.zone_id))?;
        let vswitch_id = state.next_id("vsw");
        state.vswitches.insert(
            vswitch_id.clone(),
            VSwitch {
                vswitch_id: vswitch_id.clone(),
                vswitch_name: request.vswitch_name,
                vpc_id: request.vpc_id,
                zone_id: request.zone_id,
                cidr_block: request.cidr_block,
                status: "Pending".to_string(),
            },
        );
        self.settle(&mut state, &vswitch_id, "Available");
        Ok(vswitch_id)
    }

    async fn describe_vswitches(&self, filter: VSwitchFilter) -> Result<Vec<VSwitch>, ApiError> {
        let mut state = self.lock();
        self.record(&mut state, "describe_vswitches".to_string());
        state.scripted("describe_vswitches", None)?;
        let matching: Vec<VSwitch> = state
            .vswitches
            .values()
            .filter(|v| filter.vpc_id.as_ref().is_none_or(|id| *id == v.vpc_id))
            .filter(|v| filter.vswitch_id.as_ref().is_none_or(|id| *id == v.vswitch_id))
            .filter(|v| {
                filter
                    .vswitch_name
                    .as_ref()
                    .is_none_or(|n| *n == v.vswitch_name)
            })
            .filter(|v| filter.zone_id.as_ref().is_none_or(|z| *z == v.zone_id))
            .cloned()
            .collect();
        Ok(matching
            .into_iter()
            .map(|mut vsw| {
                vsw.status = state.observe(&vsw.vswitch_id, &vsw.status);
                if let Some(stored) = state.vswitches.get_mut(&vsw.vswitch_id) {
                    stored.status = vsw.status.clone();
                }
                vsw
            })
            .collect())
    }

    async fn delete_vswitch(&self, vswitch_id: &str) -> Result<(), ApiError> {
        let mut state = self.lock();
        self.record(&mut state, format!("delete_vswitch:{vswitch_id}"));
        state.scripted("delete_vswitch", None)?;
        if state.instances.values().any(|i| i.vswitch_id == vswitch_id) {
            return Err(ApiError::service(
                "DependencyViolation",
                "vswitch still has instances",
            ));
        }
        state
            .vswitches
            .remove(vswitch_id)
            .map(|_| ())
            .ok_or_else(|| not_found(ResourceKind::VSwitch, vswitch_id))
    }

    async fn create_security_group(
        &self,
        request: CreateSecurityGroupRequest,
    ) -> Result<String, ApiError> {
        let mut state = self.lock();
        self.record(
            &mut state,
            format!("create_security_group:{}", request.security_group_name),
        );
        state.scripted("create_security_group", None)?;
        let group_id = state.next_id("sg");
        state.security_groups.insert(
            group_id.clone(),
            SecurityGroup {
                security_group_id: group_id.clone(),
                security_group_name: request.security_group_name,
                vpc_id: request.vpc_id,
            },
        );
        Ok(group_id)
    }

    async fn describe_security_groups(
        &self,
        filter: SecurityGroupFilter,
    ) -> Result<Vec<SecurityGroup>, ApiError> {
        let mut state = self.lock();
        self.record(&mut state, "describe_security_groups".to_string());
        state.scripted("describe_security_groups", None)?;
        Ok(state
            .security_groups
            .values()
            .filter(|g| filter.vpc_id.as_ref().is_none_or(|id| *id == g.vpc_id))
            .filter(|g| {
                filter
                    .security_group_id
                    .as_ref()
                    .is_none_or(|id| *id == g.security_group_id)
            })
            .filter(|g| {
                filter
                    .security_group_name
                    .as_ref()
                    .is_none_or(|n| *n == g.security_group_name)
            })
            .cloned()
            .collect())
    }

    async fn authorize_security_group(&self, rule: IngressRule) -> Result<(), ApiError> {
        let mut state = self.lock();
        self.record(
            &mut state,
            format!(
                "authorize_security_group:{}:{}",
                rule.security_group_id, rule.port_range
            ),
        );
        state.scripted("authorize_security_group", None)?;
        if !state.security_groups.contains_key(&rule.security_group_id) {
            return Err(not_found(
                ResourceKind::SecurityGroup,
                &rule.security_group_id,
            ));
        }
        Ok(())
    }

    async fn delete_security_group(&self, security_group_id: &str) -> Result<(), ApiError> {
        let mut state = self.lock();
        self.record(&mut state, format!("delete_security_group:{security_group_id}"));
        state.scripted("delete_security_group", None)?;
        state
            .security_groups
            .remove(security_group_id)
            .map(|_| ())
            .ok_or_else(|| not_found(ResourceKind::SecurityGroup, security_group_id))
    }

    async fn create_instance(&self, request: CreateInstanceRequest) -> Result<String, ApiError> {
        let mut state = self.lock();
        self.record(
            &mut state,
            format!("create_instance:{}:{}", request.zone_id, request.instance_type),
        );
        state.scripted("create_instance", Some(&request.zone_id))?;
        let instance_id = state.next_id("i");
        state.instances.insert(
            instance_id.clone(),
            Instance {
                instance_id: instance_id.clone(),
                instance_name: request.instance_name,
                instance_type: request.instance_type,
                zone_id: request.zone_id,
                vswitch_id: request.vswitch_id,
                status: "Pending".to_string(),
                private_ip: Some("172.16.0.10".to_string()),
                public_ip: None,
            },
        );
        self.settle(&mut state, &instance_id, "Stopped");
        Ok(instance_id)
    }

    async fn describe_instance(&self, instance_id: &str) -> Result<Option<Instance>, ApiError> {
        let mut state = self.lock();
        self.record(&mut state, format!("describe_instance:{instance_id}"));
        state.scripted("describe_instance", None)?;
        let Some(current) = state.instances.get(instance_id).map(|i| i.status.clone()) else {
            return Ok(None);
        };
        let status = state.observe(instance_id, &current);
        let instance = state.instances.get_mut(instance_id).map(|i| {
            i.status = status;
            i.clone()
        });
        Ok(instance)
    }

    async fn start_instance(&self, instance_id: &str) -> Result<(), ApiError> {
        let mut state = self.lock();
        self.record(&mut state, format!("start_instance:{instance_id}"));
        state.scripted("start_instance", None)?;
        let Some(instance) = state.instances.get_mut(instance_id) else {
            return Err(not_found(ResourceKind::Instance, instance_id));
        };
        instance.status = "Starting".to_string();
        self.settle(&mut state, instance_id, "Running");
        Ok(())
    }

    async fn stop_instance(&self, instance_id: &str, force: bool) -> Result<(), ApiError> {
        let mut state = self.lock();
        self.record(&mut state, format!("stop_instance:{instance_id}:{force}"));
        state.scripted("stop_instance", None)?;
        let Some(instance) = state.instances.get_mut(instance_id) else {
            return Err(not_found(ResourceKind::Instance, instance_id));
        };
        instance.status = "Stopping".to_string();
        self.settle(&mut state, instance_id, "Stopped");
        Ok(())
    }

    async fn delete_instance(&self, instance_id: &str, force: bool) -> Result<(), ApiError> {
        let mut state = self.lock();
        self.record(&mut state, format!("delete_instance:{instance_id}:{force}"));
        state.scripted("delete_instance", None)?;
        state.settling.remove(instance_id);
        state
            .instances
            .remove(instance_id)
            .map(|_| ())
            .ok_or_else(|| not_found(ResourceKind::Instance, instance_id))
    }
}
