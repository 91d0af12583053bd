//! End-to-end builds against the in-memory provider
//!
//! Every test checks the same guarantee from a different angle: whatever the
//! outcome, no transient VPC, vswitch, security group or instance survives.

use anyhow::anyhow;
use async_trait::async_trait;
use ecs_imager_builder::config::BuildConfig;
use ecs_imager_builder::ecs::Instance;
use ecs_imager_builder::pipeline::ProgressReporter;
use ecs_imager_builder::pipeline::steps::Provisioner;
use ecs_imager_builder::testing::{FakeEcs, RecordingReporter, sample_config};
use ecs_imager_builder::{BuildError, BuildOutcome, build_image};
use ecs_imager_common::ResourceKind;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

async fn build(fake: &Arc<FakeEcs>, config: BuildConfig) -> Result<BuildOutcome, BuildError> {
    build_image(
        config,
        fake.clone(),
        Arc::new(RecordingReporter::default()),
        None,
        CancellationToken::new(),
    )
    .await
}

fn assert_no_transient_resources(fake: &FakeEcs) {
    assert!(fake.instances().is_empty(), "instances left: {:?}", fake.instances());
    assert!(
        fake.security_groups().is_empty(),
        "security groups left: {:?}",
        fake.security_groups()
    );
    assert!(fake.vswitches().is_empty(), "vswitches left: {:?}", fake.vswitches());
    assert!(fake.vpcs().is_empty(), "VPCs left: {:?}", fake.vpcs());
}

fn built_image_ids(fake: &FakeEcs, region: &str) -> Vec<String> {
    fake.images(region)
        .into_iter()
        .filter(|i| i.image_name == "my-image")
        .map(|i| i.image_id)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_successful_build_keeps_only_images() {
    let fake = Arc::new(FakeEcs::default());
    fake.add_region("cn-beijing");
    let mut config = sample_config();
    config.image.destination_regions = vec!["cn-beijing".to_string()];

    let outcome = build(&fake, config).await.unwrap();

    let BuildOutcome::Built {
        image_id,
        region,
        copies,
    } = outcome
    else {
        panic!("expected a built image, got {outcome:?}");
    };
    assert_eq!(region, "cn-hangzhou");
    assert_eq!(built_image_ids(&fake, "cn-hangzhou"), vec![image_id]);
    assert_eq!(
        built_image_ids(&fake, "cn-beijing"),
        vec![copies["cn-beijing"].clone()]
    );
    assert_no_transient_resources(&fake);

    // instance was stopped before imaging
    assert_eq!(fake.count_calls("stop_instance:"), 1);
    assert!(
        fake.calls()
            .iter()
            .any(|c| c.starts_with("authorize_security_group:") && c.ends_with(":22/22"))
    );
}

#[tokio::test(start_paused = true)]
async fn test_existing_image_stops_before_creating_anything() {
    let fake = Arc::new(FakeEcs::default());
    fake.add_image("cn-hangzhou", "m-old", "my-image", "Available");

    let err = build(&fake, sample_config()).await.unwrap_err();

    assert!(matches!(err, BuildError::ImageAlreadyExists { .. }));
    assert_eq!(fake.count_calls("create_"), 0);
    assert_eq!(built_image_ids(&fake, "cn-hangzhou"), vec!["m-old"]);
}

#[tokio::test(start_paused = true)]
async fn test_existing_image_can_be_skipped() {
    let fake = Arc::new(FakeEcs::default());
    fake.add_image("cn-hangzhou", "m-old", "my-image", "Available");
    let mut config = sample_config();
    config.image.skip_if_exists = true;

    let outcome = build(&fake, config).await.unwrap();

    assert_eq!(
        outcome,
        BuildOutcome::Skipped {
            image_name: "my-image".to_string()
        }
    );
    assert_eq!(fake.count_calls("create_"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_force_delete_replaces_existing_image() {
    let fake = Arc::new(FakeEcs::default());
    fake.add_image("cn-hangzhou", "m-old", "my-image", "Available");
    let mut config = sample_config();
    config.image.force_delete = true;

    let outcome = build(&fake, config).await.unwrap();

    let BuildOutcome::Built { image_id, .. } = outcome else {
        panic!("expected a built image");
    };
    assert_ne!(image_id, "m-old");
    assert_eq!(built_image_ids(&fake, "cn-hangzhou"), vec![image_id]);
    assert_eq!(fake.count_calls("delete_image:m-old"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_image_creation_unwinds_everything() {
    let fake = Arc::new(FakeEcs::default());
    fake.fail("create_image", &["InvalidParameter"]);

    let err = build(&fake, sample_config()).await.unwrap_err();

    assert!(!err.is_sentinel());
    assert!(built_image_ids(&fake, "cn-hangzhou").is_empty());
    assert_no_transient_resources(&fake);
}

#[tokio::test(start_paused = true)]
async fn test_failed_copy_deletes_the_source_image() {
    let fake = Arc::new(FakeEcs::default());
    fake.add_region("cn-beijing");
    fake.fail("copy_image", &["InvalidRegionId.Malformed"]);
    let mut config = sample_config();
    config.image.destination_regions = vec!["cn-beijing".to_string()];

    build(&fake, config).await.unwrap_err();

    assert!(built_image_ids(&fake, "cn-hangzhou").is_empty());
    assert!(built_image_ids(&fake, "cn-beijing").is_empty());
    assert_no_transient_resources(&fake);
}

#[tokio::test(start_paused = true)]
async fn test_vswitch_moves_to_next_zone_after_fatal_error() {
    let fake = Arc::new(FakeEcs::default());
    fake.fail(
        "create_vswitch@cn-hangzhou-a",
        &[
            "TOKEN_PROCESSING",
            "TOKEN_PROCESSING",
            "TOKEN_PROCESSING",
            "InvalidCidrBlock.Overlapped",
        ],
    );

    build(&fake, sample_config()).await.unwrap();

    assert_eq!(fake.count_calls("create_vswitch:cn-hangzhou-a"), 4);
    assert_eq!(fake.count_calls("create_vswitch:cn-hangzhou-b"), 1);
    assert_eq!(fake.count_calls("create_instance:cn-hangzhou-b"), 1);
    assert_no_transient_resources(&fake);
}

#[tokio::test(start_paused = true)]
async fn test_all_zones_failing_leaves_no_vswitch() {
    let fake = Arc::new(FakeEcs::default());
    fake.fail("create_vswitch@cn-hangzhou-a", &["InvalidCidrBlock.Overlapped"]);
    fake.fail("create_vswitch@cn-hangzhou-b", &["InvalidCidrBlock.Overlapped"]);

    let err = build(&fake, sample_config()).await.unwrap_err();

    match err {
        BuildError::ZonesExhausted { kind, zones, .. } => {
            assert_eq!(kind, ResourceKind::VSwitch);
            assert_eq!(zones, vec!["cn-hangzhou-a", "cn-hangzhou-b"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fake.count_calls("create_instance"), 0);
    assert_no_transient_resources(&fake);
}

#[tokio::test(start_paused = true)]
async fn test_no_sellable_zone_fails_before_vswitch_creation() {
    let fake = Arc::new(FakeEcs::default());
    fake.set_zones(&[("cn-hangzhou-a", false), ("cn-hangzhou-b", false)]);

    let err = build(&fake, sample_config()).await.unwrap_err();

    assert!(matches!(err, BuildError::NoCandidateZones { .. }));
    assert_eq!(fake.count_calls("create_vswitch"), 0);
    assert_no_transient_resources(&fake);
}

#[tokio::test(start_paused = true)]
async fn test_pinned_network_is_reused_and_kept() {
    let fake = Arc::new(FakeEcs::default());
    fake.add_vpc("vpc-pinned", "shared");
    fake.add_vswitch("vsw-123", "vpc-pinned", "cn-beijing-a", "shared");
    let mut config = sample_config();
    config.network.vpc_id = Some("vpc-pinned".to_string());
    config.network.vswitch_id = Some("vsw-123".to_string());

    build(&fake, config).await.unwrap();

    assert_eq!(fake.count_calls("create_vpc"), 0);
    assert_eq!(fake.count_calls("create_vswitch"), 0);
    assert_eq!(fake.count_calls("delete_vswitch"), 0);
    assert_eq!(fake.count_calls("delete_vpc"), 0);
    assert_eq!(fake.count_calls("create_instance:cn-beijing-a"), 1);
    assert_eq!(fake.vswitches().len(), 1);
    assert_eq!(fake.vpcs().len(), 1);
    assert!(fake.security_groups().is_empty());
    assert!(fake.instances().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_missing_pinned_vswitch_is_fatal() {
    let fake = Arc::new(FakeEcs::default());
    fake.add_vpc("vpc-pinned", "shared");
    let mut config = sample_config();
    config.network.vpc_id = Some("vpc-pinned".to_string());
    config.network.vswitch_id = Some("vsw-missing".to_string());

    let err = build(&fake, config).await.unwrap_err();

    assert!(matches!(
        err,
        BuildError::PinnedResourceNotFound {
            kind: ResourceKind::VSwitch,
            ..
        }
    ));
    assert_eq!(fake.vpcs().len(), 1);
}

fn named_vswitch_config() -> BuildConfig {
    let mut config = sample_config();
    config.network.vpc_id = Some("vpc-pinned".to_string());
    config.network.vswitch_name = Some("team-vsw".to_string());
    config
}

#[tokio::test(start_paused = true)]
async fn test_named_vswitches_in_every_candidate_zone_are_reused() {
    let fake = Arc::new(FakeEcs::default());
    fake.add_vpc("vpc-pinned", "shared");
    fake.add_vswitch("vsw-a", "vpc-pinned", "cn-hangzhou-a", "team-vsw");
    fake.add_vswitch("vsw-b", "vpc-pinned", "cn-hangzhou-b", "team-vsw");
    fake.add_vswitch("vsw-other", "vpc-pinned", "cn-hangzhou-a", "other");
    // first reused zone rejects the instance, second one takes it
    fake.fail("create_instance@cn-hangzhou-a", &["InvalidParameter"]);

    build(&fake, named_vswitch_config()).await.unwrap();

    assert_eq!(fake.count_calls("create_vswitch"), 0);
    assert_eq!(fake.count_calls("delete_vswitch"), 0);
    assert_eq!(fake.count_calls("create_instance:cn-hangzhou-a"), 1);
    assert_eq!(fake.count_calls("create_instance:cn-hangzhou-b"), 1);
    assert_eq!(fake.vswitches().len(), 3);
    assert_eq!(fake.vpcs().len(), 1);
    assert!(fake.instances().is_empty());
    assert!(fake.security_groups().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_missing_named_vswitch_is_fatal() {
    let fake = Arc::new(FakeEcs::default());
    fake.add_vpc("vpc-pinned", "shared");

    let err = build(&fake, named_vswitch_config()).await.unwrap_err();

    assert!(matches!(
        err,
        BuildError::PinnedResourceNotFound {
            kind: ResourceKind::VSwitch,
            ref id,
        } if id == "team-vsw"
    ));
    assert_eq!(fake.count_calls("create_vswitch"), 0);
    assert_eq!(fake.count_calls("create_security_group"), 0);
    assert_eq!(fake.vpcs().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_named_vswitch_outside_candidate_zones_is_fatal() {
    let fake = Arc::new(FakeEcs::default());
    fake.add_vpc("vpc-pinned", "shared");
    fake.add_vswitch("vsw-c", "vpc-pinned", "cn-hangzhou-c", "team-vsw");

    let err = build(&fake, named_vswitch_config()).await.unwrap_err();

    assert!(matches!(
        err,
        BuildError::PinnedResourceNotFound {
            kind: ResourceKind::VSwitch,
            ..
        }
    ));
    assert_eq!(fake.count_calls("create_vswitch"), 0);
    assert_eq!(fake.count_calls("create_instance"), 0);
    assert_eq!(fake.vswitches().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sold_out_instance_falls_back_to_recommended_zone() {
    let fake = Arc::new(FakeEcs::default());
    fake.fail("create_instance@cn-hangzhou-a", &["OperationDenied.NoStock"]);
    fake.add_recommendation("cn-hangzhou-a", "ecs.g6.xlarge");
    fake.add_recommendation("cn-hangzhou-c", "ecs.g7.large");

    let outcome = build(&fake, sample_config()).await.unwrap();

    assert!(matches!(outcome, BuildOutcome::Built { .. }));
    // the zone that already failed is not retried
    assert_eq!(fake.count_calls("create_instance:cn-hangzhou-a"), 1);
    assert_eq!(
        fake.count_calls("create_instance:cn-hangzhou-c:ecs.g7.large"),
        1
    );
    assert_eq!(fake.count_calls("create_vswitch:cn-hangzhou-c"), 1);
    assert_eq!(fake.count_calls("stop_instance:"), 1);
    assert_no_transient_resources(&fake);
}

#[tokio::test(start_paused = true)]
async fn test_other_instance_errors_do_not_fall_back() {
    let fake = Arc::new(FakeEcs::default());
    fake.fail("create_instance@cn-hangzhou-a", &["InvalidParameter"]);
    fake.add_recommendation("cn-hangzhou-c", "ecs.g7.large");

    let err = build(&fake, sample_config()).await.unwrap_err();

    assert!(matches!(
        err,
        BuildError::ZonesExhausted {
            kind: ResourceKind::Instance,
            ..
        }
    ));
    assert_eq!(fake.count_calls("describe_recommended_zones"), 0);
    assert_no_transient_resources(&fake);
}

#[tokio::test(start_paused = true)]
async fn test_every_recommended_zone_failing_unwinds_nested_vswitches() {
    let fake = Arc::new(FakeEcs::default());
    fake.fail("create_instance@cn-hangzhou-a", &["OperationDenied.NoStock"]);
    fake.fail("create_instance@cn-hangzhou-c", &["OperationDenied.NoStock"]);
    fake.fail("create_instance@cn-hangzhou-d", &["Zone.NotOnSale"]);
    fake.add_recommendation("cn-hangzhou-c", "ecs.g7.large");
    fake.add_recommendation("cn-hangzhou-d", "ecs.g7.large");

    let err = build(&fake, sample_config()).await.unwrap_err();

    match err {
        BuildError::ZonesExhausted { kind, zones, .. } => {
            assert_eq!(kind, ResourceKind::Instance);
            assert_eq!(zones, vec!["cn-hangzhou-c", "cn-hangzhou-d"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fake.count_calls("create_vswitch:"), 3);
    assert_no_transient_resources(&fake);
}

/// Cancels the build when a progress line contains `trigger`
struct CancelOn {
    trigger: &'static str,
    token: CancellationToken,
}

impl ProgressReporter for CancelOn {
    fn say(&self, message: &str) {
        if message.contains(self.trigger) {
            self.token.cancel();
        }
    }

    fn message(&self, _message: &str) {}

    fn error(&self, _message: &str) {}
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_build_still_cleans_up() {
    let fake = Arc::new(FakeEcs::default());
    let cancel = CancellationToken::new();
    let reporter = Arc::new(CancelOn {
        trigger: "Creating instance",
        token: cancel.clone(),
    });

    let err = build_image(sample_config(), fake.clone(), reporter, None, cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled(), "unexpected error: {err}");
    assert_eq!(fake.count_calls("create_instance"), 0);
    assert_eq!(fake.count_calls("delete_vswitch"), 1);
    assert_no_transient_resources(&fake);
}

#[derive(Default)]
struct RecordingProvisioner {
    seen: Mutex<Vec<Instance>>,
    fail: bool,
}

#[async_trait]
impl Provisioner for RecordingProvisioner {
    async fn provision(&self, instance: &Instance, _cancel: &CancellationToken) -> anyhow::Result<()> {
        self.seen.lock().unwrap().push(instance.clone());
        if self.fail {
            return Err(anyhow!("package install failed"));
        }
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_provisioner_sees_running_instance() {
    let fake = Arc::new(FakeEcs::default());
    let provisioner = Arc::new(RecordingProvisioner::default());

    build_image(
        sample_config(),
        fake.clone(),
        Arc::new(RecordingReporter::default()),
        Some(provisioner.clone() as Arc<dyn Provisioner>),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let seen = provisioner.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].status, "Running");
}

#[tokio::test(start_paused = true)]
async fn test_provisioner_failure_unwinds() {
    let fake = Arc::new(FakeEcs::default());
    let provisioner = Arc::new(RecordingProvisioner {
        fail: true,
        ..Default::default()
    });

    let err = build_image(
        sample_config(),
        fake.clone(),
        Arc::new(RecordingReporter::default()),
        Some(provisioner as Arc<dyn Provisioner>),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, BuildError::Provision(_)));
    assert_eq!(fake.count_calls("create_image"), 0);
    assert_no_transient_resources(&fake);
}
