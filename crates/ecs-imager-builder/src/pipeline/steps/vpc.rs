//! VPC placement

use crate::ecs::classify::{retry_on, until_status};
use crate::ecs::{CreateVpcRequest, VpcFilter};
use crate::error::BuildError;
use crate::pipeline::{BuildState, Lifecycle, Step};
use crate::wait::poll_until_expected;
use async_trait::async_trait;
use ecs_imager_common::{ResourceKind, ResourceStatus, RetryCodes};
use tracing::{info, warn};

use super::{delete_with_retry, find_vpc, new_client_token};

/// Reuse a pinned or named VPC, or create one
#[derive(Debug, Default)]
pub struct ConfigVpc {
    lifecycle: Lifecycle<String>,
}

impl ConfigVpc {
    async fn locate(&self, state: &BuildState) -> Result<Option<String>, BuildError> {
        let network = &state.config.network;
        let api = state.api.as_ref();
        let no_codes = RetryCodes::default();
        let poll = state.config.retry.call_poll();

        if let Some(vpc_id) = network.vpc_id.as_deref() {
            let vpc = poll_until_expected(
                &poll,
                Some(&state.cancel),
                "describe pinned VPC",
                || find_vpc(api, vpc_id),
                retry_on(&no_codes),
            )
            .await?
            .ok_or_else(|| BuildError::PinnedResourceNotFound {
                kind: ResourceKind::Vpc,
                id: vpc_id.to_string(),
            })?;
            return Ok(Some(vpc.vpc_id));
        }

        if let Some(name) = network.vpc_name.as_deref() {
            let filter = VpcFilter {
                vpc_name: Some(name.to_string()),
                ..Default::default()
            };
            let vpcs = poll_until_expected(
                &poll,
                Some(&state.cancel),
                "describe VPCs by name",
                || api.describe_vpcs(filter.clone()),
                retry_on(&no_codes),
            )
            .await?;
            return Ok(vpcs
                .into_iter()
                .find(|v| v.vpc_name == name)
                .map(|v| v.vpc_id));
        }

        Ok(None)
    }

    async fn create(&self, state: &BuildState) -> Result<String, BuildError> {
        let config = &state.config;
        let api = state.api.as_ref();
        let codes = &state.retry.vpc;
        let request = CreateVpcRequest {
            vpc_name: config
                .network
                .vpc_name
                .clone()
                .unwrap_or_else(|| state.generated_name("vpc")),
            cidr_block: config.network.vpc_cidr().to_string(),
            description: "Temporary VPC created by ecs-imager".to_string(),
            client_token: new_client_token(),
        };

        let vpc_id = poll_until_expected(
            &config.retry.call_poll(),
            Some(&state.cancel),
            "create VPC",
            || api.create_vpc(request.clone()),
            retry_on(&codes.create),
        )
        .await?;

        let ready = poll_until_expected(
            &config.retry.network_wait(),
            Some(&state.cancel),
            "VPC to become available",
            || find_vpc(api, &vpc_id),
            until_status(ResourceStatus::Available),
        )
        .await;

        if let Err(e) = ready {
            if let Err(cleanup) =
                delete_with_retry(state, "delete VPC", &codes.delete, || api.delete_vpc(&vpc_id)).await
            {
                warn!(vpc_id = %vpc_id, error = %cleanup, "Failed to delete VPC that never became available");
            }
            return Err(e.into());
        }
        Ok(vpc_id)
    }
}

#[async_trait]
impl Step for ConfigVpc {
    fn name(&self) -> &'static str {
        "config_vpc"
    }

    async fn run(&mut self, state: &mut BuildState) -> Result<(), BuildError> {
        if let Some(vpc_id) = self.locate(state).await? {
            state.reporter.message(&format!("Using existing VPC {vpc_id}"));
            state.vpc_id = Some(vpc_id.clone());
            self.lifecycle = Lifecycle::reused(vpc_id);
            return Ok(());
        }

        state.reporter.say("Creating VPC...");
        let vpc_id = self.create(state).await?;
        info!(vpc_id = %vpc_id, "Created VPC");
        state.reporter.message(&format!("Created VPC {vpc_id}"));
        state.vpc_id = Some(vpc_id.clone());
        self.lifecycle = Lifecycle::owned(vpc_id);
        Ok(())
    }

    async fn cleanup(&mut self, state: &mut BuildState) -> Result<(), BuildError> {
        let Some(vpc_id) = self.lifecycle.take_owned() else {
            return Ok(());
        };
        state.reporter.say(&format!("Deleting VPC {vpc_id}..."));
        let api = state.api.as_ref();
        delete_with_retry(state, "delete VPC", &state.retry.vpc.delete, || {
            api.delete_vpc(&vpc_id)
        })
        .await?;
        state.vpc_id = None;
        Ok(())
    }
}
