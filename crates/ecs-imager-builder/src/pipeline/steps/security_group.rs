//! Security group placement

use crate::ecs::classify::retry_on;
use crate::ecs::{CreateSecurityGroupRequest, IngressRule, SecurityGroupFilter};
use crate::error::BuildError;
use crate::pipeline::{BuildState, Lifecycle, Step};
use crate::wait::poll_until_expected;
use async_trait::async_trait;
use ecs_imager_common::defaults::SSH_PORT;
use ecs_imager_common::{ResourceKind, RetryCodes};
use tracing::{info, warn};

use super::{delete_with_retry, new_client_token};

/// Reuse a pinned or named security group, or create one that admits SSH
#[derive(Debug, Default)]
pub struct ConfigSecurityGroup {
    lifecycle: Lifecycle<String>,
}

impl ConfigSecurityGroup {
    async fn locate(&self, state: &BuildState, vpc_id: &str) -> Result<Option<String>, BuildError> {
        let network = &state.config.network;
        let api = state.api.as_ref();
        let no_codes = RetryCodes::default();

        let filter = match (
            network.security_group_id.as_deref(),
            network.security_group_name.as_deref(),
        ) {
            (Some(id), _) => SecurityGroupFilter {
                vpc_id: Some(vpc_id.to_string()),
                security_group_id: Some(id.to_string()),
                security_group_name: None,
            },
            (None, Some(name)) => SecurityGroupFilter {
                vpc_id: Some(vpc_id.to_string()),
                security_group_id: None,
                security_group_name: Some(name.to_string()),
            },
            (None, None) => return Ok(None),
        };

        let groups = poll_until_expected(
            &state.config.retry.call_poll(),
            Some(&state.cancel),
            "describe security groups",
            || api.describe_security_groups(filter.clone()),
            retry_on(&no_codes),
        )
        .await?;

        if let Some(id) = network.security_group_id.as_deref() {
            return match groups.iter().find(|g| g.security_group_id == id) {
                Some(group) => Ok(Some(group.security_group_id.clone())),
                None => Err(BuildError::PinnedResourceNotFound {
                    kind: ResourceKind::SecurityGroup,
                    id: id.to_string(),
                }),
            };
        }

        Ok(groups
            .into_iter()
            .find(|g| Some(g.security_group_name.as_str()) == network.security_group_name.as_deref())
            .map(|g| g.security_group_id))
    }

    async fn create(&self, state: &BuildState, vpc_id: &str) -> Result<String, BuildError> {
        let config = &state.config;
        let api = state.api.as_ref();
        let codes = &state.retry.security_group;
        let request = CreateSecurityGroupRequest {
            vpc_id: vpc_id.to_string(),
            security_group_name: config
                .network
                .security_group_name
                .clone()
                .unwrap_or_else(|| state.generated_name("sg")),
            description: "Temporary security group created by ecs-imager".to_string(),
            client_token: new_client_token(),
        };

        let group_id = poll_until_expected(
            &config.retry.call_poll(),
            Some(&state.cancel),
            "create security group",
            || api.create_security_group(request.clone()),
            retry_on(&codes.create),
        )
        .await?;

        let rule = IngressRule {
            security_group_id: group_id.clone(),
            ip_protocol: "tcp".to_string(),
            port_range: format!("{SSH_PORT}/{SSH_PORT}"),
            source_cidr_ip: "0.0.0.0/0".to_string(),
            nic_type: "intranet".to_string(),
        };
        let authorized = poll_until_expected(
            &config.retry.call_poll(),
            Some(&state.cancel),
            "authorize SSH ingress",
            || api.authorize_security_group(rule.clone()),
            retry_on(&codes.create),
        )
        .await;

        if let Err(e) = authorized {
            if let Err(cleanup) = delete_with_retry(
                state,
                "delete security group",
                &codes.delete,
                || api.delete_security_group(&group_id),
            )
            .await
            {
                warn!(security_group_id = %group_id, error = %cleanup, "Failed to delete half-configured security group");
            }
            return Err(e.into());
        }
        Ok(group_id)
    }
}

#[async_trait]
impl Step for ConfigSecurityGroup {
    fn name(&self) -> &'static str {
        "config_security_group"
    }

    async fn run(&mut self, state: &mut BuildState) -> Result<(), BuildError> {
        let vpc_id = state.require_vpc_id()?.to_string();

        if let Some(group_id) = self.locate(state, &vpc_id).await? {
            state
                .reporter
                .message(&format!("Using existing security group {group_id}"));
            state.security_group_id = Some(group_id.clone());
            self.lifecycle = Lifecycle::reused(group_id);
            return Ok(());
        }

        state.reporter.say("Creating security group...");
        let group_id = self.create(state, &vpc_id).await?;
        info!(security_group_id = %group_id, "Created security group with SSH ingress");
        state
            .reporter
            .message(&format!("Created security group {group_id}"));
        state.security_group_id = Some(group_id.clone());
        self.lifecycle = Lifecycle::owned(group_id);
        Ok(())
    }

    async fn cleanup(&mut self, state: &mut BuildState) -> Result<(), BuildError> {
        let Some(group_id) = self.lifecycle.take_owned() else {
            return Ok(());
        };
        state
            .reporter
            .say(&format!("Deleting security group {group_id}..."));
        let api = state.api.as_ref();
        delete_with_retry(
            state,
            "delete security group",
            &state.retry.security_group.delete,
            || api.delete_security_group(&group_id),
        )
        .await?;
        state.security_group_id = None;
        Ok(())
    }
}
