//! Provisioning hook between boot and snapshot

use crate::ecs::Instance;
use crate::error::BuildError;
use crate::pipeline::{BuildState, Step};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Something that configures a running instance before it is imaged
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(&self, instance: &Instance, cancel: &CancellationToken) -> Result<()>;
}

/// Run the provisioner against the build instance
pub struct Provision {
    provisioner: Arc<dyn Provisioner>,
}

impl Provision {
    pub fn new(provisioner: Arc<dyn Provisioner>) -> Self {
        Self { provisioner }
    }
}

impl std::fmt::Debug for Provision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provision").finish_non_exhaustive()
    }
}

#[async_trait]
impl Step for Provision {
    fn name(&self) -> &'static str {
        "provision"
    }

    async fn run(&mut self, state: &mut BuildState) -> Result<(), BuildError> {
        let instance = state.require_instance()?.clone();
        state
            .reporter
            .say(&format!("Provisioning instance {}...", instance.instance_id));
        self.provisioner
            .provision(&instance, &state.cancel)
            .await
            .map_err(|e| {
                if state.cancel.is_cancelled() {
                    BuildError::Cancelled
                } else {
                    BuildError::Provision(e)
                }
            })
    }

    async fn cleanup(&mut self, _state: &mut BuildState) -> Result<(), BuildError> {
        Ok(())
    }
}

/// Provisioner that runs a local shell command
///
/// The command sees the instance through `ECS_INSTANCE_ID`, `ECS_INSTANCE_IP`
/// and `ECS_ZONE_ID`. Output is streamed to the log line by line.
#[derive(Debug, Clone)]
pub struct ShellProvisioner {
    command: String,
    timeout: Duration,
}

impl ShellProvisioner {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout: Duration::from_secs(3600),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Provisioner for ShellProvisioner {
    async fn provision(&self, instance: &Instance, cancel: &CancellationToken) -> Result<()> {
        let address = instance
            .public_ip
            .as_deref()
            .or(instance.private_ip.as_deref())
            .unwrap_or_default();
        info!(command = %self.command, instance_id = %instance.instance_id, "Running provision command");

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env("ECS_INSTANCE_ID", &instance.instance_id)
            .env("ECS_INSTANCE_IP", address)
            .env("ECS_ZONE_ID", &instance.zone_id)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn provision command: {}", self.command))?;

        let stdout = child.stdout.take().context("Failed to capture stdout")?;
        let stderr = child.stderr.take().context("Failed to capture stderr")?;

        let stdout_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(target: "provision", "{line}");
            }
        });
        let stderr_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(target: "provision", "{line}");
            }
        });

        let status = tokio::select! {
            result = tokio::time::timeout(self.timeout, child.wait()) => match result {
                Ok(status) => status.context("Failed waiting for provision command")?,
                Err(_) => {
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "Failed to kill timed-out provision command");
                    }
                    anyhow::bail!(
                        "Provision command timed out after {}s",
                        self.timeout.as_secs()
                    );
                }
            },
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill cancelled provision command");
                }
                anyhow::bail!("Provision command cancelled");
            }
        };

        let _ = stdout_handle.await;
        let _ = stderr_handle.await;

        if !status.success() {
            anyhow::bail!("Provision command exited with {status}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> Instance {
        Instance {
            instance_id: "i-build".to_string(),
            instance_name: "builder".to_string(),
            instance_type: "ecs.g6.large".to_string(),
            zone_id: "cn-hangzhou-b".to_string(),
            vswitch_id: "vsw-1".to_string(),
            status: "Running".to_string(),
            private_ip: Some("172.16.0.10".to_string()),
            public_ip: None,
        }
    }

    #[tokio::test]
    async fn test_shell_provisioner_sees_instance_env() {
        let provisioner = ShellProvisioner::new(
            r#"test "$ECS_INSTANCE_ID" = i-build && test "$ECS_INSTANCE_IP" = 172.16.0.10"#,
        );
        provisioner
            .provision(&instance(), &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_shell_provisioner_reports_exit_status() {
        let err = ShellProvisioner::new("exit 3")
            .provision(&instance(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exited"));
    }

    #[tokio::test]
    async fn test_shell_provisioner_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = ShellProvisioner::new("sleep 30")
            .provision(&instance(), &cancel)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }
}
