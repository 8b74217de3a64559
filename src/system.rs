//! Host-side collaborators: process liveness and instance release. Both are
//! traits so the monitor's shutdown sequence can be driven in tests without
//! touching the host.

use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::{error, info};

/// Answers whether the monitored server process is still running.
pub trait ProcessProbe {
    fn is_alive(&self, pid: i32) -> bool;
}

/// Releases the compute resource hosting the server, with an irreversible
/// local halt as the fallback of last resort.
pub trait InstanceHandle {
    fn release(&self) -> impl std::future::Future<Output = Result<()>> + Send;
    fn halt(&self) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Probes the process table with a null signal.
pub struct SystemProcessProbe;

impl ProcessProbe for SystemProcessProbe {
    fn is_alive(&self, pid: i32) -> bool {
        if pid <= 0 {
            return false;
        }
        // kill(pid, 0) delivers nothing; it only checks existence. EPERM
        // still means the pid exists.
        let result = unsafe { libc::kill(pid, 0) };
        result == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
}

/// Stops the EC2 instance through the AWS CLI, the same call the deployed
/// host image ships with.
pub struct Ec2InstanceHandle {
    pub instance_id: String,
}

impl InstanceHandle for Ec2InstanceHandle {
    async fn release(&self) -> Result<()> {
        info!(instance_id = %self.instance_id, "stopping EC2 instance");
        let output = Command::new("aws")
            .args(["ec2", "stop-instances", "--instance-ids", &self.instance_id])
            .output()
            .await
            .context("failed to launch the aws CLI")?;

        if !output.status.success() {
            bail!(
                "aws ec2 stop-instances failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    async fn halt(&self) -> Result<()> {
        error!("falling back to a local halt");
        let status = Command::new("sudo")
            .args(["shutdown", "-h", "now"])
            .status()
            .await
            .context("failed to launch shutdown")?;
        if !status.success() {
            bail!("shutdown exited with {status}");
        }
        Ok(())
    }
}
