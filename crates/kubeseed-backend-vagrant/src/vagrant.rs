//! vagrant CLI wrapper
//!
//! Wraps the vagrant commands the adapter needs. All invocations run in
//! the configured project directory (where the Vagrantfile lives).

use crate::error::{Result, VagrantError};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// vagrant CLI wrapper
pub struct Vagrant {
    project_dir: PathBuf,
}

/// SSH connection details for one machine, parsed from `vagrant ssh-config`.
#[derive(Debug, Clone, Default)]
pub struct SshConfig {
    pub host_name: String,
    pub user: String,
    pub identity_file: String,
    pub port: u16,
}

/// One machine's state from `vagrant status --machine-readable`.
#[derive(Debug, Clone)]
pub struct MachineStatus {
    pub name: String,
    pub state: String,
}

impl MachineStatus {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }

    pub fn exists(&self) -> bool {
        self.state != "not_created"
    }
}

impl Vagrant {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Check that vagrant is installed.
    pub async fn check_installed(&self) -> Result<()> {
        let which = Command::new("which").arg("vagrant").output().await?;
        if !which.status.success() {
            return Err(VagrantError::VagrantNotFound);
        }
        Ok(())
    }

    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("vagrant");
        cmd.current_dir(&self.project_dir);
        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: vagrant {}", args.join(" "));

        let output = cmd.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("machine with the name") || stderr.contains("Unknown machine") {
                return Err(VagrantError::MachineNotFound(stderr.trim().to_string()));
            }
            return Err(VagrantError::CommandFailed(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Bring a machine up. Blocks until vagrant returns; the machine may
    /// still be booting its services afterwards.
    pub async fn up(&self, machine: &str) -> Result<()> {
        self.check_installed().await?;
        self.run_command(&["up", machine]).await?;
        Ok(())
    }

    /// Destroy a machine without confirmation.
    pub async fn destroy(&self, machine: &str) -> Result<()> {
        self.run_command(&["destroy", "-f", machine]).await?;
        Ok(())
    }

    /// Status of every machine in the project.
    pub async fn status(&self) -> Result<Vec<MachineStatus>> {
        let output = self.run_command(&["status", "--machine-readable"]).await?;
        Ok(parse_status(&output))
    }

    pub async fn status_of(&self, machine: &str) -> Result<MachineStatus> {
        self.status()
            .await?
            .into_iter()
            .find(|m| m.name == machine)
            .ok_or_else(|| VagrantError::MachineNotFound(machine.to_string()))
    }

    /// SSH connection details for a running machine.
    pub async fn ssh_config(&self, machine: &str) -> Result<SshConfig> {
        let output = self.run_command(&["ssh-config", machine]).await?;
        parse_ssh_config(&output)
    }
}

/// Parse `timestamp,target,type,data` lines, keeping `state` records.
fn parse_status(output: &str) -> Vec<MachineStatus> {
    let mut machines = Vec::new();
    for line in output.lines() {
        let fields: Vec<&str> = line.splitn(4, ',').collect();
        if fields.len() == 4 && fields[2] == "state" && !fields[1].is_empty() {
            machines.push(MachineStatus {
                name: fields[1].to_string(),
                state: fields[3].trim().to_string(),
            });
        }
    }
    machines
}

fn parse_ssh_config(output: &str) -> Result<SshConfig> {
    let mut config = SshConfig {
        port: 22,
        ..Default::default()
    };
    for line in output.lines() {
        let mut parts = line.trim().splitn(2, ' ');
        let key = parts.next().unwrap_or("");
        let value = parts.next().unwrap_or("").trim().to_string();
        match key {
            "HostName" => config.host_name = value,
            "User" => config.user = value,
            "IdentityFile" => config.identity_file = value.trim_matches('"').to_string(),
            "Port" => config.port = value.parse().unwrap_or(22),
            _ => {}
        }
    }
    if config.host_name.is_empty() {
        return Err(VagrantError::ParseError(
            "ssh-config output carried no HostName".to_string(),
        ));
    }
    Ok(config)
}
