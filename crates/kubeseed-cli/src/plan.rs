//! Plan-file generation
//!
//! Renders a finalized [`ClusterTopology`] into the YAML cluster plan the
//! downstream installer consumes. The plan path is allocated idempotently:
//! existing plans are never overwritten, a numbered sibling is used instead.

use kubeseed_core::{ClusterTopology, ProvisionedNode};
use rand::{distributions::Alphanumeric, Rng};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const PLAN_BASENAME: &str = "kubeseed-cluster";

#[derive(Debug, Serialize)]
pub struct PlanFile {
    pub cluster: ClusterDetails,
    pub etcd: NodeGroup,
    pub master: MasterGroup,
    pub worker: NodeGroup,
    pub ingress: NodeGroup,
    pub storage: NodeGroup,
}

#[derive(Debug, Serialize)]
pub struct ClusterDetails {
    pub name: String,
    pub admin_password: String,
    pub allow_package_installation: bool,
    pub ssh: SshDetails,
}

#[derive(Debug, Serialize)]
pub struct SshDetails {
    pub user: String,
    pub ssh_key: String,
    pub ssh_port: u16,
}

#[derive(Debug, Serialize)]
pub struct NodeGroup {
    pub expected_count: usize,
    pub nodes: Vec<PlanNode>,
}

#[derive(Debug, Serialize)]
pub struct MasterGroup {
    pub expected_count: usize,
    pub nodes: Vec<PlanNode>,
    pub load_balanced_fqdn: String,
    pub load_balanced_short_name: String,
}

#[derive(Debug, Serialize)]
pub struct PlanNode {
    pub host: String,
    pub ip: String,
    pub internalip: String,
}

impl From<&ProvisionedNode> for PlanNode {
    fn from(node: &ProvisionedNode) -> Self {
        Self {
            host: node.hostname.clone(),
            ip: node.public_address.clone(),
            internalip: node.private_address.clone(),
        }
    }
}

fn group(nodes: &[ProvisionedNode]) -> NodeGroup {
    NodeGroup {
        expected_count: nodes.len(),
        nodes: nodes.iter().map(PlanNode::from).collect(),
    }
}

impl PlanFile {
    pub fn from_topology(
        topology: &ClusterTopology,
        ssh_user: &str,
        ssh_key_path: &str,
        ssh_port: u16,
    ) -> Self {
        Self {
            cluster: ClusterDetails {
                name: "kubernetes".to_string(),
                admin_password: generate_admin_password(),
                allow_package_installation: true,
                ssh: SshDetails {
                    user: ssh_user.to_string(),
                    ssh_key: ssh_key_path.to_string(),
                    ssh_port,
                },
            },
            etcd: group(&topology.etcd),
            master: MasterGroup {
                expected_count: topology.master.len(),
                nodes: topology.master.iter().map(PlanNode::from).collect(),
                load_balanced_fqdn: topology.master_address.clone(),
                load_balanced_short_name: topology.master_internal_name.clone(),
            },
            worker: group(&topology.worker),
            ingress: group(&topology.ingress),
            storage: group(&topology.storage),
        }
    }
}

/// First free plan path in `dir`: `kubeseed-cluster.yaml`, then
/// `kubeseed-cluster-1.yaml`, and so on. Never reuses an existing file.
pub fn allocate_plan_path(dir: &Path) -> PathBuf {
    let mut count = 0u32;
    loop {
        let name = if count == 0 {
            format!("{}.yaml", PLAN_BASENAME)
        } else {
            format!("{}-{}.yaml", PLAN_BASENAME, count)
        };
        let candidate = dir.join(name);
        if !candidate.exists() {
            return candidate;
        }
        count += 1;
    }
}

/// Write the plan into `dir` and return the path used.
pub fn write_plan(dir: &Path, plan: &PlanFile) -> anyhow::Result<PathBuf> {
    let path = allocate_plan_path(dir);
    let yaml = serde_yaml::to_string(plan)?;
    std::fs::write(&path, yaml)?;
    Ok(path)
}

/// 16-character alphanumeric admin password for the generated plan.
pub fn generate_admin_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}
