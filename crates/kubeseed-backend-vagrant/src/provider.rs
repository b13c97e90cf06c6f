//! Vagrant backend adapter
//!
//! Machine names double as backend ids. Network reconciliation is a no-op:
//! local virtualization gets its addressing from the Vagrantfile, so the
//! adapter answers every network query with a synthetic identifier and the
//! reconciler finds the "graph" already in place.
//!
//! The unbounded watch mode is the right one here: address assignment is
//! near-guaranteed once `vagrant up` returns.

use crate::vagrant::Vagrant;
use async_trait::async_trait;
use kubeseed_backend::{
    BackendAdapter, NetworkResourceSet, NodeDescription, NodeSpec, ProvenanceTag, ResourceKind,
    Result,
};
use tracing::info;

pub struct VagrantBackend {
    vagrant: Vagrant,
}

impl VagrantBackend {
    pub fn new(project_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            vagrant: Vagrant::new(project_dir),
        }
    }

    fn synthetic_id(kind: ResourceKind) -> String {
        format!("local-{}", kind)
    }
}

#[async_trait]
impl BackendAdapter for VagrantBackend {
    fn name(&self) -> &str {
        "vagrant"
    }

    async fn create_node(&self, spec: &NodeSpec) -> Result<String> {
        info!(machine = %spec.hostname, "vagrant up");
        self.vagrant.up(&spec.hostname).await?;
        Ok(spec.hostname.clone())
    }

    async fn describe_node(&self, id: &str) -> Result<NodeDescription> {
        let status = self.vagrant.status_of(id).await?;
        if !status.is_running() {
            // Still booting; the poller retries next tick.
            return Ok(NodeDescription::default());
        }
        let ssh = self.vagrant.ssh_config(id).await?;
        Ok(NodeDescription {
            // Local machines have one address serving both purposes.
            private_address: Some(ssh.host_name.clone()),
            public_address: Some(ssh.host_name),
            private_dns_name: Some(id.to_string()),
            ssh_user: Some(ssh.user),
        })
    }

    async fn delete_node(&self, id: &str) -> Result<()> {
        info!(machine = %id, "vagrant destroy");
        self.vagrant.destroy(id).await?;
        Ok(())
    }

    async fn tag_resource(&self, _id: &str, _tag: &ProvenanceTag) -> Result<()> {
        // Machines in this project directory are implicitly ours.
        Ok(())
    }

    async fn disable_source_dest_check(&self, _id: &str) -> Result<()> {
        Ok(())
    }

    async fn find_resource_by_tag(
        &self,
        kind: ResourceKind,
        _tag: &ProvenanceTag,
        _graph: &NetworkResourceSet,
    ) -> Result<Option<String>> {
        Ok(Some(Self::synthetic_id(kind)))
    }

    async fn create_network_resource(
        &self,
        kind: ResourceKind,
        _graph: &NetworkResourceSet,
    ) -> Result<String> {
        Ok(Self::synthetic_id(kind))
    }

    async fn delete_network_resource(&self, _kind: ResourceKind, _id: &str) -> Result<()> {
        Ok(())
    }

    async fn list_nodes_by_tag(&self, _tag: &ProvenanceTag) -> Result<Vec<String>> {
        let machines = self.vagrant.status().await?;
        Ok(machines
            .into_iter()
            .filter(|m| m.exists())
            .map(|m| m.name)
            .collect())
    }
}
