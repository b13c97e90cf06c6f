//! Provisioning orchestration
//!
//! Reconcile the network graph once, request every node, watch them all
//! concurrently, assemble the topology. Completes only when all watches
//! resolve: all Ready, or any one failing terminally, in which case the
//! remaining watches are cancelled and already-created siblings are left
//! in place and reported (a later `terminate_all` can reap them).

use crate::error::{ProvisionError, Result};
use crate::model::{
    ClusterTopology, NodeState, ProvisionRequest, ProvisionedNode, Role, RoleSet,
};
use crate::poller::{watch_all, Dialer, TcpDialer, WatchOptions};
use crate::reconciler::Reconciler;
use crate::requester::request_node;
use crate::topology::{assemble, assemble_single};
use futures_util::stream::{self, StreamExt};
use kubeseed_backend::{BackendAdapter, NetworkResourceSet, NodeSpec, ProvenanceTag};
use std::sync::Arc;
use tracing::{info, warn};

/// Everything the engine needs beyond the request itself. Constructed once
/// at the process edge; the engine never reads ambient process state.
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    pub tag: ProvenanceTag,
    pub watch: WatchOptions,

    /// Concurrent create calls in flight. Creates are network-I/O-bound, so
    /// a small bound keeps backends happy without serializing the run.
    pub create_concurrency: usize,

    /// Named SSH keypair installed on created nodes, where the backend
    /// manages keypairs.
    pub ssh_key_name: Option<String>,

    /// Whether reconciliation may create missing network resources. When
    /// false, only discovery runs and a missing resource is an error.
    pub create_network_resources: bool,
}

impl ProvisionerConfig {
    pub fn new(tag: ProvenanceTag) -> Self {
        Self {
            tag,
            watch: WatchOptions::default(),
            create_concurrency: 4,
            ssh_key_name: None,
            create_network_resources: true,
        }
    }
}

pub struct Provisioner<A> {
    adapter: Arc<A>,
    dialer: Arc<dyn Dialer>,
    config: ProvisionerConfig,
}

impl<A: BackendAdapter + 'static> Provisioner<A> {
    pub fn new(adapter: Arc<A>, config: ProvisionerConfig) -> Self {
        Self {
            adapter,
            dialer: Arc::new(TcpDialer::default()),
            config,
        }
    }

    /// Replace the reachability dial. Tests inject fakes here.
    pub fn with_dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = dialer;
        self
    }

    /// Provision the requested node mix and return the finalized topology.
    ///
    /// Either every role's node list matches the requested count, or an
    /// error is returned; there is no silent partial topology.
    pub async fn provision_cluster(&self, request: &ProvisionRequest) -> Result<ClusterTopology> {
        if request.count.total() == 0 {
            return Ok(ClusterTopology::default());
        }

        let graph = self.ensure_network().await?;
        let nodes = self.request_nodes(request, &graph).await?;
        let nodes = self.await_readiness(nodes).await?;
        self.check_counts(request, &nodes)?;

        Ok(assemble(&nodes, request))
    }

    /// Minikube-style variant: one node carrying every role.
    pub async fn provision_single_node(&self, request: &ProvisionRequest) -> Result<ProvisionedNode> {
        let graph = self.ensure_network().await?;

        let roles = RoleSet::of(&[Role::Etcd, Role::Master, Role::Worker, Role::Ingress]);
        let hostname = format!("kubeseed-node-{}", chrono::Utc::now().timestamp());
        let spec = self.node_spec(request, &hostname, Role::Worker, &graph);
        let node = request_node(self.adapter.as_ref(), roles, &spec, &self.config.tag).await?;

        let mut nodes = self.await_readiness(vec![node]).await?;
        Ok(nodes.remove(0))
    }

    /// Single-node topology for the plan hand-off.
    pub fn collapse_single(&self, node: &ProvisionedNode) -> ClusterTopology {
        assemble_single(node)
    }

    /// Destroy every node carrying this tool's provenance tag, and only
    /// those. Destructive and unconditional once invoked; the CLI owns
    /// operator confirmation.
    pub async fn terminate_all(&self) -> Result<usize> {
        let ids = self.adapter.list_nodes_by_tag(&self.config.tag).await?;
        if ids.is_empty() {
            info!("no nodes carry this provenance tag");
            return Ok(0);
        }
        info!(count = ids.len(), "issuing termination requests");
        for id in &ids {
            self.adapter.delete_node(id).await?;
            info!(%id, "node deleted");
        }
        Ok(ids.len())
    }

    async fn ensure_network(&self) -> Result<NetworkResourceSet> {
        let mut reconciler = Reconciler::new(self.adapter.as_ref());
        if !self.config.create_network_resources {
            reconciler = reconciler.discover_only();
        }
        reconciler.ensure(&self.config.tag).await
    }

    /// One create per requested node, with bounded concurrency. On any
    /// failure the first error is returned; already-created siblings are
    /// left on the backend, tagged and discoverable.
    async fn request_nodes(
        &self,
        request: &ProvisionRequest,
        graph: &NetworkResourceSet,
    ) -> Result<Vec<ProvisionedNode>> {
        let timestamp = chrono::Utc::now().timestamp();
        let mut specs: Vec<(RoleSet, NodeSpec)> = Vec::new();
        for (role, count) in [
            (Role::Etcd, request.count.etcd),
            (Role::Master, request.count.master),
            (Role::Worker, request.count.worker),
        ] {
            for index in 0..count {
                let hostname = format!("kubeseed-{}-{}-{}", role, index, timestamp);
                let roles = if request.overlap_roles {
                    RoleSet::of(&[Role::Etcd, Role::Master, Role::Worker])
                } else {
                    RoleSet::of(&[role])
                };
                specs.push((roles, self.node_spec(request, &hostname, role, graph)));
            }
        }

        let results: Vec<Result<ProvisionedNode>> = stream::iter(specs)
            .map(|(roles, spec)| {
                let adapter = Arc::clone(&self.adapter);
                let tag = self.config.tag.clone();
                async move { request_node(adapter.as_ref(), roles, &spec, &tag).await }
            })
            .buffer_unordered(self.config.create_concurrency)
            .collect()
            .await;

        let mut nodes = Vec::new();
        let mut failure: Option<ProvisionError> = None;
        for result in results {
            match result {
                Ok(node) => nodes.push(node),
                Err(e) if failure.is_none() => failure = Some(e),
                Err(e) => warn!(error = %e, "additional node request failed"),
            }
        }

        if let Some(failure) = failure {
            for node in &nodes {
                warn!(id = %node.id, hostname = %node.hostname,
                    "sibling node was created before the failure; left in place");
            }
            return Err(failure);
        }

        // buffer_unordered yields in completion order; hostnames carry the
        // role/index so sorting restores a deterministic layout.
        nodes.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        Ok(nodes)
    }

    async fn await_readiness(&self, nodes: Vec<ProvisionedNode>) -> Result<Vec<ProvisionedNode>> {
        let report = watch_all(
            Arc::clone(&self.adapter),
            Arc::clone(&self.dialer),
            nodes,
            self.config.watch.clone(),
        )
        .await;

        if let Some(failure) = report.failure {
            for node in &report.nodes {
                if node.state == NodeState::Ready {
                    warn!(id = %node.id, hostname = %node.hostname,
                        "node became ready before the failure; left running");
                }
            }
            return Err(failure);
        }
        Ok(report.nodes)
    }

    fn check_counts(&self, request: &ProvisionRequest, nodes: &[ProvisionedNode]) -> Result<()> {
        for (role, requested) in [
            (Role::Etcd, request.count.etcd as usize),
            (Role::Master, request.count.master as usize),
            (Role::Worker, request.count.worker as usize),
        ] {
            let actual = nodes.iter().filter(|n| n.roles.contains(role)).count();
            let enough = if request.overlap_roles {
                actual >= requested.min(1)
            } else {
                actual == requested
            };
            if !enough {
                return Err(ProvisionError::IncompleteTopology {
                    role: role.to_string(),
                    requested,
                    actual,
                });
            }
        }
        Ok(())
    }

    fn node_spec(
        &self,
        request: &ProvisionRequest,
        hostname: &str,
        role: Role,
        graph: &NetworkResourceSet,
    ) -> NodeSpec {
        let blueprint = request.blueprints.for_role(role).or_minimum();
        NodeSpec {
            hostname: hostname.to_string(),
            image: request.image.clone(),
            instance_class: blueprint.instance_class,
            disk_gib: blueprint.disk_gib,
            region: request.region.clone(),
            subnet_id: (!graph.subnet_id.is_empty()).then(|| graph.subnet_id.clone()),
            ingress_rule_set_id: (!graph.ingress_rule_set_id.is_empty())
                .then(|| graph.ingress_rule_set_id.clone()),
            ssh_key_name: self.config.ssh_key_name.clone(),
        }
    }
}
