//! End-to-end convergence tests against an in-memory backend.

use async_trait::async_trait;
use kubeseed_backend::{
    BackendAdapter, BackendError, NetworkResourceSet, NodeDescription, NodeSpec, ProvenanceTag,
    ResourceKind,
};
use kubeseed_core::poller::Dialer;
use kubeseed_core::{
    BlueprintSet, NodeCount, NodeState, ProvisionError, ProvisionRequest, Provisioner,
    ProvisionerConfig, Role, WatchOptions,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
struct FakeNode {
    hostname: String,
    tag: Option<ProvenanceTag>,
    deleted: bool,
}

/// In-memory backend: nodes materialize addresses immediately, network
/// resources are tag-indexed, deletion is tracked.
#[derive(Default)]
struct FakeBackend {
    nodes: Mutex<HashMap<String, FakeNode>>,
    network: Mutex<HashMap<ResourceKind, String>>,
    next_id: AtomicU32,

    /// Hostname prefix whose tagging fixup should fail.
    fail_tagging_prefix: Mutex<Option<String>>,
}

impl FakeBackend {
    fn seed_node(&self, id: &str, hostname: &str, tag: Option<ProvenanceTag>) {
        self.nodes.lock().unwrap().insert(
            id.to_string(),
            FakeNode {
                hostname: hostname.to_string(),
                tag,
                deleted: false,
            },
        );
    }

    fn live_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .nodes
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, n)| !n.deleted)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl BackendAdapter for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    async fn create_node(&self, spec: &NodeSpec) -> kubeseed_backend::Result<String> {
        let id = format!("i-{:04}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.seed_node(&id, &spec.hostname, None);
        Ok(id)
    }

    async fn describe_node(&self, id: &str) -> kubeseed_backend::Result<NodeDescription> {
        let nodes = self.nodes.lock().unwrap();
        let node = nodes
            .get(id)
            .filter(|n| !n.deleted)
            .ok_or_else(|| BackendError::NotFound(id.to_string()))?;
        let suffix = id.trim_start_matches("i-").trim_start_matches('0');
        let octet = if suffix.is_empty() { "0" } else { suffix };
        Ok(NodeDescription {
            private_address: Some(format!("10.0.0.{}", octet)),
            public_address: Some(format!("54.10.0.{}", octet)),
            private_dns_name: Some(format!("{}.internal", node.hostname)),
            ssh_user: Some("ubuntu".to_string()),
        })
    }

    async fn delete_node(&self, id: &str) -> kubeseed_backend::Result<()> {
        let mut nodes = self.nodes.lock().unwrap();
        match nodes.get_mut(id) {
            Some(node) => {
                node.deleted = true;
                Ok(())
            }
            None => Err(BackendError::NotFound(id.to_string())),
        }
    }

    async fn tag_resource(&self, id: &str, tag: &ProvenanceTag) -> kubeseed_backend::Result<()> {
        let mut nodes = self.nodes.lock().unwrap();
        if let Some(node) = nodes.get_mut(id) {
            let fail = self.fail_tagging_prefix.lock().unwrap();
            if fail
                .as_deref()
                .is_some_and(|prefix| node.hostname.starts_with(prefix))
            {
                return Err(BackendError::Transient("tag API down".into()));
            }
            node.tag = Some(tag.clone());
        }
        // Network resources accept tags silently; they are indexed at
        // creation time below.
        Ok(())
    }

    async fn disable_source_dest_check(&self, _id: &str) -> kubeseed_backend::Result<()> {
        Ok(())
    }

    async fn find_resource_by_tag(
        &self,
        kind: ResourceKind,
        _tag: &ProvenanceTag,
        _graph: &NetworkResourceSet,
    ) -> kubeseed_backend::Result<Option<String>> {
        Ok(self.network.lock().unwrap().get(&kind).cloned())
    }

    async fn create_network_resource(
        &self,
        kind: ResourceKind,
        _graph: &NetworkResourceSet,
    ) -> kubeseed_backend::Result<String> {
        let id = format!("{}-{}", kind, self.next_id.fetch_add(1, Ordering::SeqCst));
        self.network.lock().unwrap().insert(kind, id.clone());
        Ok(id)
    }

    async fn delete_network_resource(
        &self,
        kind: ResourceKind,
        _id: &str,
    ) -> kubeseed_backend::Result<()> {
        self.network.lock().unwrap().remove(&kind);
        Ok(())
    }

    async fn list_nodes_by_tag(
        &self,
        tag: &ProvenanceTag,
    ) -> kubeseed_backend::Result<Vec<String>> {
        let nodes = self.nodes.lock().unwrap();
        let mut ids: Vec<String> = nodes
            .iter()
            .filter(|(_, n)| !n.deleted && n.tag.as_ref().is_some_and(|t| t.matches(tag)))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

struct YesDialer;

#[async_trait]
impl Dialer for YesDialer {
    async fn dial(&self, _address: &str, _port: u16) -> bool {
        true
    }
}

fn tag() -> ProvenanceTag {
    ProvenanceTag::new("kubeseed", "test-host")
}

fn config() -> ProvisionerConfig {
    let mut config = ProvisionerConfig::new(tag());
    config.watch = WatchOptions {
        interval: Duration::from_secs(5),
        deadline: Some(Duration::from_secs(900)),
        ssh_port: 22,
    };
    config
}

fn request(etcd: u16, master: u16, worker: u16) -> ProvisionRequest {
    ProvisionRequest {
        blueprints: BlueprintSet::preset("micro").unwrap(),
        count: NodeCount {
            etcd,
            master,
            worker,
        },
        image: "ubuntu1604lts".to_string(),
        region: "us-east".to_string(),
        overlap_roles: false,
        storage_cluster: false,
    }
}

#[tokio::test(start_paused = true)]
async fn cluster_converges_within_one_interval_when_backend_answers_immediately() {
    let backend = Arc::new(FakeBackend::default());
    let provisioner =
        Provisioner::new(Arc::clone(&backend), config()).with_dialer(Arc::new(YesDialer));

    let started = tokio::time::Instant::now();
    let topology = provisioner
        .provision_cluster(&request(1, 1, 2))
        .await
        .unwrap();

    assert_eq!(topology.etcd.len(), 1);
    assert_eq!(topology.master.len(), 1);
    assert_eq!(topology.worker.len(), 2);
    assert!(topology
        .etcd
        .iter()
        .chain(&topology.master)
        .chain(&topology.worker)
        .all(|n| n.state == NodeState::Ready));
    assert_eq!(topology.master_address, topology.master[0].public_address);
    assert!(!topology.master_address.is_empty());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn failed_fixup_deletes_only_that_node() {
    let backend = Arc::new(FakeBackend::default());
    let provisioner =
        Provisioner::new(Arc::clone(&backend), config()).with_dialer(Arc::new(YesDialer));

    // The second worker's tagging fixup fails; its generated hostname
    // carries role and index.
    *backend.fail_tagging_prefix.lock().unwrap() = Some("kubeseed-worker-1-".to_string());

    let err = provisioner
        .provision_cluster(&request(1, 1, 2))
        .await
        .unwrap_err();
    let failed_id = match err {
        ProvisionError::PartialProvision { node_id, .. } => node_id,
        other => panic!("unexpected: {}", other),
    };

    // The failing node is gone; its three siblings remain created and
    // discoverable on the backend, untouched.
    let live = backend.live_ids();
    assert_eq!(live.len(), 3);
    assert!(!live.contains(&failed_id));
    assert_eq!(backend.list_nodes_by_tag(&tag()).await.unwrap().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn reconciliation_is_idempotent_across_provision_runs() {
    let backend = Arc::new(FakeBackend::default());
    let provisioner =
        Provisioner::new(Arc::clone(&backend), config()).with_dialer(Arc::new(YesDialer));

    provisioner
        .provision_cluster(&request(0, 1, 1))
        .await
        .unwrap();
    let first: HashMap<_, _> = backend.network.lock().unwrap().clone();

    provisioner
        .provision_cluster(&request(0, 1, 1))
        .await
        .unwrap();
    let second: HashMap<_, _> = backend.network.lock().unwrap().clone();

    assert_eq!(first, second);
    assert_eq!(first.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn terminate_all_spares_untagged_and_differently_tagged_nodes() {
    let backend = Arc::new(FakeBackend::default());
    backend.seed_node("i-mine-0", "kubeseed-worker-0-1", Some(tag()));
    backend.seed_node("i-mine-1", "kubeseed-worker-1-1", Some(tag()));
    backend.seed_node(
        "i-other",
        "other-host-node",
        Some(ProvenanceTag::new("kubeseed", "other-host")),
    );
    backend.seed_node("i-untagged", "pet-server", None);

    let provisioner = Provisioner::new(Arc::clone(&backend), config());
    let deleted = provisioner.terminate_all().await.unwrap();

    assert_eq!(deleted, 2);
    assert_eq!(backend.live_ids(), vec!["i-other", "i-untagged"]);
}

#[tokio::test(start_paused = true)]
async fn zero_count_request_returns_empty_topology() {
    let backend = Arc::new(FakeBackend::default());
    let provisioner = Provisioner::new(Arc::clone(&backend), config());
    let topology = provisioner
        .provision_cluster(&request(0, 0, 0))
        .await
        .unwrap();
    assert!(topology.master.is_empty());
    // No network graph is reconciled for an empty request.
    assert!(backend.network.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn single_node_collapses_all_roles() {
    let backend = Arc::new(FakeBackend::default());
    let provisioner =
        Provisioner::new(Arc::clone(&backend), config()).with_dialer(Arc::new(YesDialer));

    let node = provisioner
        .provision_single_node(&request(0, 0, 1))
        .await
        .unwrap();
    assert_eq!(node.state, NodeState::Ready);
    for role in [Role::Etcd, Role::Master, Role::Worker, Role::Ingress] {
        assert!(node.roles.contains(role), "missing role {}", role);
    }

    let topology = provisioner.collapse_single(&node);
    assert_eq!(topology.etcd.len(), 1);
    assert_eq!(topology.master_address, node.public_address);
}
