//! Topology assembly
//!
//! Groups Ready nodes by role, applies the convention-based extra role
//! assignments, and computes the derived master address fields. Pure
//! function, no I/O.

use crate::model::{ClusterTopology, ProvisionRequest, ProvisionedNode, Role};

/// Assemble the finalized topology from the set of Ready nodes.
///
/// Conventions: the first worker also serves Ingress; every worker also
/// serves Storage when the request asks for a storage cluster; in overlap
/// mode a node appears under every role it carries, which is how a single
/// node ends up holding Etcd, Master, and Worker simultaneously.
pub fn assemble(ready_nodes: &[ProvisionedNode], request: &ProvisionRequest) -> ClusterTopology {
    let mut topology = ClusterTopology::default();

    for node in ready_nodes {
        if node.roles.contains(Role::Etcd) {
            topology.etcd.push(node.clone());
        }
        if node.roles.contains(Role::Master) {
            topology.master.push(node.clone());
        }
        if node.roles.contains(Role::Worker) {
            topology.worker.push(node.clone());
        }
    }

    // First worker fronts ingress traffic.
    if let Some(first_worker) = topology.worker.first() {
        let mut ingress = first_worker.clone();
        ingress.roles.insert(Role::Ingress);
        topology.ingress.push(ingress);
    }

    if request.storage_cluster {
        topology.storage = topology
            .worker
            .iter()
            .cloned()
            .map(|mut node| {
                node.roles.insert(Role::Storage);
                node
            })
            .collect();
    }

    if let Some(first_master) = topology.master.first() {
        topology.master_address = first_master.public_address.clone();
        topology.master_internal_name = first_master.private_address.clone();
    }

    topology
}

/// Collapse all roles onto one node, minikube style.
pub fn assemble_single(node: &ProvisionedNode) -> ClusterTopology {
    let mut collapsed = node.clone();
    for role in [Role::Etcd, Role::Master, Role::Worker, Role::Ingress] {
        collapsed.roles.insert(role);
    }

    ClusterTopology {
        etcd: vec![collapsed.clone()],
        master: vec![collapsed.clone()],
        worker: vec![collapsed.clone()],
        ingress: vec![collapsed.clone()],
        storage: Vec::new(),
        master_address: collapsed.public_address.clone(),
        master_internal_name: collapsed.private_address.clone(),
    }
}
