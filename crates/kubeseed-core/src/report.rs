//! Keyed store of reported nodes
//!
//! Callback-driven backends report nodes out of band instead of being
//! polled; those reports land here, keyed by hostname, and the completeness
//! predicate answers "have all N nodes of role R reported in?". An explicit
//! keyed store, not filesystem presence.

use crate::model::{ProvisionedNode, Role};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct ReportStore {
    nodes: Mutex<HashMap<String, ProvisionedNode>>,
}

impl ReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reported node, replacing any earlier report for the same
    /// hostname.
    pub fn record(&self, node: ProvisionedNode) {
        let mut nodes = self.nodes.lock().unwrap();
        nodes.insert(node.hostname.clone(), node);
    }

    pub fn get(&self, hostname: &str) -> Option<ProvisionedNode> {
        self.nodes.lock().unwrap().get(hostname).cloned()
    }

    /// Whether `expected` nodes of `role` have reported in.
    pub fn is_complete(&self, role: Role, expected: usize) -> bool {
        self.count(role) >= expected
    }

    pub fn count(&self, role: Role) -> usize {
        self.nodes
            .lock()
            .unwrap()
            .values()
            .filter(|n| n.roles.contains(role))
            .count()
    }

    /// All reported nodes of a role, in hostname order so the result is
    /// deterministic across runs.
    pub fn nodes_for_role(&self, role: Role) -> Vec<ProvisionedNode> {
        let mut nodes: Vec<ProvisionedNode> = self
            .nodes
            .lock()
            .unwrap()
            .values()
            .filter(|n| n.roles.contains(role))
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RoleSet;

    fn node(hostname: &str, roles: &[Role]) -> ProvisionedNode {
        ProvisionedNode::new(hostname, RoleSet::of(roles), hostname)
    }

    #[test]
    fn completeness_counts_per_role() {
        let store = ReportStore::new();
        assert!(store.is_complete(Role::Worker, 0));
        assert!(!store.is_complete(Role::Worker, 2));

        store.record(node("worker-0", &[Role::Worker]));
        store.record(node("worker-1", &[Role::Worker]));
        store.record(node("etcd-0", &[Role::Etcd]));

        assert!(store.is_complete(Role::Worker, 2));
        assert!(store.is_complete(Role::Etcd, 1));
        assert!(!store.is_complete(Role::Master, 1));
    }

    #[test]
    fn rereport_replaces_by_hostname() {
        let store = ReportStore::new();
        store.record(node("worker-0", &[Role::Worker]));
        let mut updated = node("worker-0", &[Role::Worker]);
        updated.public_address = "54.0.0.1".to_string();
        store.record(updated);

        assert_eq!(store.count(Role::Worker), 1);
        assert_eq!(store.get("worker-0").unwrap().public_address, "54.0.0.1");
    }

    #[test]
    fn role_listing_is_hostname_ordered() {
        let store = ReportStore::new();
        store.record(node("worker-1", &[Role::Worker]));
        store.record(node("worker-0", &[Role::Worker]));
        let names: Vec<String> = store
            .nodes_for_role(Role::Worker)
            .into_iter()
            .map(|n| n.hostname)
            .collect();
        assert_eq!(names, vec!["worker-0", "worker-1"]);
    }
}
