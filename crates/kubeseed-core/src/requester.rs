//! Node creation with compensating cleanup
//!
//! One create call per requested node. The backend's acceptance is
//! asynchronous in effect, so the node that comes back here is only
//! `Created`; the readiness poller turns that into something usable.
//! After acceptance, mandatory fixups run synchronously. If any fixup
//! fails, the just-created node is deleted: there is no persisted state
//! where a billable node exists untagged and unusable.

use crate::error::{ProvisionError, Result};
use crate::model::{NodeState, ProvisionedNode, RoleSet};
use kubeseed_backend::{BackendAdapter, NodeSpec, ProvenanceTag};
use tracing::{error, info};

pub async fn request_node<A: BackendAdapter + ?Sized>(
    adapter: &A,
    roles: RoleSet,
    spec: &NodeSpec,
    tag: &ProvenanceTag,
) -> Result<ProvisionedNode> {
    // The adapter applies its own bounded retry policy to transient
    // rejections; validation/quota errors surface immediately.
    let node_id = adapter.create_node(spec).await?;
    info!(backend = adapter.name(), %node_id, hostname = %spec.hostname, "node accepted");

    if let Err(cause) = adapter.disable_source_dest_check(&node_id).await {
        return Err(compensate(adapter, node_id, "source/dest check fixup", cause).await);
    }

    if let Err(cause) = adapter.tag_resource(&node_id, tag).await {
        return Err(compensate(adapter, node_id, "tagging", cause).await);
    }

    let mut node = ProvisionedNode::new(node_id, roles, spec.hostname.clone());
    node.state = NodeState::Created;
    Ok(node)
}

/// Delete the just-created node after a failed fixup. If the delete itself
/// fails the error says so explicitly rather than being absorbed: the node
/// is untagged, so nothing will ever rediscover it.
async fn compensate<A: BackendAdapter + ?Sized>(
    adapter: &A,
    node_id: String,
    stage: &str,
    cause: kubeseed_backend::BackendError,
) -> ProvisionError {
    error!(%node_id, stage, error = %cause, "fixup failed, deleting node");
    match adapter.delete_node(&node_id).await {
        Ok(()) => ProvisionError::PartialProvision {
            node_id,
            stage: stage.to_string(),
            cause,
        },
        // The backend reaped the node itself; compensation is satisfied.
        Err(delete_cause) if delete_cause.is_not_found() => {
            info!(%node_id, error = %delete_cause, "node was already gone");
            ProvisionError::PartialProvision {
                node_id,
                stage: stage.to_string(),
                cause,
            }
        }
        Err(delete_cause) => {
            error!(%node_id, error = %delete_cause, "compensating delete failed");
            ProvisionError::ManualCleanupRequired {
                node_id,
                stage: stage.to_string(),
                delete_cause,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use async_trait::async_trait;
    use kubeseed_backend::{BackendError, NetworkResourceSet, NodeDescription, ResourceKind};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FixupBackend {
        fail_fixup: bool,
        fail_tag: bool,
        fail_delete: bool,
        node_already_gone: bool,
        deleted: Mutex<Vec<String>>,
        tagged: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BackendAdapter for FixupBackend {
        fn name(&self) -> &str {
            "fixup-test"
        }

        async fn create_node(&self, spec: &NodeSpec) -> kubeseed_backend::Result<String> {
            Ok(format!("id-{}", spec.hostname))
        }

        async fn describe_node(&self, _id: &str) -> kubeseed_backend::Result<NodeDescription> {
            Ok(NodeDescription::default())
        }

        async fn delete_node(&self, id: &str) -> kubeseed_backend::Result<()> {
            if self.fail_delete {
                return Err(BackendError::Transient("delete API down".into()));
            }
            if self.node_already_gone {
                return Err(BackendError::NotFound(id.to_string()));
            }
            self.deleted.lock().unwrap().push(id.to_string());
            Ok(())
        }

        async fn tag_resource(
            &self,
            id: &str,
            _tag: &ProvenanceTag,
        ) -> kubeseed_backend::Result<()> {
            if self.fail_tag {
                return Err(BackendError::Transient("tag API down".into()));
            }
            self.tagged.lock().unwrap().push(id.to_string());
            Ok(())
        }

        async fn disable_source_dest_check(&self, _id: &str) -> kubeseed_backend::Result<()> {
            if self.fail_fixup {
                return Err(BackendError::Terminal("attribute rejected".into()));
            }
            Ok(())
        }

        async fn find_resource_by_tag(
            &self,
            _kind: ResourceKind,
            _tag: &ProvenanceTag,
            _graph: &NetworkResourceSet,
        ) -> kubeseed_backend::Result<Option<String>> {
            Ok(None)
        }

        async fn create_network_resource(
            &self,
            _kind: ResourceKind,
            _graph: &NetworkResourceSet,
        ) -> kubeseed_backend::Result<String> {
            unimplemented!()
        }

        async fn delete_network_resource(
            &self,
            _kind: ResourceKind,
            _id: &str,
        ) -> kubeseed_backend::Result<()> {
            unimplemented!()
        }

        async fn list_nodes_by_tag(
            &self,
            _tag: &ProvenanceTag,
        ) -> kubeseed_backend::Result<Vec<String>> {
            Ok(vec![])
        }
    }

    fn spec(hostname: &str) -> NodeSpec {
        NodeSpec {
            hostname: hostname.to_string(),
            image: "ubuntu1604lts".to_string(),
            instance_class: "t2.micro".to_string(),
            disk_gib: 12,
            region: "us-east".to_string(),
            subnet_id: None,
            ingress_rule_set_id: None,
            ssh_key_name: None,
        }
    }

    fn tag() -> ProvenanceTag {
        ProvenanceTag::new("kubeseed", "test-host")
    }

    #[tokio::test]
    async fn successful_request_yields_created_tagged_node() {
        let backend = FixupBackend::default();
        let node = request_node(&backend, RoleSet::of(&[Role::Worker]), &spec("worker-0"), &tag())
            .await
            .unwrap();
        assert_eq!(node.id, "id-worker-0");
        assert_eq!(node.state, NodeState::Created);
        assert_eq!(backend.tagged.lock().unwrap().as_slice(), &["id-worker-0"]);
        assert!(backend.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fixup_failure_deletes_node_and_names_it() {
        let backend = FixupBackend {
            fail_fixup: true,
            ..Default::default()
        };
        let err = request_node(&backend, RoleSet::of(&[Role::Worker]), &spec("worker-3"), &tag())
            .await
            .unwrap_err();
        match err {
            ProvisionError::PartialProvision { node_id, .. } => {
                assert_eq!(node_id, "id-worker-3");
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(backend.deleted.lock().unwrap().as_slice(), &["id-worker-3"]);
    }

    #[tokio::test]
    async fn tag_failure_also_compensates() {
        let backend = FixupBackend {
            fail_tag: true,
            ..Default::default()
        };
        let err = request_node(&backend, RoleSet::of(&[Role::Etcd]), &spec("etcd-0"), &tag())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::PartialProvision { .. }));
        assert_eq!(backend.deleted.lock().unwrap().as_slice(), &["id-etcd-0"]);
    }

    #[tokio::test]
    async fn already_reaped_node_counts_as_compensated() {
        let backend = FixupBackend {
            fail_fixup: true,
            node_already_gone: true,
            ..Default::default()
        };
        let err = request_node(&backend, RoleSet::of(&[Role::Worker]), &spec("worker-5"), &tag())
            .await
            .unwrap_err();
        // The backend reaped the node itself; no manual cleanup to demand.
        match err {
            ProvisionError::PartialProvision { node_id, .. } => {
                assert_eq!(node_id, "id-worker-5");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn failed_compensating_delete_demands_manual_cleanup() {
        let backend = FixupBackend {
            fail_fixup: true,
            fail_delete: true,
            ..Default::default()
        };
        let err = request_node(&backend, RoleSet::of(&[Role::Master]), &spec("master-0"), &tag())
            .await
            .unwrap_err();
        match &err {
            ProvisionError::ManualCleanupRequired { node_id, .. } => {
                assert_eq!(node_id, "id-master-0");
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(err.to_string().contains("MANUAL CLEANUP REQUIRED"));
    }
}
