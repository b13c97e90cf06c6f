//! Backend adapter trait
//!
//! Each backend (bare-metal-as-a-service, local virtualization, ...)
//! implements this capability set once; the convergence engine is written
//! against it and never branches on which backend is active.

use crate::error::Result;
use crate::types::{NetworkResourceSet, NodeDescription, NodeSpec, ProvenanceTag, ResourceKind};
use async_trait::async_trait;

#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Backend name for logs and UI, e.g. "metal", "vagrant".
    fn name(&self) -> &str;

    /// Ask the backend to create a node. Acceptance only means the backend
    /// will eventually materialize it; the returned id is the handle the
    /// readiness poller watches.
    async fn create_node(&self, spec: &NodeSpec) -> Result<String>;

    /// Current backend view of a node. Address and hostname fields may be
    /// absent while the node is still materializing.
    async fn describe_node(&self, id: &str) -> Result<NodeDescription>;

    async fn delete_node(&self, id: &str) -> Result<()>;

    /// Attach provenance metadata to any resource (node or network).
    async fn tag_resource(&self, id: &str, tag: &ProvenanceTag) -> Result<()>;

    /// Post-create fixup: allow routed traffic through the node. Backends
    /// without the concept return Ok.
    async fn disable_source_dest_check(&self, id: &str) -> Result<()>;

    /// Look up a network resource by provenance tag. `graph` carries the
    /// identifiers reconciled so far, scoping the query to the enclosing
    /// resources (e.g. subnet within network).
    async fn find_resource_by_tag(
        &self,
        kind: ResourceKind,
        tag: &ProvenanceTag,
        graph: &NetworkResourceSet,
    ) -> Result<Option<String>>;

    /// Create a network resource with the fixed minimal configuration for
    /// its kind, wired into the identifiers already present in `graph`.
    async fn create_network_resource(
        &self,
        kind: ResourceKind,
        graph: &NetworkResourceSet,
    ) -> Result<String>;

    /// Delete a network resource. Used to compensate when tagging a freshly
    /// created resource fails, since an untagged resource is undiscoverable.
    async fn delete_network_resource(&self, kind: ResourceKind, id: &str) -> Result<()>;

    /// Ids of every node carrying the given provenance tag. Scoped strictly
    /// to the tag: untagged or differently-tagged nodes are never returned.
    async fn list_nodes_by_tag(&self, tag: &ProvenanceTag) -> Result<Vec<String>>;
}
