//! Provisioning error taxonomy

use kubeseed_backend::{BackendError, ResourceKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// The network resource graph could not be fully established. Nodes
    /// structurally depend on it, so no node create is attempted after this.
    #[error("network reconciliation failed at {kind}: {source}")]
    Reconciliation {
        kind: ResourceKind,
        source: BackendError,
    },

    /// A node's create or fixup failed after siblings may have succeeded.
    /// The failing node has been deleted; siblings are left for the operator.
    #[error("node {node_id} failed during {stage} and was deleted: {cause}")]
    PartialProvision {
        node_id: String,
        stage: String,
        cause: BackendError,
    },

    /// The compensating delete itself failed. The node is billable and
    /// untagged; nothing will rediscover it.
    #[error(
        "node {node_id} failed during {stage}, and deleting it also failed: {delete_cause}; \
         MANUAL CLEANUP REQUIRED, id={node_id}"
    )]
    ManualCleanupRequired {
        node_id: String,
        stage: String,
        delete_cause: BackendError,
    },

    /// A node was created but never became reachable within the bound. The
    /// node is left running; the operator must intervene.
    #[error("timed out waiting for node {hostname} (id={node_id}) to become ready")]
    ReadinessTimeout { node_id: String, hostname: String },

    /// A watch was stopped because a sibling failed terminally or the
    /// caller requested cancellation.
    #[error("readiness watch for node {hostname} was cancelled")]
    Cancelled { hostname: String },

    /// Multiple independent missing preconditions, reported together.
    #[error("missing required configuration:\n{}", .0.iter().map(|v| format!(" - {}", v)).collect::<Vec<_>>().join("\n"))]
    MissingConfig(Vec<String>),

    #[error("unsupported image: {0}")]
    UnsupportedImage(String),

    #[error("unknown blueprint preset: {0}")]
    UnknownBlueprint(String),

    #[error("requested {requested} {role} node(s) but {actual} became ready")]
    IncompleteTopology {
        role: String,
        requested: usize,
        actual: usize,
    },
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
