//! kubeseed provisioning convergence engine
//!
//! Bootstraps the compute substrate for a Kubernetes-capable cluster:
//! idempotently reconcile the network prerequisite graph, request compute
//! nodes with compensating cleanup, poll each node concurrently until it is
//! reachable with a known identity, and hand a finalized role-grouped
//! topology to the downstream installer.
//!
//! The engine is written once against [`kubeseed_backend::BackendAdapter`]
//! and never branches on which backend is active. Configuration is an
//! explicit value constructed at the process edge; nothing in here reads
//! environment variables.

pub mod error;
pub mod model;
pub mod poller;
pub mod provisioner;
pub mod reconciler;
pub mod report;
pub mod requester;
pub mod topology;

// Re-exports
pub use error::{ProvisionError, Result};
pub use kubeseed_backend::NetworkResourceSet;
pub use model::{
    BlueprintSet, ClusterTopology, NodeBlueprint, NodeCount, NodeState, ProvisionRequest,
    ProvisionedNode, Role, RoleSet,
};
pub use poller::{watch_all, watch_node, Dialer, TcpDialer, WatchOptions, WatchOutcome};
pub use provisioner::{Provisioner, ProvisionerConfig};
pub use reconciler::Reconciler;
pub use report::ReportStore;
pub use requester::request_node;
pub use topology::{assemble, assemble_single};
