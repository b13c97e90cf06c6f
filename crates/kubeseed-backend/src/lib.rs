//! kubeseed backend abstraction
//!
//! This crate defines the adapter capability set every compute backend
//! implements for kubeseed, plus the shared error taxonomy and retry
//! policy.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  kubeseed CLI                    │
//! │          (create / create-mini / delete-all)     │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               kubeseed-core                      │
//! │   reconciler · requester · poller · topology     │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │             kubeseed-backend                     │
//! │  trait BackendAdapter { create_node, ... }       │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │     metal     │ │    vagrant    │
//! │    backend    │ │    backend    │
//! └───────────────┘ └───────────────┘
//! ```
//!
//! Every adapter call resolves to success, `NotFound`, `Transient`, or
//! `Terminal`; the convergence engine branches on the class, never on the
//! backend.

pub mod adapter;
pub mod error;
pub mod retry;
pub mod types;

// Re-exports
pub use adapter::BackendAdapter;
pub use error::{BackendError, Result};
pub use retry::{retry, RetryConfig};
pub use types::{
    NetworkResourceSet, NodeDescription, NodeSpec, ProvenanceTag, ResourceKind,
    DEFAULT_ROUTE_CIDR, NETWORK_CIDR, SUBNET_CIDR,
};
