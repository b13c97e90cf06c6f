//! kubeseed bare-metal backend
//!
//! Provisions dedicated servers through a bare-metal-as-a-service device
//! API (Equinix Metal wire format). Provenance travels as flat
//! `key:value` tag strings on each device; the provider owns the network
//! layer, so the reconciler sees a pre-satisfied graph.

pub mod api;
pub mod provider;

// Re-exports
pub use api::{Device, DeviceList, IpAddress};
pub use provider::{MetalBackend, MetalConfig, DEFAULT_BASE_URL};
