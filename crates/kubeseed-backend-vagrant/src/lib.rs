//! kubeseed local-virtualization backend
//!
//! Drives machines defined by a Vagrantfile through the `vagrant` CLI.
//! Useful for trying out a cluster on one workstation; readiness watches
//! against this backend normally run in the unbounded mode, since address
//! assignment is near-guaranteed once `vagrant up` returns.

pub mod error;
pub mod provider;
pub mod vagrant;

// Re-exports
pub use error::{Result, VagrantError};
pub use provider::VagrantBackend;
pub use vagrant::{MachineStatus, SshConfig, Vagrant};
