//! Idempotent reconciliation of the network prerequisite graph
//!
//! Find-or-create, in strict order: network → subnet → egress gateway →
//! route table → ingress rules. Each step queries by provenance tag first
//! and reuses what it finds, so re-running against a backend that already
//! carries the tag returns the same identifiers and creates nothing.

use crate::error::{ProvisionError, Result};
use kubeseed_backend::{BackendAdapter, BackendError, NetworkResourceSet, ProvenanceTag, ResourceKind};
use tracing::{info, warn};

pub struct Reconciler<'a, A: BackendAdapter + ?Sized> {
    adapter: &'a A,
    create_missing: bool,
}

impl<'a, A: BackendAdapter + ?Sized> Reconciler<'a, A> {
    pub fn new(adapter: &'a A) -> Self {
        Self {
            adapter,
            create_missing: true,
        }
    }

    /// Reuse tagged resources only; a missing resource becomes an error
    /// instead of a create. Operators opt into creation explicitly.
    pub fn discover_only(mut self) -> Self {
        self.create_missing = false;
        self
    }

    /// Ensure the full network graph exists and is tagged.
    ///
    /// Failure at step k aborts later steps. Resources created at earlier
    /// steps are tagged and therefore discoverable on retry, so they are
    /// left in place. A freshly created resource whose tagging fails is
    /// deleted before returning: untagged resources would otherwise leak.
    pub async fn ensure(&self, tag: &ProvenanceTag) -> Result<NetworkResourceSet> {
        let mut graph = NetworkResourceSet::default();
        for kind in ResourceKind::ORDERED {
            let id = self.ensure_one(kind, tag, &graph).await?;
            graph.set_id(kind, id);
        }
        Ok(graph)
    }

    async fn ensure_one(
        &self,
        kind: ResourceKind,
        tag: &ProvenanceTag,
        graph: &NetworkResourceSet,
    ) -> Result<String> {
        if let Some(id) = self
            .adapter
            .find_resource_by_tag(kind, tag, graph)
            .await
            .map_err(|source| ProvisionError::Reconciliation { kind, source })?
        {
            info!(backend = self.adapter.name(), %kind, %id, "reusing tagged resource");
            return Ok(id);
        }

        if !self.create_missing {
            return Err(ProvisionError::Reconciliation {
                kind,
                source: BackendError::NotFound(format!(
                    "no {} carries the provenance tag, and creation is disabled",
                    kind
                )),
            });
        }

        let id = self
            .adapter
            .create_network_resource(kind, graph)
            .await
            .map_err(|source| ProvisionError::Reconciliation { kind, source })?;
        info!(backend = self.adapter.name(), %kind, %id, "created resource");

        if kind == ResourceKind::IngressRuleSet {
            // Convenience default for the force-provision path; pending a
            // product decision on hardening.
            warn!(%id, "ingress rule set is open to 0.0.0.0/0");
        }

        if let Err(tag_err) = self.adapter.tag_resource(&id, tag).await {
            warn!(%kind, %id, error = %tag_err, "tagging failed, deleting fresh resource");
            if let Err(del_err) = self.adapter.delete_network_resource(kind, &id).await {
                warn!(%kind, %id, error = %del_err, "compensating delete failed; resource is untagged");
            }
            return Err(ProvisionError::Reconciliation {
                kind,
                source: tag_err,
            });
        }

        Ok(id)
    }
}
