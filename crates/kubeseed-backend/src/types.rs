//! Types shared across backend adapters

use serde::{Deserialize, Serialize};

/// Provenance metadata attached to every resource this tool creates.
///
/// Resources are rediscovered by tag on the next run (idempotent
/// reconciliation) and deleted by tag (`terminate_all`), so a resource
/// without its tag is invisible to the tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceTag {
    /// Name of the tool that created the resource.
    pub provisioned_by: String,

    /// Identity of the invoking host.
    pub created_by: String,
}

impl ProvenanceTag {
    pub fn new(provisioned_by: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            provisioned_by: provisioned_by.into(),
            created_by: created_by.into(),
        }
    }

    pub fn matches(&self, other: &ProvenanceTag) -> bool {
        self.provisioned_by == other.provisioned_by && self.created_by == other.created_by
    }
}

/// Kinds of network prerequisite resources, in reconciliation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Network,
    Subnet,
    EgressGateway,
    RouteTable,
    IngressRuleSet,
}

impl ResourceKind {
    /// Reconciliation order. Each step consumes the previous step's
    /// identifier, so this ordering is load-bearing.
    pub const ORDERED: [ResourceKind; 5] = [
        ResourceKind::Network,
        ResourceKind::Subnet,
        ResourceKind::EgressGateway,
        ResourceKind::RouteTable,
        ResourceKind::IngressRuleSet,
    ];
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceKind::Network => "network",
            ResourceKind::Subnet => "subnet",
            ResourceKind::EgressGateway => "egress-gateway",
            ResourceKind::RouteTable => "route-table",
            ResourceKind::IngressRuleSet => "ingress-rule-set",
        };
        write!(f, "{}", s)
    }
}

/// Fixed minimal network configuration used when a resource has to be
/// created from scratch. Deterministic so re-runs converge.
pub const NETWORK_CIDR: &str = "10.0.0.0/16";
pub const SUBNET_CIDR: &str = "10.0.0.0/24";
pub const DEFAULT_ROUTE_CIDR: &str = "0.0.0.0/0";

/// Identifiers of the network prerequisite graph, filled in reconciliation
/// order. Discoverable on the backend by provenance tag, not by any locally
/// stored reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkResourceSet {
    pub network_id: String,
    pub subnet_id: String,
    pub egress_gateway_id: String,
    pub route_table_id: String,
    pub ingress_rule_set_id: String,
}

impl NetworkResourceSet {
    pub fn id_for(&self, kind: ResourceKind) -> &str {
        match kind {
            ResourceKind::Network => &self.network_id,
            ResourceKind::Subnet => &self.subnet_id,
            ResourceKind::EgressGateway => &self.egress_gateway_id,
            ResourceKind::RouteTable => &self.route_table_id,
            ResourceKind::IngressRuleSet => &self.ingress_rule_set_id,
        }
    }

    pub fn set_id(&mut self, kind: ResourceKind, id: String) {
        let slot = match kind {
            ResourceKind::Network => &mut self.network_id,
            ResourceKind::Subnet => &mut self.subnet_id,
            ResourceKind::EgressGateway => &mut self.egress_gateway_id,
            ResourceKind::RouteTable => &mut self.route_table_id,
            ResourceKind::IngressRuleSet => &mut self.ingress_rule_set_id,
        };
        *slot = id;
    }

    /// Whether every resource kind has an identifier.
    pub fn is_complete(&self) -> bool {
        ResourceKind::ORDERED
            .iter()
            .all(|kind| !self.id_for(*kind).is_empty())
    }
}

/// What the requester asks a backend to create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub hostname: String,
    pub image: String,
    pub instance_class: String,
    pub disk_gib: u32,
    pub region: String,

    /// Subnet to place the node in, where the backend has subnets.
    pub subnet_id: Option<String>,

    /// Ingress rule set to attach, where the backend has them.
    pub ingress_rule_set_id: Option<String>,

    /// Named SSH keypair to install, where the backend manages keypairs.
    pub ssh_key_name: Option<String>,
}

/// What a backend reports about a node when described.
///
/// Fields fill in as the backend materializes the node; consumers must
/// tolerate any of them being absent on early describes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeDescription {
    pub private_address: Option<String>,
    pub public_address: Option<String>,

    /// Backend-assigned private DNS name; the short hostname is its first
    /// label.
    pub private_dns_name: Option<String>,

    pub ssh_user: Option<String>,
}

impl NodeDescription {
    /// First label of the private DNS name, e.g. `ip-10-0-0-12` out of
    /// `ip-10-0-0-12.ec2.internal`.
    pub fn short_hostname(&self) -> Option<&str> {
        self.private_dns_name
            .as_deref()
            .map(|dns| dns.split('.').next().unwrap_or(dns))
            .filter(|label| !label.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_hostname_takes_first_dns_label() {
        let desc = NodeDescription {
            private_dns_name: Some("ip-10-0-0-12.ec2.internal".into()),
            ..Default::default()
        };
        assert_eq!(desc.short_hostname(), Some("ip-10-0-0-12"));
    }

    #[test]
    fn short_hostname_absent_until_assigned() {
        assert_eq!(NodeDescription::default().short_hostname(), None);

        let empty = NodeDescription {
            private_dns_name: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(empty.short_hostname(), None);
    }

    #[test]
    fn tag_matching_requires_both_fields() {
        let a = ProvenanceTag::new("kubeseed", "build-host");
        let b = ProvenanceTag::new("kubeseed", "other-host");
        assert!(a.matches(&a.clone()));
        assert!(!a.matches(&b));
    }
}
