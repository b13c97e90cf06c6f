//! Data model for the provisioning convergence engine

use serde::{Deserialize, Serialize};

/// Cluster role a node can hold. A node may hold several roles at once
/// ("overlap" mode, used for single-node deployments).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Etcd,
    Master,
    Worker,
    Ingress,
    Storage,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Etcd,
        Role::Master,
        Role::Worker,
        Role::Ingress,
        Role::Storage,
    ];
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Etcd => "etcd",
            Role::Master => "master",
            Role::Worker => "worker",
            Role::Ingress => "ingress",
            Role::Storage => "storage",
        };
        write!(f, "{}", s)
    }
}

/// Set of roles held by one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSet(Vec<Role>);

impl RoleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(roles: &[Role]) -> Self {
        let mut set = Self::new();
        for role in roles {
            set.insert(*role);
        }
        set
    }

    pub fn insert(&mut self, role: Role) {
        if !self.0.contains(&role) {
            self.0.push(role);
        }
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Roles requiring external reachability (a public address and a
    /// resolvable short hostname) before the node counts as network-assigned.
    pub fn requires_public_address(&self) -> bool {
        // All cluster roles are installed over SSH from outside.
        !self.0.is_empty()
    }
}

impl std::fmt::Display for RoleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.0.iter().map(|r| r.to_string()).collect();
        write!(f, "{}", names.join("+"))
    }
}

/// Per-role compute specification. Unset fields fall back to the
/// minimum-viable default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeBlueprint {
    pub instance_class: String,
    pub disk_gib: u32,
}

/// Smallest machine the installer will accept.
pub const MINIMUM_INSTANCE_CLASS: &str = "t2.micro";
pub const MINIMUM_DISK_GIB: u32 = 12;

impl NodeBlueprint {
    pub fn new(instance_class: impl Into<String>, disk_gib: u32) -> Self {
        Self {
            instance_class: instance_class.into(),
            disk_gib,
        }
    }

    /// Minimum-viable default blueprint.
    pub fn minimum() -> Self {
        Self::new(MINIMUM_INSTANCE_CLASS, MINIMUM_DISK_GIB)
    }

    /// Fill unset fields from the minimum-viable default.
    pub fn or_minimum(&self) -> Self {
        let mut out = Self::minimum();
        if !self.instance_class.is_empty() {
            out.instance_class = self.instance_class.clone();
        }
        if self.disk_gib > out.disk_gib {
            out.disk_gib = self.disk_gib;
        }
        out
    }

    /// Merge two blueprints: larger disk wins, non-empty instance class wins.
    pub fn merge(&self, other: &NodeBlueprint) -> Self {
        Self {
            instance_class: if other.instance_class.is_empty() {
                self.instance_class.clone()
            } else {
                other.instance_class.clone()
            },
            disk_gib: self.disk_gib.max(other.disk_gib),
        }
    }
}

/// Per-role blueprints for one provisioning request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlueprintSet {
    pub etcd: NodeBlueprint,
    pub master: NodeBlueprint,
    pub worker: NodeBlueprint,
}

impl BlueprintSet {
    /// Named preset, or None for an unknown name.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "micro" => Some(Self::default().normalized()),
            "small" => Some(
                Self {
                    worker: NodeBlueprint::new("t2.medium", 0),
                    ..Self::default()
                }
                .normalized(),
            ),
            "beefy" => Some(
                Self {
                    etcd: NodeBlueprint::new("m4.large", 50),
                    master: NodeBlueprint::new("m4.xlarge", 50),
                    worker: NodeBlueprint::new("m4.xlarge", 200),
                }
                .normalized(),
            ),
            _ => None,
        }
    }

    /// Every role's blueprint with defaults filled in.
    pub fn normalized(&self) -> Self {
        Self {
            etcd: self.etcd.or_minimum(),
            master: self.master.or_minimum(),
            worker: self.worker.or_minimum(),
        }
    }

    pub fn for_role(&self, role: Role) -> &NodeBlueprint {
        match role {
            Role::Etcd => &self.etcd,
            Role::Master => &self.master,
            // Ingress and Storage are convention roles layered onto workers.
            Role::Worker | Role::Ingress | Role::Storage => &self.worker,
        }
    }
}

/// Requested quantity per role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCount {
    pub etcd: u16,
    pub master: u16,
    pub worker: u16,
}

impl NodeCount {
    /// Widened so the sum cannot overflow on large per-role counts.
    pub fn total(&self) -> u32 {
        u32::from(self.etcd) + u32::from(self.master) + u32::from(self.worker)
    }
}

/// Everything the engine needs to provision one cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub blueprints: BlueprintSet,
    pub count: NodeCount,

    /// Distribution image, e.g. "ubuntu1604lts".
    pub image: String,

    pub region: String,

    /// Collapse all roles onto every node (single-node deployments).
    pub overlap_roles: bool,

    /// Make every worker also serve the Storage role.
    pub storage_cluster: bool,
}

/// Node lifecycle. Only ever advances forward through
/// Created → NetworkAssigned → Reachable → Ready, or terminates in
/// Failed / TimedOut / Cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Created,
    NetworkAssigned,
    Reachable,
    Ready,
    Failed,
    TimedOut,
    Cancelled,
}

impl NodeState {
    fn rank(self) -> u8 {
        match self {
            NodeState::Created => 0,
            NodeState::NetworkAssigned => 1,
            NodeState::Reachable => 2,
            NodeState::Ready => 3,
            NodeState::Failed | NodeState::TimedOut | NodeState::Cancelled => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeState::Ready | NodeState::Failed | NodeState::TimedOut | NodeState::Cancelled
        )
    }
}

/// A node the backend has accepted. Mutated in place by the readiness
/// poller as its identity becomes known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionedNode {
    /// Opaque backend id.
    pub id: String,

    pub roles: RoleSet,

    pub hostname: String,

    pub private_address: String,

    /// Empty until the backend assigns one.
    pub public_address: String,

    pub ssh_user: String,

    pub state: NodeState,
}

impl ProvisionedNode {
    pub fn new(id: impl Into<String>, roles: RoleSet, hostname: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles,
            hostname: hostname.into(),
            private_address: String::new(),
            public_address: String::new(),
            ssh_user: String::new(),
            state: NodeState::Created,
        }
    }

    /// Advance the lifecycle state. Backward transitions are ignored and
    /// terminal states stick; returns whether the state changed.
    pub fn advance_to(&mut self, next: NodeState) -> bool {
        if self.state.is_terminal() && self.state != next {
            return false;
        }
        if next.rank() <= self.state.rank() && next != self.state {
            return false;
        }
        if self.state == next {
            return false;
        }
        self.state = next;
        true
    }
}

// The network prerequisite graph identifiers (NetworkResourceSet) live in
// kubeseed-backend, since adapters consume them; re-exported from lib.rs.

/// Finalized, role-grouped set of Ready nodes handed to the downstream
/// installer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterTopology {
    pub etcd: Vec<ProvisionedNode>,
    pub master: Vec<ProvisionedNode>,
    pub worker: Vec<ProvisionedNode>,
    pub ingress: Vec<ProvisionedNode>,
    pub storage: Vec<ProvisionedNode>,

    /// Public address of the first master.
    pub master_address: String,

    /// Private address of the first master.
    pub master_internal_name: String,
}

impl ClusterTopology {
    pub fn nodes_for_role(&self, role: Role) -> &[ProvisionedNode] {
        match role {
            Role::Etcd => &self.etcd,
            Role::Master => &self.master,
            Role::Worker => &self.worker,
            Role::Ingress => &self.ingress,
            Role::Storage => &self.storage,
        }
    }
}
