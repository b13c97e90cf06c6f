//! Concurrent, timeout-bounded readiness polling
//!
//! Turns "backend accepted my create request" into "this node is reachable
//! and has a known identity". One independent watch per node, fixed-interval
//! re-query, with both an unbounded mode (local virtualization, where
//! address assignment is near-guaranteed) and a deadline-bounded mode
//! (remote backends, where provisioning can stall indefinitely).

use crate::error::ProvisionError;
use crate::model::{NodeState, ProvisionedNode};
use async_trait::async_trait;
use kubeseed_backend::BackendAdapter;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

/// How a watch polls and when it gives up.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Fixed re-query cadence.
    pub interval: Duration,

    /// None = unbounded wait.
    pub deadline: Option<Duration>,

    /// Port the reachability dial targets.
    pub ssh_port: u16,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            deadline: Some(Duration::from_secs(15 * 60)),
            ssh_port: 22,
        }
    }
}

impl WatchOptions {
    pub fn unbounded() -> Self {
        Self {
            deadline: None,
            ..Self::default()
        }
    }
}

/// Reachability seam. The default implementation dials TCP; tests inject
/// their own.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, address: &str, port: u16) -> bool;
}

/// Dials the SSH port with a connect timeout. A completed TCP handshake is
/// what "accepts SSH" means here; authentication is the installer's problem.
pub struct TcpDialer {
    pub connect_timeout: Duration,
}

impl Default for TcpDialer {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
        }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, address: &str, port: u16) -> bool {
        matches!(
            timeout(self.connect_timeout, TcpStream::connect((address, port))).await,
            Ok(Ok(_))
        )
    }
}

/// Terminal resolution of one watch.
#[derive(Debug)]
pub enum WatchOutcome {
    Ready,
    TimedOut,
    Cancelled,
    Failed(kubeseed_backend::BackendError),
}

impl WatchOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, WatchOutcome::Ready)
    }
}

/// Advance one node's state machine until Ready, deadline, cancellation,
/// or a terminal backend error. Transient describe failures retry on the
/// next tick; a backend that fails every query degrades to TimedOut, never
/// to an infinite hang (in unbounded mode the caller has accepted the hang
/// risk for address assignment, but cancellation still applies).
pub async fn watch_node<A: BackendAdapter + ?Sized>(
    adapter: &A,
    dialer: &dyn Dialer,
    node: &mut ProvisionedNode,
    opts: &WatchOptions,
    mut cancel: watch::Receiver<bool>,
) -> WatchOutcome {
    let deadline = opts.deadline.map(|d| Instant::now() + d);

    loop {
        if *cancel.borrow() {
            node.advance_to(NodeState::Cancelled);
            return WatchOutcome::Cancelled;
        }
        // An already-elapsed deadline resolves before the first poll.
        if let Some(d) = deadline {
            if Instant::now() >= d {
                warn!(node = %node.hostname, "readiness deadline elapsed");
                node.advance_to(NodeState::TimedOut);
                return WatchOutcome::TimedOut;
            }
        }

        match poll_once(adapter, dialer, node, opts.ssh_port).await {
            Ok(()) => {
                if node.state == NodeState::Ready {
                    info!(node = %node.hostname, address = %node.public_address, "node ready");
                    return WatchOutcome::Ready;
                }
            }
            Err(e) => {
                node.advance_to(NodeState::Failed);
                return WatchOutcome::Failed(e);
            }
        }

        let tick = Instant::now() + opts.interval;
        let wake = deadline.map_or(tick, |d| tick.min(d));
        tokio::select! {
            _ = sleep_until(wake) => {}
            changed = cancel.changed() => {
                if changed.is_ok() && *cancel.borrow() {
                    node.advance_to(NodeState::Cancelled);
                    return WatchOutcome::Cancelled;
                }
                // Dropped sender (nobody will ever cancel) or a spurious
                // update: wait out the tick so polling keeps its cadence.
                sleep_until(wake).await;
            }
        }
    }
}

/// One describe-and-advance step. Ok(()) means "keep polling" unless the
/// node reached Ready; Err means the backend failed terminally.
async fn poll_once<A: BackendAdapter + ?Sized>(
    adapter: &A,
    dialer: &dyn Dialer,
    node: &mut ProvisionedNode,
    ssh_port: u16,
) -> Result<(), kubeseed_backend::BackendError> {
    let desc = match adapter.describe_node(&node.id).await {
        Ok(desc) => desc,
        // Not-found right after create is eventual consistency, and
        // transient failures retry on the next tick.
        Err(e) if e.is_transient() || e.is_not_found() => {
            debug!(node = %node.hostname, error = %e, "describe failed, retrying next tick");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    // Record identity as the backend assigns it.
    if let Some(ip) = desc.private_address.as_deref() {
        if !ip.is_empty() {
            node.private_address = ip.to_string();
        }
    }
    if let Some(ip) = desc.public_address.as_deref() {
        if !ip.is_empty() {
            node.public_address = ip.to_string();
        }
    }
    if let Some(user) = desc.ssh_user.as_deref() {
        if !user.is_empty() {
            node.ssh_user = user.to_string();
        }
    }
    // Backends that assign DNS names override the requested hostname with
    // the resolvable short name.
    if let Some(short) = desc.short_hostname() {
        node.hostname = short.to_string();
    }

    let needs_public = node.roles.requires_public_address();
    let network_assigned = !node.private_address.is_empty()
        && (!needs_public || (!node.public_address.is_empty() && !node.hostname.is_empty()));
    if network_assigned {
        node.advance_to(NodeState::NetworkAssigned);
    }

    if node.state == NodeState::NetworkAssigned {
        let target = if node.public_address.is_empty() {
            &node.private_address
        } else {
            &node.public_address
        };
        if dialer.dial(target, ssh_port).await {
            node.advance_to(NodeState::Reachable);
            node.advance_to(NodeState::Ready);
        }
    }

    Ok(())
}

/// Result of watching a whole node set: every node in its final state,
/// plus the failure that stopped the run, if any. Nodes that were already
/// created stay reported even on failure so the operator can follow up.
pub struct WatchReport {
    pub nodes: Vec<ProvisionedNode>,
    pub failure: Option<ProvisionError>,
}

/// Run one independent watch per node, concurrently. The first terminal
/// failure cancels the remaining watches; cancelled siblings resolve within
/// one poll interval rather than running to their own deadlines.
pub async fn watch_all<A>(
    adapter: Arc<A>,
    dialer: Arc<dyn Dialer>,
    nodes: Vec<ProvisionedNode>,
    opts: WatchOptions,
) -> WatchReport
where
    A: BackendAdapter + 'static,
{
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let mut tasks: JoinSet<(usize, ProvisionedNode, WatchOutcome)> = JoinSet::new();

    let count = nodes.len();
    for (index, mut node) in nodes.into_iter().enumerate() {
        let adapter = Arc::clone(&adapter);
        let dialer = Arc::clone(&dialer);
        let opts = opts.clone();
        let cancel = cancel_rx.clone();
        tasks.spawn(async move {
            let outcome = watch_node(&*adapter, &*dialer, &mut node, &opts, cancel).await;
            (index, node, outcome)
        });
    }
    drop(cancel_rx);

    let mut slots: Vec<Option<ProvisionedNode>> = (0..count).map(|_| None).collect();
    let mut failure: Option<ProvisionError> = None;

    while let Some(joined) = tasks.join_next().await {
        let (index, node, outcome) = match joined {
            Ok(result) => result,
            Err(join_err) => {
                // A panicked watch task; treat like a terminal failure.
                warn!(error = %join_err, "readiness watch task failed");
                if failure.is_none() {
                    failure = Some(ProvisionError::Backend(
                        kubeseed_backend::BackendError::Terminal(join_err.to_string()),
                    ));
                    let _ = cancel_tx.send(true);
                }
                continue;
            }
        };

        if !outcome.is_ready() && failure.is_none() {
            failure = Some(match outcome {
                WatchOutcome::TimedOut => ProvisionError::ReadinessTimeout {
                    node_id: node.id.clone(),
                    hostname: node.hostname.clone(),
                },
                WatchOutcome::Cancelled => ProvisionError::Cancelled {
                    hostname: node.hostname.clone(),
                },
                WatchOutcome::Failed(e) => ProvisionError::Backend(e),
                WatchOutcome::Ready => unreachable!(),
            });
            // Stop polling the siblings.
            let _ = cancel_tx.send(true);
        }
        slots[index] = Some(node);
    }

    WatchReport {
        nodes: slots.into_iter().flatten().collect(),
        failure,
    }
}
