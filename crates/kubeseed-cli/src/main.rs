mod plan;

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use kubeseed_backend::{BackendAdapter, ProvenanceTag};
use kubeseed_backend_metal::{MetalBackend, MetalConfig};
use kubeseed_backend_vagrant::VagrantBackend;
use kubeseed_core::{
    BlueprintSet, ClusterTopology, NodeCount, ProvisionError, ProvisionRequest, Provisioner,
    ProvisionerConfig, Role, WatchOptions,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "kubeseed")]
#[command(about = "Provision Kubernetes-capable infrastructure", long_about = None)]
struct Cli {
    /// Compute backend to drive.
    ///
    /// The metal backend reads METAL_API_TOKEN and METAL_PROJECT_ID from
    /// the environment.
    #[arg(long, global = true, value_enum, default_value = "metal", env = "KUBESEED_BACKEND")]
    backend: BackendKind,

    /// Region / facility for created nodes.
    #[arg(long, global = true, default_value = "us-east-1", env = "KUBESEED_REGION")]
    region: String,

    /// Path to the SSH private key referenced from the generated plan.
    #[arg(long, global = true, env = "KUBESEED_SSH_KEY_PATH")]
    ssh_key_path: Option<String>,

    /// Named SSH keypair to install on created nodes, where the backend
    /// manages keypairs.
    #[arg(long, global = true, env = "KUBESEED_SSH_KEY_NAME")]
    ssh_key_name: Option<String>,

    /// Directory holding the Vagrantfile (vagrant backend only).
    #[arg(long, global = true, default_value = ".", env = "KUBESEED_VAGRANT_DIR")]
    vagrant_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    Metal,
    Vagrant,
}

#[derive(Subcommand)]
enum Commands {
    /// Create infrastructure for a new cluster.
    ///
    /// The command does not return until every node is online and
    /// accessible via SSH.
    Create(CreateArgs),
    /// Create a single node carrying the etcd, master and worker roles.
    CreateMini(CreateMiniArgs),
    /// Delete every node this tool provisioned from this host.
    ///
    /// This destroys clusters. It has no way of knowing you had important
    /// data on them.
    DeleteAll {
        /// Confirm the deletion. Refused otherwise.
        #[arg(long)]
        yes: bool,
    },
    /// List nodes carrying this tool's provenance tag.
    List,
}

#[derive(Args)]
struct CreateArgs {
    /// Count of etcd nodes to produce.
    #[arg(short = 'e', long, default_value_t = 1)]
    etcd: u16,

    /// Count of master nodes to produce.
    #[arg(short = 'm', long, default_value_t = 1)]
    master: u16,

    /// Count of worker nodes to produce.
    #[arg(short = 'w', long, default_value_t = 1)]
    worker: u16,

    /// Instance blueprint: micro, small, or beefy.
    #[arg(long, default_value = "small")]
    blueprint: String,

    /// Linux flavor to provision: ubuntu, centos, or rhel.
    #[arg(long = "os", default_value = "ubuntu")]
    os: String,

    /// Create any missing network prerequisites, including a default-open
    /// ingress rule set.
    #[arg(short = 'f', long)]
    force_provision: bool,

    /// Make every worker also serve the storage role.
    #[arg(long)]
    storage_cluster: bool,

    /// Print the nodes instead of writing a plan file.
    #[arg(short = 'n', long)]
    no_plan: bool,
}

#[derive(Args)]
struct CreateMiniArgs {
    /// Linux flavor to provision: ubuntu, centos, or rhel.
    #[arg(long = "os", default_value = "ubuntu")]
    os: String,

    /// Instance blueprint: micro, small, or beefy.
    #[arg(long, default_value = "small")]
    blueprint: String,

    /// Create any missing network prerequisites, including a default-open
    /// ingress rule set.
    #[arg(short = 'f', long)]
    force_provision: bool,

    /// Print the node instead of writing a plan file.
    #[arg(short = 'n', long)]
    no_plan: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let tag = ProvenanceTag::new("kubeseed", &host_identity().await);

    match cli.backend {
        BackendKind::Metal => {
            let adapter = Arc::new(metal_backend_from_env()?);
            run(adapter, tag, WatchOptions::default(), cli).await
        }
        BackendKind::Vagrant => {
            let adapter = Arc::new(VagrantBackend::new(cli.vagrant_dir.clone()));
            // Address assignment is near-guaranteed locally; wait it out.
            run(adapter, tag, WatchOptions::unbounded(), cli).await
        }
    }
}

async fn run<A: BackendAdapter + 'static>(
    adapter: Arc<A>,
    tag: ProvenanceTag,
    watch: WatchOptions,
    cli: Cli,
) -> anyhow::Result<()> {
    let mut config = ProvisionerConfig::new(tag);
    config.watch = watch;
    config.ssh_key_name = cli.ssh_key_name.clone();

    match cli.command {
        Commands::Create(args) => {
            check_plan_preconditions(&cli.ssh_key_path, args.no_plan)?;
            config.create_network_resources = args.force_provision;
            info!(backend = adapter.name(), region = %cli.region, "provisioning cluster");
            let provisioner = Provisioner::new(adapter, config);

            let request = ProvisionRequest {
                blueprints: blueprint_set(&args.blueprint)?,
                count: NodeCount {
                    etcd: args.etcd,
                    master: args.master,
                    worker: args.worker,
                },
                image: image_for(cli.backend, &args.os)?,
                region: cli.region.clone(),
                overlap_roles: false,
                storage_cluster: args.storage_cluster,
            };

            println!("{}", "Provisioning...".green());
            let topology = provisioner.provision_cluster(&request).await?;
            emit_topology(&topology, args.no_plan, &cli.ssh_key_path)
        }
        Commands::CreateMini(args) => {
            check_plan_preconditions(&cli.ssh_key_path, args.no_plan)?;
            config.create_network_resources = args.force_provision;
            info!(backend = adapter.name(), region = %cli.region, "provisioning single node");
            let provisioner = Provisioner::new(adapter, config);

            let request = ProvisionRequest {
                blueprints: blueprint_set(&args.blueprint)?,
                count: NodeCount {
                    etcd: 0,
                    master: 0,
                    worker: 1,
                },
                image: image_for(cli.backend, &args.os)?,
                region: cli.region.clone(),
                overlap_roles: true,
                storage_cluster: false,
            };

            println!("{}", "Provisioning...".green());
            let node = provisioner.provision_single_node(&request).await?;
            let topology = provisioner.collapse_single(&node);
            emit_topology(&topology, args.no_plan, &cli.ssh_key_path)
        }
        Commands::DeleteAll { yes } => {
            if !yes {
                anyhow::bail!(
                    "refusing to delete without --yes; this destroys every node \
                     this tool provisioned from this host"
                );
            }
            let provisioner = Provisioner::new(adapter, config);
            let count = provisioner.terminate_all().await?;
            println!("{}", format!("✓ {} node(s) deleted", count).green());
            Ok(())
        }
        Commands::List => {
            let ids = adapter.list_nodes_by_tag(&config.tag).await?;
            if ids.is_empty() {
                println!("No nodes carry this tool's provenance tag.");
                return Ok(());
            }
            for id in ids {
                match adapter.describe_node(&id).await {
                    Ok(desc) => println!(
                        "  {} ({}, {})",
                        id.cyan(),
                        desc.public_address.as_deref().unwrap_or("-"),
                        desc.private_address.as_deref().unwrap_or("-"),
                    ),
                    Err(e) => println!("  {} (describe failed: {})", id.cyan(), e),
                }
            }
            Ok(())
        }
    }
}

/// Aggregate every missing precondition into one error instead of failing
/// on the first.
fn check_plan_preconditions(
    ssh_key_path: &Option<String>,
    no_plan: bool,
) -> Result<(), ProvisionError> {
    let mut missing = Vec::new();
    if !no_plan && ssh_key_path.as_deref().map_or(true, str::is_empty) {
        missing.push(
            "KUBESEED_SSH_KEY_PATH (or --ssh-key-path): the generated plan references it".into(),
        );
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ProvisionError::MissingConfig(missing))
    }
}

fn metal_backend_from_env() -> Result<MetalBackend, ProvisionError> {
    let mut missing = Vec::new();
    let token = non_empty_env("METAL_API_TOKEN");
    let project = non_empty_env("METAL_PROJECT_ID");
    if token.is_none() {
        missing.push("METAL_API_TOKEN: required for all metal operations".into());
    }
    if project.is_none() {
        missing.push("METAL_PROJECT_ID: required for all metal operations".into());
    }
    if !missing.is_empty() {
        return Err(ProvisionError::MissingConfig(missing));
    }
    // Presence was just checked.
    let config = MetalConfig::new(token.unwrap_or_default(), project.unwrap_or_default());
    Ok(MetalBackend::new(config))
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn blueprint_set(name: &str) -> Result<BlueprintSet, ProvisionError> {
    BlueprintSet::preset(name).ok_or_else(|| ProvisionError::UnknownBlueprint(name.to_string()))
}

/// Map the operator-facing OS name onto the backend's image identifier.
fn image_for(backend: BackendKind, os: &str) -> Result<String, ProvisionError> {
    let image = match (backend, os.to_ascii_lowercase().as_str()) {
        (BackendKind::Metal, "ubuntu") => "ubuntu_16_04",
        (BackendKind::Metal, "centos") => "centos_7",
        (BackendKind::Metal, "rhel") => "rhel_7",
        // Vagrant boxes come from the Vagrantfile; the name is advisory.
        (BackendKind::Vagrant, "ubuntu") => "ubuntu1604lts",
        (BackendKind::Vagrant, "centos") => "centos7",
        (BackendKind::Vagrant, "rhel") => "rhel7",
        _ => return Err(ProvisionError::UnsupportedImage(os.to_string())),
    };
    Ok(image.to_string())
}

/// Identity of the invoking host, recorded in the provenance tag so
/// delete-all only ever reaps this host's nodes.
async fn host_identity() -> String {
    match tokio::process::Command::new("hostname").output().await {
        Ok(out) if out.status.success() => {
            let name = String::from_utf8_lossy(&out.stdout).trim().to_string();
            if !name.is_empty() {
                return name;
            }
        }
        _ => {}
    }
    warn!("could not determine the local hostname; provenance will say \"unknown\"");
    "unknown".to_string()
}

fn emit_topology(
    topology: &ClusterTopology,
    no_plan: bool,
    ssh_key_path: &Option<String>,
) -> anyhow::Result<()> {
    if no_plan {
        println!();
        println!("{}", "Your instances are ready.".green().bold());
        print_topology(topology);
        return Ok(());
    }

    let ssh_user = topology
        .master
        .first()
        .or_else(|| topology.worker.first())
        .map(|n| n.ssh_user.as_str())
        .unwrap_or("root");
    let key_path = ssh_key_path.as_deref().unwrap_or_default();

    let plan = plan::PlanFile::from_topology(topology, ssh_user, key_path, 22);
    let path = plan::write_plan(std::path::Path::new("."), &plan)?;

    println!();
    println!("{}", "✓ Plan written".green());
    println!("To install your cluster, point the installer at:");
    println!("  {}", path.display().to_string().cyan());
    Ok(())
}

fn print_topology(topology: &ClusterTopology) {
    for role in Role::ALL {
        let nodes = topology.nodes_for_role(role);
        if nodes.is_empty() {
            continue;
        }
        println!("{}:", role.to_string().bold());
        for node in nodes {
            println!(
                "  {} ({}, {})",
                node.hostname.cyan(),
                node.public_address,
                node.private_address
            );
        }
    }
}
