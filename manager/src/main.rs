//! fw-manager — reconcile this host's iptables INPUT rules with the fleet
//!
//! Phases:
//! 1. Load the fleet catalog (local dump or live Consul query)
//! 2. Identify this host in the catalog by its managed-network address
//! 3. Derive the rules its role requires
//! 4. Read the rules currently owned in the filter table
//! 5. Report the plan, then apply it unless this is a dry run

use anyhow::{Context, Result};
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fleet::config::{self, ManagerConfig};
use fleet::discovery::{self, ConsulClient};
use fleet::{executor, net, plan, FirewallBackend, FleetCatalog, FleetError, Iptables, ReconciliationPlan, Rule};

#[derive(Debug, Parser)]
#[command(
    name = "fw-manager",
    version,
    about = "Reconcile iptables INPUT rules with the Consul fleet catalog"
)]
struct Args {
    /// Print the rules that would change without applying them
    #[arg(long)]
    dry_run: bool,

    /// Read the catalog from this file instead of the Consul API
    #[arg(long, value_name = "PATH")]
    consul_catalog_file_path: Option<PathBuf>,

    /// Network CIDR of the managed (wireguard) network
    #[arg(long, value_name = "CIDR")]
    network_cidr: Option<String>,

    /// Assume this host has the given address instead of checking interfaces
    #[arg(long, value_name = "IP")]
    ip_override: Option<String>,

    /// Configuration file (defaults to $FWM_CONFIG, then /etc/fw-manager/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level or tracing filter directive; RUST_LOG takes precedence
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

impl Args {
    /// Command-line flags override the configuration file
    fn apply_to(&self, config: &mut ManagerConfig) {
        if self.dry_run {
            config.firewall.dry_run = true;
        }
        if let Some(ref path) = self.consul_catalog_file_path {
            config.discovery.catalog_file = Some(path.clone());
        }
        if let Some(ref cidr) = self.network_cidr {
            config.network.cidr = cidr.clone();
        }
        if let Some(ref ip) = self.ip_override {
            config.network.ip_override = Some(ip.clone());
        }
        if let Some(ref level) = self.log_level {
            config.system.log_level = level.clone();
        }
    }
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("FATAL: fw-manager failed: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let config_path = config::config_path(args.config.as_deref());
    let mut config = config::load_config(&config_path)?;
    args.apply_to(&mut config);

    init_logging(&config.system.log_level)?;
    if config_path.exists() {
        info!("Configuration loaded from {}", config_path.display());
    } else {
        warn!("Config file not found at {}, using defaults", config_path.display());
    }

    info!("Phase 1: Loading fleet catalog...");
    let catalog = normalized_catalog(&config).context("failed to get normalized fleet catalog")?;
    info!("Fleet catalog has {} members", catalog.len());

    info!("Phase 2: Matching this host to the fleet...");
    let network = net::parse_network(&config.network.cidr).context("failed to parse the network CIDR")?;
    let local = host_addresses(&config)?;
    let this_host = fleet::resolve_self(&local, &network, &catalog)
        .context("this computer does not belong to the managed network")?;
    info!(
        "This host is {} ({}) with role {}",
        this_host.node, this_host.address, this_host.role
    );

    info!("Phase 3: Deriving desired rules...");
    let desired = fleet::derive_rules(this_host, &catalog);
    info!("{} rules required by policy", desired.len());

    let backend = Iptables::new(&config.firewall.binary);
    reconcile(&backend, &desired, config.firewall.dry_run)?;

    Ok(())
}

/// Diff the backend's owned rules against `desired`, report, then apply
/// unless `dry_run`. The report always precedes any mutation.
fn reconcile(
    backend: &dyn FirewallBackend,
    desired: &[Rule],
    dry_run: bool,
) -> Result<ReconciliationPlan> {
    info!("Phase 4: Reading managed firewall rules...");
    let current = plan::current_rules(backend).context("failed to read managed firewall rules")?;
    info!("{} managed rules present", current.len());

    let plan = ReconciliationPlan::compute(&current, desired);
    report(&plan);

    if dry_run {
        info!("Dry run, execution skipped");
        return Ok(plan);
    }
    if plan.is_empty() {
        info!("Firewall is up to date");
        return Ok(plan);
    }

    info!("Phase 5: Applying {} changes...", plan.len());
    let applied = executor::apply(backend, &plan).context("failed to apply firewall rules")?;
    info!("Applied {applied} changes");

    Ok(plan)
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level {level:?}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .compact()
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {e}"))
}

/// Catalog from the local dump when configured, otherwise from every
/// datacenter known to Consul
fn normalized_catalog(config: &ManagerConfig) -> Result<FleetCatalog> {
    if let Some(ref path) = config.discovery.catalog_file {
        let records = discovery::read_local_catalog(path)
            .context("failed to read consul catalog from local file")?;
        return Ok(FleetCatalog::normalize(&records));
    }

    let client = ConsulClient::new(
        &config.discovery.consul_addr,
        config.discovery.token.clone(),
        Duration::from_secs(config.discovery.timeout_seconds),
    );
    let service = &config.discovery.service_name;
    info!("Querying {} for {service} registrations", client.base_url());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let records = runtime
        .block_on(async {
            let datacenters = client.datacenters().await?;
            info!("Datacenters: {}", datacenters.join(", "));
            let records = client.fleet_records(service, &datacenters).await?;
            Ok::<_, FleetError>(records)
        })
        .context("failed to get fleet catalog from the consul api")?;

    Ok(FleetCatalog::normalize(&records))
}

fn host_addresses(config: &ManagerConfig) -> Result<Vec<IpAddr>> {
    match config.network.ip_override {
        Some(ref ip) => {
            info!("Assuming local address {ip}");
            Ok(vec![net::parse_ip(ip)?])
        }
        None => {
            info!("Getting IP addresses assigned to local interfaces");
            net::local_addresses()
                .context("failed to get ip addresses assigned to local interfaces")
        }
    }
}

/// Emitted before any mutation, dry run or not
fn report(plan: &ReconciliationPlan) {
    for line in plan.to_string().lines() {
        info!("{line}");
    }
}
