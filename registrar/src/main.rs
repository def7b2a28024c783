//! consul-svc — announce this node to Consul and answer its health check
//!
//! The registration carries the `<env>.<stage>` tag that fw-manager turns
//! into the node's role, and the node's address on the managed network.

use anyhow::{Context, Result};
use axum::{extract::State, Router};
use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fleet::discovery::{ConsulClient, ServiceRegistration, DEFAULT_CONSUL_ADDR, PRIMARY_SERVICE_NAME};
use fleet::{net, IpNetwork};

const FALLBACK_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 10, 0, 10));

#[derive(Debug, Parser)]
#[command(name = "consul-svc", version, about = "Register the wireguard service with the local Consul agent")]
struct Args {
    /// The http port for the service
    #[arg(long, default_value_t = 8011)]
    port: u16,

    /// The service name reported to consul
    #[arg(long, default_value = PRIMARY_SERVICE_NAME)]
    name: String,

    /// The service env reported to consul in the metadata section
    #[arg(long, default_value = "metrics")]
    env: String,

    /// The service stage reported to consul in the metadata section
    #[arg(long, default_value = "test")]
    stage: String,

    /// Host consul uses to reach the health check
    #[arg(long, default_value = "localhost")]
    address: String,

    /// Managed network the registered address must belong to
    #[arg(long, default_value = "10.10.0.0/16")]
    network_cidr: String,

    /// Consul agent HTTP address
    #[arg(long, env = "CONSUL_HTTP_ADDR", default_value = DEFAULT_CONSUL_ADDR)]
    consul_addr: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("FATAL: consul-svc failed: {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .compact()
        .init();

    let network = net::parse_network(&args.network_cidr).context("failed to parse the network CIDR")?;

    // the service must keep running even when consul is unreachable
    if let Err(e) = register(&args, &network).await {
        warn!("Registration failed: {e:#}");
    }

    serve(args.port).await
}

/// Address to announce: first local address on the managed network
fn announced_address(network: &IpNetwork) -> IpAddr {
    match net::first_address_in(network) {
        Ok(Some(ip)) => ip,
        Ok(None) => {
            warn!("No local address in {network}, announcing {FALLBACK_ADDRESS}");
            FALLBACK_ADDRESS
        }
        Err(e) => {
            warn!("{e}, announcing {FALLBACK_ADDRESS}");
            FALLBACK_ADDRESS
        }
    }
}

async fn register(args: &Args, network: &IpNetwork) -> Result<()> {
    let address = announced_address(network);
    let registration = ServiceRegistration::for_node(
        &args.name,
        &address.to_string(),
        args.port,
        &args.address,
        &args.env,
        &args.stage,
    );

    let client = ConsulClient::new(
        &args.consul_addr,
        std::env::var("CONSUL_HTTP_TOKEN").ok(),
        Duration::from_secs(30),
    );
    client
        .register(&registration)
        .await
        .with_context(|| format!("failed to register service({}:{})", args.name, args.port))?;

    info!(
        "Successfully registered service {}:{} at {address} with tags {:?}",
        args.name, args.port, registration.tags
    );
    Ok(())
}

fn router() -> Router {
    Router::new()
        .fallback(answer)
        .with_state(Arc::new(AtomicU64::new(0)))
}

async fn answer(State(counter): State<Arc<AtomicU64>>) -> String {
    let n = counter.fetch_add(1, Ordering::Relaxed);
    format!("Nothing interesting is here :) #{n}")
}

async fn serve(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("HTTP server is listening on {addr}");

    axum::serve(listener, router())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")
}

/// Resolves on Ctrl-C. Without a signal handler the server runs until killed.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down"),
        Err(e) => {
            warn!("Failed to listen for Ctrl-C, graceful shutdown disabled: {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::try_parse_from(["consul-svc", "--consul-addr", "http://127.0.0.1:8500"]).unwrap();
        assert_eq!(args.port, 8011);
        assert_eq!(args.name, "wireguard");
        assert_eq!(args.env, "metrics");
        assert_eq!(args.stage, "test");
        assert_eq!(args.address, "localhost");
        assert_eq!(args.network_cidr, "10.10.0.0/16");
    }

    #[test]
    fn test_announced_address_falls_back() {
        // documentation range, never assigned to a test host
        let network = net::parse_network("192.0.2.0/24").unwrap();
        assert_eq!(announced_address(&network), FALLBACK_ADDRESS);
    }

    #[tokio::test]
    async fn test_answer_counts_requests() {
        let counter = Arc::new(AtomicU64::new(0));
        assert_eq!(
            answer(State(counter.clone())).await,
            "Nothing interesting is here :) #0"
        );
        assert_eq!(
            answer(State(counter.clone())).await,
            "Nothing interesting is here :) #1"
        );
        assert_eq!(counter.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_shutdown_signal_waits() {
        let waited = tokio::time::timeout(Duration::from_millis(50), shutdown_signal()).await;
        assert!(waited.is_err(), "shutdown fired without a signal");
    }
}
