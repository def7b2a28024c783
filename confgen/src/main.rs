//! consul-config-gen — print a Consul agent config (HCL) for a fleet node
//!
//! `node_meta` env/stage mirror the `<env>.<stage>` service tag consul-svc
//! registers, so both describe the same role.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;

#[derive(Debug, Parser)]
#[command(name = "consul-config-gen", version, about = "Render a Consul agent config for a fleet node")]
struct Args {
    /// Data center
    #[arg(long, default_value = "dc1")]
    data_center: String,

    /// Data dir for consul agent
    #[arg(long, default_value = "/consul-home")]
    data_dir: String,

    /// Node name for consul agent
    #[arg(long, default_value = "some-node")]
    node_name: String,

    /// Comma-separated IPs of the consul servers
    #[arg(long, default_value = "10.10.0.5")]
    retry_join_ip: String,

    /// Node env for consul node metadata
    #[arg(long, default_value = "metrics")]
    node_env: String,

    /// Node stage for consul node metadata
    #[arg(long, default_value = "prod")]
    node_stage: String,
}

fn retry_join(list: &str) -> String {
    list.split(',')
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(|ip| format!("\"{ip}\""))
        .collect::<Vec<_>>()
        .join(",")
}

fn render(args: &Args) -> String {
    format!(
        r#"
datacenter = "{datacenter}"
data_dir = "{data_dir}"
log_level = "INFO"
node_name = "{node_name}"
retry_join = [{retry_join}]

node_meta {{
  env = "{env}"
  stage = "{stage}"
}}
"#,
        datacenter = args.data_center,
        data_dir = args.data_dir,
        node_name = args.node_name,
        retry_join = retry_join(&args.retry_join_ip),
        env = args.node_env,
        stage = args.node_stage,
    )
}

fn main() -> Result<()> {
    let args = Args::parse();
    std::io::stdout()
        .write_all(render(&args).as_bytes())
        .context("Failed to write config to stdout")
}
