use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use nmos_node::discovery::{self, MdnsDiscovery, QUERY_SERVICE};
use nmos_node::query::QueryClient;
use nmos_node::{Config, Supervisor};

/// NMOS node - registers this host's devices with an NMOS registry
#[derive(Parser)]
#[command(name = "nmos-node", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/nmos-node/config.toml)
    #[arg(short, long, env = "NMOS_NODE_CONFIG")]
    config: Option<PathBuf>,

    /// Node API port
    #[arg(long)]
    port: Option<u16>,

    /// Node label
    #[arg(long)]
    label: Option<String>,

    /// Registration API version
    #[arg(long)]
    registry_version: Option<String>,

    /// Registry to use instead of mDNS discovery (repeatable)
    #[arg(long = "registry", value_name = "HOST:PORT")]
    registries: Vec<SocketAddr>,

    /// Don't advertise the node over mDNS
    #[arg(long)]
    no_advertise: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Browse for registries and list them
    Discover {
        /// Seconds to browse for
        #[arg(short, long, default_value = "5")]
        wait: u64,
    },
    /// Browse for query APIs and list the nodes they know
    Explore {
        /// Seconds to browse for
        #[arg(short, long, default_value = "5")]
        wait: u64,
    },
    /// Print the resources that would be registered, in publication order
    Resources,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,nmos_node=info",
        1 => "info,nmos_node=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Discover { wait } => cmd_discover(&config, wait).await,
            Command::Explore { wait } => cmd_explore(&config, wait).await,
            Command::Resources => cmd_resources(&config),
        };
    }

    let graph = config.build_graph();
    Supervisor::new(config, graph)?.run().await?;
    Ok(())
}

/// Defaults, file and environment, then flags on top
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.node.port = port;
    }
    if let Some(label) = &cli.label {
        config.node.label.clone_from(label);
    }
    if let Some(version) = &cli.registry_version {
        config.registration.settings.api_version.clone_from(version);
    }
    if !cli.registries.is_empty() {
        config.registration.static_registries.clone_from(&cli.registries);
    }
    if cli.no_advertise {
        config.node.advertise = false;
    }

    config.validate()?;
    Ok(config)
}

async fn cmd_discover(config: &Config, wait: u64) -> anyhow::Result<()> {
    let mdns = MdnsDiscovery::new()?;
    let locator = mdns.locator(&config.registration.service_type);

    println!("Browsing {} for {wait}s...", config.registration.service_type);
    let found = discovery::discover_for(&locator, Duration::from_secs(wait)).await?;

    if found.is_empty() {
        println!("No registries found");
        return Ok(());
    }

    for candidate in &found {
        let versions = candidate.txt.api_versions.join(",");
        println!("  {candidate}  api_ver={versions}  auth={}", candidate.txt.api_auth);
    }
    if let Some(selected) = nmos_node::registration::select_candidate(found) {
        println!("Would register with {selected}");
    }
    Ok(())
}

async fn cmd_explore(config: &Config, wait: u64) -> anyhow::Result<()> {
    let mdns = MdnsDiscovery::new()?;
    let locator = mdns.locator(QUERY_SERVICE);
    let found = discovery::discover_for(&locator, Duration::from_secs(wait)).await?;

    if found.is_empty() {
        println!("No query APIs found");
        return Ok(());
    }

    let client = QueryClient::new(config.registration.settings.request_timeout)?;
    let version = config.registration.settings.api_version.as_str();
    let results =
        futures::future::join_all(found.iter().map(|candidate| client.nodes(candidate, version)))
            .await;

    for (candidate, result) in found.iter().zip(results) {
        match result {
            Ok(nodes) => {
                println!("{candidate}: {} node(s)", nodes.len());
                for node in nodes {
                    tracing::info!(hostname = %node.hostname, href = %node.href, "node");
                    println!("  {}  {}  {}", node.id, node.hostname, node.href);
                }
            }
            Err(e) => tracing::warn!(query = %candidate, error = %e, "node query failed"),
        }
    }
    Ok(())
}

fn cmd_resources(config: &Config) -> anyhow::Result<()> {
    let graph = config.build_graph();
    let envelopes = graph.publication_order();
    println!("{}", serde_json::to_string_pretty(&envelopes)?);
    Ok(())
}
