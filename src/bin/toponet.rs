// ============================================================================
// File: src/bin/toponet.rs
// ----------------------------------------------------------------------------
// Command-line front end: validate a topology file, bring it up, or report
// backend health.
// ============================================================================

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::info;
use tokio::sync::oneshot;

use toponet::backends::{DirectoryImages, NetnsBackend, SimulatedBackend};
use toponet::{
    BackendConfig, BackendKind, FabricConfig, IsolationBackend, LinkFabric, Orchestrator, OrchestratorConfig,
    TopologyConfig, TopologyGraph, available_backends, create_backend, create_fabric,
};

/// Declare a virtual network topology and realize it on this host
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load and validate a topology file without creating anything
    Validate {
        /// Topology file (JSON)
        file: PathBuf,
    },

    /// Realize a topology, print its report, and tear it down on Ctrl-C
    Up {
        /// Topology file (JSON)
        file: PathBuf,

        /// netns or simulated
        #[arg(short, long, default_value = "netns")]
        backend: BackendKind,

        /// Run host commands directly instead of through sudo
        #[arg(long)]
        no_sudo: bool,

        /// Time a node's init gets to exit after SIGTERM, e.g. "2s"
        #[arg(long, value_parser = parse_duration)]
        grace: Option<Duration>,

        /// Directory holding node images as <name>/<tag>
        #[arg(long)]
        images: Option<PathBuf>,

        /// Ping between every pair of addressed nodes once live
        #[arg(long)]
        ping_all: bool,

        /// Tear down right after realizing instead of waiting for Ctrl-C
        #[arg(long)]
        once: bool,
    },

    /// Report backend and fabric health
    Check {
        /// Only check this backend
        #[arg(short, long)]
        backend: Option<BackendKind>,
    },
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}

fn load_graph(path: &Path) -> Result<TopologyGraph> {
    let config = TopologyConfig::load(path)?;
    let graph = TopologyGraph::from_config(config)
        .with_context(|| format!("Invalid declarations in '{}'", path.display()))?;
    graph
        .validate()
        .with_context(|| format!("Topology '{}' failed validation", path.display()))?;
    Ok(graph)
}

fn validate(file: &Path) -> Result<()> {
    let graph = load_graph(file)?;
    println!(
        "{}: {} nodes, {} switches, {} links",
        file.display(),
        graph.nodes().len(),
        graph.switches().len(),
        graph.links().len()
    );
    Ok(())
}

fn build_backend(
    kind: BackendKind,
    config: BackendConfig,
    images: Option<PathBuf>,
) -> Result<Arc<dyn IsolationBackend>> {
    let Some(root) = images else {
        return Ok(create_backend(kind, config)?);
    };
    let images = Arc::new(DirectoryImages::new(root));
    match kind {
        BackendKind::Netns => Ok(Arc::new(NetnsBackend::new(config)?.with_images(images))),
        BackendKind::Simulated => Ok(Arc::new(SimulatedBackend::new(config).with_images(images))),
    }
}

struct UpOptions {
    backend: BackendKind,
    no_sudo: bool,
    grace: Option<Duration>,
    images: Option<PathBuf>,
    ping_all: bool,
    once: bool,
}

async fn up(file: &Path, options: UpOptions) -> Result<()> {
    let graph = load_graph(file)?;

    let mut backend_config = BackendConfig::new(options.backend.as_str());
    let mut fabric_config = FabricConfig::new(options.backend.as_str());
    if options.no_sudo {
        backend_config = backend_config.with_sudo(false);
        fabric_config = fabric_config.with_sudo(false);
    }
    if let Some(grace) = options.grace {
        backend_config = backend_config.with_stop_grace(grace);
    }

    let backend = build_backend(options.backend, backend_config, options.images)?;
    let fabric = create_fabric(options.backend, fabric_config)?;
    let mut orchestrator = Orchestrator::from_graph(graph, backend, fabric).with_config(OrchestratorConfig::new());

    // Ctrl-C cancels an in-progress realize, or ends the live session.
    let cancel = orchestrator.cancel_handle();
    let (interrupted_tx, interrupted_rx) = oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            cancel.cancel();
            let _ = interrupted_tx.send(());
        }
    });

    orchestrator
        .realize()
        .await
        .with_context(|| format!("Failed to realize '{}'", file.display()))?;

    let report = serde_json::to_string_pretty(&orchestrator.report())?;
    println!("{report}");

    let session = async {
        if options.ping_all {
            let pings = orchestrator.ping_all().await?;
            println!("{pings}");
        }
        if !options.once {
            info!("topology is live, press Ctrl-C to tear it down");
            let _ = interrupted_rx.await;
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    let teardown = orchestrator.teardown().await.context("Teardown was incomplete");
    session?;
    teardown
}

async fn check(only: Option<BackendKind>) -> Result<()> {
    let kinds = match only {
        Some(kind) => vec![kind],
        None => available_backends(),
    };

    let mut unhealthy = 0;
    for kind in kinds {
        let backend = create_backend(kind, BackendConfig::new(kind.as_str()));
        let fabric = create_fabric(kind, FabricConfig::new(kind.as_str()));
        let (backend, fabric): (Arc<dyn IsolationBackend>, Arc<dyn LinkFabric>) = match (backend, fabric) {
            (Ok(backend), Ok(fabric)) => (backend, fabric),
            (Err(e), _) => {
                println!("{kind}: unavailable: {e}");
                unhealthy += 1;
                continue;
            }
            (_, Err(e)) => {
                println!("{kind}: unavailable: {e}");
                unhealthy += 1;
                continue;
            }
        };

        for (component, status) in [
            ("backend", backend.health_check().await?),
            ("fabric", fabric.health_check().await?),
        ] {
            let verdict = if status.is_healthy { "healthy" } else { "unhealthy" };
            println!("{kind} {component}: {verdict}: {}", status.message);
            let mut metrics: Vec<_> = status.metrics.iter().collect();
            metrics.sort();
            for (key, value) in metrics {
                println!("    {key} = {value}");
            }
            if !status.is_healthy {
                unhealthy += 1;
            }
        }
    }

    health_verdict(unhealthy)
}

fn health_verdict(unhealthy: usize) -> Result<()> {
    if unhealthy > 0 {
        bail!("{} component(s) unhealthy or unavailable", unhealthy);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    match cli.command {
        Command::Validate { file } => validate(&file),
        Command::Up {
            file,
            backend,
            no_sudo,
            grace,
            images,
            ping_all,
            once,
        } => {
            let options = UpOptions {
                backend,
                no_sudo,
                grace,
                images,
                ping_all,
                once,
            };
            up(&file, options).await
        }
        Command::Check { backend } => check(backend).await,
    }
}
