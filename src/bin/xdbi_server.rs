//! xdbi server
//!
//! Serves a single `DbInterface` (direct backend, or a federation of
//! one main plus N import servers) over the §6.3 HTTP wire envelope.

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use xdbi::config::{build_federated_interface, FederationConfig};
use xdbi::db_interface::{DbInterface, DirectInterface};
use xdbi::engine::StorageEngine;
use xdbi::observability::init_logging_with_level;

#[derive(Parser, Debug)]
#[command(author, version, about = "xdbi graph-aware entity store server")]
struct Args {
    /// Path to the on-disk database root.
    #[arg(short = 'd', long, env = "XDBI_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Path to a federation config JSON (mutually exclusive with --data-dir).
    #[arg(long, env = "XDBI_FEDERATION_CONFIG")]
    federation_config: Option<PathBuf>,

    /// Bind address.
    #[arg(short = 'b', long, default_value = "127.0.0.1", env = "XDBI_BIND")]
    bind: String,

    /// Bind port.
    #[arg(short = 'p', long, default_value = "8080", env = "XDBI_PORT")]
    port: u16,

    /// Serve the single working graph under this name.
    #[arg(short = 'g', long, default_value = "default", env = "XDBI_GRAPH")]
    graph: String,

    /// Open the direct backend read-only.
    #[arg(long)]
    read_only: bool,

    /// Verbose (debug) logging.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Quiet logging (errors only).
    #[arg(short = 'q', long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging_with_level(args.verbose, args.quiet)?;

    let db: Arc<dyn DbInterface> = match (&args.data_dir, &args.federation_config) {
        (Some(_), Some(_)) => {
            anyhow::bail!("--data-dir and --federation-config are mutually exclusive");
        }
        (None, Some(config_path)) => {
            info!(path = %config_path.display(), "loading federation config");
            let raw = tokio::fs::read_to_string(config_path).await?;
            let config = FederationConfig::from_json_str(&raw)?;
            let base = config_path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let federated = build_federated_interface(&config, base).await?;
            Arc::new(federated)
        }
        (Some(data_dir), None) => {
            std::fs::create_dir_all(data_dir)?;
            let engine = Arc::new(StorageEngine::new(data_dir.clone()));
            Arc::new(DirectInterface::new(engine, args.read_only))
        }
        (None, None) => anyhow::bail!("one of --data-dir or --federation-config is required"),
    };

    db.set_working_graph(&args.graph).await;

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(graph = %args.graph, %addr, "xdbi server starting");
    xdbi::http_server::serve(db, addr).await
}
