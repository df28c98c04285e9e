//! Forwarding HTTP proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────┐
//!                     │                 FORWARDING PROXY                  │
//!                     │                                                   │
//!   GET /proxy/host/x │  ┌─────────┐    ┌──────────────┐    ┌──────────┐  │
//!   ──────────────────┼─▶│  http   │───▶│   request    │───▶│ upstream │──┼──▶ Target
//!                     │  │ server  │    │ classify/body│    │  lease + │  │
//!                     │  └─────────┘    └──────────────┘    │  client  │  │
//!                     │                                     └────┬─────┘  │
//!   streamed response │  ┌──────────────┐                        │        │
//!   ◀─────────────────┼──│   response   │◀───────────────────────┘        │
//!                     │  │ relay stream │                                 │
//!                     │  └──────────────┘                                 │
//!                     │                                                   │
//!                     │  ┌────────────┐  hot swap   ┌──────────────────┐  │
//!                     │  │   memory   │────────────▶│ ClientPool       │  │
//!                     │  │  monitor   │             │ (ArcSwapOption)  │  │
//!                     │  └────────────┘             └──────────────────┘  │
//!                     └──────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use forward_proxy::config::{load_config, CliOverrides};
use forward_proxy::lifecycle;
use forward_proxy::observability::logging::init_logging;

#[derive(Parser, Debug)]
#[command(name = "forward-proxy", version, about = "Generic forwarding HTTP proxy")]
struct Args {
    /// TOML configuration file (falls back to PROXY_CONFIG).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind host (overrides config and PROXY_HOST).
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides config and PROXY_PORT).
    #[arg(short, long)]
    port: Option<u16>,

    /// Runtime worker threads.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Debug logging.
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let overrides = CliOverrides {
        host: args.host,
        port: args.port,
        workers: args.workers,
        debug: args.debug,
    };

    let path = args
        .config
        .or_else(|| std::env::var_os("PROXY_CONFIG").map(PathBuf::from));
    let config = load_config(path.as_deref(), &overrides)?;
    init_logging(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address(),
        workers = config.listener.workers,
        max_connections = config.pool.max_connections,
        memory_monitor = config.memory.enabled,
        "forward-proxy starting"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.listener.workers)
        .enable_all()
        .build()?;

    runtime.block_on(lifecycle::serve(config))?;

    tracing::info!("Shutdown complete");
    Ok(())
}
