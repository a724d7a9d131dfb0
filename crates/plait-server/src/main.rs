//! The plait gateway binary: load config, bootstrap the bundler and the
//! sandbox engine, serve the three operations over stdio.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use plait_core::Config;
use plait_sandbox::{RspackBundler, WasmEngine};
use plait_server::{serve_stdio, Gateway};
use plait_session::SessionManager;

#[derive(Parser)]
#[command(name = "plait", version, about = "Code-execution gateway for MCP tool servers")]
struct Args {
    /// Path to the configuration file; defaults to the standard search
    /// paths.
    #[arg(long, env = "PLAIT_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = Config::load(args.config).context(
        "failed to load config; pass --config or set PLAIT_CONFIG",
    )?;
    info!(
        servers = config.mcp_servers.len(),
        "loaded configuration"
    );

    let bundler = RspackBundler::locate()
        .context("bundler not available; install with: npm install -g @rspack/cli @rspack/core")?;

    let wasm_path = config
        .wasm_path()
        .context("config is missing sandbox.wasmPath (the sandbox WASM plugin)")?
        .to_string();
    let engine = WasmEngine::from_file(&wasm_path)
        .with_context(|| format!("failed to load sandbox plugin from {wasm_path}"))?;

    let sessions = SessionManager::new(config);
    let gateway = Arc::new(Gateway::new(
        sessions.clone(),
        Arc::new(bundler),
        Arc::new(engine),
    ));

    serve_stdio(gateway).await?;

    sessions.close_all().await;
    info!("server stopped");
    Ok(())
}
