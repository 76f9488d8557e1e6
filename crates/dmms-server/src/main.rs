use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rmcp::transport::stdio;
use rmcp::ServiceExt;

mod config;
mod logging;
mod state;
mod tools;

use config::DmmsConfig;
use state::AppState;
use tools::DmmsToolServer;

/// MCP server keeping a Chroma vector store and a Dolt version-controlled
/// store in sync.
///
/// Configuration is read entirely from the environment (see
/// `dmms_server::config::DmmsConfig`); this command takes no flags of its
/// own beyond the standard `--help`/`--version`.
#[derive(Parser)]
#[command(name = "dmms-server")]
#[command(version, about)]
struct Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _cli = Cli::parse();

    let config = DmmsConfig::from_env().context("loading configuration from the environment")?;
    logging::init(&config).context("initializing logging")?;

    tracing::info!(
        dolt_repository_path = %config.dolt_repository_path.display(),
        chroma_mode = %config.chroma_mode,
        "starting dmms-server"
    );

    let state = Arc::new(AppState::from_config(&config).context("opening repository state")?);
    let server = DmmsToolServer::new(state);

    let service = server
        .serve(stdio())
        .await
        .context("starting MCP stdio transport")?;
    service.waiting().await.context("serving MCP requests")?;

    Ok(())
}
