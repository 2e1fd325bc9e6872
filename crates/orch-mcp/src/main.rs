//! Test orchestrator MCP server
//!
//! # Usage
//!
//! ```bash
//! orch-mcp [--config <path>] [--profile browser|karate|all]
//! orch-mcp --list-tools
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Control log verbosity (default: `orch_mcp=info`)
//! - `JIRA_*`, `AZURE_OPEN_AI_*`, `WEBDRIVER_URL`, `KARATE_BASE_PATH`:
//!   override configuration values; a `.env` file is read first
//!
//! # Protocol
//!
//! The server communicates via line-delimited JSON over stdio:
//! - Requests/responses go through stdout
//! - Logs go to stderr (to avoid interfering with the protocol)

use std::path::PathBuf;

use clap::Parser;
use orch_dispatch::Dispatcher;
use orch_mcp::{McpServer, Profile, Providers, build_registry_with};
use orch_providers::Settings;

/// MCP server for browser automation and Karate tests
#[derive(Parser)]
#[command(name = "orch-mcp")]
#[command(about = "MCP server for browser automation and Karate tests")]
#[command(version)]
struct Args {
    /// Settings file (TOML)
    #[arg(short, long, env = "ORCH_CONFIG")]
    config: Option<PathBuf>,

    /// Tool set to expose
    #[arg(short, long, value_enum, default_value_t = Profile::All)]
    profile: Profile,

    /// Print the tool catalogue as JSON and exit
    #[arg(long)]
    list_tools: bool,

    /// Default per-call timeout in seconds
    #[arg(long)]
    default_timeout: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let _ = dotenvy::dotenv();

    // Logs go to stderr, stdout carries the protocol
    let directive = if args.verbose { "orch_mcp=debug" } else { "orch_mcp=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(secs) = args.default_timeout {
        settings.dispatch.default_timeout_secs = secs;
    }

    let providers = Providers::from_settings(&settings, args.profile);
    let registry = build_registry_with(&providers, &settings)?;

    if args.list_tools {
        let tools = serde_json::json!({ "tools": registry.list() });
        println!("{}", serde_json::to_string_pretty(&tools)?);
        return Ok(());
    }

    tracing::info!(profile = ?args.profile, config = ?args.config, "Starting orch-mcp server");

    let dispatcher = Dispatcher::new(registry).with_default_timeout(settings.dispatch.default_timeout());
    let server = McpServer::new(dispatcher);
    let served = server.run().await;
    providers.shutdown().await;
    served?;

    Ok(())
}
