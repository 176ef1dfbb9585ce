use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use zerodha_mcp::config::{Resolver, ServerConfig};
use zerodha_mcp::kite::KiteClient;
use zerodha_mcp::mcp::{run_sse, run_stdio, McpServer};
use zerodha_mcp::Mode;

#[derive(Parser, Debug)]
#[command(author, version, about = "Zerodha MCP server")]
struct Args {
    /// Zerodha API key (falls back to ZERODHA_API_KEY, then .env)
    #[arg(long)]
    api_key: Option<String>,

    /// Zerodha API secret (falls back to ZERODHA_API_SECRET, then .env)
    #[arg(long)]
    api_secret: Option<String>,

    /// Port for SSE mode (falls back to PORT, then .env; default: 8001)
    #[arg(short, long)]
    port: Option<String>,

    /// Transport: sse or stdio (falls back to SERVER_MODE, then .env; default: sse)
    #[arg(short, long)]
    mode: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr: in stdio mode stdout belongs to the protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("zerodha_mcp=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let resolver = Resolver::from_process();
    let config = ServerConfig::resolve(
        &resolver,
        args.api_key.as_deref(),
        args.api_secret.as_deref(),
        args.port.as_deref(),
        args.mode.as_deref(),
    )?;

    info!("Starting Zerodha MCP server");
    info!("Mode: {}", config.mode);

    let kite = KiteClient::new(config.api_key.clone(), config.api_secret.clone());
    let server = Arc::new(McpServer::new(kite));

    match config.mode {
        Mode::Stdio => run_stdio(server).await,
        Mode::Sse => run_sse(server, config.port).await,
    }
}
