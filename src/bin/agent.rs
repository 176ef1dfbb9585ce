//! Chat REPL: one MCP session to the tool server, one Claude conversation.
//!
//! Reads a line, lets Claude pick brokerage tools, prints the reply.
//! `quit` / `exit` (or EOF) ends the session.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use zerodha_mcp::agent::claude::ClaudeClient;
use zerodha_mcp::agent::Agent;
use zerodha_mcp::config::{ClientConfig, Resolver};
use zerodha_mcp::mcp::McpClient;
use zerodha_mcp::Mode;

#[derive(Parser, Debug)]
#[command(author, version, about = "Chat with a Zerodha account through Claude")]
struct Args {
    /// Server host in SSE mode (falls back to MCP_HOST, then .env; default: localhost)
    #[arg(long)]
    host: Option<String>,

    /// Server port in SSE mode (falls back to MCP_PORT, then .env; default: 8001)
    #[arg(short, long)]
    port: Option<String>,

    /// Transport: sse or stdio (falls back to MCP_TRANSPORT, then .env; default: sse)
    #[arg(short, long)]
    transport: Option<String>,

    /// Server binary to spawn in stdio mode
    #[arg(long, default_value = "zerodha-mcp-server")]
    server_command: String,

    /// Claude model to drive the conversation
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Keep the REPL quiet by default; RUST_LOG overrides
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("zerodha_mcp=warn".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let resolver = Resolver::from_process();
    let config = ClientConfig::resolve(
        &resolver,
        args.host.as_deref(),
        args.port.as_deref(),
        args.transport.as_deref(),
    )?;

    let mut claude = ClaudeClient::from_env()?;
    if let Some(model) = args.model {
        claude = claude.with_model(model);
    }

    // Connection or handshake failure here is fatal
    let mut mcp = match config.transport {
        Mode::Sse => McpClient::connect_sse(&config.origin())
            .await
            .with_context(|| format!("could not reach the MCP server at {}", config.sse_url()))?,
        Mode::Stdio => {
            McpClient::connect_stdio(&args.server_command, &["--mode".into(), "stdio".into()])
                .await
                .context("could not start the MCP server")?
        }
    };

    let tools = mcp.tools().to_vec();
    println!(
        "Connected to the Zerodha MCP server ({} tools). Type 'quit' to exit.",
        tools.len()
    );

    let mut agent = Agent::new(claude, &tools);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break; // EOF
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "quit" | "exit") {
            break;
        }

        match agent.run_turn(&mut mcp, line).await {
            Ok(reply) => println!("{reply}\n"),
            // A failed model call ends the turn, not the session
            Err(e) => eprintln!("error: {e:#}\n"),
        }
    }

    println!("bye");
    Ok(())
}
