//! One-shot access-token generator.
//!
//! Prints the login URL, waits for the pasted request token, exchanges it,
//! prints the access token. A failed exchange reports the brokerage error
//! and exits non-zero. No retry.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{BufRead, Write};

use zerodha_mcp::config::{Resolver, ServerConfig};
use zerodha_mcp::kite::KiteClient;

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate a Zerodha access token")]
struct Args {
    /// Zerodha API key (falls back to ZERODHA_API_KEY, then .env)
    #[arg(long)]
    api_key: Option<String>,

    /// Zerodha API secret (falls back to ZERODHA_API_SECRET, then .env)
    #[arg(long)]
    api_secret: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("zerodha_mcp=warn".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let resolver = Resolver::from_process();
    let config = ServerConfig::resolve(
        &resolver,
        args.api_key.as_deref(),
        args.api_secret.as_deref(),
        None,
        None,
    )?;

    let mut kite = KiteClient::new(config.api_key.clone(), config.api_secret.clone());

    println!("Open this URL, log in, and copy the request_token from the redirect URL:");
    println!("  {}", kite.login_url());
    println!();
    print!("request_token: ");
    std::io::stdout().flush()?;

    let mut request_token = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut request_token)
        .context("reading request token")?;
    let request_token = request_token.trim();
    if request_token.is_empty() {
        anyhow::bail!("no request token given");
    }

    let session = kite
        .generate_session(request_token)
        .await
        .context("token exchange failed")?;

    println!();
    if let Some(user) = session.user_name.as_deref().or(session.user_id.as_deref()) {
        println!("Logged in as {user}.");
    }
    println!("access_token: {}", session.access_token);
    println!("The token is valid for the rest of the trading day.");
    Ok(())
}
