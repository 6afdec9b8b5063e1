use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use docgate_server::{gate::TokenSigner, load_config, observability, run};

#[derive(Parser)]
#[command(name = "docgate-server", version, about = "Dynamic collection gateway over JSON document stores")]
struct Cli {
    /// Path to the TOML configuration file (defaults to ./docgate.toml when present)
    #[arg(long, env = "DOCGATE_CONFIG", global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Mint a signed owner token with the configured gate secret
    IssueToken {
        #[arg(long)]
        subject: String,
        /// Token lifetime; defaults to gate.token_ttl_secs
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref()).map_err(|e| anyhow!("Configuration error: {e}"))?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            observability::init_tracing_with_level(&cfg.logging.level);
            tracing::info!(
                port = cfg.server.port,
                backend = ?cfg.storage.backend,
                "Configuration loaded"
            );
            run(cfg).await
        }
        Command::IssueToken { subject, ttl_secs } => {
            let secret = cfg
                .gate
                .secret
                .as_deref()
                .filter(|s| !s.is_empty())
                .context("gate.secret (or OWNER_KEY) must be set to issue tokens")?;
            let ttl = Duration::from_secs(ttl_secs.unwrap_or(cfg.gate.token_ttl_secs));
            let token = TokenSigner::new(secret)
                .issue(&subject, ttl)
                .map_err(|e| anyhow!("cannot issue token: {e}"))?;

            println!("{token}");
            Ok(())
        }
    }
}
