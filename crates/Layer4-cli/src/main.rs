//! Kiln CLI - Main entry point

mod cli;

use clap::{Parser, Subcommand};
use kiln_foundation::PluginsConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Kiln - hot-loadable plugin host
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve, install and load every enabled plugin
    Sync {
        /// Print the pass report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a startup pass, then list loaded manifests and the module index
    Status {
        /// Include stealth (built-in) manifests
        #[arg(short, long)]
        all: bool,
    },
    /// Print the effective plugin configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = PluginsConfig::load()?;

    if let Command::Config = args.command {
        return cli::print_config(&config);
    }

    // Ctrl-C → 진행 중인 패스 취소
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling plugin pass");
                cancel.cancel();
            }
        });
    }

    match args.command {
        Command::Sync { json } => cli::run_sync(config, &cancel, json).await,
        Command::Status { all } => cli::run_status(config, &cancel, all).await,
        Command::Config => Ok(()),
    }
}
