//! Stash CLI - Main entry point

use chrono::Utc;
use clap::{Parser, Subcommand};
use stash_rpc::{commands, AppConfig, AppContext, Seed};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stash")]
#[command(about = "Stash - envelope ledger with admission control", long_about = None)]
struct Cli {
    /// Config file (overrides STASH_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Users and envelopes to load before running the command
    #[arg(short, long)]
    seed: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay inbound events (JSONL) through admission and the ledger
    Submit {
        events: PathBuf,
        /// Run the conservation audit afterwards
        #[arg(long)]
        audit: bool,
    },

    /// Print a user's envelope snapshot
    Snapshot {
        user: String,
        /// Events to replay first
        #[arg(long)]
        events: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let mut config = AppConfig::from_env()?;
    if let Some(path) = &cli.config {
        let data_dir = config.data_dir.clone();
        config = AppConfig::from_file(path)?;
        if std::env::var_os(stash_rpc::config::DATA_DIR_ENV).is_some() {
            config.data_dir = data_dir;
        }
    }

    let ctx = AppContext::open(config)?;
    if let Some(path) = &cli.seed {
        ctx.load_seed(&Seed::from_file(path)?).await?;
    }
    ctx.sweep_limitations(Utc::now()).await?;

    match cli.command {
        Commands::Submit { events, audit } => {
            let events = commands::read_events(&events)?;
            commands::submit(&ctx, events.clone()).await?;
            if audit && !commands::audit(&ctx, &events).await? {
                anyhow::bail!("conservation audit failed");
            }
        }

        Commands::Snapshot { user, events } => {
            if let Some(path) = events {
                commands::submit(&ctx, commands::read_events(&path)?).await?;
            }
            commands::snapshot(&ctx, &user).await?;
        }

        Commands::Config => {
            commands::show_config(&ctx)?;
        }
    }

    Ok(())
}
