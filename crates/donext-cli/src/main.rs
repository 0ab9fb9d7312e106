use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "donext", version, about = "donext CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one lifecycle event and print the response envelope
    Event {
        /// Event JSON (read from stdin when neither this nor --file is given)
        #[arg(conflicts_with = "file")]
        json: Option<String>,
        /// Read the event JSON from a file
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Load work items into the local store
    Seed {
        /// JSON file: {"user_id": "...", "candidates": [...]}
        file: PathBuf,
    },
}

/// Logs go to stderr so stdout stays pure JSON. Filter with DONEXT_LOG.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("DONEXT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Event { json, file } => commands::event::run(json, file).await,
        Commands::Config { action } => commands::config::run(action),
        Commands::Seed { file } => commands::seed::run(&file),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
