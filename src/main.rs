// src/main.rs — tipstream entry point

use clap::Parser;

use tipstream::cli::{self, Cli, Commands};
use tipstream::infra::config::Config;
use tipstream::infra::logger;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Load config (falls back to defaults if no config.toml)
    let config = if let Some(ref path) = cli.config {
        Config::load_from(std::path::Path::new(path))?
    } else {
        Config::load()?
    };

    // Initialize logging (respects RUST_LOG)
    logger::init_logging(&cli.log_level, config.logging.file.as_deref());

    match &cli.command {
        Commands::Send { streams, all } => cli::send::run_send(&config, streams, *all).await,
        Commands::Preview { stream } => cli::preview::run_preview(&config, stream).await,
        Commands::Status => cli::status::show_status(&config).await,
        Commands::History { stream, limit } => {
            cli::history::show_history(&config, stream, *limit).await
        }
    }
}
