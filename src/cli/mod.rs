// src/cli/mod.rs — CLI definition (clap derive)

pub mod history;
pub mod preview;
pub mod send;
pub mod status;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tipstream",
    about = "Generate, deduplicate and deliver daily tips",
    version
)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a unique tip and post it to the stream's channel
    Send {
        /// Streams to send (e.g. python, js, trader, blockchain)
        streams: Vec<String>,
        /// Send one tip to every configured stream
        #[arg(long, conflicts_with = "streams")]
        all: bool,
    },
    /// Generate and check a tip without delivering or recording it
    Preview {
        /// Stream to preview
        stream: String,
    },
    /// Show configured streams, index sizes and tip counts
    Status,
    /// Show recently accepted tips for a stream
    History {
        stream: String,
        /// Number of tips to show
        #[arg(short = 'n', long, default_value = "10")]
        limit: u32,
    },
}
