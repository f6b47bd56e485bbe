use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "launchpad", version, about = "Startup evaluation and market research agents")]
pub struct Cli {
    /// Root for generated reports, decks and research data.
    #[arg(long, global = true, env = "LAUNCHPAD_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default if no subcommand given).
    Serve {
        #[arg(long, env = "LAUNCHPAD_HOST", default_value = "0.0.0.0")]
        host: String,
        #[arg(long, env = "LAUNCHPAD_PORT", default_value = "8000")]
        port: u16,
    },

    /// Score a startup profile across the nine dimensions.
    Evaluate {
        /// Path to the startup profile JSON.
        profile: PathBuf,
    },

    /// Run market research for a business idea.
    Research {
        idea: String,
        /// The customer problem the idea addresses.
        #[arg(long, default_value = "")]
        problem: String,
    },

    /// Write a recommendation report from a profile and its evaluation.
    Recommend {
        /// Path to the raw startup profile JSON.
        raw_input: PathBuf,
        /// Path to the evaluation output JSON.
        evaluation: PathBuf,
        #[arg(long)]
        request_id: Option<String>,
    },

    /// Generate a pitch deck from a JSON request shaped like `POST /ppt/generate`.
    Deck {
        request: PathBuf,
    },

    /// Print current configuration (redacted secrets).
    Config,
}

impl Commands {
    pub fn default_serve() -> Self {
        Commands::Serve {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}
