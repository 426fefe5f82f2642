//! Main entry point for the Parley backend CLI.

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use shared::config::server::Config;
use std::error::Error;
use std::path::PathBuf;

/// Main CLI structure for the Parley server.
#[derive(Parser)]
#[command(name = "Parley CLI")]
#[command(about = "Backend server for the Parley chat platform", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands for the Parley CLI.
#[derive(Subcommand)]
pub enum Commands {
    /// Start the backend server
    Serve {
        /// The port number to bind the server to (e.g., 5001).
        #[arg(long, short)]
        port: Option<u16>,

        /// Path to the configuration file (YAML or JSON). Defaults are used
        /// when not provided.
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, config } => {
            let resolved = Config::load_config(config, port)?;
            server::server::run(resolved).await
        }
    }
}
