//! CLI parse: clap types for hazprod. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// hazprod CLI - inspect disseminated hazard products and site configuration
#[derive(Parser)]
#[command(name = "hazprod")]
#[command(about = "Hazard product store and dissemination tooling")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect persisted products
    Products {
        #[command(subcommand)]
        command: ProductCommands,
    },
    /// Show the dissemination order of the given product codes
    Order {
        /// Product codes (PILs)
        #[arg(required = true)]
        pils: Vec<String>,
    },
    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ProductCommands {
    /// List stored products, oldest first
    List {
        /// Only products from this generator
        #[arg(long)]
        generator: Option<String>,
        /// Operating mode (operational, practice, test); defaults to the configured mode
        #[arg(long)]
        mode: Option<String>,
        /// Earliest issue time (RFC 3339)
        #[arg(long)]
        since: Option<String>,
        /// Latest issue time (RFC 3339)
        #[arg(long)]
        until: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show one stored product
    Show {
        /// Record id
        record_id: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate the loaded configuration
    Validate,
    /// Print the effective configuration as TOML
    Show,
}
