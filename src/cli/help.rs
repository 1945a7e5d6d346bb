//! Command-name contract for logging.

use crate::cli::parse::{Commands, ConfigCommands, ProductCommands};

/// Dotted command name (e.g. "products.list", "config.validate").
pub fn command_name(command: &Commands) -> String {
    match command {
        Commands::Products { command } => format!("products.{}", product_command_name(command)),
        Commands::Order { .. } => "order".to_string(),
        Commands::Config { command } => format!("config.{}", config_command_name(command)),
    }
}

pub fn product_command_name(command: &ProductCommands) -> &'static str {
    match command {
        ProductCommands::List { .. } => "list",
        ProductCommands::Show { .. } => "show",
    }
}

pub fn config_command_name(command: &ConfigCommands) -> &'static str {
    match command {
        ConfigCommands::Validate => "validate",
        ConfigCommands::Show => "show",
    }
}
