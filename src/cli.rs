//! CLI domain: parse, route, output, and presentation only.
//! Inspection of stored products and configuration; no batch orchestration.

mod help;
mod output;
mod parse;
mod presentation;
mod route;

pub use help::command_name;
pub use output::map_error;
pub use parse::{Cli, Commands, ConfigCommands, ProductCommands};
pub use presentation::{
    format_order_text, format_record_json, format_record_list_json, format_record_list_text,
    format_record_text, format_validation_text,
};
pub use route::RunContext;
