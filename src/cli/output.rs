//! CLI output: error mapping from domain errors to the CLI surface.

use crate::error::OrchestrationError;

/// Map domain errors to a string for CLI output.
pub fn map_error(e: &OrchestrationError) -> String {
    match e {
        OrchestrationError::Persistence(inner) => format!("Store error: {}", inner),
        other => other.to_string(),
    }
}
