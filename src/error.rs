//! Error types for hazard product generation and dissemination.

use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Product {product_id} from generator {generator} has no issue time")]
    MissingIssueTime { generator: String, product_id: String },

    #[error("Invalid record data: {0}")]
    InvalidData(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors reported by the generation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine request failed: {0}")]
    Request(String),

    #[error("Generator {generator} rejected the request: {message}")]
    Rejected { generator: String, message: String },

    #[error("Malformed engine response: {0}")]
    MalformedResponse(String),

    #[error("Generation engine has been shut down")]
    ShutDown,
}

/// Errors raised while orchestrating a product generation batch.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("No applicable hazard events for generator(s): {}", .generators.join(", "))]
    NoApplicableEvents { generators: Vec<String> },

    #[error("Invalid selection ({}): {message}", .event_ids.join(", "))]
    InvalidSelection {
        event_ids: Vec<String>,
        message: String,
    },

    #[error("Generator {generator} returned malformed staging fields: {message}")]
    StagingSpec { generator: String, message: String },

    #[error("Generator {generator} failed: {message}")]
    GeneratorJob { generator: String, message: String },

    #[error("Persistence failed: {0}")]
    Persistence(#[from] StorageError),

    #[error("Failed to send product {pil}: {message}")]
    Transmission { pil: String, message: String },

    #[error("Conflict detection failed: {0}")]
    ConflictDetection(String),

    #[error("Issuance was not confirmed")]
    ConfirmationDenied,

    #[error("Unknown generator: {0}")]
    UnknownGenerator(String),

    #[error("Unknown or expired batch: {0}")]
    UnknownBatch(String),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Session error: {0}")]
    Session(#[from] crate::session::SessionError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Orchestrator has been shut down")]
    Shutdown,
}

impl From<config::ConfigError> for OrchestrationError {
    fn from(err: config::ConfigError) -> Self {
        OrchestrationError::ConfigError(err.to_string())
    }
}
