//! hazprod: Hazard Product Generation and Dissemination
//!
//! Orchestrates product generators over selected hazard events: applicability
//! scanning, two-phase staging, concurrent generation with an exactly-once
//! batch join, priority-ordered dissemination, and durable product records.

pub mod affinity;
pub mod applicability;
pub mod audit;
pub mod cli;
pub mod config;
pub mod conflict;
pub mod dissemination;
pub mod engine;
pub mod error;
pub mod factory;
pub mod generator;
pub mod hazard;
pub mod logging;
pub mod notify;
pub mod orchestrator;
pub mod payload;
pub mod session;
pub mod staging;
pub mod store;

pub use error::{EngineError, OrchestrationError, StorageError};
pub use factory::ProductSession;
pub use orchestrator::{BatchHandle, BatchOutcome, Orchestrator};
