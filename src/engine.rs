//! Generation Engine Abstraction
//!
//! The engine executes a named product generator against an event payload.
//! Each call is an independent future; the orchestrator owns joining them.

use crate::error::EngineError;
use crate::generator::{GeneratedProduct, GeneratedProductList, StagingValues};
use crate::payload::EventPayload;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;

pub mod http;

pub use http::HttpGenerationEngine;

/// Client for the external generation engine.
#[async_trait]
pub trait GenerationEngine: Send + Sync {
    /// Run a generator against an event payload.
    async fn generate(
        &self,
        generator: &str,
        payload: &EventPayload,
        staging: Option<&StagingValues>,
        formats: &[String],
    ) -> Result<GeneratedProductList, EngineError>;

    /// Re-format already generated product data after edits.
    async fn update(
        &self,
        generator: &str,
        payload: &EventPayload,
        existing: &[GeneratedProduct],
        formats: &[String],
    ) -> Result<GeneratedProductList, EngineError>;

    /// Refresh time-sensitive fields of existing products for a correction.
    async fn generate_from(
        &self,
        generator: &str,
        existing: &[GeneratedProduct],
        correction_key: &str,
        formats: &[String],
    ) -> Result<GeneratedProductList, EngineError>;

    /// Raw staging field declarations for a generator; an empty list or
    /// `null` means no staging is needed.
    async fn dialog_info(&self, generator: &str, payload: &EventPayload)
        -> Result<Value, EngineError>;

    async fn script_file(&self, generator: &str) -> Result<Option<PathBuf>, EngineError>;

    /// Propagate the active site.
    async fn set_site(&self, site_id: &str) -> Result<(), EngineError>;

    /// Release engine resources; later calls fail with [`EngineError::ShutDown`].
    async fn shutdown(&self);
}
