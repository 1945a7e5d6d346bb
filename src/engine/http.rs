//! HTTP client for a remote generation engine service.

use super::GenerationEngine;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::generator::{GeneratedProduct, GeneratedProductList, StagingValues};
use crate::payload::EventPayload;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

const ENGINE_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct GenerateRequest<'a> {
    payload: &'a EventPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    staging: Option<&'a StagingValues>,
    formats: &'a [String],
}

#[derive(Serialize)]
struct UpdateRequest<'a> {
    payload: &'a EventPayload,
    existing: &'a [GeneratedProduct],
    formats: &'a [String],
}

#[derive(Serialize)]
struct GenerateFromRequest<'a> {
    existing: &'a [GeneratedProduct],
    correction_key: &'a str,
    formats: &'a [String],
}

#[derive(Serialize)]
struct SiteRequest<'a> {
    site_id: &'a str,
}

#[derive(Deserialize)]
struct ScriptFileResponse {
    path: Option<PathBuf>,
}

fn map_http_error(error: reqwest::Error) -> EngineError {
    if error.is_timeout() {
        EngineError::Request(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        EngineError::Request(format!("Connection error: {}", error))
    } else {
        EngineError::Request(format!("HTTP error: {}", error))
    }
}

/// Generation engine reached over HTTP+JSON.
pub struct HttpGenerationEngine {
    client: Client,
    base_url: String,
    shut_down: AtomicBool,
}

impl HttpGenerationEngine {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let client = Client::builder()
            .connect_timeout(ENGINE_HTTP_CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::Request(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            shut_down: AtomicBool::new(false),
        })
    }

    fn url(&self, generator: &str, action: &str) -> String {
        format!("{}/generators/{}/{}", self.base_url, generator, action)
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.shut_down.load(Ordering::SeqCst) {
            Err(EngineError::ShutDown)
        } else {
            Ok(())
        }
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        generator: &str,
        url: String,
        body: &B,
    ) -> Result<T, EngineError> {
        self.ensure_open()?;
        debug!(url = %url, generator = %generator, "Calling generation engine");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(map_http_error)?;
        decode(generator, response).await
    }
}

async fn decode<T: DeserializeOwned>(generator: &str, response: Response) -> Result<T, EngineError> {
    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(EngineError::Rejected {
            generator: generator.to_string(),
            message: format!("status {}: {}", status, error_text),
        });
    }
    response
        .json()
        .await
        .map_err(|e| EngineError::MalformedResponse(format!("Failed to parse response: {}", e)))
}

#[async_trait]
impl GenerationEngine for HttpGenerationEngine {
    async fn generate(
        &self,
        generator: &str,
        payload: &EventPayload,
        staging: Option<&StagingValues>,
        formats: &[String],
    ) -> Result<GeneratedProductList, EngineError> {
        let request = GenerateRequest {
            payload,
            staging,
            formats,
        };
        self.post(generator, self.url(generator, "generate"), &request)
            .await
    }

    async fn update(
        &self,
        generator: &str,
        payload: &EventPayload,
        existing: &[GeneratedProduct],
        formats: &[String],
    ) -> Result<GeneratedProductList, EngineError> {
        let request = UpdateRequest {
            payload,
            existing,
            formats,
        };
        self.post(generator, self.url(generator, "update"), &request)
            .await
    }

    async fn generate_from(
        &self,
        generator: &str,
        existing: &[GeneratedProduct],
        correction_key: &str,
        formats: &[String],
    ) -> Result<GeneratedProductList, EngineError> {
        let request = GenerateFromRequest {
            existing,
            correction_key,
            formats,
        };
        self.post(generator, self.url(generator, "generate-from"), &request)
            .await
    }

    async fn dialog_info(
        &self,
        generator: &str,
        payload: &EventPayload,
    ) -> Result<Value, EngineError> {
        self.post(generator, self.url(generator, "dialog-info"), payload)
            .await
    }

    async fn script_file(&self, generator: &str) -> Result<Option<PathBuf>, EngineError> {
        self.ensure_open()?;
        let response = self
            .client
            .get(self.url(generator, "script"))
            .send()
            .await
            .map_err(map_http_error)?;
        let body: ScriptFileResponse = decode(generator, response).await?;
        Ok(body.path)
    }

    async fn set_site(&self, site_id: &str) -> Result<(), EngineError> {
        self.ensure_open()?;
        let url = format!("{}/site", self.base_url);
        let response = self
            .client
            .put(&url)
            .json(&SiteRequest { site_id })
            .send()
            .await
            .map_err(map_http_error)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(EngineError::Request(format!(
                "Site update failed with status {}",
                response.status()
            )))
        }
    }

    async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }
}
