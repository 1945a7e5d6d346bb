//! Outbound channels for finished products.

use crate::error::OrchestrationError;
use crate::generator::GeneratedProduct;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

const OUTBOUND_TARGET: &str = "hazprod::outbound";

/// A product on its way out, with the context a receiver needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundProduct {
    pub generator_name: String,
    pub site_id: String,
    pub product: GeneratedProduct,
}

#[async_trait]
pub trait ProductSender: Send + Sync {
    async fn send(&self, outbound: &OutboundProduct) -> Result<(), OrchestrationError>;
}

/// Logs each product and remembers the PILs it saw.
#[derive(Default)]
pub struct LoggingSender {
    sent: Mutex<Vec<String>>,
}

impl LoggingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl ProductSender for LoggingSender {
    async fn send(&self, outbound: &OutboundProduct) -> Result<(), OrchestrationError> {
        info!(
            target: OUTBOUND_TARGET,
            pil = %outbound.product.pil,
            generator = %outbound.generator_name,
            site = %outbound.site_id,
            events = ?outbound.product.event_ids,
            "Product sent"
        );
        self.sent.lock().push(outbound.product.pil.clone());
        Ok(())
    }
}

/// Spools each product as a JSON file into an outbound directory.
pub struct SpoolSender {
    dir: PathBuf,
    seq: AtomicU64,
}

impl SpoolSender {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, OrchestrationError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| OrchestrationError::Transmission {
            pil: String::new(),
            message: format!("cannot create outbound directory {}: {}", dir.display(), e),
        })?;
        Ok(Self {
            dir,
            seq: AtomicU64::new(1),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(&self, outbound: &OutboundProduct) -> String {
        let issue_ms = outbound
            .product
            .issue_time
            .map(|t| t.timestamp_millis())
            .unwrap_or_default();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{issue_ms}-{seq:06}-{}.json", outbound.product.pil)
    }
}

#[async_trait]
impl ProductSender for SpoolSender {
    async fn send(&self, outbound: &OutboundProduct) -> Result<(), OrchestrationError> {
        let transmission = |message: String| OrchestrationError::Transmission {
            pil: outbound.product.pil.clone(),
            message,
        };
        let path = self.dir.join(self.file_name(outbound));
        let body = serde_json::to_vec_pretty(outbound).map_err(|e| transmission(e.to_string()))?;
        // write then rename so readers never see a partial file
        let partial = path.with_extension("json.part");
        fs::write(&partial, body).map_err(|e| transmission(e.to_string()))?;
        fs::rename(&partial, &path).map_err(|e| transmission(e.to_string()))?;
        info!(target: OUTBOUND_TARGET, pil = %outbound.product.pil, path = %path.display(), "Product spooled");
        Ok(())
    }
}
