//! Dissemination: priority ordering, transmission and record persistence.
//!
//! Live mode transmits each product before recording it, so downstream
//! ingest never sees a record for a product it has not received. Practice
//! and test modes record first, then transmit.

pub mod order;
pub mod sender;

pub use order::order_by_priority;
pub use sender::{LoggingSender, OutboundProduct, ProductSender, SpoolSender};

use crate::config::OperatingMode;
use crate::error::{OrchestrationError, StorageError};
use crate::generator::GeneratedProduct;
use crate::logging::STATUS_TARGET;
use crate::store::{GeneratedProductRecord, ProductRecordStore};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// One product of a batch together with the generator that made it.
#[derive(Debug, Clone, PartialEq)]
pub struct DisseminationItem {
    pub generator_name: String,
    pub correction_key: Option<String>,
    pub product: GeneratedProduct,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisseminationReport {
    /// Fully sent and recorded, in dissemination order.
    pub disseminated: Vec<DisseminationItem>,
    pub record_ids: Vec<String>,
    /// Products halted by a send or storage failure: (PIL, error).
    pub failures: Vec<(String, String)>,
    pub warnings: Vec<String>,
}

impl DisseminationReport {
    pub fn pils(&self) -> Vec<String> {
        self.disseminated.iter().map(|i| i.product.pil.clone()).collect()
    }
}

pub struct Disseminator {
    priority: Vec<String>,
    mode: OperatingMode,
    sender: Arc<dyn ProductSender>,
    store: Arc<dyn ProductRecordStore>,
}

impl Disseminator {
    pub fn new(
        priority: Vec<String>,
        mode: OperatingMode,
        sender: Arc<dyn ProductSender>,
        store: Arc<dyn ProductRecordStore>,
    ) -> Self {
        Self {
            priority,
            mode,
            sender,
            store,
        }
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub fn priority(&self) -> &[String] {
        &self.priority
    }

    /// Order items by the configured priority table, warning about PILs it
    /// does not list.
    pub fn order(&self, items: Vec<DisseminationItem>) -> (Vec<DisseminationItem>, Vec<String>) {
        let (ordered, missing) = order_by_priority(items, &self.priority, |i| i.product.pil.as_str());
        let warnings = missing
            .into_iter()
            .map(|pil| {
                warn!(target: STATUS_TARGET, pil = %pil, "Product missing from dissemination priority configuration");
                format!("{pil} is missing from the dissemination priority configuration")
            })
            .collect();
        (ordered, warnings)
    }

    /// Send and record a batch's products in priority order.
    ///
    /// Every product must carry an issue time; if any does not, nothing is
    /// sent. Otherwise a failure halts only the product it occurred on.
    pub async fn disseminate(
        &self,
        site_id: &str,
        items: Vec<DisseminationItem>,
    ) -> Result<DisseminationReport, OrchestrationError> {
        if let Some(missing) = items.iter().find(|i| i.product.issue_time.is_none()) {
            error!(
                target: STATUS_TARGET,
                generator = %missing.generator_name,
                pil = %missing.product.pil,
                "Product has no issue time; dissemination aborted"
            );
            return Err(StorageError::MissingIssueTime {
                generator: missing.generator_name.clone(),
                product_id: missing.product.pil.clone(),
            }
            .into());
        }

        let (ordered, warnings) = self.order(items);
        let mut report = DisseminationReport {
            warnings,
            ..DisseminationReport::default()
        };

        for item in ordered {
            let pil = item.product.pil.clone();
            match self.disseminate_one(site_id, &item).await {
                Ok(record_id) => {
                    debug!(pil = %pil, record_id = %record_id, "Product disseminated");
                    report.record_ids.push(record_id);
                    report.disseminated.push(item);
                }
                Err(err) => {
                    error!(target: STATUS_TARGET, pil = %pil, error = %err, "Product dissemination halted");
                    report.failures.push((pil, err.to_string()));
                }
            }
        }
        Ok(report)
    }

    async fn disseminate_one(&self, site_id: &str, item: &DisseminationItem) -> Result<String, OrchestrationError> {
        let record = GeneratedProductRecord::from_product(
            &item.generator_name,
            self.mode,
            site_id,
            &item.product,
            item.correction_key.as_deref(),
        )?;
        let outbound = OutboundProduct {
            generator_name: item.generator_name.clone(),
            site_id: site_id.to_string(),
            product: item.product.clone(),
        };

        if self.mode.is_live() {
            self.sender.send(&outbound).await?;
            self.store.put(&record)?;
        } else {
            self.store.put(&record)?;
            self.sender.send(&outbound).await?;
        }
        Ok(record.record_id)
    }
}
