//! Generated Product Store
//!
//! Durable record of every product disseminated, addressable by record id
//! and by generator + mode + issue-time range for correction and viewing.

pub mod persistence;

pub use persistence::SledProductStore;

use crate::config::OperatingMode;
use crate::error::StorageError;
use crate::generator::{EditableEntry, GeneratedProduct};
use blake3::Hasher;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One persisted product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedProductRecord {
    pub record_id: String,
    pub mode: OperatingMode,
    pub generator_name: String,
    #[serde(rename = "eventIDs")]
    pub event_ids: Vec<String>,
    #[serde(rename = "site")]
    pub site_id: String,
    pub issue_time: DateTime<Utc>,
    pub pil: String,
    pub data: Map<String, Value>,
    pub editable_entries: Vec<EditableEntry>,
    #[serde(default)]
    pub correction_key: Option<String>,
}

impl GeneratedProductRecord {
    /// Build the record for a disseminated product. A product without an
    /// issue time cannot be recorded.
    pub fn from_product(
        generator_name: &str,
        mode: OperatingMode,
        site_id: &str,
        product: &GeneratedProduct,
        correction_key: Option<&str>,
    ) -> Result<Self, StorageError> {
        let issue_time = product.issue_time.ok_or_else(|| StorageError::MissingIssueTime {
            generator: generator_name.to_string(),
            product_id: product.pil.clone(),
        })?;
        let record_id = compute_record_id(generator_name, mode, site_id, issue_time, product)?;
        Ok(Self {
            record_id,
            mode,
            generator_name: generator_name.to_string(),
            event_ids: product.event_ids.clone(),
            site_id: site_id.to_string(),
            issue_time,
            pil: product.pil.clone(),
            data: product.data.clone(),
            editable_entries: product.editable_entries.clone(),
            correction_key: correction_key.map(str::to_string),
        })
    }

    pub fn to_product(&self) -> GeneratedProduct {
        GeneratedProduct {
            pil: self.pil.clone(),
            issue_time: Some(self.issue_time),
            event_ids: self.event_ids.clone(),
            data: self.data.clone(),
            editable_entries: self.editable_entries.clone(),
        }
    }
}

/// Content digest over everything that identifies a product issuance.
fn compute_record_id(
    generator_name: &str,
    mode: OperatingMode,
    site_id: &str,
    issue_time: DateTime<Utc>,
    product: &GeneratedProduct,
) -> Result<String, StorageError> {
    let data = serde_json::to_vec(&product.data)
        .map_err(|e| StorageError::InvalidData(format!("Failed to serialize product data: {}", e)))?;
    let mut hasher = Hasher::new();
    for part in [generator_name, mode.as_str(), site_id, product.pil.as_str()] {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hasher.update(&issue_time.timestamp_millis().to_le_bytes());
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize().as_bytes()))
}

/// Generated product store interface
pub trait ProductRecordStore: Send + Sync {
    fn put(&self, record: &GeneratedProductRecord) -> Result<(), StorageError>;

    fn get(&self, record_id: &str) -> Result<Option<GeneratedProductRecord>, StorageError>;

    /// Records for one generator and mode, oldest first. Open bounds are
    /// unbounded; both ends are inclusive.
    fn query(
        &self,
        generator_name: &str,
        mode: OperatingMode,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<GeneratedProductRecord>, StorageError>;
}
