//! Persistence layer for generated product records

use crate::config::OperatingMode;
use crate::error::StorageError;
use crate::store::{GeneratedProductRecord, ProductRecordStore};
use chrono::{DateTime, Utc};
use sled::{Db, Tree};
use std::io;
use std::path::Path;

const TREE_PRODUCTS: &str = "generated_products";
const TREE_BY_ID: &str = "generated_products_by_id";
const ISSUE_KEY_PAD: usize = 20;

/// Sled-based implementation of ProductRecordStore
#[derive(Clone)]
pub struct SledProductStore {
    db: Db,
    products: Tree,
    by_id: Tree,
}

impl SledProductStore {
    /// Open (or create) the store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| {
            StorageError::IoError(io::Error::new(
                io::ErrorKind::Other,
                format!("Failed to open sled database: {}", e),
            ))
        })?;
        Self::new(db)
    }

    pub fn new(db: Db) -> Result<Self, StorageError> {
        let products = db.open_tree(TREE_PRODUCTS).map_err(to_storage_io)?;
        let by_id = db.open_tree(TREE_BY_ID).map_err(to_storage_io)?;
        Ok(Self { db, products, by_id })
    }

    /// Every record in key order (generator, mode, issue time).
    pub fn list_all(&self) -> Result<Vec<GeneratedProductRecord>, StorageError> {
        let mut out = Vec::new();
        for result in self.products.iter() {
            let (_, value) = result.map_err(to_storage_io)?;
            out.push(serde_json::from_slice(&value).map_err(to_storage_data)?);
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush().map_err(to_storage_io)?;
        Ok(())
    }
}

impl ProductRecordStore for SledProductStore {
    fn put(&self, record: &GeneratedProductRecord) -> Result<(), StorageError> {
        let key = primary_key(
            &record.generator_name,
            record.mode,
            issue_millis(record.issue_time),
            &record.record_id,
        );
        let value = serde_json::to_vec(record).map_err(to_storage_data)?;
        self.products
            .insert(key.as_bytes(), value)
            .map_err(to_storage_io)?;
        self.by_id
            .insert(record.record_id.as_bytes(), key.as_bytes())
            .map_err(to_storage_io)?;
        Ok(())
    }

    fn get(&self, record_id: &str) -> Result<Option<GeneratedProductRecord>, StorageError> {
        let Some(key) = self.by_id.get(record_id.as_bytes()).map_err(to_storage_io)? else {
            return Ok(None);
        };
        let Some(raw) = self.products.get(key).map_err(to_storage_io)? else {
            return Ok(None);
        };
        let parsed = serde_json::from_slice(&raw).map_err(to_storage_data)?;
        Ok(Some(parsed))
    }

    fn query(
        &self,
        generator_name: &str,
        mode: OperatingMode,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<GeneratedProductRecord>, StorageError> {
        let start = range_prefix(generator_name, mode, from.map(issue_millis).unwrap_or(0));
        let mut end = range_prefix(generator_name, mode, to.map(issue_millis).unwrap_or(u64::MAX));
        // '\u{1}' sorts after the '\0' that precedes every record id
        end.push('\u{1}');

        let mut out = Vec::new();
        for result in self.products.range(start.into_bytes()..end.into_bytes()) {
            let (_, value) = result.map_err(to_storage_io)?;
            out.push(serde_json::from_slice(&value).map_err(to_storage_data)?);
        }
        Ok(out)
    }
}

fn issue_millis(time: DateTime<Utc>) -> u64 {
    u64::try_from(time.timestamp_millis()).unwrap_or(0)
}

fn range_prefix(generator_name: &str, mode: OperatingMode, issue_ms: u64) -> String {
    format!(
        "{generator_name}\0{}\0{issue_ms:0ISSUE_KEY_PAD$}",
        mode.as_str()
    )
}

fn primary_key(generator_name: &str, mode: OperatingMode, issue_ms: u64, record_id: &str) -> String {
    format!("{}\0{record_id}", range_prefix(generator_name, mode, issue_ms))
}

fn to_storage_io(err: sled::Error) -> StorageError {
    StorageError::IoError(io::Error::new(io::ErrorKind::Other, err.to_string()))
}

fn to_storage_data(err: serde_json::Error) -> StorageError {
    StorageError::IoError(io::Error::new(io::ErrorKind::InvalidData, err.to_string()))
}
