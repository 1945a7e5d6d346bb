//! Two-phase staging: candidate selection, then generator-declared fields.
//!
//! A batch that needs user input is parked in the session's [`StagingStore`]
//! under its own [`BatchId`] and resumed from there; nothing is keyed by the
//! issue flag, so concurrent staging round trips never alias.

use crate::audit::BatchId;
use crate::error::OrchestrationError;
use crate::generator::GeneratorInfo;
use crate::hazard::HazardRecord;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;
use tracing::debug;

/// One input field a generator wants filled in before it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingField {
    pub field_name: String,
    #[serde(default)]
    pub label: Option<String>,
    pub field_type: String,
    #[serde(default)]
    pub choices: Vec<Value>,
    #[serde(default)]
    pub values: Option<Value>,
}

/// Which kind of user input the batch is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagingPhase {
    CandidateSelection,
    Fields,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorStaging {
    pub generator_name: String,
    pub candidates: Vec<HazardRecord>,
    pub fields: Vec<StagingField>,
}

/// Handed back to the caller when a batch is diverted for user input.
#[derive(Debug, Clone, PartialEq)]
pub struct StagingRequest {
    pub batch_id: BatchId,
    pub issue: bool,
    pub phase: StagingPhase,
    pub generators: Vec<GeneratorStaging>,
}

/// Parse a generator's raw dialog declaration.
///
/// Accepts `null`, an empty object, a field array, or `{"fields": [...]}`.
pub fn parse_dialog_info(generator: &str, raw: Value) -> Result<Vec<StagingField>, OrchestrationError> {
    let spec_error = |message: String| OrchestrationError::StagingSpec {
        generator: generator.to_string(),
        message,
    };

    let fields = match raw {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("fields") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) => return Ok(Vec::new()),
            Some(other) => {
                return Err(spec_error(format!("'fields' must be an array, got {}", other)))
            }
            None if map.is_empty() => return Ok(Vec::new()),
            None => return Err(spec_error("object without a 'fields' array".to_string())),
        },
        other => return Err(spec_error(format!("unexpected dialog declaration {}", other))),
    };

    fields
        .into_iter()
        .map(|item| {
            let field: StagingField = serde_json::from_value(item)
                .map_err(|e| spec_error(format!("invalid field: {}", e)))?;
            if field.field_name.trim().is_empty() {
                return Err(spec_error("field without a name".to_string()));
            }
            Ok(field)
        })
        .collect()
}

/// A diverted batch waiting for user input.
#[derive(Debug, Clone)]
pub struct PendingBatch {
    pub batch_id: BatchId,
    pub issue: bool,
    pub phase: StagingPhase,
    pub infos: Vec<GeneratorInfo>,
    pub staged_at: Instant,
}

/// Session-scoped store of diverted batches.
#[derive(Default)]
pub struct StagingStore {
    pending: Mutex<HashMap<BatchId, PendingBatch>>,
}

impl StagingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stash(&self, batch: PendingBatch) {
        debug!(batch_id = %batch.batch_id, phase = ?batch.phase, "Staging batch");
        self.pending.lock().insert(batch.batch_id.clone(), batch);
    }

    /// Remove and return a pending batch, checking it is in the expected phase.
    pub fn take(&self, batch_id: &BatchId, phase: StagingPhase) -> Result<PendingBatch, OrchestrationError> {
        let mut pending = self.pending.lock();
        match pending.get(batch_id) {
            Some(batch) if batch.phase == phase => {}
            _ => return Err(OrchestrationError::UnknownBatch(batch_id.to_string())),
        }
        pending
            .remove(batch_id)
            .ok_or_else(|| OrchestrationError::UnknownBatch(batch_id.to_string()))
    }

    pub fn discard(&self, batch_id: &BatchId) -> bool {
        self.pending.lock().remove(batch_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
