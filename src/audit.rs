//! Batch completion audit.
//!
//! Every dispatched generator reports exactly one outcome. The live-batch
//! table and each batch's [`BatchAuditor`] share one mutex, so of all the
//! outcome reports for a batch exactly one observes the pending set going
//! empty and takes the batch out of the table.

use crate::generator::{GeneratedProductList, GeneratorInfo, GeneratorInfoId};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Semaphore};

static BATCH_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generation-tracking identifier for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchId(String);

impl BatchId {
    pub fn new() -> Self {
        let ts = Utc::now().timestamp_millis();
        let seq = BATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
        BatchId(format!("batch-{ts}-{}-{seq}", std::process::id()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tracks the generators of one batch that have not reported yet.
#[derive(Debug)]
pub struct BatchAuditor {
    batch_id: BatchId,
    issue: bool,
    pending: HashSet<GeneratorInfoId>,
    results: Vec<GeneratedProductList>,
}

impl BatchAuditor {
    pub fn new(batch_id: BatchId, issue: bool, infos: impl IntoIterator<Item = GeneratorInfoId>) -> Self {
        Self {
            batch_id,
            issue,
            pending: infos.into_iter().collect(),
            results: Vec::new(),
        }
    }

    /// Returns true iff this call emptied the pending set. Reports for
    /// unknown or already-reported generators return false.
    pub fn record_success(&mut self, result: GeneratedProductList, info: GeneratorInfoId) -> bool {
        if !self.pending.remove(&info) {
            return false;
        }
        self.results.push(result);
        self.pending.is_empty()
    }

    /// Same contract as [`record_success`](Self::record_success), without a result.
    pub fn record_failure(&mut self, info: GeneratorInfoId) -> bool {
        if !self.pending.remove(&info) {
            return false;
        }
        self.pending.is_empty()
    }

    pub fn is_pending(&self, info: GeneratorInfoId) -> bool {
        self.pending.contains(&info)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn batch_id(&self) -> &BatchId {
        &self.batch_id
    }

    pub fn issue(&self) -> bool {
        self.issue
    }

    pub fn results(&self) -> &[GeneratedProductList] {
        &self.results
    }
}

/// Counting join: resolves once `expected` completion signals were observed.
pub struct CompletionLatch {
    expected: u32,
    signals: Semaphore,
}

impl CompletionLatch {
    pub fn new(expected: usize) -> Self {
        Self {
            expected: u32::try_from(expected).unwrap_or(u32::MAX),
            signals: Semaphore::new(0),
        }
    }

    pub fn signal(&self) {
        self.signals.add_permits(1);
    }

    /// Waits without a timeout.
    pub async fn wait(&self) {
        if let Ok(permits) = self.signals.acquire_many(self.expected).await {
            permits.forget();
        }
    }
}

/// Summary handed to the caller and published when a batch completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: String,
    pub issue: bool,
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
    /// PILs in dissemination order
    pub disseminated: Vec<String>,
    pub issued_events: Vec<String>,
    pub ended_events: Vec<String>,
    pub warnings: Vec<String>,
}

/// A dispatched batch awaiting its generators.
pub struct LiveBatch {
    pub auditor: BatchAuditor,
    pub infos: Vec<GeneratorInfo>,
    pub latch: Arc<CompletionLatch>,
    pub completion: Option<oneshot::Sender<BatchReport>>,
    /// Advisory findings gathered before dispatch.
    pub warnings: Vec<String>,
}

impl LiveBatch {
    pub fn new(batch_id: BatchId, issue: bool, infos: Vec<GeneratorInfo>) -> Self {
        let auditor = BatchAuditor::new(batch_id, issue, infos.iter().map(|i| i.id));
        let latch = Arc::new(CompletionLatch::new(infos.len()));
        Self {
            auditor,
            infos,
            latch,
            completion: None,
            warnings: Vec::new(),
        }
    }
}

/// Result of feeding one generator outcome into the table.
pub enum RecordOutcome {
    /// Other generators of the batch are still outstanding.
    Pending { generator_name: String },
    /// Last outstanding generator; the batch has left the table.
    Completed {
        generator_name: String,
        batch: Box<LiveBatch>,
    },
    /// Unknown batch or a repeated report.
    Ignored,
}

/// Table of in-flight batches.
#[derive(Default)]
pub struct BatchTable {
    batches: Mutex<HashMap<BatchId, LiveBatch>>,
}

impl BatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, batch: LiveBatch) {
        let batch_id = batch.auditor.batch_id().clone();
        self.batches.lock().insert(batch_id, batch);
    }

    pub fn contains(&self, batch_id: &BatchId) -> bool {
        self.batches.lock().contains_key(batch_id)
    }

    pub fn len(&self) -> usize {
        self.batches.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn latch(&self, batch_id: &BatchId) -> Option<Arc<CompletionLatch>> {
        self.batches.lock().get(batch_id).map(|b| Arc::clone(&b.latch))
    }

    /// Record one generator's outcome on its GeneratorInfo and in the auditor.
    pub fn record(
        &self,
        batch_id: &BatchId,
        info_id: GeneratorInfoId,
        outcome: Result<GeneratedProductList, String>,
    ) -> RecordOutcome {
        let mut batches = self.batches.lock();
        let Some(batch) = batches.get_mut(batch_id) else {
            return RecordOutcome::Ignored;
        };
        if !batch.auditor.is_pending(info_id) {
            return RecordOutcome::Ignored;
        }
        let Some(info) = batch.infos.iter_mut().find(|i| i.id == info_id) else {
            return RecordOutcome::Ignored;
        };
        let generator_name = info.generator_name.clone();

        let terminal = match outcome {
            Ok(list) => {
                info.generated = Some(list.clone());
                batch.auditor.record_success(list, info_id)
            }
            Err(message) => {
                info.error = Some(message);
                batch.auditor.record_failure(info_id)
            }
        };

        if !terminal {
            return RecordOutcome::Pending { generator_name };
        }
        match batches.remove(batch_id) {
            Some(batch) => RecordOutcome::Completed {
                generator_name,
                batch: Box::new(batch),
            },
            None => RecordOutcome::Ignored,
        }
    }
}
