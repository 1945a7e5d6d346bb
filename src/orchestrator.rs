//! Product generation orchestrator.
//!
//! Turns the session's selected hazards into finished products:
//!
//! 1. validate the selection and scan generators for applicability,
//! 2. divert to staging when candidates or dialog fields need user input,
//! 3. confirm issuance once, then dispatch one future per generator,
//! 4. join the batch through the live-batch table and completion latch,
//! 5. disseminate in priority order and apply issuance on the affinity
//!    executor, then publish a single completion notification.

mod completion;
pub mod confirm;

pub use confirm::{AutoConfirm, CountingConfirmer, IssueConfirmer, TerminalConfirmer};

use crate::affinity::AffinityExecutor;
use crate::applicability::{collect_for, scan, validate_selection};
use crate::audit::{BatchId, BatchReport, BatchTable, LiveBatch};
use crate::config::OperatingMode;
use crate::conflict::{advisory_conflicts, Conflict, ConflictDetector};
use crate::dissemination::{DisseminationItem, DisseminationReport, Disseminator};
use crate::engine::GenerationEngine;
use crate::error::{OrchestrationError, StorageError};
use crate::generator::{
    GeneratedProduct, GeneratedProductList, GeneratorDefinition, GeneratorInfo, GeneratorTable,
    StagingValues,
};
use crate::hazard::HazardRecord;
use crate::logging::STATUS_TARGET;
use crate::notify::{Delivery, Notification, NotificationBus, NotificationKind, SubscriptionId};
use crate::payload::PayloadBuilder;
use crate::session::SessionEventManager;
use crate::staging::{
    parse_dialog_info, GeneratorStaging, PendingBatch, StagingPhase, StagingRequest, StagingStore,
};
use crate::store::ProductRecordStore;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// What a generation request turned into.
#[derive(Debug)]
pub enum BatchOutcome {
    /// The batch is parked until the caller supplies user input.
    StagingRequired(StagingRequest),
    /// Generators are running; the handle resolves with the batch report.
    Dispatched(BatchHandle),
}

impl BatchOutcome {
    pub fn staging(&self) -> Option<&StagingRequest> {
        match self {
            BatchOutcome::StagingRequired(request) => Some(request),
            BatchOutcome::Dispatched(_) => None,
        }
    }

    pub fn into_handle(self) -> Option<BatchHandle> {
        match self {
            BatchOutcome::Dispatched(handle) => Some(handle),
            BatchOutcome::StagingRequired(_) => None,
        }
    }
}

#[derive(Debug)]
pub struct BatchHandle {
    pub batch_id: BatchId,
    pub generators: Vec<String>,
    receiver: oneshot::Receiver<BatchReport>,
}

impl BatchHandle {
    /// Wait for the batch to complete. There is no timeout: a generator that
    /// never reports stalls only this batch.
    pub async fn wait(self) -> Result<BatchReport, OrchestrationError> {
        self.receiver.await.map_err(|_| OrchestrationError::Shutdown)
    }
}

/// Collaborators an orchestrator is assembled from.
pub struct OrchestratorParts {
    pub generators: GeneratorTable,
    pub session: Arc<dyn SessionEventManager>,
    pub engine: Arc<dyn GenerationEngine>,
    pub payloads: PayloadBuilder,
    pub disseminator: Disseminator,
    pub store: Arc<dyn ProductRecordStore>,
    pub bus: Arc<NotificationBus>,
    pub affinity: AffinityExecutor,
    pub conflicts: Arc<dyn ConflictDetector>,
    pub confirmer: Arc<dyn IssueConfirmer>,
}

pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    generators: GeneratorTable,
    session: Arc<dyn SessionEventManager>,
    engine: Arc<dyn GenerationEngine>,
    payloads: RwLock<PayloadBuilder>,
    staging: StagingStore,
    batches: BatchTable,
    bus: Arc<NotificationBus>,
    affinity: AffinityExecutor,
    disseminator: Disseminator,
    store: Arc<dyn ProductRecordStore>,
    conflicts: Arc<dyn ConflictDetector>,
    confirmer: Arc<dyn IssueConfirmer>,
    site_subscription: Mutex<Option<SubscriptionId>>,
    shut_down: AtomicBool,
}

impl Orchestrator {
    pub fn new(parts: OrchestratorParts) -> Self {
        let inner = Arc::new(Inner {
            generators: parts.generators,
            session: parts.session,
            engine: parts.engine,
            payloads: RwLock::new(parts.payloads),
            staging: StagingStore::new(),
            batches: BatchTable::new(),
            bus: parts.bus,
            affinity: parts.affinity,
            disseminator: parts.disseminator,
            store: parts.store,
            conflicts: parts.conflicts,
            confirmer: parts.confirmer,
            site_subscription: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&inner);
        let subscription = inner.bus.subscribe(
            &[NotificationKind::SiteChanged],
            Delivery::Synchronous,
            move |notification| {
                if let (Notification::SiteChanged { site_id }, Some(inner)) = (notification, weak.upgrade()) {
                    inner.change_site(site_id);
                }
            },
        );
        *inner.site_subscription.lock() = Some(subscription);
        Self { inner }
    }

    pub fn site_id(&self) -> String {
        self.inner.payloads.read().site_id().to_string()
    }

    pub fn mode(&self) -> OperatingMode {
        self.inner.payloads.read().mode()
    }

    pub fn generators(&self) -> &GeneratorTable {
        &self.inner.generators
    }

    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.inner.bus
    }

    /// Batches parked for user input.
    pub fn pending_staging(&self) -> usize {
        self.inner.staging.len()
    }

    /// Batches with generators still outstanding.
    pub fn live_batches(&self) -> usize {
        self.inner.batches.len()
    }

    /// Start a batch from the session's current selection.
    pub async fn generate_selected(&self, issue: bool) -> Result<BatchOutcome, OrchestrationError> {
        self.ensure_running()?;
        let site_id = self.site_id();
        let selected = self.inner.session.selected_events();
        validate_selection(&selected, &site_id, issue)?;
        let all_events = self.inner.session.events_for_current_settings();
        let infos = scan(&self.inner.generators, &selected, &all_events, &site_id)?;

        let batch_id = BatchId::new();
        info!(
            batch_id = %batch_id,
            issue,
            generators = infos.len(),
            events = selected.len(),
            "Starting product generation"
        );
        self.inner.begin(batch_id, issue, infos).await
    }

    /// Start a batch for one named generator, over the given events or the
    /// current selection.
    pub async fn generate_for(
        &self,
        generator: &str,
        issue: bool,
        events: Option<Vec<HazardRecord>>,
    ) -> Result<BatchOutcome, OrchestrationError> {
        self.ensure_running()?;
        let definition = self.definition(generator)?;
        let site_id = self.site_id();
        let events = events.unwrap_or_else(|| self.inner.session.selected_events());
        validate_selection(&events, &site_id, issue)?;
        let all_events = self.inner.session.events_for_current_settings();
        let info = collect_for(definition, &events, &all_events, &site_id);
        if info.selected_events.is_empty() {
            return Err(OrchestrationError::NoApplicableEvents {
                generators: vec![generator.to_string()],
            });
        }

        let batch_id = BatchId::new();
        info!(batch_id = %batch_id, issue, generator, "Starting product generation");
        self.inner.begin(batch_id, issue, vec![info]).await
    }

    /// Resume a batch parked for candidate selection. `selections` maps
    /// generator name to the final event ids it should run over, drawn from
    /// its selected events and candidates. Generators left out keep their
    /// current selection; one left with no events aborts the batch.
    pub async fn resume_with_candidates(
        &self,
        batch_id: &BatchId,
        selections: &HashMap<String, Vec<String>>,
    ) -> Result<BatchOutcome, OrchestrationError> {
        self.ensure_running()?;
        let mut pending = self
            .inner
            .staging
            .take(batch_id, StagingPhase::CandidateSelection)?;
        for info in &mut pending.infos {
            if let Some(chosen) = selections.get(&info.generator_name) {
                info.retain_events(chosen);
            }
        }
        debug!(batch_id = %batch_id, "Resuming after candidate selection");
        self.inner
            .stage_fields(pending.batch_id, pending.issue, pending.infos)
            .await
    }

    /// Resume a batch parked for staging fields. `values` maps generator
    /// name to the values the user entered.
    pub async fn resume_with_staging_values(
        &self,
        batch_id: &BatchId,
        mut values: HashMap<String, StagingValues>,
    ) -> Result<BatchOutcome, OrchestrationError> {
        self.ensure_running()?;
        let mut pending = self.inner.staging.take(batch_id, StagingPhase::Fields)?;
        for info in &mut pending.infos {
            if let Some(entered) = values.remove(&info.generator_name) {
                info.staging_values = Some(entered);
            }
        }
        debug!(batch_id = %batch_id, "Resuming with staging values");
        self.inner
            .dispatch(pending.batch_id, pending.issue, pending.infos)
            .await
    }

    /// Drop a parked batch the user abandoned.
    pub fn cancel_staging(&self, batch_id: &BatchId) -> bool {
        self.inner.staging.discard(batch_id)
    }

    /// Re-run a generator over already generated products to refresh
    /// time-sensitive fields, then disseminate the refreshed products.
    pub async fn correct(
        &self,
        generator: &str,
        existing: Vec<GeneratedProduct>,
        correction_key: &str,
    ) -> Result<DisseminationReport, OrchestrationError> {
        self.ensure_running()?;
        let definition = self.definition(generator)?;
        let refreshed = self
            .inner
            .engine
            .generate_from(generator, &existing, correction_key, &definition.formats)
            .await?;

        let items: Vec<DisseminationItem> = refreshed
            .products
            .into_iter()
            .map(|product| DisseminationItem {
                generator_name: generator.to_string(),
                correction_key: Some(correction_key.to_string()),
                product,
            })
            .collect();
        info!(generator, products = items.len(), "Disseminating corrected products");
        let site_id = self.site_id();
        self.inner.disseminator.disseminate(&site_id, items).await
    }

    /// Correct the products recorded for a generator in a mode and time
    /// range. Without an explicit key the most recent stored one is used.
    pub async fn correct_stored(
        &self,
        generator: &str,
        mode: OperatingMode,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        correction_key: Option<&str>,
    ) -> Result<DisseminationReport, OrchestrationError> {
        let records = self.inner.store.query(generator, mode, from, to)?;
        if records.is_empty() {
            return Err(StorageError::RecordNotFound(format!(
                "{} products from {} in the requested range",
                mode.as_str(),
                generator
            ))
            .into());
        }
        let key = match correction_key {
            Some(key) => key.to_string(),
            None => records
                .iter()
                .rev()
                .find_map(|r| r.correction_key.clone())
                .ok_or_else(|| {
                    StorageError::InvalidData(format!("no correction key stored for {}", generator))
                })?,
        };
        let existing = records.iter().map(|r| r.to_product()).collect();
        self.correct(generator, existing, &key).await
    }

    /// Re-format existing products after their editable entries changed.
    pub async fn update_products(
        &self,
        generator: &str,
        events: Vec<HazardRecord>,
        existing: &[GeneratedProduct],
        formats: Option<&[String]>,
    ) -> Result<GeneratedProductList, OrchestrationError> {
        self.ensure_running()?;
        let definition = self.definition(generator)?;
        let mut info = GeneratorInfo::new(definition);
        for event in events {
            info.add_selected(event);
        }
        let formats = formats.map(<[String]>::to_vec).unwrap_or_else(|| info.formats.clone());
        let payload = self.inner.payloads.read().build(&info, false, Utc::now());
        let updated = self
            .inner
            .engine
            .update(generator, &payload, existing, &formats)
            .await?;
        Ok(updated)
    }

    pub async fn generator_script(&self, generator: &str) -> Result<Option<PathBuf>, OrchestrationError> {
        self.ensure_running()?;
        self.definition(generator)?;
        Ok(self.inner.engine.script_file(generator).await?)
    }

    /// Unsubscribe from the bus and release the engine. Batches already
    /// dispatched still run to completion.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let subscription = self.inner.site_subscription.lock().take();
        if let Some(id) = subscription {
            self.inner.bus.unsubscribe(id);
        }
        self.inner.engine.shutdown().await;
        info!(
            pending_staging = self.inner.staging.len(),
            live_batches = self.inner.batches.len(),
            "Orchestrator shut down"
        );
    }

    fn ensure_running(&self) -> Result<(), OrchestrationError> {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(OrchestrationError::Shutdown);
        }
        Ok(())
    }

    fn definition(&self, generator: &str) -> Result<&GeneratorDefinition, OrchestrationError> {
        self.inner
            .generators
            .get(generator)
            .ok_or_else(|| OrchestrationError::UnknownGenerator(generator.to_string()))
    }
}

impl Inner {
    fn change_site(&self, site_id: &str) {
        self.payloads.write().set_site(site_id);
        info!(site_id, "Active site changed");

        let engine = Arc::clone(&self.engine);
        let site = site_id.to_string();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = engine.set_site(&site).await {
                        warn!(target: STATUS_TARGET, site_id = %site, error = %err, "Failed to propagate site to engine");
                    }
                });
            }
            Err(_) => {
                warn!(site_id, "No runtime available; engine site left unchanged");
            }
        }
    }

    /// Phase one of staging: candidate selection, when any generator has
    /// include-all candidates the user has not already selected.
    async fn begin(
        self: &Arc<Self>,
        batch_id: BatchId,
        issue: bool,
        infos: Vec<GeneratorInfo>,
    ) -> Result<BatchOutcome, OrchestrationError> {
        if infos.iter().any(|i| i.open_candidates().next().is_some()) {
            let request = StagingRequest {
                batch_id: batch_id.clone(),
                issue,
                phase: StagingPhase::CandidateSelection,
                generators: infos
                    .iter()
                    .map(|info| GeneratorStaging {
                        generator_name: info.generator_name.clone(),
                        candidates: info.open_candidates().cloned().collect(),
                        fields: Vec::new(),
                    })
                    .collect(),
            };
            self.divert(batch_id, issue, StagingPhase::CandidateSelection, infos);
            return Ok(BatchOutcome::StagingRequired(request));
        }
        self.stage_fields(batch_id, issue, infos).await
    }

    /// Phase two of staging: ask every generator for dialog fields. A
    /// generator with a malformed declaration is dropped from the batch.
    async fn stage_fields(
        self: &Arc<Self>,
        batch_id: BatchId,
        issue: bool,
        mut infos: Vec<GeneratorInfo>,
    ) -> Result<BatchOutcome, OrchestrationError> {
        let empty: Vec<String> = infos
            .iter()
            .filter(|i| i.selected_events.is_empty())
            .map(|i| i.generator_name.clone())
            .collect();
        if !empty.is_empty() {
            info!(batch_id = %batch_id, generators = ?empty, "Batch aborted with no applicable events");
            return Err(OrchestrationError::NoApplicableEvents { generators: empty });
        }
        for info in &mut infos {
            self.refresh_ugcs(info).await?;
        }

        let mut kept = Vec::with_capacity(infos.len());
        let mut generators = Vec::with_capacity(infos.len());
        let mut needs_input = false;
        let mut last_spec_error = None;

        for info in infos {
            let payload = self.payloads.read().build(&info, issue, Utc::now());
            let raw = self.engine.dialog_info(&info.generator_name, &payload).await?;
            match parse_dialog_info(&info.generator_name, raw) {
                Ok(fields) => {
                    needs_input |= !fields.is_empty();
                    generators.push(GeneratorStaging {
                        generator_name: info.generator_name.clone(),
                        candidates: Vec::new(),
                        fields,
                    });
                    kept.push(info);
                }
                Err(err) => {
                    warn!(
                        target: STATUS_TARGET,
                        batch_id = %batch_id,
                        generator = %info.generator_name,
                        error = %err,
                        "Excluding generator from batch"
                    );
                    last_spec_error = Some(err);
                }
            }
        }

        if kept.is_empty() {
            return Err(last_spec_error.unwrap_or(OrchestrationError::NoApplicableEvents {
                generators: Vec::new(),
            }));
        }

        if needs_input {
            let request = StagingRequest {
                batch_id: batch_id.clone(),
                issue,
                phase: StagingPhase::Fields,
                generators,
            };
            self.divert(batch_id, issue, StagingPhase::Fields, kept);
            return Ok(BatchOutcome::StagingRequired(request));
        }
        self.dispatch(batch_id, issue, kept).await
    }

    fn divert(&self, batch_id: BatchId, issue: bool, phase: StagingPhase, infos: Vec<GeneratorInfo>) {
        info!(batch_id = %batch_id, phase = ?phase, "Batch needs user input");
        self.staging.stash(PendingBatch {
            batch_id: batch_id.clone(),
            issue,
            phase,
            infos,
            staged_at: Instant::now(),
        });
        self.bus.publish(Notification::StagingRequired {
            batch_id: batch_id.to_string(),
            phase,
        });
    }

    /// Refresh UGC attributes on the affinity context, since the session's
    /// records may be mid-issuance for another batch.
    async fn refresh_ugcs(&self, info: &mut GeneratorInfo) -> Result<(), OrchestrationError> {
        let session = Arc::clone(&self.session);
        let event_ids = info.event_ids();
        let refreshed = self
            .affinity
            .run(move || {
                event_ids
                    .iter()
                    .map(|id| session.update_ugc_attributes(id))
                    .collect::<Vec<_>>()
            })
            .await?;
        for (event, result) in info.selected_events.iter_mut().zip(refreshed) {
            match result {
                Ok(record) => *event = record,
                Err(err) => debug!(event_id = %event.event_id, error = %err, "UGC refresh skipped"),
            }
        }
        Ok(())
    }

    /// Confirm (issuing batches only), register the batch and spawn one
    /// generation future per generator.
    async fn dispatch(
        self: &Arc<Self>,
        batch_id: BatchId,
        issue: bool,
        infos: Vec<GeneratorInfo>,
    ) -> Result<BatchOutcome, OrchestrationError> {
        let mut warnings = Vec::new();
        if issue {
            let mut events: Vec<HazardRecord> = Vec::new();
            for event in infos.iter().flat_map(|i| i.selected_events.iter()) {
                if !events.iter().any(|e| e.event_id == event.event_id) {
                    events.push(event.clone());
                }
            }
            let others = self.session.events_for_current_settings();
            warnings.extend(
                advisory_conflicts(self.conflicts.as_ref(), &events, &others)
                    .iter()
                    .map(Conflict::describe),
            );
            if !self.confirmer.confirm(&events)? {
                info!(batch_id = %batch_id, "Issuance declined");
                return Err(OrchestrationError::ConfirmationDenied);
            }
        }

        let now = Utc::now();
        let calls: Vec<_> = infos
            .iter()
            .map(|info| {
                (
                    info.id,
                    info.generator_name.clone(),
                    self.payloads.read().build(info, issue, now),
                    info.staging_values.clone(),
                    info.formats.clone(),
                )
            })
            .collect();
        let generators: Vec<String> = infos.iter().map(|i| i.generator_name.clone()).collect();

        let (tx, rx) = oneshot::channel();
        let mut batch = LiveBatch::new(batch_id.clone(), issue, infos);
        batch.completion = Some(tx);
        batch.warnings = warnings;
        self.batches.insert(batch);

        info!(batch_id = %batch_id, issue, generators = ?generators, "Dispatching generators");
        for (info_id, generator, payload, staging, formats) in calls {
            let inner = Arc::clone(self);
            let batch_id = batch_id.clone();
            tokio::spawn(async move {
                // a panicking generator still reports, or the batch never joins
                let call = inner
                    .engine
                    .generate(&generator, &payload, staging.as_ref(), &formats);
                let result = match AssertUnwindSafe(call).catch_unwind().await {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(_) => Err("panicked".to_string()),
                }
                .map_err(|message| OrchestrationError::GeneratorJob {
                    generator: generator.clone(),
                    message,
                });
                inner.on_generator_complete(&batch_id, info_id, result);
            });
        }

        Ok(BatchOutcome::Dispatched(BatchHandle {
            batch_id,
            generators,
            receiver: rx,
        }))
    }
}
