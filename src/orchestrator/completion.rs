//! Batch completion: per-generator reports, the join, ordered issuance.

use super::Inner;
use crate::audit::{BatchId, BatchReport, LiveBatch, RecordOutcome};
use crate::dissemination::DisseminationItem;
use crate::error::OrchestrationError;
use crate::generator::{GeneratedProductList, GeneratorInfoId};
use crate::hazard::{
    HazardRecord, HazardStatus, CONSUMED_BY_ISSUANCE_ATTRIBUTES, STALE_ISSUANCE_ATTRIBUTES,
};
use crate::logging::STATUS_TARGET;
use crate::notify::Notification;
use crate::session::{SessionError, SessionEventManager};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// One generator's share of a batch's issuance.
struct Issuance {
    generator_name: String,
    product_count: usize,
    updated_events: Vec<HazardRecord>,
    event_ids: Vec<String>,
}

#[derive(Default)]
struct IssuanceOutcome {
    issued: Vec<String>,
    ended: Vec<String>,
    warnings: Vec<String>,
}

impl Inner {
    /// Feed one generator's result into the live-batch table. Exactly one
    /// report per batch observes completion and starts the join.
    pub(super) fn on_generator_complete(
        self: &Arc<Self>,
        batch_id: &BatchId,
        info_id: GeneratorInfoId,
        result: Result<GeneratedProductList, OrchestrationError>,
    ) {
        let Some(latch) = self.batches.latch(batch_id) else {
            debug!(batch_id = %batch_id, "Report for unknown batch ignored");
            return;
        };
        let result = result.map_err(|err| err.to_string());
        let reported = match &result {
            Ok(list) => Ok(list.products.len()),
            Err(message) => Err(message.clone()),
        };

        let (generator_name, completed) = match self.batches.record(batch_id, info_id, result) {
            RecordOutcome::Pending { generator_name } => (generator_name, None),
            RecordOutcome::Completed { generator_name, batch } => (generator_name, Some(batch)),
            RecordOutcome::Ignored => {
                debug!(batch_id = %batch_id, "Repeated generator report ignored");
                return;
            }
        };

        match reported {
            Ok(product_count) => {
                info!(batch_id = %batch_id, generator = %generator_name, product_count, "Generator succeeded");
                self.bus.publish(Notification::GeneratorSucceeded {
                    batch_id: batch_id.to_string(),
                    generator_name,
                    product_count,
                });
            }
            Err(message) => {
                warn!(
                    target: STATUS_TARGET,
                    batch_id = %batch_id,
                    generator = %generator_name,
                    error = %message,
                    "Generator failed"
                );
                self.bus.publish(Notification::GeneratorFailed {
                    batch_id: batch_id.to_string(),
                    generator_name,
                    error: message,
                });
            }
        }

        if let Some(batch) = completed {
            let inner = Arc::clone(self);
            tokio::spawn(async move { inner.complete_batch(*batch).await });
        }
        latch.signal();
    }

    /// Wait for every dispatched generator's signal, then disseminate and
    /// issue (issuing batches only) and publish the batch completion.
    async fn complete_batch(self: Arc<Self>, mut batch: LiveBatch) {
        batch.latch.wait().await;

        let batch_id = batch.auditor.batch_id().clone();
        let issue = batch.auditor.issue();
        let mut report = BatchReport {
            batch_id: batch_id.to_string(),
            issue,
            warnings: std::mem::take(&mut batch.warnings),
            ..BatchReport::default()
        };

        let mut issuances = Vec::new();
        let mut items = Vec::new();
        for info in &batch.infos {
            match (&info.generated, &info.error) {
                (Some(list), None) => {
                    report.succeeded.push(info.generator_name.clone());
                    items.extend(list.products.iter().cloned().map(|product| DisseminationItem {
                        generator_name: info.generator_name.clone(),
                        correction_key: list.correction_key.clone(),
                        product,
                    }));
                    issuances.push(Issuance {
                        generator_name: info.generator_name.clone(),
                        product_count: list.products.len(),
                        updated_events: list.updated_events.clone(),
                        event_ids: info.event_ids(),
                    });
                }
                (_, Some(message)) => report
                    .failed
                    .push((info.generator_name.clone(), message.clone())),
                (None, None) => report
                    .failed
                    .push((info.generator_name.clone(), "no result reported".to_string())),
            }
        }

        if issue && !issuances.is_empty() {
            self.issue_batch(&batch_id, items, issuances, &mut report).await;
        }

        info!(
            batch_id = %batch_id,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            disseminated = report.disseminated.len(),
            "Batch complete"
        );
        self.bus.publish(Notification::BatchCompleted {
            report: report.clone(),
        });
        if let Some(completion) = batch.completion.take() {
            let _ = completion.send(report);
        }
    }

    async fn issue_batch(
        &self,
        batch_id: &BatchId,
        items: Vec<DisseminationItem>,
        issuances: Vec<Issuance>,
        report: &mut BatchReport,
    ) {
        let site_id = self.payloads.read().site_id().to_string();
        let outcome = match self.disseminator.disseminate(&site_id, items).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(target: STATUS_TARGET, batch_id = %batch_id, error = %err, "Dissemination aborted");
                report.warnings.push(err.to_string());
                return;
            }
        };
        report.disseminated = outcome.pils();
        report.warnings.extend(outcome.warnings.iter().cloned());
        report.warnings.extend(
            outcome
                .failures
                .iter()
                .map(|(pil, err)| format!("{pil} was not disseminated: {err}")),
        );

        let ordered = issuance_order(&outcome.disseminated, issuances);
        let session = Arc::clone(&self.session);
        match self
            .affinity
            .run(move || apply_issuance(session.as_ref(), &ordered))
            .await
        {
            Ok(applied) => {
                report.issued_events = applied.issued;
                report.ended_events = applied.ended;
                report.warnings.extend(applied.warnings);
            }
            Err(err) => {
                error!(target: STATUS_TARGET, batch_id = %batch_id, error = %err, "Issuance not applied");
                report.warnings.push(err.to_string());
            }
        }
    }
}

/// Generators in the order their first product was disseminated. Generators
/// that produced nothing follow; those whose every product was halted drop out.
fn issuance_order(disseminated: &[DisseminationItem], issuances: Vec<Issuance>) -> Vec<Issuance> {
    let mut remaining = issuances;
    let mut ordered = Vec::with_capacity(remaining.len());
    for item in disseminated {
        if let Some(pos) = remaining
            .iter()
            .position(|i| i.generator_name == item.generator_name)
        {
            ordered.push(remaining.remove(pos));
        }
    }
    ordered.extend(remaining.into_iter().filter(|i| i.product_count == 0));
    ordered
}

fn apply_issuance(session: &dyn SessionEventManager, ordered: &[Issuance]) -> IssuanceOutcome {
    let mut outcome = IssuanceOutcome::default();
    for issuance in ordered {
        if issuance.updated_events.is_empty() {
            // nothing came back to replace the prior issuance's fields
            for event_id in &issuance.event_ids {
                let result = session
                    .mark_issued(event_id)
                    .and_then(|_| session.clear_attributes(event_id, STALE_ISSUANCE_ATTRIBUTES));
                record(&mut outcome, event_id, false, result);
            }
            continue;
        }
        for event in &issuance.updated_events {
            let event_id = event.event_id.clone();
            let ending = matches!(event.status, HazardStatus::Ending | HazardStatus::Ended);
            let result = session
                .merge_event(event.clone())
                .and_then(|_| {
                    if ending {
                        session.mark_ended(&event_id)
                    } else {
                        session.mark_issued(&event_id)
                    }
                })
                .and_then(|_| session.clear_attributes(&event_id, CONSUMED_BY_ISSUANCE_ATTRIBUTES));
            record(&mut outcome, &event_id, ending, result);
        }
    }
    outcome
}

fn record(outcome: &mut IssuanceOutcome, event_id: &str, ending: bool, result: Result<(), SessionError>) {
    match result {
        Ok(()) => {
            let list = if ending { &mut outcome.ended } else { &mut outcome.issued };
            if !list.iter().any(|id| id == event_id) {
                list.push(event_id.to_string());
            }
        }
        Err(err) => {
            warn!(target: STATUS_TARGET, event_id, error = %err, "Failed to apply issuance");
            outcome.warnings.push(format!("{event_id}: {err}"));
        }
    }
}
