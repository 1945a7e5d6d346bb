//! Selection validation and the applicability scan.
//!
//! Both run synchronously before any generator is contacted, so every
//! failure here is reported before asynchronous work starts.

use crate::error::OrchestrationError;
use crate::generator::{GeneratorDefinition, GeneratorInfo, GeneratorTable};
use crate::hazard::HazardRecord;
use tracing::debug;

/// Reject selections generation cannot work with, naming every offender.
///
/// Untyped events are always rejected. When issuing, events owned by another
/// site and events already ended or elapsed are rejected too.
pub fn validate_selection(events: &[HazardRecord], site_id: &str, issue: bool) -> Result<(), OrchestrationError> {
    let mut untyped = Vec::new();
    let mut foreign = Vec::new();
    let mut finished = Vec::new();

    for event in events {
        if event.hazard_type().is_none() {
            untyped.push(event.event_id.clone());
        } else if issue && event.site_id != site_id {
            foreign.push(event.event_id.clone());
        } else if issue && event.status.is_terminal() {
            finished.push(event.event_id.clone());
        }
    }

    let mut problems = Vec::new();
    if !untyped.is_empty() {
        problems.push(format!("no hazard type assigned to {}", untyped.join(", ")));
    }
    if !foreign.is_empty() {
        problems.push(format!("{} not owned by site {}", foreign.join(", "), site_id));
    }
    if !finished.is_empty() {
        problems.push(format!("{} already ended or elapsed", finished.join(", ")));
    }
    if problems.is_empty() {
        return Ok(());
    }

    let mut event_ids = untyped;
    event_ids.extend(foreign);
    event_ids.extend(finished);
    Err(OrchestrationError::InvalidSelection {
        event_ids,
        message: problems.join("; "),
    })
}

/// Build one generator's GeneratorInfo from the selection.
///
/// Include-all types additionally sweep active events of that type from
/// `all_events` into the candidate set.
pub fn collect_for(
    definition: &GeneratorDefinition,
    selected: &[HazardRecord],
    all_events: &[HazardRecord],
    site_id: &str,
) -> GeneratorInfo {
    let mut info = GeneratorInfo::new(definition);
    for event in selected {
        let applies = event.site_id == site_id
            && event
                .hazard_type()
                .map(|t| definition.allows(&t))
                .unwrap_or(false);
        if applies {
            info.add_selected(event.clone());
        }
    }

    for include_type in definition.include_all_types() {
        for event in all_events {
            let matches = event.site_id == site_id
                && !event.status.is_inactive()
                && event.hazard_type().as_deref() == Some(include_type);
            if matches && !info.candidate_events.iter().any(|c| c.event_id == event.event_id) {
                info.candidate_events.push(event.clone());
            }
        }
    }
    info
}

/// Scan every known generator against the selection. Generators with no
/// selected events are dropped; if none remain the batch is aborted.
pub fn scan(
    table: &GeneratorTable,
    selected: &[HazardRecord],
    all_events: &[HazardRecord],
    site_id: &str,
) -> Result<Vec<GeneratorInfo>, OrchestrationError> {
    let mut infos = Vec::new();
    for definition in table.iter() {
        let info = collect_for(definition, selected, all_events, site_id);
        if info.selected_events.is_empty() {
            continue;
        }
        debug!(
            generator = %info.generator_name,
            selected = info.selected_events.len(),
            candidates = info.candidate_events.len(),
            "Generator applies"
        );
        infos.push(info);
    }

    if infos.is_empty() {
        return Err(OrchestrationError::NoApplicableEvents {
            generators: table.iter().map(|d| d.name.clone()).collect(),
        });
    }
    Ok(infos)
}
