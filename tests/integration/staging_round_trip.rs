//! Two-phase staging: candidate selection, then dialog fields.

use super::support::{config, event, generator, product, Fixture, ScriptedEngine};
use hazprod::config::OperatingMode;
use hazprod::error::OrchestrationError;
use hazprod::hazard::HazardStatus;
use hazprod::staging::StagingPhase;
use serde_json::{json, Map};
use std::collections::HashMap;
use tempfile::TempDir;

#[tokio::test]
async fn candidates_then_fields_then_dispatch() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path(), OperatingMode::Practice);
    cfg.generators
        .insert("FFA".to_string(), generator(&["FF.A"], &["FF.A"]));
    cfg.dissemination.priority.push("FFA".to_string());

    let fx = Fixture::open(
        dir,
        &cfg,
        ScriptedEngine::new()
            .produces("FFA", vec![product("FFA", &["HZ-1", "HZ-2"])])
            .asks(
                "FFA",
                json!({ "fields": [{ "fieldName": "callToAction", "fieldType": "CheckList", "choices": ["Turn around"] }] }),
            ),
        vec![
            event("HZ-1", "FF.A", HazardStatus::Pending),
            event("HZ-2", "FF.A", HazardStatus::Issued),
            event("HZ-3", "FF.A", HazardStatus::Ended),
        ],
        &["HZ-1"],
        true,
    );
    let orchestrator = fx.session.orchestrator();

    let first = orchestrator.generate_selected(true).await.unwrap();
    let request = first.staging().cloned().expect("candidate selection");
    assert_eq!(request.phase, StagingPhase::CandidateSelection);
    assert!(request.issue);
    let offered: Vec<&str> = request.generators[0]
        .candidates
        .iter()
        .map(|e| e.event_id.as_str())
        .collect();
    assert_eq!(offered, vec!["HZ-2"]);
    assert!(fx.engine.calls.lock().is_empty());

    let mut chosen = HashMap::new();
    chosen.insert("FFA".to_string(), vec!["HZ-1".to_string(), "HZ-2".to_string()]);
    let second = orchestrator
        .resume_with_candidates(&request.batch_id, &chosen)
        .await
        .unwrap();
    let fields = second.staging().cloned().expect("field staging");
    assert_eq!(fields.phase, StagingPhase::Fields);
    assert_eq!(fields.batch_id, request.batch_id);
    assert_eq!(fields.generators[0].fields[0].field_name, "callToAction");

    let mut values = Map::new();
    values.insert("callToAction".to_string(), json!(["Turn around"]));
    let mut by_generator = HashMap::new();
    by_generator.insert("FFA".to_string(), values.clone());
    let report = orchestrator
        .resume_with_staging_values(&fields.batch_id, by_generator)
        .await
        .unwrap()
        .into_handle()
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(report.disseminated, vec!["FFA"]);
    assert_eq!(fx.engine.staging_seen.lock()[0].1.as_ref(), Some(&values));
    assert_eq!(
        fx.engine.payload_events.lock()[0].1,
        vec!["HZ-1".to_string(), "HZ-2".to_string()]
    );
    assert_eq!(orchestrator.pending_staging(), 0);
}

#[tokio::test]
async fn resuming_the_wrong_phase_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path(), OperatingMode::Practice);
    cfg.generators.insert("FFW".to_string(), generator(&["FF.W"], &[]));

    let fx = Fixture::open(
        dir,
        &cfg,
        ScriptedEngine::new().asks("FFW", json!([{ "fieldName": "cause", "fieldType": "RadioButtons" }])),
        vec![event("HZ-1", "FF.W", HazardStatus::Pending)],
        &["HZ-1"],
        true,
    );
    let orchestrator = fx.session.orchestrator();

    let outcome = orchestrator.generate_selected(false).await.unwrap();
    let request = outcome.staging().cloned().unwrap();
    assert_eq!(request.phase, StagingPhase::Fields);

    let err = orchestrator
        .resume_with_candidates(&request.batch_id, &HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestrationError::UnknownBatch(_)));
}

#[tokio::test]
async fn two_parked_batches_resume_independently() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path(), OperatingMode::Practice);
    cfg.generators.insert("FFW".to_string(), generator(&["FF.W"], &[]));

    let fx = Fixture::open(
        dir,
        &cfg,
        ScriptedEngine::new()
            .produces("FFW", vec![product("FFW", &["HZ-1"])])
            .asks("FFW", json!([{ "fieldName": "cause", "fieldType": "RadioButtons" }])),
        vec![event("HZ-1", "FF.W", HazardStatus::Pending)],
        &["HZ-1"],
        true,
    );
    let orchestrator = fx.session.orchestrator();

    let issuing = orchestrator.generate_selected(true).await.unwrap();
    let preview = orchestrator.generate_selected(false).await.unwrap();
    let issuing_id = issuing.staging().unwrap().batch_id.clone();
    let preview_id = preview.staging().unwrap().batch_id.clone();
    assert_eq!(orchestrator.pending_staging(), 2);

    let preview_report = orchestrator
        .resume_with_staging_values(&preview_id, HashMap::new())
        .await
        .unwrap()
        .into_handle()
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert!(!preview_report.issue);
    assert_eq!(orchestrator.pending_staging(), 1);

    let issuing_report = orchestrator
        .resume_with_staging_values(&issuing_id, HashMap::new())
        .await
        .unwrap()
        .into_handle()
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert!(issuing_report.issue);
    assert_eq!(issuing_report.disseminated, vec!["FFW"]);
    assert_eq!(orchestrator.pending_staging(), 0);
}
