//! Correction of stored products.

use super::support::{config, event, generator, issue_time, product, Fixture, ScriptedEngine};
use chrono::Duration as ChronoDuration;
use hazprod::config::OperatingMode;
use hazprod::error::{OrchestrationError, StorageError};
use hazprod::hazard::HazardStatus;
use hazprod::store::ProductRecordStore;
use tempfile::TempDir;

#[tokio::test]
async fn stored_products_are_corrected_with_their_key() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path(), OperatingMode::Practice);
    cfg.generators.insert("FFW".to_string(), generator(&["FF.W"], &[]));
    let fx = Fixture::open(
        dir,
        &cfg,
        ScriptedEngine::new().produces("FFW", vec![product("FFW", &["HZ-1"])]),
        vec![event("HZ-1", "FF.W", HazardStatus::Pending)],
        &["HZ-1"],
        true,
    );
    let orchestrator = fx.session.orchestrator();

    orchestrator
        .generate_selected(true)
        .await
        .unwrap()
        .into_handle()
        .unwrap()
        .wait()
        .await
        .unwrap();

    let corrected = orchestrator
        .correct_stored("FFW", OperatingMode::Practice, None, None, None)
        .await
        .unwrap();

    assert_eq!(corrected.pils(), vec!["FFW"]);
    assert_eq!(
        *fx.engine.corrections.lock(),
        vec![("FFW".to_string(), "FFW-correction".to_string())]
    );
    assert_eq!(fx.spooled(), vec!["FFW", "FFW"]);

    let store = fx.session.store().unwrap();
    let records = store.query("FFW", OperatingMode::Practice, None, None).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].issue_time, issue_time() + ChronoDuration::minutes(5));
    assert_eq!(records[1].correction_key.as_deref(), Some("FFW-correction"));

    let later_only = store
        .query(
            "FFW",
            OperatingMode::Practice,
            Some(issue_time() + ChronoDuration::minutes(1)),
            None,
        )
        .unwrap();
    assert_eq!(later_only.len(), 1);
}

#[tokio::test]
async fn correcting_an_empty_range_reports_not_found() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path(), OperatingMode::Test);
    cfg.generators.insert("FFW".to_string(), generator(&["FF.W"], &[]));
    let fx = Fixture::open(dir, &cfg, ScriptedEngine::new(), Vec::new(), &[], true);

    let err = fx
        .session
        .orchestrator()
        .correct_stored("FFW", OperatingMode::Test, None, None, Some("key"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestrationError::Persistence(StorageError::RecordNotFound(_))
    ));
    assert!(fx.engine.corrections.lock().is_empty());
}
