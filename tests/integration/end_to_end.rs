//! Whole-batch scenarios through a session wired from configuration.

use super::support::{config, event, generator, product, Fixture, ScriptedEngine};
use hazprod::config::OperatingMode;
use hazprod::hazard::HazardStatus;
use hazprod::notify::{Delivery, Notification, NotificationKind};
use hazprod::session::SessionEventManager;
use hazprod::store::ProductRecordStore;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn flood_watch_is_generated_disseminated_and_issued() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path(), OperatingMode::Practice);
    cfg.generators
        .insert("FFA".to_string(), generator(&["FF.A", "FA.A"], &[]));
    cfg.dissemination.priority.push("FFA".to_string());

    let fx = Fixture::open(
        dir,
        &cfg,
        ScriptedEngine::new().produces("FFA", vec![product("FFA", &["HZ-1"])]),
        vec![event("HZ-1", "FF.A", HazardStatus::Pending)],
        &["HZ-1"],
        true,
    );

    let completions = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&completions);
    fx.session.orchestrator().bus().subscribe(
        &[NotificationKind::BatchCompleted],
        Delivery::Synchronous,
        move |n| {
            if let Notification::BatchCompleted { report } = n {
                seen.lock().push(report.batch_id.clone());
            }
        },
    );

    let handle = fx
        .session
        .orchestrator()
        .generate_selected(true)
        .await
        .unwrap()
        .into_handle()
        .expect("dispatched without staging");
    let batch_id = handle.batch_id.to_string();
    let report = handle.wait().await.unwrap();

    assert_eq!(report.succeeded, vec!["FFA"]);
    assert_eq!(report.disseminated, vec!["FFA"]);
    assert_eq!(report.issued_events, vec!["HZ-1"]);
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    assert_eq!(fx.spooled(), vec!["FFA"]);
    assert_eq!(fx.events.event("HZ-1").unwrap().status, HazardStatus::Issued);
    assert_eq!(*completions.lock(), vec![batch_id]);

    let store = fx.session.store().unwrap();
    let stored = store.query("FFA", OperatingMode::Practice, None, None).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].event_ids, vec!["HZ-1"]);
    assert_eq!(stored[0].correction_key.as_deref(), Some("FFA-correction"));

    fx.session.close().await;
}

#[tokio::test]
async fn one_failed_generator_does_not_stall_the_batch() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path(), OperatingMode::Practice);
    cfg.generators.insert("FFW".to_string(), generator(&["FF.W"], &[]));
    cfg.generators.insert("FLW".to_string(), generator(&["FF.W"], &[]));

    let fx = Fixture::open(
        dir,
        &cfg,
        ScriptedEngine::new()
            .produces("FFW", vec![product("FFW", &["HZ-1"])])
            .fails("FLW", "template error")
            .slow("FFW", Duration::from_millis(30)),
        vec![event("HZ-1", "FF.W", HazardStatus::Pending)],
        &["HZ-1"],
        true,
    );

    let failures = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&failures);
    fx.session.orchestrator().bus().subscribe(
        &[NotificationKind::GeneratorFailed],
        Delivery::Synchronous,
        move |n| {
            if let Notification::GeneratorFailed { generator_name, .. } = n {
                seen.lock().push(generator_name.clone());
            }
        },
    );

    let report = fx
        .session
        .orchestrator()
        .generate_selected(true)
        .await
        .unwrap()
        .into_handle()
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(report.succeeded, vec!["FFW"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "FLW");
    assert!(report.failed[0].1.contains("template error"));
    assert_eq!(report.disseminated, vec!["FFW"]);
    assert_eq!(*failures.lock(), vec!["FLW"]);
    assert_eq!(fx.session.orchestrator().live_batches(), 0);
    fx.session.close().await;
}

#[tokio::test]
async fn preview_leaves_session_and_store_untouched() {
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

    let report = fx
        .session
        .orchestrator()
        .generate_selected(false)
        .await
        .unwrap()
        .into_handle()
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert!(!report.issue);
    assert_eq!(report.succeeded, vec!["FFW"]);
    assert!(report.disseminated.is_empty());
    assert!(fx.spooled().is_empty());
    assert!(fx.session.store().unwrap().is_empty());
    assert_eq!(fx.events.event("HZ-1").unwrap().status, HazardStatus::Pending);
    assert_eq!(fx.confirmer.times_asked(), 0);
    fx.session.close().await;
}
