//! The confirmation hook is asked once per issuing batch, before dispatch.

use super::support::{config, event, generator, product, Fixture, ScriptedEngine};
use hazprod::config::OperatingMode;
use hazprod::error::OrchestrationError;
use hazprod::hazard::HazardStatus;
use hazprod::session::SessionEventManager;
use std::time::Duration;
use tempfile::TempDir;

fn warning_engine() -> ScriptedEngine {
    ScriptedEngine::new()
        .produces("FFW", vec![product("FFW", &["HZ-1"])])
        .produces("FLW", vec![product("FLW", &["HZ-2"])])
        .produces("FFS", vec![product("FFS", &["HZ-1"])])
        .slow("FFW", Duration::from_millis(25))
}

fn warning_config(dir: &std::path::Path) -> hazprod::config::HazprodConfig {
    let mut cfg = config(dir, OperatingMode::Practice);
    for name in ["FFW", "FLW", "FFS"] {
        cfg.generators.insert(name.to_string(), generator(&["FF.W", "FL.W"], &[]));
    }
    cfg
}

#[tokio::test]
async fn three_generators_one_prompt() {
    let dir = TempDir::new().unwrap();
    let cfg = warning_config(dir.path());
    let fx = Fixture::open(
        dir,
        &cfg,
        warning_engine(),
        vec![
            event("HZ-1", "FF.W", HazardStatus::Pending),
            event("HZ-2", "FL.W", HazardStatus::Pending),
        ],
        &["HZ-1", "HZ-2"],
        true,
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

    assert_eq!(fx.confirmer.times_asked(), 1);
    assert_eq!(fx.engine.calls.lock().len(), 3);
    assert_eq!(report.succeeded.len(), 3);
    assert_eq!(report.issued_events.len(), 2);
}

#[tokio::test]
async fn declining_stops_every_generator() {
    let dir = TempDir::new().unwrap();
    let cfg = warning_config(dir.path());
    let fx = Fixture::open(
        dir,
        &cfg,
        warning_engine(),
        vec![event("HZ-1", "FF.W", HazardStatus::Pending)],
        &["HZ-1"],
        false,
    );

    let err = fx
        .session
        .orchestrator()
        .generate_selected(true)
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestrationError::ConfirmationDenied));
    assert_eq!(fx.confirmer.times_asked(), 1);
    assert!(fx.engine.calls.lock().is_empty());
    assert_eq!(fx.session.orchestrator().live_batches(), 0);
    assert!(fx.spooled().is_empty());
    assert_eq!(fx.events.event("HZ-1").unwrap().status, HazardStatus::Pending);
}

#[tokio::test]
async fn selections_from_another_site_are_refused_before_confirmation() {
    let dir = TempDir::new().unwrap();
    let cfg = warning_config(dir.path());
    let mut foreign = event("HZ-9", "FF.W", HazardStatus::Pending);
    foreign.site_id = "DMX".to_string();
    let fx = Fixture::open(
        dir,
        &cfg,
        warning_engine(),
        vec![event("HZ-1", "FF.W", HazardStatus::Pending), foreign],
        &["HZ-1", "HZ-9"],
        true,
    );

    let err = fx
        .session
        .orchestrator()
        .generate_selected(true)
        .await
        .unwrap_err();

    match err {
        OrchestrationError::InvalidSelection { event_ids, .. } => assert_eq!(event_ids, vec!["HZ-9"]),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fx.confirmer.times_asked(), 0);
}
