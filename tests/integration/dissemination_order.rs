//! Products go out in priority order whatever order the generators finish in.

use super::support::{config, event, generator, product, Fixture, ScriptedEngine};
use hazprod::config::OperatingMode;
use hazprod::hazard::HazardStatus;
use hazprod::session::SessionEventManager;
use hazprod::store::ProductRecordStore;
use std::time::Duration;
use tempfile::TempDir;

fn warning_config(dir: &std::path::Path, mode: OperatingMode) -> hazprod::config::HazprodConfig {
    let mut cfg = config(dir, mode);
    for name in ["FFS", "FLW", "FFW", "ZZZ"] {
        cfg.generators.insert(name.to_string(), generator(&["FF.W"], &[]));
    }
    cfg
}

#[tokio::test]
async fn slowest_high_priority_product_still_goes_first() {
    let dir = TempDir::new().unwrap();
    let cfg = warning_config(dir.path(), OperatingMode::Operational);
    let fx = Fixture::open(
        dir,
        &cfg,
        ScriptedEngine::new()
            .produces("FFW", vec![product("FFW", &["HZ-1"])])
            .produces("FLW", vec![product("FLW", &["HZ-1"])])
            .produces("FFS", vec![product("FFS", &["HZ-1"])])
            .produces("ZZZ", vec![product("ZZZ", &["HZ-1"])])
            .slow("FFW", Duration::from_millis(60))
            .slow("FLW", Duration::from_millis(30)),
        vec![event("HZ-1", "FF.W", HazardStatus::Pending)],
        &["HZ-1"],
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

    assert_eq!(report.disseminated, vec!["FFW", "FLW", "FFS", "ZZZ"]);
    assert_eq!(fx.spooled(), vec!["FFW", "FLW", "FFS", "ZZZ"]);
    assert!(report
        .warnings
        .iter()
        .any(|w| w.contains("ZZZ") && w.contains("priority")));

    let store = fx.session.store().unwrap();
    assert_eq!(store.len(), 4);
    let ffw = store.query("FFW", OperatingMode::Operational, None, None).unwrap();
    assert_eq!(ffw.len(), 1);
    assert!(store
        .query("FFW", OperatingMode::Practice, None, None)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn missing_issue_time_sends_nothing_from_the_batch() {
    let dir = TempDir::new().unwrap();
    let cfg = warning_config(dir.path(), OperatingMode::Practice);
    let mut undated = product("FLW", &["HZ-1"]);
    undated.issue_time = None;
    let fx = Fixture::open(
        dir,
        &cfg,
        ScriptedEngine::new()
            .produces("FFW", vec![product("FFW", &["HZ-1"])])
            .produces("FLW", vec![undated]),
        vec![event("HZ-1", "FF.W", HazardStatus::Pending)],
        &["HZ-1"],
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

    assert!(report.disseminated.is_empty());
    assert!(report.warnings.iter().any(|w| w.contains("no issue time")));
    assert!(fx.spooled().is_empty());
    assert!(fx.session.store().unwrap().is_empty());
    assert!(report.issued_events.is_empty());
    assert_eq!(fx.events.event("HZ-1").unwrap().status, HazardStatus::Pending);
}
