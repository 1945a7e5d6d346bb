//! Shared fixtures: a scriptable engine and a session wired from configuration.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hazprod::config::{GeneratorConfig, HazprodConfig, OperatingMode};
use hazprod::engine::GenerationEngine;
use hazprod::error::EngineError;
use hazprod::generator::{GeneratedProduct, GeneratedProductList, StagingValues};
use hazprod::hazard::{Coord, Geometry, HazardRecord, HazardStatus};
use hazprod::orchestrator::CountingConfirmer;
use hazprod::payload::EventPayload;
use hazprod::session::InMemoryEventManager;
use hazprod::ProductSession;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Serializes tests that read or write process environment variables.
pub static ENV_LOCK: Mutex<()> = parking_lot::const_mutex(());

pub fn issue_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 18, 30, 0).unwrap()
}

pub fn event(id: &str, hazard_type: &str, status: HazardStatus) -> HazardRecord {
    HazardRecord::new(
        id,
        "OAX",
        hazard_type,
        status,
        Geometry::Polygon(vec![
            Coord::new(-96.2, 41.1),
            Coord::new(-95.8, 41.1),
            Coord::new(-95.8, 41.5),
            Coord::new(-96.2, 41.5),
        ]),
    )
}

pub fn product(pil: &str, event_ids: &[&str]) -> GeneratedProduct {
    let mut data = Map::new();
    data.insert("Legacy".to_string(), json!(format!("{pil} PRODUCT TEXT")));
    GeneratedProduct {
        pil: pil.to_string(),
        issue_time: Some(issue_time()),
        event_ids: event_ids.iter().map(|id| id.to_string()).collect(),
        data,
        editable_entries: Vec::new(),
    }
}

enum Script {
    Products(Vec<GeneratedProduct>),
    Fail(String),
}

/// Engine whose per-generator answers are set up front.
#[derive(Default)]
pub struct ScriptedEngine {
    scripts: Mutex<HashMap<String, Script>>,
    dialogs: Mutex<HashMap<String, Value>>,
    delays: Mutex<HashMap<String, Duration>>,
    pub calls: Mutex<Vec<String>>,
    pub staging_seen: Mutex<Vec<(String, Option<StagingValues>)>>,
    pub payload_events: Mutex<Vec<(String, Vec<String>)>>,
    pub corrections: Mutex<Vec<(String, String)>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn produces(self, generator: &str, products: Vec<GeneratedProduct>) -> Self {
        self.scripts
            .lock()
            .insert(generator.to_string(), Script::Products(products));
        self
    }

    pub fn fails(self, generator: &str, message: &str) -> Self {
        self.scripts
            .lock()
            .insert(generator.to_string(), Script::Fail(message.to_string()));
        self
    }

    pub fn asks(self, generator: &str, fields: Value) -> Self {
        self.dialogs.lock().insert(generator.to_string(), fields);
        self
    }

    pub fn slow(self, generator: &str, delay: Duration) -> Self {
        self.delays.lock().insert(generator.to_string(), delay);
        self
    }
}

#[async_trait]
impl GenerationEngine for ScriptedEngine {
    async fn generate(
        &self,
        generator: &str,
        payload: &EventPayload,
        staging: Option<&StagingValues>,
        _formats: &[String],
    ) -> Result<GeneratedProductList, EngineError> {
        self.calls.lock().push(generator.to_string());
        self.staging_seen
            .lock()
            .push((generator.to_string(), staging.cloned()));
        self.payload_events.lock().push((
            generator.to_string(),
            payload.events.iter().map(|e| e.record.event_id.clone()).collect(),
        ));
        let delay = self.delays.lock().get(generator).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let products = match self.scripts.lock().get(generator) {
            Some(Script::Fail(message)) => {
                return Err(EngineError::Rejected {
                    generator: generator.to_string(),
                    message: message.clone(),
                })
            }
            Some(Script::Products(products)) => products.clone(),
            None => Vec::new(),
        };
        Ok(GeneratedProductList {
            generator_name: generator.to_string(),
            products,
            updated_events: payload.events.iter().map(|e| e.record.clone()).collect(),
            correction_key: Some(format!("{generator}-correction")),
        })
    }

    async fn update(
        &self,
        generator: &str,
        _payload: &EventPayload,
        existing: &[GeneratedProduct],
        _formats: &[String],
    ) -> Result<GeneratedProductList, EngineError> {
        Ok(GeneratedProductList {
            generator_name: generator.to_string(),
            products: existing.to_vec(),
            updated_events: Vec::new(),
            correction_key: None,
        })
    }

    async fn generate_from(
        &self,
        generator: &str,
        existing: &[GeneratedProduct],
        correction_key: &str,
        _formats: &[String],
    ) -> Result<GeneratedProductList, EngineError> {
        self.corrections
            .lock()
            .push((generator.to_string(), correction_key.to_string()));
        let corrected = existing
            .iter()
            .cloned()
            .map(|mut p| {
                p.issue_time = p.issue_time.map(|t| t + chrono::Duration::minutes(5));
                p
            })
            .collect();
        Ok(GeneratedProductList {
            generator_name: generator.to_string(),
            products: corrected,
            updated_events: Vec::new(),
            correction_key: Some(correction_key.to_string()),
        })
    }

    async fn dialog_info(&self, generator: &str, _payload: &EventPayload) -> Result<Value, EngineError> {
        Ok(self
            .dialogs
            .lock()
            .get(generator)
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn script_file(&self, generator: &str) -> Result<Option<PathBuf>, EngineError> {
        Ok(Some(PathBuf::from(format!("generators/{generator}.py"))))
    }

    async fn set_site(&self, _site_id: &str) -> Result<(), EngineError> {
        Ok(())
    }

    async fn shutdown(&self) {}
}

pub fn generator(types: &[&str], include_all: &[&str]) -> GeneratorConfig {
    GeneratorConfig {
        hazard_types: types.iter().map(|t| t.to_string()).collect(),
        include_all: include_all.iter().map(|t| t.to_string()).collect(),
        formats: Vec::new(),
    }
}

/// Config rooted in `dir`: store under `products/`, spool under `outbound/`.
pub fn config(dir: &Path, mode: OperatingMode) -> HazprodConfig {
    let mut config = HazprodConfig::new("OAX");
    config.mode = mode;
    config.storage.store_path = dir.join("products");
    config.dissemination.outbound_dir = Some(dir.join("outbound"));
    config.dissemination.priority = vec!["FFW".to_string(), "FLW".to_string(), "FFS".to_string()];
    config
}

pub struct Fixture {
    pub session: ProductSession,
    pub engine: Arc<ScriptedEngine>,
    pub events: Arc<InMemoryEventManager>,
    pub confirmer: Arc<CountingConfirmer>,
    pub dir: TempDir,
}

impl Fixture {
    pub fn open(
        dir: TempDir,
        config: &HazprodConfig,
        engine: ScriptedEngine,
        events: Vec<HazardRecord>,
        selected: &[&str],
        confirm: bool,
    ) -> Self {
        let engine = Arc::new(engine);
        let manager = Arc::new(InMemoryEventManager::new(events));
        manager.set_selected(selected);
        let confirmer = Arc::new(CountingConfirmer::new(confirm));
        let session = ProductSession::open(config, manager.clone(), engine.clone(), confirmer.clone())
            .expect("session opens");
        Self {
            session,
            engine,
            events: manager,
            confirmer,
            dir,
        }
    }

    /// PILs of the spooled products in send order.
    pub fn spooled(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.dir.path().join("outbound"))
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .filter(|n| n.ends_with(".json"))
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
            .iter()
            .filter_map(|n| n.trim_end_matches(".json").rsplit('-').next().map(str::to_string))
            .collect()
    }
}
