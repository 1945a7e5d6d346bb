//! Per-session handler factory.
//!
//! Each product session owns one instance per handler type, created on first
//! use and looked up by type afterwards. Nothing is process-global: two
//! sessions never share a handler.

use crate::affinity::AffinityExecutor;
use crate::config::HazprodConfig;
use crate::conflict::{ConflictDetector, NoConflictDetector, TableConflictDetector};
use crate::dissemination::{Disseminator, LoggingSender, ProductSender, SpoolSender};
use crate::engine::GenerationEngine;
use crate::error::OrchestrationError;
use crate::notify::NotificationBus;
use crate::orchestrator::{IssueConfirmer, Orchestrator, OrchestratorParts};
use crate::payload::{CompassPortionDescriber, PayloadBuilder};
use crate::session::SessionEventManager;
use crate::store::{ProductRecordStore, SledProductStore};
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Lookup table of handler instances keyed by their type.
#[derive(Default)]
pub struct HandlerFactory {
    instances: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl HandlerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The session's instance of `T`, created with `create` on first request.
    pub fn get_or_create<T, F>(&self, create: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let mut instances = self.instances.lock();
        if let Some(existing) = instances.get(&TypeId::of::<T>()) {
            if let Ok(instance) = Arc::clone(existing).downcast::<T>() {
                return instance;
            }
        }
        let instance = Arc::new(create());
        instances.insert(TypeId::of::<T>(), instance.clone() as Arc<dyn Any + Send + Sync>);
        instance
    }

    /// Fallible variant of [`get_or_create`](Self::get_or_create).
    pub fn try_get_or_create<T, F, E>(&self, create: F) -> Result<Arc<T>, E>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(existing) = self.get::<T>() {
            return Ok(existing);
        }
        let created = Arc::new(create()?);
        let mut instances = self.instances.lock();
        let entry = instances
            .entry(TypeId::of::<T>())
            .or_insert_with(|| created.clone() as Arc<dyn Any + Send + Sync>);
        Ok(Arc::clone(entry).downcast::<T>().unwrap_or(created))
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let instances = self.instances.lock();
        let existing = instances.get(&TypeId::of::<T>())?;
        Arc::clone(existing).downcast::<T>().ok()
    }

    pub fn len(&self) -> usize {
        self.instances.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything one product-generation session needs, wired from configuration.
pub struct ProductSession {
    handlers: HandlerFactory,
    orchestrator: Orchestrator,
    affinity_task: JoinHandle<()>,
}

impl ProductSession {
    /// Assemble a session. Must be called within a tokio runtime.
    pub fn open(
        config: &HazprodConfig,
        session: Arc<dyn SessionEventManager>,
        engine: Arc<dyn GenerationEngine>,
        confirmer: Arc<dyn IssueConfirmer>,
    ) -> Result<Self, OrchestrationError> {
        let handlers = HandlerFactory::new();

        let bus = handlers.get_or_create(NotificationBus::new);
        let store = handlers.try_get_or_create(|| SledProductStore::open(&config.storage.store_path))?;
        let sender: Arc<dyn ProductSender> = match &config.dissemination.outbound_dir {
            Some(dir) => handlers.try_get_or_create(|| SpoolSender::new(dir))?,
            None => handlers.get_or_create(LoggingSender::new),
        };
        let conflicts: Arc<dyn ConflictDetector> = if config.conflicts.pairs.is_empty() {
            handlers.get_or_create(|| NoConflictDetector)
        } else {
            handlers.get_or_create(|| TableConflictDetector::from_config(&config.conflicts))
        };
        let (affinity, affinity_task) = AffinityExecutor::spawn();

        let mut payloads = PayloadBuilder::new(&config.site_id, config.mode, &config.vtec_mode);
        if let Some(describer) = CompassPortionDescriber::from_config(&config.geography) {
            payloads = payloads.with_portions(config.geography.county_hazard_types.clone(), Arc::new(describer));
        }

        let store_handle: Arc<dyn ProductRecordStore> = store.clone();
        let disseminator = Disseminator::new(
            config.dissemination.priority.clone(),
            config.mode,
            sender,
            Arc::clone(&store_handle),
        );

        let orchestrator = Orchestrator::new(OrchestratorParts {
            generators: config.generator_table(),
            session,
            engine,
            payloads,
            disseminator,
            store: store_handle,
            bus,
            affinity,
            conflicts,
            confirmer,
        });

        info!(
            site_id = %config.site_id,
            mode = config.mode.as_str(),
            generators = config.generators.len(),
            handlers = handlers.len(),
            "Product session opened"
        );
        Ok(Self {
            handlers,
            orchestrator,
            affinity_task,
        })
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn handlers(&self) -> &HandlerFactory {
        &self.handlers
    }

    pub fn bus(&self) -> Option<Arc<NotificationBus>> {
        self.handlers.get::<NotificationBus>()
    }

    pub fn store(&self) -> Option<Arc<SledProductStore>> {
        self.handlers.get::<SledProductStore>()
    }

    /// Shut the orchestrator down and stop the affinity executor.
    pub async fn close(self) {
        self.orchestrator.shutdown().await;
        self.affinity_task.abort();
        if let Some(store) = self.handlers.get::<SledProductStore>() {
            let _ = store.flush();
        }
    }
}
