//! Session event manager contract consumed by product generation.
//!
//! The manager owns the live hazard-record set. Generation reads the current
//! selection from it and, on completion, merges generator-returned updates
//! back and moves events to issued or ended.

use crate::hazard::{HazardRecord, HazardStatus};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Hazard event not found: {0}")]
    EventNotFound(String),
}

/// Read/write access to the session's hazard events.
pub trait SessionEventManager: Send + Sync {
    /// Events currently selected by the user.
    fn selected_events(&self) -> Vec<HazardRecord>;

    /// Every event visible under the active settings.
    fn events_for_current_settings(&self) -> Vec<HazardRecord>;

    fn event(&self, event_id: &str) -> Option<HazardRecord>;

    /// Replace the session copy with an externally updated record.
    fn merge_event(&self, updated: HazardRecord) -> Result<(), SessionError>;

    fn mark_issued(&self, event_id: &str) -> Result<(), SessionError>;

    fn mark_ended(&self, event_id: &str) -> Result<(), SessionError>;

    fn clear_attributes(&self, event_id: &str, keys: &[&str]) -> Result<(), SessionError>;

    /// Recompute UGC-derived attributes ahead of generation, returning the
    /// refreshed record.
    fn update_ugc_attributes(&self, event_id: &str) -> Result<HazardRecord, SessionError>;
}

/// Computes the UGC list for an event; the real mapping lives in the GIS layer.
pub type UgcResolver = dyn Fn(&HazardRecord) -> Vec<String> + Send + Sync;

/// In-memory event manager preserving insertion order.
pub struct InMemoryEventManager {
    events: RwLock<Vec<HazardRecord>>,
    ugc_resolver: Option<Arc<UgcResolver>>,
}

impl InMemoryEventManager {
    pub fn new(events: Vec<HazardRecord>) -> Self {
        Self {
            events: RwLock::new(events),
            ugc_resolver: None,
        }
    }

    pub fn with_ugc_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&HazardRecord) -> Vec<String> + Send + Sync + 'static,
    {
        self.ugc_resolver = Some(Arc::new(resolver));
        self
    }

    pub fn insert(&self, record: HazardRecord) {
        let mut events = self.events.write();
        match events.iter_mut().find(|e| e.event_id == record.event_id) {
            Some(existing) => *existing = record,
            None => events.push(record),
        }
    }

    pub fn set_selected(&self, event_ids: &[&str]) {
        for event in self.events.write().iter_mut() {
            event.selected = event_ids.contains(&event.event_id.as_str());
        }
    }

    fn with_event<R>(
        &self,
        event_id: &str,
        f: impl FnOnce(&mut HazardRecord) -> R,
    ) -> Result<R, SessionError> {
        let mut events = self.events.write();
        let event = events
            .iter_mut()
            .find(|e| e.event_id == event_id)
            .ok_or_else(|| SessionError::EventNotFound(event_id.to_string()))?;
        Ok(f(event))
    }
}

impl SessionEventManager for InMemoryEventManager {
    fn selected_events(&self) -> Vec<HazardRecord> {
        self.events
            .read()
            .iter()
            .filter(|e| e.selected)
            .cloned()
            .collect()
    }

    fn events_for_current_settings(&self) -> Vec<HazardRecord> {
        self.events.read().clone()
    }

    fn event(&self, event_id: &str) -> Option<HazardRecord> {
        self.events
            .read()
            .iter()
            .find(|e| e.event_id == event_id)
            .cloned()
    }

    fn merge_event(&self, updated: HazardRecord) -> Result<(), SessionError> {
        let event_id = updated.event_id.clone();
        self.with_event(&event_id, move |event| {
            let selected = event.selected;
            *event = updated;
            event.selected = selected;
        })
    }

    fn mark_issued(&self, event_id: &str) -> Result<(), SessionError> {
        self.with_event(event_id, |event| event.status = HazardStatus::Issued)
    }

    fn mark_ended(&self, event_id: &str) -> Result<(), SessionError> {
        self.with_event(event_id, |event| event.status = HazardStatus::Ended)
    }

    fn clear_attributes(&self, event_id: &str, keys: &[&str]) -> Result<(), SessionError> {
        self.with_event(event_id, |event| event.clear_attributes(keys))
    }

    fn update_ugc_attributes(&self, event_id: &str) -> Result<HazardRecord, SessionError> {
        let resolver = self.ugc_resolver.clone();
        self.with_event(event_id, move |event| {
            if let Some(resolver) = resolver {
                let ugcs: Vec<Value> = resolver(event).into_iter().map(Value::String).collect();
                event.attributes.insert("ugcs".to_string(), Value::Array(ugcs));
            }
            event.clone()
        })
    }
}
