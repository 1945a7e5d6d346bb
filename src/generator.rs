//! Generator definitions and the per-batch GeneratorInfo value object.

use crate::hazard::HazardRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// User-supplied staging field values, keyed by field name.
pub type StagingValues = Map<String, Value>;

/// One hazard type a generator accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedHazardType {
    pub hazard_type: String,
    /// Sweep every active event of this type into the batch as a candidate.
    #[serde(default)]
    pub include_all: bool,
}

/// Static description of a product generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorDefinition {
    pub name: String,
    pub hazard_types: Vec<AllowedHazardType>,
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,
}

fn default_formats() -> Vec<String> {
    vec!["Legacy".to_string()]
}

impl GeneratorDefinition {
    pub fn new(name: impl Into<String>, hazard_types: &[&str]) -> Self {
        Self {
            name: name.into(),
            hazard_types: hazard_types
                .iter()
                .map(|t| AllowedHazardType {
                    hazard_type: (*t).to_string(),
                    include_all: false,
                })
                .collect(),
            formats: default_formats(),
        }
    }

    pub fn with_include_all(mut self, hazard_type: &str) -> Self {
        for allowed in &mut self.hazard_types {
            if allowed.hazard_type == hazard_type {
                allowed.include_all = true;
            }
        }
        self
    }

    pub fn allows(&self, hazard_type: &str) -> bool {
        self.hazard_types.iter().any(|t| t.hazard_type == hazard_type)
    }

    pub fn include_all_types(&self) -> impl Iterator<Item = &str> {
        self.hazard_types
            .iter()
            .filter(|t| t.include_all)
            .map(|t| t.hazard_type.as_str())
    }
}

/// Known generators keyed by name; iteration order is name order.
#[derive(Debug, Clone, Default)]
pub struct GeneratorTable {
    generators: BTreeMap<String, GeneratorDefinition>,
}

impl GeneratorTable {
    pub fn new(definitions: impl IntoIterator<Item = GeneratorDefinition>) -> Self {
        Self {
            generators: definitions
                .into_iter()
                .map(|d| (d.name.clone(), d))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&GeneratorDefinition> {
        self.generators.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GeneratorDefinition> {
        self.generators.values()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }
}

/// Identity of one GeneratorInfo within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GeneratorInfoId(u64);

impl GeneratorInfoId {
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        GeneratorInfoId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// An editable region of a generated product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditableEntry {
    pub key: String,
    pub value: Value,
}

/// One finished product returned by a generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedProduct {
    /// Short product-type code used as the dissemination priority key.
    pub pil: String,
    #[serde(default)]
    pub issue_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub event_ids: Vec<String>,
    /// Formatted output keyed by format name.
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub editable_entries: Vec<EditableEntry>,
}

/// Everything a generator hands back for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedProductList {
    pub generator_name: String,
    pub products: Vec<GeneratedProduct>,
    /// Event copies as updated by the generator (status, VTEC, ETNs...).
    #[serde(default)]
    pub updated_events: Vec<HazardRecord>,
    /// Key for a later correction re-run.
    #[serde(default)]
    pub correction_key: Option<String>,
}

/// A generator's role within one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorInfo {
    pub id: GeneratorInfoId,
    pub generator_name: String,
    pub selected_events: Vec<HazardRecord>,
    pub candidate_events: Vec<HazardRecord>,
    pub formats: Vec<String>,
    pub staging_values: Option<StagingValues>,
    pub generated: Option<GeneratedProductList>,
    pub error: Option<String>,
}

impl GeneratorInfo {
    pub fn new(definition: &GeneratorDefinition) -> Self {
        Self {
            id: GeneratorInfoId::next(),
            generator_name: definition.name.clone(),
            selected_events: Vec::new(),
            candidate_events: Vec::new(),
            formats: definition.formats.clone(),
            staging_values: None,
            generated: None,
            error: None,
        }
    }

    pub fn has_selected(&self, event_id: &str) -> bool {
        self.selected_events.iter().any(|e| e.event_id == event_id)
    }

    pub fn add_selected(&mut self, event: HazardRecord) {
        if !self.has_selected(&event.event_id) {
            self.selected_events.push(event);
        }
    }

    /// Candidates the user has not already selected.
    pub fn open_candidates(&self) -> impl Iterator<Item = &HazardRecord> {
        self.candidate_events
            .iter()
            .filter(|c| !self.has_selected(&c.event_id))
    }

    /// Replace the selection with the named events, drawn from the current
    /// selection and the candidates. Unknown ids are ignored.
    pub fn retain_events(&mut self, event_ids: &[String]) {
        let mut kept: Vec<HazardRecord> = Vec::with_capacity(event_ids.len());
        for event in self.selected_events.iter().chain(self.candidate_events.iter()) {
            if event_ids.contains(&event.event_id) && !kept.iter().any(|k| k.event_id == event.event_id) {
                kept.push(event.clone());
            }
        }
        self.selected_events = kept;
    }

    pub fn event_ids(&self) -> Vec<String> {
        self.selected_events
            .iter()
            .map(|e| e.event_id.clone())
            .collect()
    }

    pub fn succeeded(&self) -> bool {
        self.generated.is_some() && self.error.is_none()
    }
}
