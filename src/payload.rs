//! Event payload construction for generator calls.
//!
//! A payload carries the batch context (time, site, modes, staging values)
//! and a sanitized copy of every event the generator should format.

use crate::config::{GeographyConfig, OperatingMode};
use crate::generator::{GeneratorInfo, StagingValues};
use crate::hazard::{Extent, HazardRecord, ShapeKind, STALE_ISSUANCE_ATTRIBUTES};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where a polygon sits within its county and state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortionDescription {
    pub county: String,
    pub state: String,
}

/// One event as handed to a generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadEvent {
    pub record: HazardRecord,
    pub shape: ShapeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portion: Option<PortionDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub creation_time: DateTime<Utc>,
    pub site_id: String,
    pub mode: OperatingMode,
    pub vtec_mode: String,
    pub issue: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging_values: Option<StagingValues>,
    pub events: Vec<PayloadEvent>,
}

/// Describes the portion of county/state a polygon covers.
pub trait PortionDescriber: Send + Sync {
    fn describe(&self, record: &HazardRecord) -> Option<PortionDescription>;
}

/// Compass-sector description of a polygon centroid within configured
/// county and state extents.
pub struct CompassPortionDescriber {
    county_extent: Extent,
    state_extent: Extent,
}

impl CompassPortionDescriber {
    pub fn new(county_extent: Extent, state_extent: Extent) -> Self {
        Self {
            county_extent,
            state_extent,
        }
    }

    pub fn from_config(geography: &GeographyConfig) -> Option<Self> {
        Some(Self::new(geography.county_extent?, geography.state_extent?))
    }
}

impl PortionDescriber for CompassPortionDescriber {
    fn describe(&self, record: &HazardRecord) -> Option<PortionDescription> {
        let centroid = record.geometry.centroid()?;
        let (county_ns, county_ew) = sector(&self.county_extent, centroid.lon, centroid.lat);
        let (state_ns, state_ew) = sector(&self.state_extent, centroid.lon, centroid.lat);
        Some(PortionDescription {
            county: county_words(county_ns, county_ew),
            state: state_words(state_ns, state_ew),
        })
    }
}

fn third(value: f64, min: f64, max: f64) -> usize {
    let span = max - min;
    if span <= 0.0 {
        return 1;
    }
    let position = ((value - min) / span).clamp(0.0, 1.0);
    if position < 1.0 / 3.0 {
        0
    } else if position < 2.0 / 3.0 {
        1
    } else {
        2
    }
}

/// (north/central/south, west/central/east) as indices into the word tables.
fn sector(extent: &Extent, lon: f64, lat: f64) -> (usize, usize) {
    let ns = 2 - third(lat, extent.min_lat, extent.max_lat);
    let ew = third(lon, extent.min_lon, extent.max_lon);
    (ns, ew)
}

fn county_words(ns: usize, ew: usize) -> String {
    const NS: [&str; 3] = ["north", "", "south"];
    const EW: [&str; 3] = ["west", "", "east"];
    match (NS[ns], EW[ew]) {
        ("", "") => "central".to_string(),
        (ns, "") => format!("{ns}ern"),
        ("", ew) => format!("{ew}ern"),
        (ns, ew) => format!("{ns}{ew}ern"),
    }
}

fn state_words(ns: usize, ew: usize) -> String {
    const NS: [&str; 3] = ["north", "", "south"];
    const EW: [&str; 3] = ["west", "", "east"];
    match (NS[ns], EW[ew]) {
        ("", "") => "central".to_string(),
        (ns, "") => format!("{ns} central"),
        ("", ew) => format!("{ew} central"),
        (ns, ew) => format!("{ns}{ew}"),
    }
}

/// Builds payloads with a fixed batch context.
#[derive(Clone)]
pub struct PayloadBuilder {
    site_id: String,
    mode: OperatingMode,
    vtec_mode: String,
    county_hazard_types: Vec<String>,
    describer: Option<Arc<dyn PortionDescriber>>,
}

impl PayloadBuilder {
    pub fn new(site_id: impl Into<String>, mode: OperatingMode, vtec_mode: impl Into<String>) -> Self {
        Self {
            site_id: site_id.into(),
            mode,
            vtec_mode: vtec_mode.into(),
            county_hazard_types: Vec::new(),
            describer: None,
        }
    }

    pub fn with_portions(
        mut self,
        county_hazard_types: Vec<String>,
        describer: Arc<dyn PortionDescriber>,
    ) -> Self {
        self.county_hazard_types = county_hazard_types;
        self.describer = Some(describer);
        self
    }

    pub fn set_site(&mut self, site_id: impl Into<String>) {
        self.site_id = site_id.into();
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    /// Payload for one generator's call; staging values are carried verbatim.
    pub fn build(&self, info: &GeneratorInfo, issue: bool, now: DateTime<Utc>) -> EventPayload {
        EventPayload {
            creation_time: now,
            site_id: self.site_id.clone(),
            mode: self.mode,
            vtec_mode: self.vtec_mode.clone(),
            issue,
            staging_values: info.staging_values.clone(),
            events: info
                .selected_events
                .iter()
                .map(|event| self.payload_event(event, issue))
                .collect(),
        }
    }

    fn payload_event(&self, event: &HazardRecord, issue: bool) -> PayloadEvent {
        let mut record = event.clone();
        if issue {
            record.clear_attributes(STALE_ISSUANCE_ATTRIBUTES);
        }
        let shape = record.geometry.shape_kind();
        let portion = match (&self.describer, record.hazard_type()) {
            (Some(describer), Some(hazard_type))
                if shape == ShapeKind::Area && self.county_hazard_types.contains(&hazard_type) =>
            {
                describer.describe(&record)
            }
            _ => None,
        };
        PayloadEvent {
            record,
            shape,
            portion,
        }
    }
}
