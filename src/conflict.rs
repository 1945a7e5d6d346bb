//! Advisory conflict detection between hazards about to be issued and the
//! rest of the session.
//!
//! Conflicts are reported as warnings; lookup failures are logged and
//! swallowed so issuance is never blocked.

use crate::config::ConflictConfig;
use crate::error::OrchestrationError;
use crate::hazard::HazardRecord;
use crate::logging::STATUS_TARGET;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub event_id: String,
    pub hazard_type: String,
    pub other_event_id: String,
    pub other_hazard_type: String,
}

impl Conflict {
    pub fn describe(&self) -> String {
        format!(
            "{} ({}) conflicts with {} ({})",
            self.event_id, self.hazard_type, self.other_event_id, self.other_hazard_type
        )
    }
}

pub trait ConflictDetector: Send + Sync {
    fn detect(
        &self,
        events: &[HazardRecord],
        others: &[HazardRecord],
    ) -> Result<Vec<Conflict>, OrchestrationError>;
}

/// Never reports anything.
pub struct NoConflictDetector;

impl ConflictDetector for NoConflictDetector {
    fn detect(&self, _: &[HazardRecord], _: &[HazardRecord]) -> Result<Vec<Conflict>, OrchestrationError> {
        Ok(Vec::new())
    }
}

/// Conflicting type pairs from configuration, matched on overlapping extents.
pub struct TableConflictDetector {
    pairs: HashSet<(String, String)>,
}

impl TableConflictDetector {
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut table = HashSet::new();
        for (a, b) in pairs {
            table.insert((b.clone(), a.clone()));
            table.insert((a, b));
        }
        Self { pairs: table }
    }

    pub fn from_config(config: &ConflictConfig) -> Self {
        Self::new(config.pairs.iter().cloned())
    }

    fn conflicting(&self, a: &str, b: &str) -> bool {
        self.pairs.contains(&(a.to_string(), b.to_string()))
    }
}

impl ConflictDetector for TableConflictDetector {
    fn detect(
        &self,
        events: &[HazardRecord],
        others: &[HazardRecord],
    ) -> Result<Vec<Conflict>, OrchestrationError> {
        let mut conflicts = Vec::new();
        for event in events {
            let Some(hazard_type) = event.hazard_type() else {
                continue;
            };
            let extent = event.geometry.extent().ok_or_else(|| {
                OrchestrationError::ConflictDetection(format!("event {} has no geometry", event.event_id))
            })?;
            for other in others {
                if other.event_id == event.event_id || other.status.is_inactive() {
                    continue;
                }
                let Some(other_type) = other.hazard_type() else {
                    continue;
                };
                if !self.conflicting(&hazard_type, &other_type) {
                    continue;
                }
                let overlaps = other
                    .geometry
                    .extent()
                    .map(|e| e.intersects(&extent))
                    .unwrap_or(false);
                if overlaps {
                    conflicts.push(Conflict {
                        event_id: event.event_id.clone(),
                        hazard_type: hazard_type.clone(),
                        other_event_id: other.event_id.clone(),
                        other_hazard_type: other_type,
                    });
                }
            }
        }
        Ok(conflicts)
    }
}

/// Run a detector, logging instead of failing.
pub fn advisory_conflicts(
    detector: &dyn ConflictDetector,
    events: &[HazardRecord],
    others: &[HazardRecord],
) -> Vec<Conflict> {
    match detector.detect(events, others) {
        Ok(conflicts) => {
            for conflict in &conflicts {
                warn!(target: STATUS_TARGET, conflict = %conflict.describe(), "Hazard conflict");
            }
            conflicts
        }
        Err(err) => {
            warn!(target: STATUS_TARGET, error = %err, "Conflict detection failed; continuing");
            Vec::new()
        }
    }
}
