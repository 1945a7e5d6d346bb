//! Hazard records as seen by product generation.
//!
//! Records are owned by the session's event manager; generation only reads
//! them, builds sanitized copies for payloads, and hands updates back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Attributes left behind by a prior issuance; stripped from payload copies
/// when an event is about to be (re)issued, and from the session copy when
/// the generator hands back no updated record.
pub const STALE_ISSUANCE_ATTRIBUTES: &[&str] = &[
    "replaces",
    "issueTime",
    "expirationTime",
    "vtecCodes",
    "etns",
    "pils",
];

/// Cleared from the session copy once issuance completes.
pub const CONSUMED_BY_ISSUANCE_ATTRIBUTES: &[&str] = &["replaces"];

/// Lifecycle status of a hazard event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HazardStatus {
    Potential,
    Pending,
    Proposed,
    Issued,
    Ending,
    Ended,
    Elapsed,
}

impl HazardStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HazardStatus::Potential => "POTENTIAL",
            HazardStatus::Pending => "PENDING",
            HazardStatus::Proposed => "PROPOSED",
            HazardStatus::Issued => "ISSUED",
            HazardStatus::Ending => "ENDING",
            HazardStatus::Ended => "ENDED",
            HazardStatus::Elapsed => "ELAPSED",
        }
    }

    /// Statuses that can never be swept in as include-all candidates.
    pub fn is_inactive(self) -> bool {
        matches!(
            self,
            HazardStatus::Potential | HazardStatus::Elapsed | HazardStatus::Ended
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, HazardStatus::Elapsed | HazardStatus::Ended)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub lon: f64,
    pub lat: f64,
}

impl Coord {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// Axis-aligned extent in lon/lat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl Extent {
    pub fn intersects(&self, other: &Extent) -> bool {
        self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
            && self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
    }

    fn include(&mut self, coord: &Coord) {
        self.min_lon = self.min_lon.min(coord.lon);
        self.min_lat = self.min_lat.min(coord.lat);
        self.max_lon = self.max_lon.max(coord.lon);
        self.max_lat = self.max_lat.max(coord.lat);
    }

    fn around(coord: &Coord) -> Self {
        Self {
            min_lon: coord.lon,
            min_lat: coord.lat,
            max_lon: coord.lon,
            max_lat: coord.lat,
        }
    }
}

/// Geometry attached to a hazard event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Coord),
    Line(Vec<Coord>),
    Polygon(Vec<Coord>),
    Collection(Vec<Geometry>),
}

/// Coarse shape classification passed to generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Point,
    Line,
    Area,
    Mixed,
}

impl Geometry {
    /// A collection takes its members' common kind, or `Mixed`.
    pub fn shape_kind(&self) -> ShapeKind {
        match self {
            Geometry::Point(_) => ShapeKind::Point,
            Geometry::Line(_) => ShapeKind::Line,
            Geometry::Polygon(_) => ShapeKind::Area,
            Geometry::Collection(parts) => {
                let mut kinds = parts.iter().map(Geometry::shape_kind);
                match kinds.next() {
                    None => ShapeKind::Mixed,
                    Some(first) => {
                        if kinds.all(|kind| kind == first) {
                            first
                        } else {
                            ShapeKind::Mixed
                        }
                    }
                }
            }
        }
    }

    pub fn is_polygonal(&self) -> bool {
        self.shape_kind() == ShapeKind::Area
    }

    fn coords(&self) -> Vec<Coord> {
        match self {
            Geometry::Point(c) => vec![*c],
            Geometry::Line(cs) | Geometry::Polygon(cs) => cs.clone(),
            Geometry::Collection(parts) => parts.iter().flat_map(Geometry::coords).collect(),
        }
    }

    pub fn extent(&self) -> Option<Extent> {
        let coords = self.coords();
        let mut iter = coords.iter();
        let mut extent = Extent::around(iter.next()?);
        for coord in iter {
            extent.include(coord);
        }
        Some(extent)
    }

    /// Vertex centroid; good enough for portion descriptions.
    pub fn centroid(&self) -> Option<Coord> {
        let coords = self.coords();
        if coords.is_empty() {
            return None;
        }
        let n = coords.len() as f64;
        let (lon, lat) = coords
            .iter()
            .fold((0.0, 0.0), |(lon, lat), c| (lon + c.lon, lat + c.lat));
        Some(Coord::new(lon / n, lat / n))
    }
}

/// A hazard event referenced by product generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardRecord {
    pub event_id: String,
    pub site_id: String,
    pub phenomenon: Option<String>,
    pub significance: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    pub status: HazardStatus,
    pub geometry: Geometry,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl HazardRecord {
    pub fn new(
        event_id: impl Into<String>,
        site_id: impl Into<String>,
        hazard_type: &str,
        status: HazardStatus,
        geometry: Geometry,
    ) -> Self {
        let mut parts = hazard_type.splitn(3, '.');
        let phenomenon = parts.next().filter(|p| !p.is_empty()).map(str::to_string);
        let significance = parts.next().map(str::to_string);
        let subtype = parts.next().map(str::to_string);
        Self {
            event_id: event_id.into(),
            site_id: site_id.into(),
            phenomenon,
            significance,
            subtype,
            status,
            geometry,
            attributes: Map::new(),
            selected: false,
            start_time: None,
            end_time: None,
        }
    }

    /// `PHEN.SIG[.SUBTYPE]`, or `None` while the type is still unassigned.
    pub fn hazard_type(&self) -> Option<String> {
        let phen = self.phenomenon.as_deref()?;
        let sig = self.significance.as_deref()?;
        Some(match self.subtype.as_deref() {
            Some(sub) if !sub.is_empty() => format!("{phen}.{sig}.{sub}"),
            _ => format!("{phen}.{sig}"),
        })
    }

    pub fn clear_attributes(&mut self, keys: &[&str]) {
        for key in keys {
            self.attributes.remove(*key);
        }
    }

    pub fn with_selected(mut self, selected: bool) -> Self {
        self.selected = selected;
        self
    }
}
