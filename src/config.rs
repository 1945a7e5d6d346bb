//! Configuration System
//!
//! Layered configuration: built-in defaults, the global user file, workspace
//! files, then `HAZPROD__*` environment overrides. Validation collects every
//! problem instead of stopping at the first one.

use crate::error::OrchestrationError;
use crate::generator::{AllowedHazardType, GeneratorDefinition, GeneratorTable};
use crate::hazard::Extent;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

mod loader;

pub use loader::ConfigLoader;

/// Whether products go out for real.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    Operational,
    Practice,
    Test,
}

impl OperatingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            OperatingMode::Operational => "operational",
            OperatingMode::Practice => "practice",
            OperatingMode::Test => "test",
        }
    }

    /// Only operational mode transmits before persisting.
    pub fn is_live(self) -> bool {
        matches!(self, OperatingMode::Operational)
    }
}

impl std::str::FromStr for OperatingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "operational" => Ok(OperatingMode::Operational),
            "practice" => Ok(OperatingMode::Practice),
            "test" => Ok(OperatingMode::Test),
            other => Err(format!("unknown operating mode '{other}'")),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HazprodConfig {
    /// Active site identifier (e.g. "OAX")
    pub site_id: String,

    #[serde(default = "default_mode")]
    pub mode: OperatingMode,

    /// VTEC mode character passed through to generators
    #[serde(default = "default_vtec_mode")]
    pub vtec_mode: String,

    #[serde(default)]
    pub generators: BTreeMap<String, GeneratorConfig>,

    #[serde(default)]
    pub dissemination: DisseminationConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub geography: GeographyConfig,

    #[serde(default)]
    pub conflicts: ConflictConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_mode() -> OperatingMode {
    OperatingMode::Practice
}

fn default_vtec_mode() -> String {
    "O".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub hazard_types: Vec<String>,
    /// Subset of `hazard_types` whose active events are offered as candidates
    #[serde(default)]
    pub include_all: Vec<String>,
    #[serde(default)]
    pub formats: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisseminationConfig {
    /// Product-type codes (PILs) in dissemination order
    #[serde(default)]
    pub priority: Vec<String>,
    /// Spool directory for outbound products; products are only logged when unset
    #[serde(default)]
    pub outbound_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub store_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "hazprod")
        .map(|dirs| dirs.data_dir().join("products"))
        .unwrap_or_else(|| PathBuf::from(".hazprod/products"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base URL of the generation engine service
    pub endpoint: String,
    #[serde(default = "default_engine_timeout")]
    pub timeout_secs: u64,
}

fn default_engine_timeout() -> u64 {
    120
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9580".to_string(),
            timeout_secs: default_engine_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeographyConfig {
    /// Hazard types whose polygons are described by portion of county/state
    #[serde(default)]
    pub county_hazard_types: Vec<String>,
    #[serde(default)]
    pub county_extent: Option<Extent>,
    #[serde(default)]
    pub state_extent: Option<Extent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConflictConfig {
    /// Hazard type pairs that must not overlap
    #[serde(default)]
    pub pairs: Vec<(String, String)>,
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Site(String),
    Generator(String, String),
    Dissemination(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Site(msg) => write!(f, "Site: {}", msg),
            ValidationError::Generator(name, msg) => write!(f, "Generator '{}': {}", name, msg),
            ValidationError::Dissemination(msg) => write!(f, "Dissemination: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl GeneratorConfig {
    fn validate(&self) -> Result<(), String> {
        if self.hazard_types.is_empty() {
            return Err("must allow at least one hazard type".to_string());
        }
        if let Some(stray) = self
            .include_all
            .iter()
            .find(|t| !self.hazard_types.contains(t))
        {
            return Err(format!(
                "include_all type '{}' is not in hazard_types",
                stray
            ));
        }
        Ok(())
    }

    pub fn to_definition(&self, name: &str) -> GeneratorDefinition {
        GeneratorDefinition {
            name: name.to_string(),
            hazard_types: self
                .hazard_types
                .iter()
                .map(|t| AllowedHazardType {
                    hazard_type: t.clone(),
                    include_all: self.include_all.contains(t),
                })
                .collect(),
            formats: if self.formats.is_empty() {
                vec!["Legacy".to_string()]
            } else {
                self.formats.clone()
            },
        }
    }
}

impl HazprodConfig {
    pub fn new(site_id: impl Into<String>) -> Self {
        Self {
            site_id: site_id.into(),
            mode: default_mode(),
            vtec_mode: default_vtec_mode(),
            generators: BTreeMap::new(),
            dissemination: DisseminationConfig::default(),
            storage: StorageConfig::default(),
            engine: EngineConfig::default(),
            geography: GeographyConfig::default(),
            conflicts: ConflictConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn generator_table(&self) -> GeneratorTable {
        GeneratorTable::new(
            self.generators
                .iter()
                .map(|(name, generator)| generator.to_definition(name)),
        )
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.site_id.trim().is_empty() {
            errors.push(ValidationError::Site("site_id cannot be empty".to_string()));
        }

        for (name, generator) in &self.generators {
            if let Err(e) = generator.validate() {
                errors.push(ValidationError::Generator(name.clone(), e));
            }
        }

        let mut seen = HashSet::new();
        for pil in &self.dissemination.priority {
            if pil.trim().is_empty() {
                errors.push(ValidationError::Dissemination(
                    "priority table contains an empty entry".to_string(),
                ));
            } else if !seen.insert(pil.as_str()) {
                errors.push(ValidationError::Dissemination(format!(
                    "priority table lists '{}' more than once",
                    pil
                )));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold all problems into a single error.
    pub fn validated(self) -> Result<Self, OrchestrationError> {
        self.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            OrchestrationError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })?;
        Ok(self)
    }
}
