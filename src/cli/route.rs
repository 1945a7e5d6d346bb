//! CLI route: single route table and run context.

use crate::cli::help::command_name;
use crate::cli::parse::{Commands, ConfigCommands, ProductCommands};
use crate::cli::presentation::{
    format_order_text, format_record_json, format_record_list_json, format_record_list_text,
    format_record_text, format_validation_text,
};
use crate::config::{ConfigLoader, HazprodConfig, OperatingMode};
use crate::dissemination::order_by_priority;
use crate::error::{OrchestrationError, StorageError};
use crate::store::{GeneratedProductRecord, ProductRecordStore, SledProductStore};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::{debug, info};

/// Runtime context for CLI execution: workspace and loaded configuration.
/// The product store is opened on demand so `config` commands never touch it.
pub struct RunContext {
    workspace_root: PathBuf,
    config: HazprodConfig,
    store: OnceLock<SledProductStore>,
}

impl RunContext {
    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, OrchestrationError> {
        let config = if let Some(ref cfg_path) = config_path {
            ConfigLoader::load_from_file(cfg_path)?
        } else {
            ConfigLoader::load(&workspace_root)?
        };
        Ok(Self::from_config(workspace_root, config))
    }

    pub fn from_config(workspace_root: PathBuf, config: HazprodConfig) -> Self {
        Self {
            workspace_root,
            config,
            store: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &HazprodConfig {
        &self.config
    }

    /// Store path with relative paths resolved against the workspace root.
    pub fn store_path(&self) -> PathBuf {
        resolve(&self.workspace_root, &self.config.storage.store_path)
    }

    /// The product store, opened on first use.
    pub fn store(&self) -> Result<&SledProductStore, OrchestrationError> {
        if let Some(store) = self.store.get() {
            return Ok(store);
        }
        let opened = SledProductStore::open(self.store_path())?;
        Ok(self.store.get_or_init(|| opened))
    }

    /// Execute a command and return its rendered output.
    pub fn execute(&self, command: &Commands) -> Result<String, OrchestrationError> {
        let started = Instant::now();
        let name = command_name(command);
        debug!(command = %name, "Executing command");

        let result = match command {
            Commands::Products { command } => self.handle_products(command),
            Commands::Order { pils } => Ok(self.handle_order(pils)),
            Commands::Config { command } => match command {
                ConfigCommands::Validate => Ok(format_validation_text(&self.config.validate())),
                ConfigCommands::Show => toml::to_string_pretty(&self.config).map_err(|e| {
                    OrchestrationError::ConfigError(format!("Failed to render configuration: {}", e))
                }),
            },
        };

        info!(
            command = %name,
            ok = result.is_ok(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        result
    }

    fn handle_products(&self, command: &ProductCommands) -> Result<String, OrchestrationError> {
        let store = self.store()?;
        match command {
            ProductCommands::List {
                generator,
                mode,
                since,
                until,
                format,
            } => {
                let mode = match mode {
                    Some(m) => m.parse::<OperatingMode>().map_err(OrchestrationError::ConfigError)?,
                    None => self.config.mode,
                };
                let from = parse_time(since.as_deref())?;
                let to = parse_time(until.as_deref())?;
                let records = match generator {
                    Some(name) => store.query(name, mode, from, to)?,
                    None => store
                        .list_all()?
                        .into_iter()
                        .filter(|r| r.mode == mode && in_range(r, from, to))
                        .collect(),
                };
                match format.as_str() {
                    "json" => format_record_list_json(&records),
                    _ => Ok(format_record_list_text(&records)),
                }
            }
            ProductCommands::Show { record_id, format } => {
                let record = store
                    .get(record_id)?
                    .ok_or_else(|| StorageError::RecordNotFound(record_id.clone()))?;
                match format.as_str() {
                    "json" => format_record_json(&record),
                    _ => Ok(format_record_text(&record)),
                }
            }
        }
    }

    fn handle_order(&self, pils: &[String]) -> String {
        let (ordered, missing) = order_by_priority(
            pils.to_vec(),
            &self.config.dissemination.priority,
            |pil: &String| pil.as_str(),
        );
        format_order_text(&ordered, &missing)
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn parse_time(value: Option<&str>) -> Result<Option<DateTime<Utc>>, OrchestrationError> {
    value
        .map(|v| {
            DateTime::parse_from_rfc3339(v)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| OrchestrationError::ConfigError(format!("Invalid time '{}': {}", v, e)))
        })
        .transpose()
}

fn in_range(record: &GeneratedProductRecord, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
    from.map_or(true, |f| record.issue_time >= f) && to.map_or(true, |t| record.issue_time <= t)
}
