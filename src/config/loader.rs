//! Config loader: defaults, global file, workspace files, environment.

use super::HazprodConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Loads [`HazprodConfig`] from the layered sources.
#[derive(Debug, Default)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Precedence (lowest to highest): defaults, global config file,
    /// `config/config.toml`, `config/{HAZPROD_ENV}.toml`, `HAZPROD__*` env vars.
    pub fn load(workspace_root: &Path) -> Result<HazprodConfig, ConfigError> {
        let mut builder = builder_with_defaults()?;
        builder = add_global_file(builder);
        builder = add_workspace_files(builder, workspace_root);
        builder = builder.add_source(Environment::with_prefix("HAZPROD").separator("__"));
        builder.build()?.try_deserialize()
    }

    /// Load a single TOML file over the defaults.
    pub fn load_from_file(path: &Path) -> Result<HazprodConfig, ConfigError> {
        builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()))
            .build()?
            .try_deserialize()
    }

    /// Path to the global config file, if a home directory is known.
    pub fn global_config_path() -> Option<PathBuf> {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            return Some(PathBuf::from(xdg).join("hazprod").join("config.toml"));
        }
        std::env::var("HOME").ok().map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join("hazprod")
                .join("config.toml")
        })
    }
}

fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("mode", "practice")?
        .set_default("vtec_mode", "O")
}

fn add_global_file(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    match ConfigLoader::global_config_path() {
        Some(path) if path.exists() => {
            debug!(config_path = %path.display(), "Loading global configuration");
            builder.add_source(File::from(path).required(false))
        }
        Some(path) => {
            warn!(
                config_path = %path.display(),
                "Global configuration file not found; using workspace and environment only"
            );
            builder
        }
        None => builder,
    }
}

fn add_workspace_files(
    mut builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> ConfigBuilder<DefaultState> {
    let config_dir = workspace_root.join("config");
    let env_name = std::env::var("HAZPROD_ENV").unwrap_or_else(|_| "development".to_string());

    let base = config_dir.join("config.toml");
    if base.exists() {
        builder = builder.add_source(File::from(base).required(false));
    }
    let env_specific = config_dir.join(format!("{}.toml", env_name));
    if env_specific.exists() {
        builder = builder.add_source(File::from(env_specific).required(false));
    }
    builder
}
