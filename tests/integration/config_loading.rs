//! Layered configuration loading and validation.

use super::support::ENV_LOCK;
use hazprod::cli::{Commands, ConfigCommands, RunContext};
use hazprod::config::{ConfigLoader, OperatingMode, ValidationError};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const ENV_KEYS: &[&str] = &["XDG_CONFIG_HOME", "HAZPROD_ENV", "HAZPROD__SITE_ID", "HAZPROD__MODE"];

/// Runs `f` with an isolated global config directory and the given env
/// overrides, restoring the previous environment afterwards.
fn with_env<R>(overrides: &[(&str, &str)], f: impl FnOnce() -> R) -> R {
    let _guard = ENV_LOCK.lock();
    let saved: Vec<(&str, Option<String>)> = ENV_KEYS.iter().map(|k| (*k, std::env::var(k).ok())).collect();
    let xdg = TempDir::new().unwrap();
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
    std::env::set_var("XDG_CONFIG_HOME", xdg.path());
    for (key, value) in overrides {
        std::env::set_var(key, value);
    }

    let result = f();

    for (key, value) in saved {
        match value {
            Some(v) => std::env::set_var(key, v),
            None => std::env::remove_var(key),
        }
    }
    result
}

fn write_workspace(root: &Path) {
    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(
        config_dir.join("config.toml"),
        r#"
site_id = "OAX"
mode = "practice"

[generators.FFW]
hazard_types = ["FF.W"]

[generators.FFA]
hazard_types = ["FF.A", "FA.A"]
include_all = ["FF.A"]

[dissemination]
priority = ["FFW", "FLW", "FFS"]
"#,
    )
    .unwrap();
    fs::write(
        config_dir.join("staging.toml"),
        r#"
vtec_mode = "T"

[conflicts]
pairs = [["FF.W", "FA.Y"]]
"#,
    )
    .unwrap();
}

#[test]
fn workspace_file_then_environment_file_then_variables() {
    let workspace = TempDir::new().unwrap();
    write_workspace(workspace.path());

    let config = with_env(
        &[("HAZPROD_ENV", "staging"), ("HAZPROD__MODE", "test")],
        || ConfigLoader::load(workspace.path()).unwrap(),
    );

    assert_eq!(config.site_id, "OAX");
    assert_eq!(config.mode, OperatingMode::Test);
    assert_eq!(config.vtec_mode, "T");
    assert_eq!(config.conflicts.pairs, vec![("FF.W".to_string(), "FA.Y".to_string())]);
    assert_eq!(config.generators.len(), 2);
    let table = config.generator_table();
    assert!(table.get("FFA").unwrap().allows("FA.A"));
    assert!(config.validate().is_ok());
}

#[test]
fn without_an_environment_file_the_base_file_wins() {
    let workspace = TempDir::new().unwrap();
    write_workspace(workspace.path());

    let config = with_env(&[], || ConfigLoader::load(workspace.path()).unwrap());

    assert_eq!(config.mode, OperatingMode::Practice);
    assert_eq!(config.vtec_mode, "O");
    assert!(config.conflicts.pairs.is_empty());
}

#[test]
fn validation_reports_every_problem() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(
        &path,
        r#"
site_id = " "

[generators.FFA]
hazard_types = ["FF.A"]
include_all = ["FA.A"]

[generators.EMPTY]
hazard_types = []

[dissemination]
priority = ["FFW", "FFW", ""]
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&path).unwrap();
    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 5, "{:?}", errors);
    assert!(errors.contains(&ValidationError::Site("site_id cannot be empty".to_string())));
    assert!(errors
        .iter()
        .any(|e| matches!(e, ValidationError::Generator(name, _) if name == "EMPTY")));
    assert!(errors
        .iter()
        .any(|e| matches!(e, ValidationError::Generator(name, msg) if name == "FFA" && msg.contains("FA.A"))));

    let context = RunContext::new(dir.path().to_path_buf(), Some(path)).unwrap();
    let output = context
        .execute(&Commands::Config {
            command: ConfigCommands::Validate,
        })
        .unwrap();
    assert!(output.contains("5 problem(s)"));
}
