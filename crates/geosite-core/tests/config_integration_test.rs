//! Integration tests for layered configuration
//!
//! Precedence: CLI arguments > Environment variables > Config file > Defaults

use geosite_core::config::{CliConfigOverrides, ConfigSource, LayeredConfig};
use geosite_core::GeositeError;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

const VARS: &[&str] = &[
    "GEOSITE_DATASET",
    "GEOSITE_MAX_SITES",
    "GEOSITE_MIN_DISTANCE_M",
    "GEOSITE_EMBEDDER",
    "GEOSITE_LLM_API_KEY",
    "GEOSITE_ENABLE_ROUTE_ORDER",
    "DEEPSEEK_API_KEY",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

fn config_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", content).unwrap();
    file
}

#[test]
fn test_partial_file_configuration() {
    let file = config_file(
        r#"
max_sites = 4
# Everything else stays at its default
"#,
    );

    let config = LayeredConfig::with_defaults().load_from_file(file.path()).unwrap();

    assert_eq!(config.max_sites.value, 4);
    assert_eq!(config.max_sites.source, ConfigSource::File);
    assert_eq!(config.min_candidates.value, 10);
    assert_eq!(config.min_candidates.source, ConfigSource::Default);
    assert_eq!(config.embedder.source, ConfigSource::Default);
}

#[test]
fn test_invalid_toml_is_config_invalid() {
    let file = config_file("max_sites = \"many\"");

    let result = LayeredConfig::with_defaults().load_from_file(file.path());
    assert!(matches!(result, Err(GeositeError::ConfigInvalid { .. })));
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    clear_env();
    env::set_var("GEOSITE_MAX_SITES", "7");
    env::set_var("GEOSITE_EMBEDDER", "ollama:env-model");
    env::set_var("GEOSITE_ENABLE_ROUTE_ORDER", "true");

    let file = config_file(
        r#"
max_sites = 4
embedder = "ollama:file-model"
min_distance_m = 250.0
"#,
    );

    let config = LayeredConfig::with_defaults()
        .load_from_file(file.path())
        .unwrap()
        .load_from_env();

    assert_eq!(config.max_sites.value, 7);
    assert_eq!(config.max_sites.source, ConfigSource::Environment);
    assert_eq!(config.embedder.value, "ollama:env-model");
    assert!(config.enable_route_order.value);
    // Not set in the environment, so the file value survives
    assert_eq!(config.min_distance_m.value, 250.0);
    assert_eq!(config.min_distance_m.source, ConfigSource::File);

    clear_env();
}

#[test]
#[serial]
fn test_invalid_environment_value_is_ignored() {
    clear_env();
    env::set_var("GEOSITE_MAX_SITES", "lots");

    let config = LayeredConfig::with_defaults().load_from_env();
    assert_eq!(config.max_sites.value, 10);
    assert_eq!(config.max_sites.source, ConfigSource::Default);

    clear_env();
}

#[test]
#[serial]
fn test_fallback_api_key_variable() {
    clear_env();
    env::set_var("DEEPSEEK_API_KEY", "sk-fallback");

    let config = LayeredConfig::with_defaults().load_from_env();
    assert_eq!(config.llm_api_key.value.as_deref(), Some("sk-fallback"));
    assert_eq!(config.llm_api_key.source, ConfigSource::Environment);

    env::set_var("GEOSITE_LLM_API_KEY", "sk-primary");
    let config = LayeredConfig::with_defaults().load_from_env();
    assert_eq!(config.llm_api_key.value.as_deref(), Some("sk-primary"));

    clear_env();
}

#[test]
#[serial]
fn test_cli_overrides_everything() {
    clear_env();
    env::set_var("GEOSITE_MAX_SITES", "7");
    env::set_var("GEOSITE_DATASET", "env.json");

    let file = config_file("max_sites = 4");

    let mut config = LayeredConfig::with_defaults()
        .load_from_file(file.path())
        .unwrap()
        .load_from_env();
    config.update_from_cli(CliConfigOverrides {
        max_sites: Some(2),
        dataset_path: Some(PathBuf::from("cli.json")),
        llm_enabled: Some(false),
        ..Default::default()
    });

    assert_eq!(config.max_sites.value, 2);
    assert_eq!(config.max_sites.source, ConfigSource::Cli);

    let resolved = config.resolve().unwrap();
    assert_eq!(resolved.dataset_path, PathBuf::from("cli.json"));
    assert_eq!(resolved.max_sites, 2);
    assert!(resolved.llm.is_none());
    assert!(!resolved.enable_llm_constraints);

    clear_env();
}

#[test]
#[serial]
fn test_missing_credential_aborts_resolution() {
    clear_env();
    env::set_var("GEOSITE_DATASET", "sites.json");

    let config = LayeredConfig::with_defaults().load_from_env();
    let err = config.resolve().unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("llm_api_key"));

    clear_env();
}
