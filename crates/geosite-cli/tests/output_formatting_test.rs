//! Integration tests for output formatting
//!
//! These tests run the built binary and check JSON output and exit status.

use std::path::Path;
use std::process::{Command, Output};

fn geosite(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_geosite"))
        .args(args)
        .current_dir(dir)
        .env_remove("GEOSITE_DATASET")
        .env_remove("GEOSITE_MAX_SITES")
        .env("RUST_LOG", "off")
        .output()
        .expect("Failed to execute command")
}

#[test]
fn test_config_json_output_is_valid() {
    let dir = tempfile::tempdir().unwrap();
    let output = geosite(dir.path(), &["config", "--json"]);
    assert!(output.status.success(), "Command should succeed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("Output should be valid JSON");

    assert_eq!(parsed["status"], "success");
    let max_sites = &parsed["data"]["values"]["max_sites"];
    assert_eq!(max_sites["value"], "10");
    assert_eq!(max_sites["source"], "default");
}

#[test]
fn test_config_sources_follow_precedence() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("geosite.toml"), "max_sites = 7\nmin_candidates = 20\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_geosite"))
        .args(["config", "--json"])
        .current_dir(dir.path())
        .env("GEOSITE_MAX_SITES", "5")
        .env("RUST_LOG", "off")
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());

    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let values = &parsed["data"]["values"];
    assert_eq!(values["max_sites"]["value"], "5");
    assert_eq!(values["max_sites"]["source"], "env");
    assert_eq!(values["min_candidates"]["value"], "20");
    assert_eq!(values["min_candidates"]["source"], "file");
}

#[test]
fn test_select_without_dataset_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = geosite(dir.path(), &["select", "近地铁", "--no-llm"]);

    assert!(!output.status.success(), "Missing dataset must abort the run");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("dataset_path"), "stderr: {}", stderr);
}

#[test]
fn test_explicit_config_file_must_exist() {
    let dir = tempfile::tempdir().unwrap();
    let output = geosite(dir.path(), &["config", "--config", "missing.toml"]);
    assert!(!output.status.success());
}
