//! Tests for configuration defaults, builders and JSON loading.

use lsp_exchange::config::Config;
use lsp_exchange::error::Error;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_defaults() {
    let config = Config::new();

    assert_eq!(config.convergence_precision, 1);
    assert_eq!(config.max_negotiation_rounds, 50);
    assert!(!config.cross_company_exchange);
    assert!(config.individual_rationality);
    assert!(!config.reallocation);
    assert_eq!(config.max_reallocation_rounds, 20);
    assert_eq!(config.weight_scale, 1.0);
    assert_eq!(config.oracle.seed, 42);
    assert_eq!(config.oracle.max_passes, 50);
    assert!(config.export.is_none());
}

#[test]
fn test_json_file_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    let config = Config::new()
        .with_convergence_precision(2)
        .with_max_negotiation_rounds(7)
        .with_cross_company_exchange(true)
        .with_individual_rationality(false)
        .with_reallocation(true)
        .with_max_reallocation_rounds(3)
        .with_weight_scale(100.0)
        .with_oracle_seed(9)
        .with_oracle_passes(4)
        .with_export("out", "lc101");
    fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

    let loaded = Config::from_json_file(&path).unwrap();

    assert_eq!(loaded.convergence_precision, 2);
    assert_eq!(loaded.max_negotiation_rounds, 7);
    assert!(loaded.cross_company_exchange);
    assert!(!loaded.individual_rationality);
    assert!(loaded.reallocation);
    assert_eq!(loaded.max_reallocation_rounds, 3);
    assert_eq!(loaded.weight_scale, 100.0);
    assert_eq!(loaded.oracle.seed, 9);
    assert_eq!(loaded.oracle.max_passes, 4);
    let export = loaded.export.unwrap();
    assert_eq!(export.root, PathBuf::from("out"));
    assert_eq!(export.instance_name, "lc101");
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempdir().unwrap();

    let result = Config::from_json_file(dir.path().join("absent.json"));

    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
fn test_malformed_json_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ \"convergence_precision\": \"one\" }").unwrap();

    assert!(matches!(Config::from_json_file(&path), Err(Error::Json(_))));
}
