//! Integration tests for config loading

use hmc_config::Config;
use hmc_errors::{ConfigError, Error};
use std::path::PathBuf;
use tempfile::tempdir;

#[tokio::test]
async fn test_partial_file_keeps_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    tokio::fs::write(
        &path,
        r#"
[paths]
db_path = "/var/lib/hmc/state.sqlite"

[dispatch]
timeout_secs = 30

[agent]
program = "mco"
args = ["puppet", "runonce", "-I", "{host}"]
"#,
    )
    .await
    .unwrap();

    let config = Config::load_from_file(&path).await.unwrap();
    assert_eq!(config.db_path(), PathBuf::from("/var/lib/hmc/state.sqlite"));
    assert_eq!(config.dispatch.timeout_secs, 30);
    assert_eq!(config.dispatch.max_retries, 3);
    assert_eq!(config.agent.program, "mco");
    assert_eq!(config.agent.success_exit_codes, vec![0, 2]);
    assert_eq!(config.state.retention_days, 30);
}

#[tokio::test]
async fn test_missing_file_is_not_found() {
    let dir = tempdir().unwrap();
    let err = Config::load_from_file(&dir.path().join("absent.toml"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::NotFound { .. })));
}

#[tokio::test]
async fn test_malformed_toml_is_parse_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    tokio::fs::write(&path, "[dispatch\ntimeout_secs = ").await.unwrap();

    let err = Config::load_from_file(&path).await.unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::ParseError { .. })));
}

#[tokio::test]
async fn test_invalid_jitter_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    tokio::fs::write(&path, "[dispatch]\njitter_factor = 3.0\n")
        .await
        .unwrap();

    let err = Config::load_from_file(&path).await.unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::Invalid { .. })));
}

#[test]
fn test_defaults_validate() {
    let config = Config::default();
    config.validate().unwrap();
    assert!(config.worker_count() > 0);
    assert!(config.log_dir().is_none());
}
