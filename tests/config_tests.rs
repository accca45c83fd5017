//! Config loading, TOML parsing, and env var override tests.
//!
//! Some tests are `#[ignore]` (they chdir or set env vars and conflict in
//! parallel). Run them with:
//! `cargo test --test config_tests -- --ignored --test-threads=1`

use duckrpc::Config;
use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_config_defaults() {
    let config = Config::default();
    assert!(!config.protocol.report_affected_rows);
    assert_eq!(config.protocol.max_fetch_rows, 0);
    assert_eq!(config.appender.default_schema, "main");
    assert!(config.logging.enabled);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, "text");
}

#[test]
fn test_config_from_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("custom.toml");
    fs::write(
        &path,
        r#"
[protocol]
report_affected_rows = true
max_fetch_rows = 100

[appender]
default_schema = "staging"

[logging]
level = "debug"
format = "json"
file = "/tmp/duckrpc-test.log"
"#,
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();
    assert!(config.protocol.report_affected_rows);
    assert_eq!(config.protocol.max_fetch_rows, 100);
    assert_eq!(config.appender.default_schema, "staging");
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, "json");
    assert_eq!(
        config.logging.file,
        Some(PathBuf::from("/tmp/duckrpc-test.log"))
    );
}

#[test]
fn test_config_from_partial_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("partial.toml");
    fs::write(&path, "[logging]\nenabled = false\n").unwrap();

    let config = Config::from_file(&path).unwrap();
    assert!(!config.logging.enabled);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.appender.default_schema, "main");
}

#[test]
fn test_config_from_missing_file_uses_defaults() {
    let temp = TempDir::new().unwrap();
    let config = Config::from_file(temp.path().join("absent.toml")).unwrap();
    assert_eq!(config.appender.default_schema, "main");
}

#[test]
fn test_config_invalid_type_is_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("bad.toml");
    fs::write(&path, "[protocol]\nmax_fetch_rows = \"lots\"\n").unwrap();
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_config_invalid_toml_is_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("broken.toml");
    fs::write(&path, "[protocol\n").unwrap();
    assert!(Config::from_file(&path).is_err());
}

#[test]
#[ignore = "sets process env vars; run with --test-threads=1"]
fn test_config_env_override() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("base.toml");
    fs::write(&path, "[protocol]\nmax_fetch_rows = 10\n").unwrap();

    env::set_var("DUCKRPC_PROTOCOL__MAX_FETCH_ROWS", "25");
    env::set_var("DUCKRPC_APPENDER__DEFAULT_SCHEMA", "bulk");
    let config = Config::from_file(&path);
    env::remove_var("DUCKRPC_PROTOCOL__MAX_FETCH_ROWS");
    env::remove_var("DUCKRPC_APPENDER__DEFAULT_SCHEMA");

    let config = config.unwrap();
    assert_eq!(config.protocol.max_fetch_rows, 25);
    assert_eq!(config.appender.default_schema, "bulk");
}

#[test]
#[ignore = "changes the working directory; run with --test-threads=1"]
fn test_config_load_local_overrides_base() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("duckrpc.toml"),
        "[protocol]\nmax_fetch_rows = 10\nreport_affected_rows = true\n",
    )
    .unwrap();
    fs::write(
        temp.path().join("duckrpc.local.toml"),
        "[protocol]\nmax_fetch_rows = 20\n",
    )
    .unwrap();

    let original = env::current_dir().unwrap();
    env::set_current_dir(temp.path()).unwrap();
    let config = Config::load();
    env::set_current_dir(original).unwrap();

    let config = config.unwrap();
    assert_eq!(config.protocol.max_fetch_rows, 20);
    assert!(config.protocol.report_affected_rows);
}
