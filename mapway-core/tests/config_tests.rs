//! Config file loading, defaults and validation.

use assert_fs::prelude::*;
use mapway_core::{Config, ConfigError};
use predicates::prelude::*;

#[test]
fn partial_file_keeps_defaults_for_missing_fields() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("mapway.yaml");
    file.write_str("redis_host: redis.internal\nreconcile_interval_secs: 60\n")
        .expect("write");

    let config = Config::load_at(file.path()).expect("load");
    assert_eq!(config.redis_host, "redis.internal");
    assert_eq!(config.reconcile_interval_secs, 60);
    assert_eq!(config.redis_port, 6379);
    assert_eq!(config.redis_channel, "mappings_channel");
    assert_eq!(config.redis_key, "mappings_key");
}

#[test]
fn missing_file_reports_path() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let path = dir.path().join("absent.yaml");
    let err = Config::load_at(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }), "got: {err}");
    assert!(predicate::str::contains("absent.yaml").eval(&err.to_string()));
}

#[test]
fn unknown_field_is_a_parse_error_with_path() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("mapway.yaml");
    file.write_str("redis_hots: typo\n").expect("write");

    let err = Config::load_at(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("mapway.yaml"));
}

#[test]
fn zero_timeout_is_invalid() {
    let config = Config {
        op_timeout_ms: 0,
        ..Config::default()
    };
    let err = config.validate().unwrap_err();
    assert!(
        matches!(err, ConfigError::Invalid { field: "op_timeout_ms", .. }),
        "got: {err}"
    );
}

#[test]
fn empty_channel_is_invalid() {
    let config = Config {
        redis_channel: " ".to_string(),
        ..Config::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::Invalid { field: "redis_channel", .. })
    ));
}

#[test]
fn table_path_with_whitespace_is_invalid() {
    let config = Config {
        table_path: "/etc/haproxy/my maps.map".into(),
        ..Config::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::Invalid { field: "table_path", .. })
    ));
}
