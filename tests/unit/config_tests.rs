//! Unit tests for configuration parsing and validation.

use std::io::Write;
use std::path::PathBuf;

use taskpipe::{ClientConfig, ClientError};

/// Minimal TOML parses with default timeouts applied.
#[test]
fn minimal_toml_applies_defaults() {
    let config = ClientConfig::from_toml_str(
        r#"
        worker_path = "/usr/local/bin/task-worker"
        workspace_root = "/home/user/project"
        "#,
    )
    .expect("parse");

    assert_eq!(config.worker_path, PathBuf::from("/usr/local/bin/task-worker"));
    assert_eq!(config.request_timeout_seconds, 30);
    assert_eq!(config.startup_timeout_seconds, 10);
    assert!(config.worker_args.is_empty());
}

/// All fields round-trip from TOML.
#[test]
fn full_toml_overrides_defaults() {
    let config = ClientConfig::from_toml_str(
        r#"
        worker_path = "/opt/worker"
        worker_args = ["--verbose"]
        workspace_root = "/srv/code"
        request_timeout_seconds = 5
        startup_timeout_seconds = 2
        "#,
    )
    .expect("parse");

    assert_eq!(config.worker_args, vec!["--verbose".to_owned()]);
    assert_eq!(config.request_timeout().as_secs(), 5);
    assert_eq!(config.startup_timeout().as_secs(), 2);
}

/// Missing required fields is a config error, not a panic.
#[test]
fn missing_worker_path_is_rejected() {
    let result = ClientConfig::from_toml_str(r#"workspace_root = "/srv/code""#);
    assert!(matches!(result, Err(ClientError::Config(_))));
}

/// Zero timeouts are rejected by validation.
#[test]
fn zero_timeout_is_rejected() {
    let result = ClientConfig::from_toml_str(
        r#"
        worker_path = "/opt/worker"
        workspace_root = "/srv/code"
        request_timeout_seconds = 0
        "#,
    );
    assert!(matches!(result, Err(ClientError::Config(_))));
}

/// Config files on disk load the same as inline text.
#[test]
fn config_file_round_trips_through_disk() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        "worker_path = \"/opt/worker\"\nworkspace_root = \"/srv/code\""
    )
    .expect("write");

    let text = std::fs::read_to_string(file.path()).expect("read back");
    let config = ClientConfig::from_toml_str(&text).expect("parse");
    assert_eq!(config.workspace_root, PathBuf::from("/srv/code"));
}

/// The spawn configuration carries the fixed launch contract inputs.
#[test]
fn spawn_config_derives_from_client_config() {
    let config = ClientConfig::new(PathBuf::from("/opt/worker"), PathBuf::from("/srv/code"));
    let spawn = config.spawn_config();
    assert_eq!(spawn.worker_path, PathBuf::from("/opt/worker"));
    assert_eq!(spawn.workspace_root, PathBuf::from("/srv/code"));
    assert_eq!(spawn.startup_timeout.as_secs(), 10);
}
