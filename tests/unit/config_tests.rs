//! Unit tests for client configuration parsing and binary resolution.

use std::path::{Path, PathBuf};
use std::time::Duration;

use orchestragent_client::config::{validate_binary_path, ClientConfig, LaunchMode};
use orchestragent_client::AppError;

#[test]
fn empty_config_uses_defaults() {
    let config = ClientConfig::from_toml_str("").expect("empty config is valid");
    assert_eq!(config, ClientConfig::default());
    assert!(config.auto_start_server);
    assert_eq!(config.refresh_interval(), Duration::from_secs(30));
    assert_eq!(config.base_branch, "main");
    assert_eq!(config.launch_mode, LaunchMode::Argument);
    assert_eq!(config.connection.max_retries, 5);
    assert_eq!(config.connection.initial_delay(), Duration::from_millis(1000));
    assert_eq!(config.connection.request_timeout(), None);
    assert_eq!(config.connection.stop_grace(), Duration::from_secs(5));
}

#[test]
fn full_config_parses() {
    let toml = r#"
mcp_server_path = "/opt/orchestragent/bin/server"
repository_path = "/work/repo"
auto_start_server = false
refresh_interval_seconds = 10
base_branch = "develop"
test_command = "cargo test"
launch_mode = "working_directory"

[connection]
max_retries = 3
initial_delay_ms = 250
request_timeout_seconds = 15
stop_grace_seconds = 2
"#;
    let config = ClientConfig::from_toml_str(toml).expect("valid config");
    assert_eq!(
        config.mcp_server_path.as_deref(),
        Some(Path::new("/opt/orchestragent/bin/server"))
    );
    assert!(!config.auto_start_server);
    assert_eq!(config.launch_mode, LaunchMode::WorkingDirectory);
    assert_eq!(config.connection.max_retries, 3);
    assert_eq!(config.connection.request_timeout(), Some(Duration::from_secs(15)));
}

#[test]
fn blank_paths_are_treated_as_unset() {
    let config = ClientConfig::from_toml_str("mcp_server_path = \"  \"\nrepository_path = \"\"")
        .expect("valid config");
    assert!(config.mcp_server_path.is_none());
    assert!(config.repository_path.is_none());
}

#[test]
fn zero_refresh_interval_is_rejected() {
    let err = ClientConfig::from_toml_str("refresh_interval_seconds = 0").expect_err("invalid");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn zero_max_retries_is_rejected() {
    let err =
        ClientConfig::from_toml_str("[connection]\nmax_retries = 0").expect_err("invalid");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn malformed_toml_is_a_config_error() {
    let err = ClientConfig::from_toml_str("auto_start_server = \"maybe\"").expect_err("invalid");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn load_from_missing_file_is_a_config_error() {
    let err = ClientConfig::load_from_path("/nonexistent/orchestragent.toml").expect_err("missing");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn load_from_file_reads_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orchestragent.toml");
    std::fs::write(&path, "base_branch = \"trunk\"").unwrap();
    let config = ClientConfig::load_from_path(&path).unwrap();
    assert_eq!(config.base_branch, "trunk");
}

#[test]
fn custom_server_path_wins_over_bundled() {
    let config = ClientConfig {
        mcp_server_path: Some(PathBuf::from("/custom/server")),
        ..ClientConfig::default()
    };
    assert_eq!(config.resolve_server_binary_path(), PathBuf::from("/custom/server"));
}

#[test]
fn bundled_path_is_platform_specific() {
    let config = ClientConfig {
        bundled_binary_root: PathBuf::from("/plugin"),
        ..ClientConfig::default()
    };
    let path = config.resolve_bundled_binary_path();
    assert!(path.starts_with("/plugin/bin"));
    let file = path.file_name().and_then(|n| n.to_str()).unwrap();
    assert!(file.starts_with("orchestragent"));
    assert_eq!(config.resolve_server_binary_path(), path);
}

#[test]
fn argument_launch_mode_passes_repository_flag() {
    let config = ClientConfig {
        mcp_server_path: Some(PathBuf::from("/srv/orchestragent")),
        repository_path: Some(PathBuf::from("/work/repo")),
        ..ClientConfig::default()
    };
    let spec = config.launch_spec();
    assert_eq!(spec.program, PathBuf::from("/srv/orchestragent"));
    assert_eq!(spec.args, vec!["--repository".to_owned(), "/work/repo".to_owned()]);
    assert!(spec.current_dir.is_none());
}

#[test]
fn working_directory_launch_mode_sets_cwd() {
    let config = ClientConfig {
        mcp_server_path: Some(PathBuf::from("/srv/orchestragent")),
        repository_path: Some(PathBuf::from("/work/repo")),
        launch_mode: LaunchMode::WorkingDirectory,
        ..ClientConfig::default()
    };
    let spec = config.launch_spec();
    assert!(spec.args.is_empty());
    assert_eq!(spec.current_dir, Some(PathBuf::from("/work/repo")));
}

#[test]
fn no_repository_means_no_arguments() {
    let spec = ClientConfig::default().launch_spec();
    assert!(spec.args.is_empty());
    assert!(spec.current_dir.is_none());
}

#[test]
fn missing_binary_fails_validation() {
    assert!(!validate_binary_path(Path::new("/nonexistent/orchestragent")));
}

#[test]
fn directory_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    assert!(!validate_binary_path(dir.path()));
}

#[cfg(unix)]
#[test]
fn executable_bit_is_required() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orchestragent");
    std::fs::write(&path, "#!/bin/sh\n").unwrap();

    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
    assert!(!validate_binary_path(&path));

    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    assert!(validate_binary_path(&path));
}
