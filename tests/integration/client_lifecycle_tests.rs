//! End-to-end tests of `McpClient` against a shell-script server.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;

use orchestragent_client::notify::NotificationLevel;
use orchestragent_client::rpc::ConnectionState;
use orchestragent_client::TransportError;

use super::test_helpers::{
    client_with, install_script, test_config, FAKE_SERVER, STUBBORN_THEN_DEAD_SERVER,
};

#[tokio::test]
async fn start_connect_call_and_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let server = install_script(dir.path(), FAKE_SERVER);
    let (client, notifier) = client_with(test_config(Some(server), None));

    assert!(client.start_server_and_connect().await);
    assert!(client.is_connected().await);
    assert!(notifier.has(NotificationLevel::Info, "MCP Server"));

    let mut args = HashMap::new();
    args.insert("sessionId".to_owned(), "s-1".to_owned());
    let response = client.call_tool("ping", args).await.unwrap();
    assert_eq!(response.result, Some(json!({"ok": true})));
    assert!(!response.is_error());

    client.shutdown().await;
    assert!(!client.is_connected().await);
    assert_eq!(client.protocol().connection_state(), ConnectionState::Disconnected);
    assert!(!client.process().is_alive().await);

    client.shutdown().await;
}

#[tokio::test]
async fn tool_error_is_returned_and_notified() {
    let dir = tempfile::tempdir().unwrap();
    let server = install_script(dir.path(), FAKE_SERVER);
    let (client, notifier) = client_with(test_config(Some(server), None));
    assert!(client.start_server_and_connect().await);

    let response = client.call_tool("fail", HashMap::new()).await.unwrap();
    let error = response.error.expect("error reply");
    assert_eq!(error.message, "tool exploded");

    let tool_errors: Vec<_> = notifier
        .entries()
        .into_iter()
        .filter(|(level, title, _)| *level == NotificationLevel::Error && title == "MCP Tool Error")
        .collect();
    assert_eq!(tool_errors.len(), 1);
    assert!(tool_errors[0].2.contains("fail"));
    assert!(tool_errors[0].2.contains("tool exploded"));

    client.shutdown().await;
}

#[tokio::test]
async fn missing_binary_fails_start_and_notifies() {
    let (client, notifier) = client_with(test_config(
        Some(PathBuf::from("/nonexistent/orchestragent")),
        None,
    ));

    assert!(!client.start_server_and_connect().await);
    assert!(!client.is_connected().await);

    let entries = notifier.entries();
    let (level, title, message) = entries.last().expect("a notification");
    assert_eq!(*level, NotificationLevel::Error);
    assert_eq!(title, "MCP Server Error");
    assert!(message.contains("/nonexistent/orchestragent"));
}

#[tokio::test]
async fn call_before_connect_is_not_connected() {
    let (client, notifier) = client_with(test_config(None, None));
    let err = client.call_tool("get_sessions", HashMap::new()).await.unwrap_err();
    assert_eq!(err, TransportError::NotConnected);
    assert!(notifier.has(NotificationLevel::Error, "MCP Tool Error"));
}

#[tokio::test]
async fn repository_is_passed_as_argument() {
    let dir = tempfile::tempdir().unwrap();
    let server = install_script(dir.path(), FAKE_SERVER);
    let (client, _notifier) = client_with(test_config(
        Some(server),
        Some(PathBuf::from("/work/repo")),
    ));
    assert!(client.start_server_and_connect().await);
    // The script writes its arguments before reading stdin; one exchange
    // guarantees the file is complete.
    client.call_tool("ping", HashMap::new()).await.unwrap();

    let args = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
    assert_eq!(args.lines().collect::<Vec<_>>(), vec!["--repository", "/work/repo"]);
    client.shutdown().await;
}

#[tokio::test]
async fn repository_as_working_directory() {
    use orchestragent_client::config::LaunchMode;

    let dir = tempfile::tempdir().unwrap();
    let repo = tempfile::tempdir().unwrap();
    let server = install_script(dir.path(), FAKE_SERVER);
    let mut config = test_config(Some(server), Some(repo.path().to_path_buf()));
    config.launch_mode = LaunchMode::WorkingDirectory;
    let (client, _notifier) = client_with(config);

    assert!(client.start_server_and_connect().await);
    client.call_tool("ping", HashMap::new()).await.unwrap();

    let cwd = std::fs::read_to_string(dir.path().join("cwd.txt")).unwrap();
    assert_eq!(
        PathBuf::from(cwd.trim()).canonicalize().unwrap(),
        repo.path().canonicalize().unwrap()
    );
    let args = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
    assert!(args.trim().is_empty());
    client.shutdown().await;
}

#[tokio::test]
async fn restart_replaces_running_server() {
    let dir = tempfile::tempdir().unwrap();
    let server = install_script(dir.path(), FAKE_SERVER);
    let (client, _notifier) = client_with(test_config(Some(server), None));

    assert!(client.start_server_and_connect().await);
    let first = client.process().pid().await;

    assert!(client.start_server_and_connect().await);
    let second = client.process().pid().await;
    assert_ne!(first, second);

    let response = client.call_tool("ping", HashMap::new()).await.unwrap();
    assert!(response.result.is_some());
    client.shutdown().await;
}

#[tokio::test]
async fn shutdown_during_restart_abandons_connect_retries() {
    let dir = tempfile::tempdir().unwrap();
    let server = install_script(dir.path(), STUBBORN_THEN_DEAD_SERVER);
    let mut config = test_config(Some(server), None);
    config.connection.max_retries = 5;
    config.connection.initial_delay_ms = 500;
    config.connection.stop_grace_seconds = 2;
    let (client, notifier) = client_with(config);
    assert!(client.start_server_and_connect().await);

    // The restart spends the whole grace period replacing the first server,
    // which ignores SIGTERM; the replacement exits at once.
    let restarting = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.start_server_and_connect().await })
    };
    tokio::time::sleep(Duration::from_millis(500)).await;

    let shutdown_at = Instant::now();
    client.shutdown().await;
    assert!(!restarting.await.unwrap());
    // Without cancellation the backoff alone would add 7.5 s.
    assert!(
        shutdown_at.elapsed() < Duration::from_secs(5),
        "restart outlived shutdown by {:?}",
        shutdown_at.elapsed()
    );

    assert!(!client.is_connected().await);
    assert!(!client.process().is_alive().await);
    assert!(!notifier
        .entries()
        .iter()
        .any(|(_, _, message)| message == "Failed to connect to MCP server"));
}
