//! End-to-end tests of unexpected server exit handling.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use orchestragent_client::notify::{NotificationLevel, Notifier};
use orchestragent_client::process::monitor::{check_once, spawn_exit_monitor};
use orchestragent_client::rpc::ConnectionState;

use super::test_helpers::{client_with, install_script, test_config, FAKE_SERVER};

async fn wait_for_exit(client: &orchestragent_client::orchestrator::McpClient) {
    for _ in 0..100 {
        if !client.process().is_alive().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("server did not exit");
}

#[tokio::test]
async fn exit_while_connected_is_reported_once() {
    let dir = tempfile::tempdir().unwrap();
    let server = install_script(dir.path(), FAKE_SERVER);
    let (client, notifier) = client_with(test_config(Some(server), None));
    assert!(client.start_server_and_connect().await);

    client.call_tool("quit", HashMap::new()).await.unwrap();
    wait_for_exit(&client).await;
    assert!(!client.is_connected().await);

    let handled = check_once(client.process(), client.protocol(), notifier.as_ref()).await;
    assert!(handled);
    assert_eq!(client.protocol().connection_state(), ConnectionState::Disconnected);
    assert!(notifier.has(NotificationLevel::Error, "MCP Server Error"));

    let again = check_once(client.process(), client.protocol(), notifier.as_ref()).await;
    assert!(!again);

    client.shutdown().await;
}

#[tokio::test]
async fn healthy_server_is_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let server = install_script(dir.path(), FAKE_SERVER);
    let (client, notifier) = client_with(test_config(Some(server), None));
    assert!(client.start_server_and_connect().await);
    let before = notifier.entries().len();

    assert!(!check_once(client.process(), client.protocol(), notifier.as_ref()).await);
    assert_eq!(notifier.entries().len(), before);
    assert_eq!(client.protocol().connection_state(), ConnectionState::Connected);

    client.shutdown().await;
}

#[tokio::test]
async fn monitor_task_disconnects_after_exit() {
    let dir = tempfile::tempdir().unwrap();
    let server = install_script(dir.path(), FAKE_SERVER);
    let (client, notifier) = client_with(test_config(Some(server), None));
    assert!(client.start_server_and_connect().await);

    let cancel = CancellationToken::new();
    let handle = spawn_exit_monitor(
        Arc::clone(client.process()),
        Arc::clone(client.protocol()),
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        Duration::from_millis(20),
        cancel.clone(),
    );

    client.call_tool("quit", HashMap::new()).await.unwrap();
    wait_for_exit(&client).await;

    for _ in 0..100 {
        if client.protocol().connection_state() == ConnectionState::Disconnected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(client.protocol().connection_state(), ConnectionState::Disconnected);
    assert!(notifier.has(NotificationLevel::Error, "MCP Server Error"));

    cancel.cancel();
    handle.await.unwrap();
    client.shutdown().await;
}
