//! ScriptLauncher node tests: overrides, forwarded errors, teardown

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map};
use tokio_test::{assert_err, assert_ok};

use common::{drain_statuses, target, Connect, MockTransport, Reply};
use scriptlauncher_client::{
    FlowMessage, LauncherConfig, ScriptLauncher, SessionError, SessionStatus,
};

fn launcher(transport: MockTransport, command: &str) -> ScriptLauncher {
    let config = LauncherConfig {
        command: command.to_string(),
        ..LauncherConfig::new(target())
    };
    ScriptLauncher::with_transport(config, Arc::new(transport))
}

#[tokio::test(start_paused = true)]
async fn test_result_lands_in_payload_and_keeps_message_fields() {
    let transport = MockTransport::replying(vec![Reply::event(
        200,
        "status_result",
        json!({"ok": true}),
    )]);
    let node = launcher(transport, "status");

    let mut extra = Map::new();
    extra.insert("topic".into(), json!("lab-pc"));
    let msg = FlowMessage {
        extra,
        ..Default::default()
    };

    let out = assert_ok!(node.execute(msg).await);
    assert_eq!(out.payload, Some(json!({"ok": true})));
    assert_eq!(out.extra["topic"], json!("lab-pc"));
    assert!(!out.is_error());
}

#[tokio::test(start_paused = true)]
async fn test_server_error_is_forwarded_as_payload() {
    let transport = MockTransport::replying(vec![Reply::event(
        10,
        "error_result",
        json!({"message": "busy"}),
    )]);
    let node = launcher(transport, "status");
    let mut status = node.subscribe_status();

    let out = assert_ok!(node.execute(FlowMessage::command("restart")).await);
    assert_eq!(out.payload, Some(json!({"error": {"message": "busy"}})));
    assert!(out.is_error());

    let statuses = drain_statuses(&mut status);
    assert_eq!(statuses.last(), Some(&SessionStatus::CommandError));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_override_reaches_the_wire() {
    let transport = MockTransport::replying(vec![Reply::event(
        10,
        "shutdown_result",
        json!("ok"),
    )]);
    let probe = transport.probe();
    let node = launcher(transport, "status");

    let msg = FlowMessage {
        command: Some("shutdown".into()),
        shutdown_time: Some(5),
        ..Default::default()
    };
    assert_ok!(node.execute(msg).await);

    let emitted = probe.emitted();
    assert_eq!(
        emitted[0].1,
        json!({"command": "shutdown", "password": "pw", "time": 5})
    );
}

#[tokio::test(start_paused = true)]
async fn test_unconfigured_server_never_connects() {
    let transport = MockTransport::replying(vec![]);
    let probe = transport.probe();
    let node = ScriptLauncher::with_transport(LauncherConfig::default(), Arc::new(transport));
    let mut status = node.subscribe_status();

    let err = assert_err!(node.execute(FlowMessage::command("status")).await);
    assert!(matches!(err, SessionError::Configuration(_)));
    assert_eq!(probe.connects(), 0);
    assert_eq!(
        drain_statuses(&mut status),
        vec![SessionStatus::NotConfigured]
    );
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_are_returned_as_errors() {
    let node = launcher(MockTransport::new(Connect::Never, vec![]), "status");

    let err = assert_err!(node.execute(FlowMessage::default()).await);
    assert_eq!(err.kind(), "connect_timeout");
    assert!(node.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_close_abandons_pending_commands() {
    let transport = MockTransport::replying(vec![]);
    let probe = transport.probe();
    let node = Arc::new(launcher(transport, "status"));
    let mut status = node.subscribe_status();

    let pending = {
        let node = node.clone();
        tokio::spawn(async move { node.execute(FlowMessage::default()).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(node.registry().len(), 1);

    node.close();
    assert!(node.registry().is_empty());

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(SessionError::Abandoned)));

    // Give the abandoned session a turn to release its connection
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(probe.closes(), 1);

    let statuses = drain_statuses(&mut status);
    assert_eq!(statuses.last(), Some(&SessionStatus::Idle));
    assert!(!statuses.contains(&SessionStatus::ResponseTimeout));
}
