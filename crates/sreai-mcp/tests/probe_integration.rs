//! End-to-end tests against real child processes.
//!
//! Scripted servers are small `sh` programs that emit pre-framed responses,
//! so these tests only run on unix.

#![cfg(unix)]

use std::time::{Duration, Instant};

use sreai_mcp::{McpError, RunRequest, ServerDefinition, probe_server, run_command};
use tokio_util::sync::CancellationToken;

/// Shell helper that frames its argument with a `Content-Length` header.
const SEND_FN: &str = r#"send() { printf 'Content-Length: %d\r\n\r\n%s' "${#1}" "$1"; }"#;

fn scripted_server(body: &str) -> ServerDefinition {
    let script = format!("{SEND_FN}\n{body}");
    ServerDefinition::new("sh").with_args(["-c".to_string(), script])
}

fn cancel_after(delay: Duration) -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        trigger.cancel();
    });
    cancel
}

#[tokio::test]
async fn probe_collects_two_pages_of_tools() {
    let server = scripted_server(
        r#"echo "scripted server ready" >&2
send '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2025-06-18","serverInfo":{"name":"scripted","version":"0.1.0"},"capabilities":{"tools":{}},"instructions":" List first. "}}'
send '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"alpha","description":"first tool"}],"nextCursor":"p2"}}'
send '{"jsonrpc":"2.0","id":3,"result":{"tools":[{"name":"beta","annotations":{"title":"Beta"}}]}}'
cat >/dev/null"#,
    );

    let cancel = CancellationToken::new();
    let result = probe_server("scripted", &server, &cancel).await.unwrap();

    assert_eq!(result.alias, "scripted");
    assert_eq!(result.server_name, "scripted");
    assert_eq!(result.server_version, "0.1.0");
    assert_eq!(result.protocol_version, "2025-06-18");
    assert_eq!(result.instructions, "List first.");
    assert!(result.capabilities.contains_key("tools"));
    let names: Vec<&str> = result.tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "beta"]);
    assert_eq!(result.tools[0].description, "first tool");
    assert_eq!(result.tools[1].title, "Beta");
    assert!(result.notifications.is_empty());
    assert_eq!(result.stderr, "scripted server ready");
}

#[tokio::test]
async fn probe_records_notifications_and_answers_server_requests() {
    let server = scripted_server(
        r#"send '{"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info","data":"booting"}}'
send '{"jsonrpc":"2.0","id":"srv-1","method":"roots/list"}'
send '{"jsonrpc":"2.0","id":1,"result":{"serverInfo":{"name":"chatty"}}}'
send '{"jsonrpc":"2.0","id":2,"result":{"tools":[]}}'
cat >/dev/null"#,
    );

    let cancel = CancellationToken::new();
    let result = probe_server("chatty", &server, &cancel).await.unwrap();
    assert_eq!(result.server_name, "chatty");
    assert!(result.tools.is_empty());
    assert_eq!(result.notifications.len(), 1);
    assert_eq!(result.notifications[0].method, "notifications/message");
    assert_eq!(
        result.notifications[0].detail,
        r#"{"data":"booting","level":"info"}"#
    );
}

#[tokio::test]
async fn probe_reports_early_exit_with_stderr() {
    let server = ServerDefinition::new("sh").with_args(["-c", "echo 'fatal: bad config' >&2; exit 3"]);
    let cancel = CancellationToken::new();
    let err = probe_server("broken", &server, &cancel).await.unwrap_err();

    assert!(
        matches!(err.root(), McpError::ServerExited { reason } if reason == "exit status 3"),
        "unexpected error: {err:?}"
    );
    assert_eq!(err.stderr_tail(), Some("fatal: bad config"));
    let message = err.to_string();
    assert!(message.starts_with("broken: "), "{message}");
    assert!(message.ends_with("stderr: fatal: bad config"), "{message}");
}

#[tokio::test]
async fn probe_initialize_error_is_fatal() {
    let server = scripted_server(
        r#"send '{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"unsupported protocol version"}}'
cat >/dev/null"#,
    );
    let cancel = CancellationToken::new();
    let err = probe_server("picky", &server, &cancel).await.unwrap_err();
    assert!(matches!(
        err.root(),
        McpError::JsonRpc { method, code: -32602, .. } if method == "initialize"
    ));
}

#[tokio::test]
async fn probe_unframed_output_is_protocol_error() {
    let server = scripted_server(
        r#"printf 'hello world\r\n\r\n'
cat >/dev/null"#,
    );
    let cancel = CancellationToken::new();
    let err = probe_server("noisy", &server, &cancel).await.unwrap_err();
    assert!(
        matches!(err.root(), McpError::Protocol(m) if m.contains("missing Content-Length")),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn probe_of_silent_server_is_cancelled_and_killed() {
    let server = ServerDefinition::new("sleep").with_args(["30"]);
    let cancel = cancel_after(Duration::from_millis(200));

    let started = Instant::now();
    let err = probe_server("silent", &server, &cancel).await.unwrap_err();
    assert!(err.is_cancelled(), "unexpected error: {err:?}");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn run_echo_captures_stdout() {
    let cancel = CancellationToken::new();
    let output = run_command(
        "echo",
        &ServerDefinition::new("echo").with_args(["hi"]),
        RunRequest::default(),
        &cancel,
    )
    .await
    .unwrap();
    assert_eq!(output.stdout, "hi\n");
    assert_eq!(output.stderr, "");
    assert_eq!(output.exit_code, 0);
}

#[tokio::test]
async fn run_is_cancelled_and_killed() {
    let cancel = cancel_after(Duration::from_millis(200));
    let started = Instant::now();
    let err = run_command(
        "sleeper",
        &ServerDefinition::new("sleep").with_args(["30"]),
        RunRequest::default(),
        &cancel,
    )
    .await
    .unwrap_err();
    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(5));
}
