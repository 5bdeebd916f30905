//! Manager workflows over a temporary store: warmup precedence, import, and
//! launching stored definitions.

#![cfg(unix)]

use std::sync::Arc;

use sreai_config::McpSettings;
use sreai_mcp::{
    CancellationToken, DefinitionStore, McpManager, Registry, RunRequest, ServerDefinition, Source,
};
use tempfile::TempDir;

fn manager_in(tmp: &TempDir) -> McpManager {
    let store = DefinitionStore::new(tmp.path().join("mcp").join("servers.json"));
    McpManager::new(Arc::new(Registry::new()), store)
}

#[tokio::test]
async fn store_roundtrip_survives_restart() {
    let tmp = TempDir::new().unwrap();
    let definition = ServerDefinition::new("npx")
        .with_args(["-y", "@modelcontextprotocol/server-filesystem", "/srv"])
        .with_env("DEBUG", "1")
        .with_workdir("/srv");

    manager_in(&tmp)
        .add_local_server("files", definition.clone())
        .await
        .unwrap();

    let reopened = manager_in(&tmp);
    assert_eq!(reopened.get_local_server("files").await.unwrap(), definition);
    assert_eq!(
        reopened
            .list_local_servers()
            .await
            .unwrap()
            .keys()
            .collect::<Vec<_>>(),
        vec!["files"]
    );
}

#[tokio::test]
async fn missing_store_lists_empty_but_get_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let manager = manager_in(&tmp);
    assert!(manager.list_local_servers().await.unwrap().is_empty());
    assert!(manager.get_local_server("files").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn warmup_prefers_local_definitions() {
    let tmp = TempDir::new().unwrap();
    let manager = manager_in(&tmp);
    manager
        .add_local_server("github", ServerDefinition::new("github-mcp-server"))
        .await
        .unwrap();

    manager.warmup(&McpSettings::default()).await.unwrap();

    let registry = manager.registry();
    assert_eq!(registry.list().await, vec!["files", "github"]);
    let github = registry.get("github").await.unwrap();
    assert_eq!(github.source, Source::Local);
    assert!(github.manifest.is_none());
    assert_eq!(
        registry.get("files").await.unwrap().source,
        Source::Embedded
    );

    let summaries = registry.summaries().await;
    assert_eq!(summaries[0].manifest_transport_type, "stdio");
    assert_eq!(summaries[1].command, "github-mcp-server");
}

#[tokio::test]
async fn import_then_run_stored_definition() {
    let tmp = TempDir::new().unwrap();
    let manager = manager_in(&tmp);
    let import = tmp.path().join("greeter.json");
    tokio::fs::write(
        &import,
        r#"{"command": "sh", "args": ["-c", "read name; echo \"hello $name from $GREETER\""], "env": {"GREETER": "sreai"}}"#,
    )
    .await
    .unwrap();

    let (alias, _) = manager
        .import_local_server(&format!("greeter = {}", import.display()))
        .await
        .unwrap();
    assert_eq!(alias, "greeter");

    let cancel = CancellationToken::new();
    let output = manager
        .run_local_command(
            "greeter",
            RunRequest {
                stdin: Some("ops\n".into()),
                ..RunRequest::default()
            },
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(output.stdout, "hello ops from sreai\n");
}

#[tokio::test]
async fn check_and_probe_stored_definitions() {
    let tmp = TempDir::new().unwrap();
    let manager = manager_in(&tmp);
    let script = concat!(
        r#"send() { printf 'Content-Length: %d\r\n\r\n%s' "${#1}" "$1"; }"#,
        "\n",
        r#"send '{"jsonrpc":"2.0","id":1,"result":{"serverInfo":{"name":"stub","version":"9"}}}'"#,
        "\n",
        r#"send '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"ping"}]}}'"#,
        "\n",
        "cat >/dev/null",
    );
    manager
        .add_local_server("stub", ServerDefinition::new("sh").with_args(["-c", script]))
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    manager.check_local_server("stub", &cancel).await.unwrap();

    let result = manager.probe_local_server("stub", &cancel).await.unwrap();
    assert_eq!(result.server_version, "9");
    assert_eq!(result.tools.len(), 1);
    assert_eq!(result.tools[0].name, "ping");
}
