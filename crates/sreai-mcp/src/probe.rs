//! MCP probe: launch a local server, handshake, list its tools, shut it down.

use crate::connection::{Connection, Notification};
use crate::definition::ServerDefinition;
use crate::error::McpError;
use crate::launcher::LaunchPlan;
use crate::process::{self, ProcessControl};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

/// MCP protocol version we request.
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Client name sent in `initialize`.
const CLIENT_NAME: &str = "sreai";

/// Shutdown grace when the handshake never completed.
const GRACE_BEFORE_HANDSHAKE: Duration = Duration::from_millis(200);

/// Shutdown grace after a completed handshake.
const GRACE_AFTER_HANDSHAKE: Duration = Duration::from_millis(750);

/// Bound on closing the server's stdin.
const CLOSE_TIMEOUT: Duration = Duration::from_millis(200);

type JsonObject = serde_json::Map<String, Value>;

/// What a probe learned about a server.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub alias: String,
    pub server_name: String,
    pub server_version: String,
    pub protocol_version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub instructions: String,
    pub capabilities: JsonObject,
    pub tools: Vec<ToolSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notifications: Vec<Notification>,
    #[serde(rename = "durationMs", serialize_with = "serialize_millis")]
    pub duration: Duration,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

fn serialize_millis<S: serde::Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(duration.as_millis().try_into().unwrap_or(u64::MAX))
}

/// One tool advertised by `tools/list`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSummary {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "JsonObject::is_empty")]
    pub input_schema: JsonObject,
    #[serde(skip_serializing_if = "JsonObject::is_empty")]
    pub annotations: JsonObject,
}

impl ToolSummary {
    fn from_value(value: &Value) -> Self {
        let annotations = object_field(value, "annotations");
        let mut title = string_field(value, "title");
        if title.is_empty() {
            title = annotations
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
        }
        Self {
            name: string_field(value, "name"),
            title,
            description: string_field(value, "description"),
            input_schema: object_field(value, "inputSchema"),
            annotations,
        }
    }
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn object_field(value: &Value, key: &str) -> JsonObject {
    value
        .get(key)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// Launch `definition`, perform the MCP handshake, and enumerate its tools.
///
/// The server is always shut down before returning. Failures carry the alias
/// and the tail of the server's stderr.
pub async fn probe_server(
    alias: &str,
    definition: &ServerDefinition,
    cancel: &CancellationToken,
) -> Result<ProbeResult, McpError> {
    definition.validate()?;
    let started = Instant::now();
    let plan = LaunchPlan::new(definition, &[], &BTreeMap::new());

    let process::StdioProcess {
        stdin,
        stdout,
        exit,
        mut control,
    } = process::spawn_stdio(alias, &plan)?;

    let mut connection = Connection::new(alias, stdout, stdin, exit);
    let mut handshake_done = false;
    let outcome = run_session(&mut connection, alias, &mut handshake_done, cancel).await;

    let grace = if handshake_done {
        GRACE_AFTER_HANDSHAKE
    } else {
        GRACE_BEFORE_HANDSHAKE
    };
    let notifications = connection.take_notifications();
    shutdown(connection, &mut control, grace).await;

    let stderr = control.stderr_tail();
    match outcome {
        Ok(mut result) => {
            result.notifications = notifications;
            result.duration = started.elapsed();
            result.stderr = stderr;
            tracing::info!(
                "MCP server '{}' probed with {} tools in {:?}",
                alias,
                result.tools.len(),
                result.duration
            );
            Ok(result)
        }
        Err(e) => {
            tracing::debug!("Probe of MCP server '{}' failed: {e}", alias);
            Err(e.in_session(alias, stderr))
        }
    }
}

async fn run_session<R, W>(
    connection: &mut Connection<R, W>,
    alias: &str,
    handshake_done: &mut bool,
    cancel: &CancellationToken,
) -> Result<ProbeResult, McpError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut result = initialize(connection, alias, cancel).await?;
    *handshake_done = true;
    result.tools = list_tools(connection, cancel).await?;
    Ok(result)
}

/// `initialize` followed by `notifications/initialized`.
pub(crate) async fn initialize<R, W>(
    connection: &mut Connection<R, W>,
    alias: &str,
    cancel: &CancellationToken,
) -> Result<ProbeResult, McpError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let params = serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": CLIENT_NAME,
            "version": env!("CARGO_PKG_VERSION")
        }
    });
    let init = connection
        .request("initialize", Some(params), cancel)
        .await?;
    if !init.is_object() {
        return Err(McpError::Protocol(
            "initialize returned a non-object result".into(),
        ));
    }

    let server_info = init.get("serverInfo").cloned().unwrap_or_default();
    let result = ProbeResult {
        alias: alias.to_string(),
        server_name: string_field(&server_info, "name"),
        server_version: string_field(&server_info, "version"),
        protocol_version: string_field(&init, "protocolVersion"),
        instructions: string_field(&init, "instructions").trim().to_string(),
        capabilities: object_field(&init, "capabilities"),
        ..ProbeResult::default()
    };

    connection
        .notify(
            "notifications/initialized",
            Some(serde_json::json!({})),
            cancel,
        )
        .await?;
    Ok(result)
}

/// Page through `tools/list` until no cursor is returned.
pub(crate) async fn list_tools<R, W>(
    connection: &mut Connection<R, W>,
    cancel: &CancellationToken,
) -> Result<Vec<ToolSummary>, McpError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut tools = Vec::new();
    let mut cursor = String::new();
    loop {
        let params = if cursor.is_empty() {
            None
        } else {
            Some(serde_json::json!({ "cursor": cursor }))
        };
        let page = connection.request("tools/list", params, cancel).await?;
        if let Some(entries) = page.get("tools").and_then(Value::as_array) {
            tools.extend(entries.iter().map(ToolSummary::from_value));
        }
        cursor = string_field(&page, "nextCursor");
        if cursor.is_empty() {
            break;
        }
    }
    Ok(tools)
}

async fn shutdown<R, W>(connection: Connection<R, W>, control: &mut ProcessControl, grace: Duration)
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut exit = connection.finish(CLOSE_TIMEOUT).await;
    let report = process::reap(&mut exit, control, grace).await;
    tracing::debug!("MCP server stopped after probe: {}", report.describe());
}
