//! Request/response correlation over a framed stdio stream.
//!
//! A [`Connection`] is driven by a single caller. Responses that arrive for
//! other requests are parked in a pending map, server-initiated requests are
//! answered with "method not found", and notifications are recorded.

use crate::error::McpError;
use crate::framing::{read_frame, write_frame};
use crate::jsonrpc::{
    Envelope, JsonRpcErrorResponse, JsonRpcNotification, JsonRpcRequest, MessageKind, id_key,
};
use crate::process::{ExitReport, ExitWatch};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How long buffered output may still be read after the process has exited.
const EXIT_DRAIN_WINDOW: Duration = Duration::from_millis(250);

/// How long to wait for the exit report once stdout reaches EOF.
const EOF_EXIT_WAIT: Duration = Duration::from_secs(2);

/// Longest notification detail kept.
const NOTIFICATION_DETAIL_BYTES: usize = 400;

/// A notification received from the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub method: String,
    /// Compact JSON of the params, truncated.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

impl Notification {
    fn from_envelope(method: &str, params: Option<&serde_json::Value>) -> Self {
        let detail = params.map(sreai_types::compact_json).unwrap_or_default();
        Self {
            method: method.to_string(),
            detail: sreai_types::truncate_with_ellipsis(&detail, NOTIFICATION_DETAIL_BYTES),
        }
    }
}

/// One client-side JSON-RPC session.
pub struct Connection<R, W> {
    alias: String,
    reader: R,
    writer: Option<W>,
    exit: ExitWatch,
    pending: HashMap<String, Envelope>,
    notifications: Vec<Notification>,
    next_id: u64,
}

impl<R, W> Connection<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(alias: impl Into<String>, reader: R, writer: W, exit: ExitWatch) -> Self {
        Self {
            alias: alias.into(),
            reader,
            writer: Some(writer),
            exit,
            pending: HashMap::new(),
            notifications: Vec::new(),
            next_id: 1,
        }
    }

    /// Send a request and return its id key.
    pub async fn send_request(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
        cancel: &CancellationToken,
    ) -> Result<String, McpError> {
        let id = self.next_id;
        self.next_id += 1;
        let request = JsonRpcRequest::new(id, method, params);
        self.write_message(&request, cancel).await?;
        Ok(id.to_string())
    }

    /// Send a notification.
    pub async fn notify(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
        cancel: &CancellationToken,
    ) -> Result<(), McpError> {
        let notification = JsonRpcNotification::new(method, params);
        self.write_message(&notification, cancel).await
    }

    /// Wait for the response to request `id`, servicing other traffic meanwhile.
    pub async fn await_response(
        &mut self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Envelope, McpError> {
        if let Some(envelope) = self.pending.remove(id) {
            return Ok(envelope);
        }

        loop {
            let body = self.next_frame(cancel).await?;
            let envelope = Envelope::decode(&body)?;
            match envelope.kind() {
                MessageKind::Response => {
                    let key = match envelope.id() {
                        Some(value) => id_key(value)?,
                        None => continue,
                    };
                    if key == id {
                        return Ok(envelope);
                    }
                    self.pending.insert(key, envelope);
                }
                MessageKind::Request => {
                    let method = envelope.method().unwrap_or_default().to_string();
                    let request_id = envelope.id.clone().unwrap_or_default();
                    id_key(&request_id)?;
                    tracing::debug!(
                        "MCP server '{}' sent unsolicited request '{}'",
                        self.alias,
                        method
                    );
                    let reply = JsonRpcErrorResponse::method_not_found(request_id, &method);
                    self.write_message(&reply, cancel).await?;
                }
                MessageKind::Notification => {
                    let notification = Notification::from_envelope(
                        envelope.method().unwrap_or_default(),
                        envelope.params.as_ref(),
                    );
                    tracing::debug!(
                        "MCP server '{}' notification: {} {}",
                        self.alias,
                        notification.method,
                        notification.detail
                    );
                    self.notifications.push(notification);
                }
                MessageKind::Unknown => {
                    tracing::debug!("Ignoring MCP message without id or method");
                }
            }
        }
    }

    /// Send a request and return its `result`.
    ///
    /// A JSON-RPC error response becomes [`McpError::JsonRpc`]; a response
    /// without a result is a protocol error.
    pub async fn request(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, McpError> {
        let id = self.send_request(method, params, cancel).await?;
        let response = self.await_response(&id, cancel).await?;
        if let Some(err) = response.error {
            return Err(McpError::JsonRpc {
                method: method.to_string(),
                code: err.code,
                message: err.message,
            });
        }
        response
            .result
            .ok_or_else(|| McpError::Protocol(format!("{method} response missing result")))
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    /// Close the write side (the server sees EOF) and hand back the exit watch.
    pub async fn finish(mut self, timeout: Duration) -> ExitWatch {
        if let Some(mut writer) = self.writer.take() {
            if tokio::time::timeout(timeout, writer.shutdown()).await.is_err() {
                tracing::debug!("Timed out closing stdin of MCP server '{}'", self.alias);
            }
        }
        self.exit
    }

    async fn write_message<T: Serialize>(
        &mut self,
        message: &T,
        cancel: &CancellationToken,
    ) -> Result<(), McpError> {
        let body = serde_json::to_vec(message)?;
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| McpError::Protocol("connection is closed for writing".into()))?;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(McpError::Cancelled),
            result = write_frame(writer, &body) => result,
        };

        match result {
            Err(McpError::Io(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                // The server is gone; report its exit rather than the pipe.
                match tokio::time::timeout(EXIT_DRAIN_WINDOW, self.exit.wait()).await {
                    Ok(report) => Err(report.into_error()),
                    Err(_) => Err(McpError::Io(e)),
                }
            }
            other => other,
        }
    }

    /// Read the next frame body, racing cancellation and process exit.
    ///
    /// After the process exits, frames it already wrote may still be read for
    /// a short window; after that the exit is reported as an error.
    async fn next_frame(&mut self, cancel: &CancellationToken) -> Result<Vec<u8>, McpError> {
        let read = read_frame(&mut self.reader);
        tokio::pin!(read);

        let mut exited: Option<ExitReport> = None;
        let mut drain_deadline: Option<Instant> = None;

        let outcome = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(McpError::Cancelled),
                result = &mut read => break result,
                report = self.exit.wait(), if exited.is_none() => {
                    exited = Some(report);
                    drain_deadline = Some(Instant::now() + EXIT_DRAIN_WINDOW);
                }
                _ = tokio::time::sleep_until(drain_deadline.unwrap_or_else(Instant::now)),
                    if drain_deadline.is_some() =>
                {
                    break Ok(None);
                }
            }
        };

        match outcome {
            Ok(Some(body)) => Ok(body),
            Ok(None) => {
                let report = match exited {
                    Some(report) => Some(report),
                    None => tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(McpError::Cancelled),
                        report = tokio::time::timeout(EOF_EXIT_WAIT, self.exit.wait()) => report.ok(),
                    },
                };
                match report {
                    Some(report) => {
                        tracing::debug!(
                            "MCP server '{}' exited mid-session: {}",
                            self.alias,
                            report.describe()
                        );
                        Err(report.into_error())
                    }
                    None => Err(McpError::Protocol("server closed its output stream".into())),
                }
            }
            Err(e) => Err(e),
        }
    }
}
