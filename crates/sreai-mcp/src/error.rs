//! Error types for local MCP server operations.

use crate::launcher::RunOutput;
use thiserror::Error;

/// Errors from the local MCP server store, registry, launcher and probe.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Configuration error: {0}")]
    Config(#[from] sreai_types::ConfigError),

    #[error("{0}")]
    Validation(String),

    #[error("unknown MCP server {alias}")]
    NotFound { alias: String },

    #[error("no MCP servers registered")]
    NoServersRegistered,

    #[error("Failed to read MCP server store {path}: {source}")]
    StoreParse {
        path: String,
        source: serde_json::Error,
    },

    #[error("load manifest {alias} ({path}): {message}")]
    ManifestLoad {
        alias: String,
        path: String,
        message: String,
    },

    #[error("unable to execute {alias}: {source}")]
    Launch {
        alias: String,
        source: std::io::Error,
    },

    #[error("{alias} exited with {code}: {stderr_tail}")]
    ProcessExit {
        alias: String,
        code: i32,
        stderr_tail: String,
        output: Box<RunOutput>,
    },

    #[error("{method} failed (code {code}): {message}")]
    JsonRpc {
        method: String,
        code: i64,
        message: String,
    },

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("server exited: {reason}")]
    ServerExited { reason: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{alias}: {source}{}", stderr_suffix(.stderr_tail))]
    Session {
        alias: String,
        stderr_tail: String,
        source: Box<McpError>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn stderr_suffix(tail: &str) -> String {
    if tail.is_empty() {
        String::new()
    } else {
        format!("\nstderr: {tail}")
    }
}

impl McpError {
    /// Attach alias and stderr context to a failure from a running session.
    pub(crate) fn in_session(self, alias: &str, stderr_tail: String) -> Self {
        match self {
            // Already carries its own context.
            McpError::Session { .. } | McpError::Launch { .. } | McpError::ProcessExit { .. } => {
                self
            }
            other => McpError::Session {
                alias: alias.to_string(),
                stderr_tail,
                source: Box::new(other),
            },
        }
    }

    /// The underlying error with any session wrapper removed.
    pub fn root(&self) -> &McpError {
        match self {
            McpError::Session { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the operation stopped because its cancellation token fired.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), McpError::Cancelled)
    }

    /// Whether the alias (or the whole store) was missing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.root(),
            McpError::NotFound { .. } | McpError::NoServersRegistered
        )
    }

    /// Captured stderr tail, when the error carries one.
    pub fn stderr_tail(&self) -> Option<&str> {
        match self {
            McpError::Session { stderr_tail, .. } | McpError::ProcessExit { stderr_tail, .. }
                if !stderr_tail.is_empty() =>
            {
                Some(stderr_tail)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_display_appends_stderr_tail() {
        let err = McpError::Protocol("missing Content-Length header".into())
            .in_session("files", "node: bad option".into());
        assert_eq!(
            err.to_string(),
            "files: MCP protocol error: missing Content-Length header\nstderr: node: bad option"
        );
        assert_eq!(err.stderr_tail(), Some("node: bad option"));
    }

    #[test]
    fn session_display_without_stderr() {
        let err = McpError::Cancelled.in_session("files", String::new());
        assert_eq!(err.to_string(), "files: Operation cancelled");
        assert!(err.stderr_tail().is_none());
        assert!(err.is_cancelled());
    }

    #[test]
    fn launch_errors_are_not_rewrapped() {
        let err = McpError::Launch {
            alias: "files".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        }
        .in_session("files", "ignored".into());
        assert!(matches!(err, McpError::Launch { .. }));
    }

    #[test]
    fn not_found_classification() {
        assert!(McpError::NoServersRegistered.is_not_found());
        assert!(
            McpError::NotFound {
                alias: "x".into()
            }
            .is_not_found()
        );
        assert!(!McpError::Cancelled.is_not_found());
    }

    #[test]
    fn json_rpc_display() {
        let err = McpError::JsonRpc {
            method: "initialize".into(),
            code: -32603,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "initialize failed (code -32603): boom");
    }
}
