//! Launch definitions for local MCP servers and their import formats.

use crate::error::McpError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// How to launch a local MCP server process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDefinition {
    /// Command to run (e.g., "npx", "python").
    #[serde(default)]
    pub command: String,
    /// Arguments passed before any per-invocation extras.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment overrides layered over the caller's environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Working directory; empty means inherit.
    #[serde(default)]
    pub workdir: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,
}

impl ServerDefinition {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<String>) -> Self {
        self.workdir = workdir.into();
        self
    }

    /// Reject definitions that cannot be launched.
    pub fn validate(&self) -> Result<(), McpError> {
        if self.command.trim().is_empty() {
            return Err(McpError::Validation("server command cannot be empty".into()));
        }
        Ok(())
    }
}

/// On-disk document: `{"mcpServers": {"<alias>": {...}}}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerDocument {
    #[serde(default, rename = "mcpServers")]
    pub servers: BTreeMap<String, ServerDefinition>,
}

/// Split an `alias=path` expression into its trimmed parts.
pub fn split_alias_path(input: &str) -> Result<(String, String), McpError> {
    let (alias, path) = input
        .split_once('=')
        .ok_or_else(|| McpError::Validation(format!("expected alias=path, got {input}")))?;
    let alias = alias.trim();
    let path = path.trim();
    if alias.is_empty() || path.is_empty() {
        return Err(McpError::Validation(format!(
            "invalid alias=path expression: {input}"
        )));
    }
    Ok((alias.to_string(), path.to_string()))
}

/// Parse a definition from an import file (`~` is expanded).
///
/// Accepts either a wrapped `{"mcpServers": {...}}` document or a bare
/// definition object. For wrapped documents `alias` selects the entry; without
/// an alias the document must hold exactly one entry.
pub async fn load_definition_from_file(
    alias: Option<&str>,
    path: &str,
) -> Result<ServerDefinition, McpError> {
    let expanded = sreai_config::expand_path(path);
    let data = tokio::fs::read_to_string(&expanded).await?;
    parse_definition(alias, &data, &expanded)
}

fn parse_definition(
    alias: Option<&str>,
    data: &str,
    origin: &Path,
) -> Result<ServerDefinition, McpError> {
    if let Ok(mut document) = serde_json::from_str::<ServerDocument>(data) {
        if !document.servers.is_empty() {
            return match alias {
                Some(alias) => document.servers.remove(alias).ok_or_else(|| {
                    McpError::Validation(format!(
                        "alias {alias} not found in {}",
                        origin.display()
                    ))
                }),
                None if document.servers.len() == 1 => document
                    .servers
                    .into_values()
                    .next()
                    .ok_or_else(|| McpError::Validation("empty server document".into())),
                None => Err(McpError::Validation(
                    "alias required when file contains multiple servers".into(),
                )),
            };
        }
    }

    serde_json::from_str::<ServerDefinition>(data).map_err(|e| {
        McpError::Validation(format!(
            "parse server definition {}: {e}",
            origin.display()
        ))
    })
}
