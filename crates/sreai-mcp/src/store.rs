//! Persistent local server definitions backed by a single JSON file.

use crate::definition::{ServerDefinition, ServerDocument};
use crate::error::McpError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File-based definition store: `{"mcpServers": {...}}` in one file.
///
/// Mutations rewrite the whole document. There is no internal locking, so
/// callers must serialize `add`/`remove` against the same file.
#[derive(Debug, Clone)]
pub struct DefinitionStore {
    path: PathBuf,
}

impl DefinitionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the per-user location (`<config_dir>/mcp/servers.json`).
    pub fn open_default() -> Result<Self, McpError> {
        Ok(Self::new(sreai_config::mcp_store_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or replace `alias`, then persist.
    pub async fn add(&self, alias: &str, definition: ServerDefinition) -> Result<(), McpError> {
        if alias.trim().is_empty() {
            return Err(McpError::Validation("alias cannot be empty".into()));
        }
        definition.validate()?;

        let mut document = self.load().await?.unwrap_or_default();
        document.servers.insert(alias.to_string(), definition);
        self.save(&document).await?;
        tracing::debug!("Saved MCP server '{}' to {}", alias, self.path.display());
        Ok(())
    }

    /// Delete `alias` and persist.
    pub async fn remove(&self, alias: &str) -> Result<(), McpError> {
        let mut document = self.load().await?.ok_or(McpError::NoServersRegistered)?;
        if document.servers.remove(alias).is_none() {
            return Err(McpError::NotFound {
                alias: alias.to_string(),
            });
        }
        self.save(&document).await?;
        tracing::debug!("Removed MCP server '{}' from {}", alias, self.path.display());
        Ok(())
    }

    /// Fetch one definition. A missing store file is an error here.
    pub async fn get(&self, alias: &str) -> Result<ServerDefinition, McpError> {
        let mut document = self.load().await?.ok_or(McpError::NoServersRegistered)?;
        document
            .servers
            .remove(alias)
            .ok_or_else(|| McpError::NotFound {
                alias: alias.to_string(),
            })
    }

    /// All stored definitions. A missing store file yields an empty map.
    pub async fn list(&self) -> Result<BTreeMap<String, ServerDefinition>, McpError> {
        Ok(self
            .load()
            .await?
            .map(|document| document.servers)
            .unwrap_or_default())
    }

    /// Read and parse the store file; `None` when it does not exist.
    async fn load(&self) -> Result<Option<ServerDocument>, McpError> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let document: ServerDocument =
            serde_json::from_str(&data).map_err(|source| McpError::StoreParse {
                path: self.path.display().to_string(),
                source,
            })?;
        Ok(Some(document))
    }

    /// Atomic write: owner-only .tmp file, then rename over the target.
    async fn save(&self, document: &ServerDocument) -> Result<(), McpError> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let json = serde_json::to_string_pretty(document)?;
        let tmp_path = self.path.with_extension("json.tmp");
        write_private(&tmp_path, json.as_bytes()).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

async fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await?;
    // `mode` only applies on create; a leftover file keeps its old bits.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .await?;
    }
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}
