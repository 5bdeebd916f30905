//! MCP manager: the entry point tying the store, registry, launcher and probe together.

use crate::definition::{ServerDefinition, load_definition_from_file, split_alias_path};
use crate::error::McpError;
use crate::launcher::{self, RunOutput, RunRequest};
use crate::probe::{self, ProbeResult};
use crate::registry::Registry;
use crate::store::DefinitionStore;
use sreai_config::McpSettings;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Manages local MCP server definitions and the server catalog.
///
/// Store mutations are not serialized internally; callers must not run
/// `add`/`import`/`remove` concurrently against the same store file.
#[derive(Debug, Clone)]
pub struct McpManager {
    registry: Arc<Registry>,
    store: DefinitionStore,
}

impl McpManager {
    pub fn new(registry: Arc<Registry>, store: DefinitionStore) -> Self {
        Self { registry, store }
    }

    /// Manager over the per-user store with a fresh registry.
    pub fn open_default() -> Result<Self, McpError> {
        Ok(Self::new(
            Arc::new(Registry::new()),
            DefinitionStore::open_default()?,
        ))
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn store(&self) -> &DefinitionStore {
        &self.store
    }

    /// Rebuild the registry from embedded manifests, `settings`, and the store.
    pub async fn warmup(&self, settings: &McpSettings) -> Result<(), McpError> {
        self.registry.warmup(settings, &self.store).await
    }

    /// Persist a definition and register it.
    pub async fn add_local_server(
        &self,
        alias: &str,
        definition: ServerDefinition,
    ) -> Result<(), McpError> {
        let origin = self.store.path().display().to_string();
        self.add_with_origin(alias, definition, &origin).await
    }

    /// Import a definition from an `alias=path` expression.
    ///
    /// Returns the alias and the imported definition.
    pub async fn import_local_server(
        &self,
        expression: &str,
    ) -> Result<(String, ServerDefinition), McpError> {
        let (alias, path) = split_alias_path(expression)?;
        let definition = load_definition_from_file(Some(&alias), &path).await?;
        let origin = sreai_config::absolute_display_path(&path);
        self.add_with_origin(&alias, definition.clone(), &origin)
            .await?;
        tracing::info!("Imported MCP server '{}' from {}", alias, origin);
        Ok((alias, definition))
    }

    async fn add_with_origin(
        &self,
        alias: &str,
        definition: ServerDefinition,
        origin: &str,
    ) -> Result<(), McpError> {
        self.store.add(alias, definition.clone()).await?;
        self.registry
            .register_local(alias, definition, origin)
            .await;
        Ok(())
    }

    /// Delete a definition from the store and the registry.
    pub async fn remove_local_server(&self, alias: &str) -> Result<(), McpError> {
        self.store.remove(alias).await?;
        self.registry.remove(alias).await;
        Ok(())
    }

    pub async fn list_local_servers(
        &self,
    ) -> Result<BTreeMap<String, ServerDefinition>, McpError> {
        self.store.list().await
    }

    pub async fn get_local_server(&self, alias: &str) -> Result<ServerDefinition, McpError> {
        self.store.get(alias).await
    }

    /// Run a stored definition to completion.
    pub async fn run_local_command(
        &self,
        alias: &str,
        request: RunRequest,
        cancel: &CancellationToken,
    ) -> Result<RunOutput, McpError> {
        let definition = self.store.get(alias).await?;
        launcher::run_command(alias, &definition, request, cancel).await
    }

    /// Handshake with a stored definition and list its tools.
    pub async fn probe_local_server(
        &self,
        alias: &str,
        cancel: &CancellationToken,
    ) -> Result<ProbeResult, McpError> {
        let definition = self.store.get(alias).await?;
        probe::probe_server(alias, &definition, cancel).await
    }

    /// Verify a stored definition starts and stays up briefly.
    pub async fn check_local_server(
        &self,
        alias: &str,
        cancel: &CancellationToken,
    ) -> Result<(), McpError> {
        let definition = self.store.get(alias).await?;
        launcher::check_launch(alias, &definition, cancel).await
    }
}
