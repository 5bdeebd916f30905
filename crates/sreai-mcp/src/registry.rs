//! Catalog of MCP servers keyed by alias.
//!
//! Unifies descriptive manifests (embedded or config-declared) and launchable
//! local definitions under one alias space. Rebuilt on every warmup.

use crate::definition::ServerDefinition;
use crate::error::McpError;
use crate::manifest::{self, Manifest, Source};
use crate::store::DefinitionStore;
use serde::Serialize;
use sreai_config::McpSettings;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// One registered server.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub alias: String,
    pub source: Source,
    /// Display path the entry was loaded from.
    pub origin: String,
    pub manifest: Option<Manifest>,
    pub definition: Option<ServerDefinition>,
}

impl CatalogEntry {
    fn from_manifest(alias: &str, manifest: Manifest, source: Source, origin: &str) -> Self {
        Self {
            alias: alias.to_string(),
            source,
            origin: origin.to_string(),
            manifest: Some(manifest),
            definition: None,
        }
    }

    fn from_definition(alias: &str, definition: ServerDefinition, origin: &str) -> Self {
        Self {
            alias: alias.to_string(),
            source: Source::Local,
            origin: origin.to_string(),
            manifest: None,
            definition: Some(definition),
        }
    }

    /// Flattened, serializable view for listings.
    pub fn summary(&self) -> ServerSummary {
        let mut summary = ServerSummary {
            alias: self.alias.clone(),
            source: self.source,
            origin: self.origin.clone(),
            ..ServerSummary::default()
        };
        if let Some(manifest) = &self.manifest {
            summary.manifest_name = manifest.name.clone();
            summary.manifest_version = manifest.version.clone();
            summary.manifest_transport_type =
                manifest.transport_type().unwrap_or_default().to_string();
            summary.manifest_capabilities = manifest.capabilities.iter().cloned().collect();
        }
        if let Some(def) = &self.definition {
            summary.command = def.command.clone();
            summary.args = def.args.clone();
            summary.workdir = def.workdir.clone();
            summary.env = def.env.clone();
            summary.notes = def.notes.clone();
        }
        summary
    }
}

/// Display projection of a [`CatalogEntry`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServerSummary {
    pub alias: String,
    pub source: Source,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub origin: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub command: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub workdir: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub notes: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub manifest_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub manifest_version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub manifest_transport_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub manifest_capabilities: Vec<String>,
}

/// Registry of MCP servers. Reads share the lock; mutations take it exclusively.
///
/// The lock is tokio's fair `RwLock`, so a queued writer is never starved by
/// a stream of readers and vice versa.
#[derive(Debug, Default)]
pub struct Registry {
    entries: RwLock<HashMap<String, CatalogEntry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every entry.
    pub async fn reset(&self) {
        self.entries.write().await.clear();
    }

    /// Register (or replace) a manifest-based entry.
    pub async fn register_manifest(
        &self,
        alias: &str,
        manifest: Manifest,
        source: Source,
        origin: &str,
    ) {
        let entry = CatalogEntry::from_manifest(alias, manifest, source, origin);
        self.entries.write().await.insert(alias.to_string(), entry);
    }

    /// Register (or replace) a launchable local definition.
    pub async fn register_local(&self, alias: &str, definition: ServerDefinition, origin: &str) {
        let entry = CatalogEntry::from_definition(alias, definition, origin);
        self.entries.write().await.insert(alias.to_string(), entry);
    }

    pub async fn remove(&self, alias: &str) {
        self.entries.write().await.remove(alias);
    }

    pub async fn get(&self, alias: &str) -> Option<CatalogEntry> {
        self.entries.read().await.get(alias).cloned()
    }

    /// All aliases in lexical order.
    pub async fn list(&self) -> Vec<String> {
        let mut aliases: Vec<String> = self.entries.read().await.keys().cloned().collect();
        aliases.sort();
        aliases
    }

    /// All entries, sorted by alias.
    pub async fn snapshot(&self) -> Vec<CatalogEntry> {
        let mut entries: Vec<CatalogEntry> = self.entries.read().await.values().cloned().collect();
        entries.sort_by(|a, b| a.alias.cmp(&b.alias));
        entries
    }

    /// Display summaries, sorted by alias.
    pub async fn summaries(&self) -> Vec<ServerSummary> {
        self.snapshot()
            .await
            .iter()
            .map(CatalogEntry::summary)
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Rebuild the catalog: embedded defaults, then config-declared manifests,
    /// then persisted local definitions. Later sources replace earlier ones
    /// sharing an alias, so local definitions win.
    ///
    /// The catalog is assembled off-lock and swapped in with one write. Any
    /// manifest failure aborts the warmup and leaves the registry empty.
    pub async fn warmup(
        &self,
        settings: &McpSettings,
        store: &DefinitionStore,
    ) -> Result<(), McpError> {
        self.reset().await;

        let mut staged: HashMap<String, CatalogEntry> = HashMap::new();

        for (alias, manifest) in manifest::embedded_manifests()? {
            staged.insert(
                alias.to_string(),
                CatalogEntry::from_manifest(alias, manifest, Source::Embedded, "embedded"),
            );
        }

        for (alias, location) in &settings.servers {
            let manifest = manifest::load_declared(alias, location).await?;
            let origin = manifest::origin_of(location);
            staged.insert(
                alias.clone(),
                CatalogEntry::from_manifest(alias, manifest, Source::Config, &origin),
            );
        }

        let origin = store.path().display().to_string();
        for (alias, definition) in store.list().await? {
            let entry = CatalogEntry::from_definition(&alias, definition, &origin);
            staged.insert(alias, entry);
        }

        tracing::debug!("MCP registry warmed up with {} servers", staged.len());
        *self.entries.write().await = staged;
        Ok(())
    }
}
