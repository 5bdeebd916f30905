//! Descriptive MCP manifests and the catalog's source tags.
//!
//! Manifests describe a server (transport, auth, tools) but are never
//! launched by this crate.

use crate::error::McpError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

type JsonObject = serde_json::Map<String, serde_json::Value>;

/// Manifests compiled into the binary, registered first at warmup.
const EMBEDDED_MANIFESTS: &[(&str, &str)] = &[
    ("files", include_str!("../manifests/files.json")),
    ("github", include_str!("../manifests/github.json")),
];

/// Where a catalog entry came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Compiled-in defaults.
    Embedded,
    /// Manifest path declared in settings.
    Config,
    /// Persisted in the definition store.
    #[default]
    Local,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Embedded => "embedded",
            Source::Config => "config",
            Source::Local => "local",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The subset of an MCP manifest the catalog understands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub transport: JsonObject,
    #[serde(default)]
    pub auth: JsonObject,
    #[serde(default)]
    pub tools: Vec<JsonObject>,
    #[serde(default)]
    pub resources: Vec<JsonObject>,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Original document text, kept for faithful display.
    #[serde(skip)]
    pub raw: String,
}

impl Manifest {
    /// Parse a manifest document, retaining its original text.
    pub fn parse(data: &str) -> Result<Self, McpError> {
        let mut manifest: Manifest = serde_json::from_str(data)?;
        manifest.raw = data.to_string();
        Ok(manifest)
    }

    /// Read and parse a manifest file (`~` is expanded).
    pub async fn load(path: &str) -> Result<Self, McpError> {
        let expanded = sreai_config::expand_path(path);
        let data = tokio::fs::read_to_string(&expanded).await?;
        Self::parse(&data)
    }

    /// `transport.type`, when declared as a string.
    pub fn transport_type(&self) -> Option<&str> {
        self.transport
            .get("type")
            .and_then(serde_json::Value::as_str)
    }

    /// Manifest JSON for display: the original text when available.
    pub fn to_pretty_json(&self) -> Result<String, McpError> {
        if !self.raw.is_empty() {
            return Ok(self.raw.clone());
        }
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Parse every compiled-in manifest as `(alias, manifest)`.
pub fn embedded_manifests() -> Result<Vec<(&'static str, Manifest)>, McpError> {
    EMBEDDED_MANIFESTS
        .iter()
        .map(|(alias, data)| {
            Manifest::parse(data)
                .map(|manifest| (*alias, manifest))
                .map_err(|e| McpError::ManifestLoad {
                    alias: (*alias).to_string(),
                    path: "<embedded>".to_string(),
                    message: e.to_string(),
                })
        })
        .collect()
}

/// Load a config-declared manifest, wrapping failures with alias context.
pub(crate) async fn load_declared(alias: &str, location: &str) -> Result<Manifest, McpError> {
    Manifest::load(location)
        .await
        .map_err(|e| McpError::ManifestLoad {
            alias: alias.to_string(),
            path: location.to_string(),
            message: e.to_string(),
        })
}

/// Display origin for a declared manifest location.
pub(crate) fn origin_of(location: &str) -> String {
    sreai_config::expand_path(location).display().to_string()
}
