//! Configuration locations and MCP settings for sreai.
//!
//! The config directory resolves with precedence:
//! `SREAI_CONFIG_DIR` env var > `~/.config/sre-ai`

use serde::{Deserialize, Serialize};
use sreai_types::ConfigError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the config directory.
pub const CONFIG_DIR_ENV: &str = "SREAI_CONFIG_DIR";

/// Settings file name, relative to the config dir.
pub const CONFIG_FILE: &str = "config.toml";

/// Store file name, relative to `<config_dir>/mcp/`.
pub const MCP_STORE_FILE: &str = "servers.json";

/// MCP-related settings consumed by registry warmup.
///
/// `servers` maps an alias to the path of a descriptive manifest file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpSettings {
    #[serde(default)]
    pub servers: BTreeMap<String, String>,
}

impl McpSettings {
    /// Add (or replace) a manifest location for `alias`.
    pub fn with_server(mut self, alias: impl Into<String>, location: impl Into<String>) -> Self {
        self.servers.insert(alias.into(), location.into());
        self
    }

    /// Read the `[mcp]` table of a TOML settings file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::Parse {
                    path: path.display().to_string(),
                    message: e.to_string(),
                });
            }
        };
        let file: SettingsFile = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        tracing::debug!(
            "Loaded {} MCP manifest locations from {}",
            file.mcp.servers.len(),
            path.display()
        );
        Ok(file.mcp)
    }

    /// Fill in aliases from `other` that are not already set here.
    pub fn merge_missing(&mut self, other: McpSettings) {
        for (alias, location) in other.servers {
            self.servers.entry(alias).or_insert(location);
        }
    }
}

/// On-disk settings file; only the `[mcp]` table is read.
#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    mcp: McpSettings,
}

/// Get the sreai config directory path (`~/.config/sre-ai/`).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let home = dirs_next::home_dir().ok_or(ConfigError::HomeDirUnavailable)?;
    Ok(home.join(".config").join("sre-ai"))
}

/// Path of the settings file (`<config_dir>/config.toml`).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// Path of the persisted local MCP server definitions.
pub fn mcp_store_path() -> Result<PathBuf, ConfigError> {
    let path = config_dir()?.join("mcp").join(MCP_STORE_FILE);
    tracing::debug!("MCP store path resolved to {}", path.display());
    Ok(path)
}

/// Expand a leading `~` to the home directory. Other paths are returned as-is.
pub fn expand_path(input: &str) -> PathBuf {
    if let Some(rest) = input.strip_prefix('~') {
        if let Some(home) = dirs_next::home_dir() {
            let rest = rest.trim_start_matches(['/', '\\']);
            return if rest.is_empty() { home } else { home.join(rest) };
        }
    }
    PathBuf::from(input)
}

/// Expand `~` and make the path absolute against the current directory, for display.
pub fn absolute_display_path(input: &str) -> String {
    let expanded = expand_path(input);
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(expanded),
            Err(_) => expanded,
        }
    };
    absolute.display().to_string()
}
