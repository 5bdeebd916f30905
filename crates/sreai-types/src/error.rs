//! Error hierarchy shared across sreai crates.

use thiserror::Error;

/// Errors from resolving or parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot resolve home directory for the sreai config dir (set SREAI_CONFIG_DIR)")]
    HomeDirUnavailable,

    #[error("Config file parse error at {path}: {message}")]
    Parse { path: String, message: String },
}
