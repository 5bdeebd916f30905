//! Shared error hierarchy and string helpers for sreai.

pub mod error;
pub mod util;

pub use error::ConfigError;
pub use util::{compact_json, mask_value, tail_str, truncate_str, truncate_with_ellipsis};
