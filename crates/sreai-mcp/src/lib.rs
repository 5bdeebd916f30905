//! Local MCP (Model Context Protocol) server support for sreai.
//!
//! Persists launch definitions for local servers, keeps a catalog that merges
//! them with descriptive manifests, runs definitions as one-shot commands, and
//! probes servers over stdio using `Content-Length` framed JSON-RPC 2.0.

pub mod connection;
pub mod definition;
pub mod env;
pub mod error;
pub mod framing;
pub mod jsonrpc;
pub mod launcher;
pub mod manager;
pub mod manifest;
pub mod probe;
pub mod process;
pub mod registry;
pub mod store;

pub use connection::{Connection, Notification};
pub use definition::{ServerDefinition, load_definition_from_file, split_alias_path};
pub use env::local_node_executable;
pub use error::McpError;
pub use launcher::{LaunchPlan, RunOutput, RunRequest, check_launch, run_command};
pub use manager::McpManager;
pub use manifest::{Manifest, Source};
pub use probe::{ProbeResult, ToolSummary, probe_server};
pub use registry::{CatalogEntry, Registry, ServerSummary};
pub use store::DefinitionStore;
pub use tokio_util::sync::CancellationToken;
