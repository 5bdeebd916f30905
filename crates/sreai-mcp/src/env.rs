//! Environment assembly for launched servers: layered variables and a `PATH`
//! that prefers bundled runtimes shipped next to the executable.

use crate::error::McpError;
use std::collections::{BTreeMap, HashSet};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

#[cfg(windows)]
const PATH_SEPARATOR: char = ';';
#[cfg(not(windows))]
const PATH_SEPARATOR: char = ':';

/// Bundled runtime roots, relative to the executable's directory.
const RUNTIME_ROOTS: &[&str] = &["third_party/node", "../third_party/node"];

/// The current process environment, byte for byte.
pub fn process_env() -> BTreeMap<OsString, OsString> {
    std::env::vars_os().collect()
}

/// Layer `definition_env` then `extra_env` over `base`, and put `runtime_dirs`
/// at the front of `PATH`.
pub fn merge_env(
    base: BTreeMap<OsString, OsString>,
    definition_env: &BTreeMap<String, String>,
    extra_env: &BTreeMap<String, String>,
    runtime_dirs: &[PathBuf],
) -> BTreeMap<OsString, OsString> {
    let mut env = base;
    for (key, value) in definition_env.iter().chain(extra_env) {
        env.insert(OsString::from(key), OsString::from(value));
    }

    let path_key = path_key(&env);
    let existing = env.get(&path_key).cloned().unwrap_or_default();
    let augmented = augment_path(&existing, runtime_dirs);
    if !augmented.is_empty() {
        env.insert(path_key, augmented);
    }
    env
}

/// The key holding `PATH`; matched case-insensitively on Windows.
fn path_key(env: &BTreeMap<OsString, OsString>) -> OsString {
    if cfg!(windows) {
        let found = env
            .keys()
            .find(|k| k.to_str().is_some_and(|k| k.eq_ignore_ascii_case("PATH")));
        if let Some(key) = found {
            return key.clone();
        }
    }
    OsString::from("PATH")
}

/// Prepend `dirs` to a `PATH` value, dropping empty and duplicate entries.
/// Duplicates are detected case-insensitively. Entries that are not valid
/// UTF-8 are kept as-is.
pub fn augment_path(existing: &OsStr, dirs: &[PathBuf]) -> OsString {
    let mut seen = HashSet::new();
    let mut parts: Vec<OsString> = Vec::new();

    let prepended = dirs.iter().map(|d| d.as_os_str().to_os_string());
    for entry in prepended.chain(split_path(existing)) {
        let trimmed = entry.to_str().map(|text| OsString::from(text.trim()));
        let entry = trimmed.unwrap_or(entry);
        if entry.is_empty() {
            continue;
        }
        if seen.insert(entry.to_string_lossy().to_lowercase()) {
            parts.push(entry);
        }
    }

    let mut joined = OsString::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            joined.push(PATH_SEPARATOR.to_string());
        }
        joined.push(part);
    }
    joined
}

#[cfg(unix)]
fn split_path(value: &OsStr) -> Vec<OsString> {
    use std::os::unix::ffi::OsStrExt;

    value
        .as_bytes()
        .split(|b| *b == PATH_SEPARATOR as u8)
        .map(|entry| OsStr::from_bytes(entry).to_os_string())
        .collect()
}

#[cfg(not(unix))]
fn split_path(value: &OsStr) -> Vec<OsString> {
    value
        .to_string_lossy()
        .split(PATH_SEPARATOR)
        .map(OsString::from)
        .collect()
}

/// Bundled runtime bin directories for the running executable.
pub fn runtime_bin_dirs() -> Vec<PathBuf> {
    match std::env::current_exe() {
        Ok(exe) => match exe.parent() {
            Some(dir) => runtime_bin_dirs_in(dir),
            None => Vec::new(),
        },
        Err(e) => {
            tracing::debug!("Cannot resolve current executable: {e}");
            Vec::new()
        }
    }
}

/// Bundled runtime bin directories under `exe_dir`, in discovery order.
///
/// Each subdirectory of a runtime root contributes itself when it holds
/// `node.exe`, otherwise its `bin/` when that holds `node`.
pub fn runtime_bin_dirs_in(exe_dir: &Path) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut dirs = Vec::new();

    for root in RUNTIME_ROOTS {
        let root = exe_dir.join(root);
        let Ok(read_dir) = std::fs::read_dir(&root) else {
            continue;
        };
        let mut children: Vec<PathBuf> = read_dir
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        children.sort();

        for child in children {
            let candidate = if child.join("node.exe").is_file() {
                child
            } else if child.join("bin").join("node").is_file() {
                child.join("bin")
            } else {
                continue;
            };
            if seen.insert(candidate.display().to_string().to_lowercase()) {
                dirs.push(candidate);
            }
        }
    }
    dirs
}

/// Path of the first bundled node binary.
pub fn local_node_executable() -> Result<PathBuf, McpError> {
    runtime_bin_dirs()
        .into_iter()
        .find_map(|dir| node_binary_in(&dir))
        .ok_or_else(|| {
            McpError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "bundled node runtime not found",
            ))
        })
}

fn node_binary_in(dir: &Path) -> Option<PathBuf> {
    ["node.exe", "node"]
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}
