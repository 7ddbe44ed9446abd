//! Host trust bootstrap.
//!
//! libgit2 verifies SSH host keys against the user's `known_hosts`, so the
//! remote host must be recorded there before the first clone or push.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::error::SyncError;

/// Where host keys are recorded and how they are discovered.
#[derive(Debug, Clone)]
pub struct TrustStore {
    pub known_hosts: PathBuf,
    pub keyscan: String,
}

/// Build the host-key discovery command (`ssh-keyscan [-p port] host`).
pub fn keyscan_command(program: &str, host: &str, port: Option<u16>) -> Command {
    let mut cmd = Command::new(program);
    if let Some(p) = port {
        cmd.arg("-p").arg(p.to_string());
    }
    cmd.arg(host);
    cmd
}

/// Run host-key discovery and return the `known_hosts` lines it printed.
///
/// # Errors
/// Fails if the program cannot be started, exits non-zero, or reports no keys.
pub fn scan_host_keys(
    store: &TrustStore,
    host: &str,
    port: Option<u16>,
) -> Result<Vec<String>, SyncError> {
    let trust_err = |reason: String| SyncError::Trust {
        host: host.to_string(),
        reason,
    };

    let out = keyscan_command(&store.keyscan, host, port)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .map_err(|e| trust_err(format!("cannot run {}: {}", store.keyscan, e)))?;

    if !out.status.success() {
        return Err(trust_err(format!("{} exited with {}", store.keyscan, out.status)));
    }

    let entries: Vec<String> = String::from_utf8_lossy(&out.stdout)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect();

    if entries.is_empty() {
        return Err(trust_err("no host keys returned".to_string()));
    }
    Ok(entries)
}

/// Append `entries` that are not yet present in the `known_hosts` file.
///
/// The file and its parent directory are created when missing. Existing
/// content is never rewritten. Returns how many lines were appended.
pub fn append_entries(path: &Path, entries: &[String]) -> Result<usize, SyncError> {
    let store_err = |source| SyncError::TrustStore {
        path: path.to_path_buf(),
        source,
    };

    let existing = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(store_err(e)),
    };
    let mut known: HashSet<&str> = existing.lines().map(str::trim).collect();

    let mut fresh = Vec::new();
    for e in entries {
        if known.insert(e.as_str()) {
            fresh.push(e.as_str());
        }
    }
    if fresh.is_empty() {
        return Ok(0);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(store_err)?;
    }
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(store_err)?;

    let mut buf = String::new();
    if !existing.is_empty() && !existing.ends_with('\n') {
        buf.push('\n');
    }
    for line in &fresh {
        buf.push_str(line);
        buf.push('\n');
    }
    f.write_all(buf.as_bytes()).map_err(store_err)?;
    Ok(fresh.len())
}

/// Make sure `host` is trusted before any network operation.
pub fn ensure_trusted(store: &TrustStore, host: &str, port: Option<u16>) -> Result<usize, SyncError> {
    let entries = scan_host_keys(store, host, port)?;
    let added = append_entries(&store.known_hosts, &entries)?;
    if added > 0 {
        info!(host, added, known_hosts = %store.known_hosts.display(), "trusted host keys");
    } else {
        debug!(host, "host keys already trusted");
    }
    Ok(added)
}
