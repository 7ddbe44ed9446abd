use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::paths::paths;

/// Private key used for SSH public-key authentication.
#[derive(Debug, Clone)]
pub struct Credential {
    key: PathBuf,
    passphrase: Option<String>,
}

impl Credential {
    pub fn new(key: impl Into<PathBuf>, passphrase: Option<String>) -> Self {
        Self {
            key: key.into(),
            passphrase,
        }
    }

    /// Use `supplied` if it exists, otherwise fall back to `~/.ssh/id_rsa`.
    ///
    /// The fallback is not checked for existence; authentication reports it.
    pub fn resolve(supplied: &Path, passphrase: Option<String>) -> Result<Self> {
        if supplied.exists() {
            return Ok(Self::new(supplied, passphrase));
        }
        let fallback = paths()?.default_key;
        warn!(
            supplied = %supplied.display(),
            fallback = %fallback.display(),
            "private key not found, using default key"
        );
        Ok(Self::new(fallback, passphrase))
    }

    pub fn key(&self) -> &Path {
        &self.key
    }

    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_deref()
    }
}
