use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Broad category of a [`SyncError`], used for diagnostics and exit handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed connection string or unusable artifact.
    Input,
    /// Host-key discovery or trust store failure.
    Trust,
    /// Clone/open/pull/commit/push failure.
    Repository,
    /// Copy or index tracking failure.
    Filesystem,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Input => "input",
            ErrorKind::Trust => "trust",
            ErrorKind::Repository => "repository",
            ErrorKind::Filesystem => "filesystem",
        })
    }
}

/// Every failure the synchronization engine can report.
///
/// Tolerated conditions (empty remote on clone, nothing new on pull) never
/// surface here; they are modelled as regular outcomes instead.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid repository address: {0}")]
    InvalidAddress(String),

    #[error("artifact not readable: {}", path.display())]
    ArtifactUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("artifact is empty: {}", .0.display())]
    ArtifactEmpty(PathBuf),

    #[error("host key discovery failed for {host}: {reason}")]
    Trust { host: String, reason: String },

    #[error("cannot update trust store {}", path.display())]
    TrustStore {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("git clone {url}")]
    Clone {
        url: String,
        #[source]
        source: git2::Error,
    },

    #[error("cannot open mirror at {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("git pull origin")]
    Pull(#[source] git2::Error),

    #[error("local branch {branch} has diverged from origin/{branch}")]
    Diverged { branch: String },

    #[error("HEAD does not point to a branch")]
    DetachedHead,

    #[error("cannot stage {}", path.display())]
    Stage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot track {path} in the index")]
    Track {
        path: String,
        #[source]
        source: git2::Error,
    },

    #[error("git commit")]
    Commit(#[source] git2::Error),

    #[error("git push origin {refspec}")]
    Push {
        refspec: String,
        #[source]
        source: git2::Error,
    },

    #[error("push of {reference} rejected by remote: {message}")]
    PushRejected { reference: String, message: String },
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::InvalidAddress(_)
            | SyncError::ArtifactUnreadable { .. }
            | SyncError::ArtifactEmpty(_) => ErrorKind::Input,
            SyncError::Trust { .. } | SyncError::TrustStore { .. } => ErrorKind::Trust,
            SyncError::Clone { .. }
            | SyncError::Open { .. }
            | SyncError::Pull(_)
            | SyncError::Diverged { .. }
            | SyncError::DetachedHead
            | SyncError::Commit(_)
            | SyncError::Push { .. }
            | SyncError::PushRejected { .. } => ErrorKind::Repository,
            SyncError::Stage { .. } | SyncError::Track { .. } => ErrorKind::Filesystem,
        }
    }
}
