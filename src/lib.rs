//! Crate entry point for **dumpvault**.
//!
//! This library provides the implementation for the `dumpvault` CLI: it dumps
//! a WordPress database and publishes each dump as a new commit in a remote
//! git repository, so the repository history becomes the backup history.
//! Each submodule encapsulates one responsibility (address parsing, host trust,
//! mirror resolution, git operations, the sync pipeline, etc.).
//! The `pub use` re-exports make the commands and the main types accessible
//! directly from the crate root.

pub mod config;
pub mod credential;
pub mod dump;
pub mod endpoint;
pub mod error;
pub mod git;
pub mod mirror;
mod paths;
mod progress;
pub mod stage;
pub mod sync;
pub mod trust;

/// Re-export commonly used types and commands so they can be accessed from `dumpvault::*`.
pub use config::{Config, DumpArgs, RepoArgs};
pub use credential::Credential;
pub use dump::cmd_dump;
pub use endpoint::RepositoryEndpoint;
pub use error::{ErrorKind, SyncError};
pub use mirror::MirrorState;
pub use paths::dumpvault_home;
pub use sync::{
    Author, EmptyMirrorPolicy, SyncRequest, SyncResult, cmd_backup, cmd_push, publish,
};
