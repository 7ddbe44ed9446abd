//! Git integration layer.
//!
//! This module wraps the actual backend implementation (`git2_backend`)
//! and re-exports the operations the sync pipeline needs, so nothing else in
//! the crate talks to `git2` transports directly.

mod git2_backend;

use git2::{Oid, Repository};

pub use git2_backend::{clone_repo, commit_index, current_branch, open_repo, pull, push, track};

/// Result of cloning a remote.
pub enum CloneOutcome {
    /// The remote had history; the work tree is checked out.
    Cloned(Repository),
    /// The remote had no commits. The repository exists locally, has `origin`
    /// configured and no branch yet.
    EmptyRemote(Repository),
}

/// Result of a pull that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// Nothing new on `origin`.
    UpToDate,
    /// The local branch moved forward to this commit.
    FastForward(Oid),
}
