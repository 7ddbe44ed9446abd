//! Local mirror classification and handle acquisition.
//!
//! The state of the working copy is never stored; it is derived from what is
//! on disk each time [`classify`] runs.

use git2::Repository;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::credential::Credential;
use crate::error::SyncError;
use crate::git::{CloneOutcome, clone_repo, open_repo};

/// Observed condition of the local working copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState {
    /// No `.git` metadata in the directory.
    Absent,
    /// Metadata exists but no branch has a commit.
    EmptyShell,
    /// At least one branch reference exists.
    Populated,
}

impl fmt::Display for MirrorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MirrorState::Absent => "absent",
            MirrorState::EmptyShell => "empty",
            MirrorState::Populated => "populated",
        })
    }
}

/// A usable repository handle together with the state observed before acquiring it.
pub enum Resolution {
    /// The repository has history.
    Ready {
        observed: MirrorState,
        repo: Repository,
    },
    /// The repository exists but has no commit yet.
    Unborn {
        observed: MirrorState,
        repo: Repository,
    },
}

/// Classify `dir` by inspecting its `.git` metadata.
pub fn classify(dir: &Path) -> MirrorState {
    let git = dir.join(".git");
    if !git.exists() {
        MirrorState::Absent
    } else if contains_file(&git.join("refs").join("heads")) || packed_heads(&git.join("packed-refs"))
    {
        MirrorState::Populated
    } else {
        MirrorState::EmptyShell
    }
}

/// Whether a directory tree holds at least one file (branch names may nest).
fn contains_file(dir: &Path) -> bool {
    let rd = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(_) => return false,
    };
    rd.flatten().any(|ent| match ent.file_type() {
        Ok(ft) if ft.is_dir() => contains_file(&ent.path()),
        Ok(_) => true,
        Err(_) => false,
    })
}

/// Whether `packed-refs` lists any `refs/heads/*` entry.
fn packed_heads(packed: &Path) -> bool {
    fs::read_to_string(packed)
        .map(|txt| {
            txt.lines()
                .filter(|l| !l.starts_with('#') && !l.starts_with('^'))
                .any(|l| {
                    l.split_whitespace()
                        .nth(1)
                        .is_some_and(|r| r.starts_with("refs/heads/"))
                })
        })
        .unwrap_or(false)
}

/// Classify `dir` and obtain a repository handle for it.
///
/// - `Absent`: clone `remote`. An empty remote is tolerated and leaves an
///   empty repository behind.
/// - `EmptyShell`/`Populated`: open the existing repository.
///
/// Never deletes or resets anything in `dir`.
pub fn resolve(dir: &Path, remote: &str, cred: &Credential) -> Result<Resolution, SyncError> {
    let observed = classify(dir);
    info!(dir = %dir.display(), state = %observed, "mirror state");

    match observed {
        MirrorState::Absent => match clone_repo(remote, dir, cred)? {
            CloneOutcome::Cloned(repo) => Ok(Resolution::Ready { observed, repo }),
            CloneOutcome::EmptyRemote(repo) => {
                info!(remote, "remote repository is empty");
                Ok(Resolution::Unborn { observed, repo })
            }
        },
        MirrorState::EmptyShell => Ok(Resolution::Unborn {
            observed,
            repo: open_repo(dir)?,
        }),
        MirrorState::Populated => Ok(Resolution::Ready {
            observed,
            repo: open_repo(dir)?,
        }),
    }
}
