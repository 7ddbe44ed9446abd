//! Publishing pipeline.
//!
//! Takes a finished dump, makes sure the local mirror of the backup
//! repository is usable, and records the dump as one new commit on the
//! remote. The `cmd_*` functions are the CLI entry points.

use anyhow::{Context, Result};
use git2::{Oid, Repository};
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{DumpArgs, RepoArgs, load_config};
use crate::credential::Credential;
use crate::dump::produce_dump;
use crate::endpoint::RepositoryEndpoint;
use crate::error::SyncError;
use crate::git::{self, PullOutcome};
use crate::mirror::{self, MirrorState, Resolution};
use crate::progress::finish_ok;
use crate::stage::{self, StagedArtifact};
use crate::trust::{self, TrustStore};

/// File name of the dump inside the mirror. Overwritten on every run.
pub const STAGED_FILE: &str = "dump.sql";
pub const COMMIT_MESSAGE: &str = "Automated database backup";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub email: String,
}

/// What to do when the mirror exists but has no commit yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyMirrorPolicy {
    /// Create the root commit and push it.
    #[default]
    Seed,
    /// Stop without committing; a later run tries again.
    Abort,
}

/// Metadata of the commit created by one run.
#[derive(Debug, Clone)]
pub struct CommitRecord {
    pub author: Author,
    pub message: &'static str,
    pub files: Vec<&'static str>,
}

impl CommitRecord {
    pub fn backup(author: &Author) -> Self {
        Self {
            author: author.clone(),
            message: COMMIT_MESSAGE,
            files: vec![STAGED_FILE],
        }
    }
}

/// Everything needed to publish an artifact to the remote.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub endpoint: RepositoryEndpoint,
    pub mirror_dir: PathBuf,
    pub credential: Credential,
    pub author: Author,
    pub trust: TrustStore,
    pub on_empty: EmptyMirrorPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncResult {
    /// A commit was created and pushed.
    Published {
        commit: Oid,
        branch: String,
        pull: PullOutcome,
    },
    /// The mirror has no history and this run intentionally made no commit.
    Deferred { state: MirrorState, reason: String },
}

/// Publish `artifact` to the repository described by `req`.
///
/// The artifact is checked before any network operation, then the host is
/// trusted, the mirror resolved and the pipeline run.
pub fn publish(req: &SyncRequest, artifact: &Path) -> Result<SyncResult, SyncError> {
    let artifact = StagedArtifact::inspect(artifact)?;
    info!(
        artifact = %artifact.source.display(),
        size = artifact.size,
        sha256 = %artifact.sha256,
        "artifact ready"
    );

    if req.endpoint.uses_ssh() {
        trust::ensure_trusted(&req.trust, req.endpoint.host(), req.endpoint.port())?;
    } else {
        debug!(endpoint = %req.endpoint, "not an ssh endpoint, skipping host key bootstrap");
    }

    sync_mirror(
        &req.endpoint.to_string(),
        &req.mirror_dir,
        &req.credential,
        &req.author,
        &artifact,
        req.on_empty,
    )
}

/// Resolve the mirror at `dir` against `remote` and run pull, stage, commit, push.
pub fn sync_mirror(
    remote: &str,
    dir: &Path,
    cred: &Credential,
    author: &Author,
    artifact: &StagedArtifact,
    on_empty: EmptyMirrorPolicy,
) -> Result<SyncResult, SyncError> {
    let repo = match mirror::resolve(dir, remote, cred)? {
        Resolution::Ready { repo, .. } => repo,
        Resolution::Unborn {
            observed: MirrorState::EmptyShell,
            repo,
        } if on_empty == EmptyMirrorPolicy::Seed => {
            info!(dir = %dir.display(), "mirror has no history, creating the first commit");
            repo
        }
        Resolution::Unborn { observed, .. } => {
            let reason = match observed {
                MirrorState::Absent => "remote repository is empty; mirror initialized for the next run",
                _ => "repository has no history yet; nothing to pull, will retry next run",
            };
            warn!(dir = %dir.display(), "{reason}");
            return Ok(SyncResult::Deferred {
                state: mirror::classify(dir),
                reason: reason.to_string(),
            });
        }
    };

    run_pipeline(&repo, dir, cred, author, artifact)
}

fn run_pipeline(
    repo: &Repository,
    dir: &Path,
    cred: &Credential,
    author: &Author,
    artifact: &StagedArtifact,
) -> Result<SyncResult, SyncError> {
    let branch = git::current_branch(repo)?;

    let pull = git::pull(repo, cred, &branch)?;
    if pull == PullOutcome::UpToDate {
        debug!(branch, "already up to date");
    }

    let dest = dir.join(STAGED_FILE);
    match stage::matches_digest(&dest, &artifact.sha256) {
        Ok(true) => info!("artifact is identical to the previous dump"),
        Ok(false) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %dest.display(), error = %e, "cannot fingerprint previous dump"),
    }
    stage::stage(&artifact.source, dir, STAGED_FILE)?;

    let record = CommitRecord::backup(author);
    for file in &record.files {
        git::track(repo, file)?;
    }
    let commit = git::commit_index(
        repo,
        &record.author.name,
        &record.author.email,
        record.message,
    )?;
    info!(%commit, branch, "committed");

    git::push(repo, cred, &branch)?;
    info!(%commit, branch, "pushed");

    Ok(SyncResult::Published {
        commit,
        branch,
        pull,
    })
}

fn report(req: &SyncRequest, res: &SyncResult) {
    match res {
        SyncResult::Published { commit, branch, .. } => {
            let id = commit.to_string();
            finish_ok(format!("pushed {} to {} ({})", &id[..7], req.endpoint, branch));
        }
        SyncResult::Deferred { reason, .. } => finish_ok(reason.clone()),
    }
}

/// CLI command: publish an existing artifact.
///
/// # Errors
/// Returns an error if configuration is incomplete, the address is invalid,
/// or any pipeline step fails.
pub fn cmd_push(config: Option<&Path>, repo: &RepoArgs, artifact: &Path) -> Result<()> {
    let cfg = load_config(config)?;
    let req = cfg.sync_request(repo)?;
    let res = publish(&req, artifact).with_context(|| format!("publishing to {}", req.endpoint))?;
    report(&req, &res);
    Ok(())
}

/// CLI command: dump the database, then publish the dump.
///
/// High-level flow:
/// 1. Load `config.toml` and merge the flags over it into a [`SyncRequest`].
///    The repository address, key and author are validated here, before the
///    database is touched.
/// 2. Read `wp-config.php` and run `mysqldump` into a timestamped file (see [`produce_dump`]).
/// 3. [`publish`] the file:
///    - fingerprint the artifact and refuse a missing or empty one,
///    - record the host keys of an SSH remote in `~/.ssh/known_hosts`,
///    - clone or open the mirror, pull, copy the dump to `dump.sql`,
///      commit and push.
///
/// A mirror without history ends the run with [`SyncResult::Deferred`]
/// instead of an error (see [`EmptyMirrorPolicy`]).
pub fn cmd_backup(config: Option<&Path>, dump: &DumpArgs, repo: &RepoArgs) -> Result<()> {
    let cfg = load_config(config)?;
    let req = cfg.sync_request(repo)?;
    let settings = cfg.dump_settings(dump)?;

    let (artifact, _) = produce_dump(&settings)?;
    let res = publish(&req, &artifact).with_context(|| format!("publishing to {}", req.endpoint))?;
    report(&req, &res);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use git2::Signature;
    use std::fs;

    fn ops() -> Author {
        Author {
            name: "ops".into(),
            email: "ops@example.com".into(),
        }
    }

    fn no_key(root: &Path) -> Credential {
        Credential::new(root.join("no-key"), None)
    }

    fn bare_remote(root: &Path) -> PathBuf {
        let p = root.join("remote.git");
        Repository::init_bare(&p).unwrap();
        p
    }

    fn path_str(p: &Path) -> String {
        p.to_string_lossy().into_owned()
    }

    fn run(
        remote: &Path,
        mirror_dir: &Path,
        root: &Path,
        dump: &StagedArtifact,
        on_empty: EmptyMirrorPolicy,
    ) -> Result<SyncResult, SyncError> {
        sync_mirror(&path_str(remote), mirror_dir, &no_key(root), &ops(), dump, on_empty)
    }

    fn artifact(root: &Path, name: &str, body: &str) -> StagedArtifact {
        let p = root.join(name);
        fs::write(&p, body).unwrap();
        StagedArtifact::inspect(&p).unwrap()
    }

    /// Commit `name` in a work tree and push the current branch to origin.
    fn commit_and_push(repo: &Repository, name: &str, body: &str) -> Oid {
        fs::write(repo.workdir().unwrap().join(name), body).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("dev", "dev@example.com").unwrap();
        let parent = repo.head().ok().map(|h| h.peel_to_commit().unwrap());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        let oid = repo
            .commit(Some("HEAD"), &sig, &sig, name, &tree, &parents)
            .unwrap();
        let branch = git::current_branch(repo).unwrap();
        repo.find_remote("origin")
            .unwrap()
            .push(&[format!("refs/heads/{branch}:refs/heads/{branch}").as_str()], None)
            .unwrap();
        oid
    }

    fn seeded_remote(root: &Path) -> PathBuf {
        let remote = bare_remote(root);
        let work = Repository::init(root.join("seed")).unwrap();
        work.remote("origin", &path_str(&remote)).unwrap();
        commit_and_push(&work, "README", "snapshots\n");
        remote
    }

    fn remote_head(remote: &Path, branch: &str) -> Oid {
        Repository::open_bare(remote)
            .unwrap()
            .find_reference(&format!("refs/heads/{branch}"))
            .unwrap()
            .target()
            .unwrap()
    }

    fn published(res: SyncResult) -> (Oid, String, PullOutcome) {
        match res {
            SyncResult::Published {
                commit,
                branch,
                pull,
            } => (commit, branch, pull),
            other => panic!("expected a published result, got {other:?}"),
        }
    }

    #[test]
    fn first_run_clones_commits_and_pushes() {
        let td = tempfile::tempdir().unwrap();
        let root = td.path();
        let remote = seeded_remote(root);
        let mirror_dir = root.join("repository");
        let dump = artifact(root, "dump-20240101120000.sql", &"INSERT 1;\n".repeat(50));

        let res = sync_mirror(
            &path_str(&remote),
            &mirror_dir,
            &no_key(root),
            &ops(),
            &dump,
            EmptyMirrorPolicy::Seed,
        )
        .unwrap();
        let (commit, branch, pull) = published(res);

        assert_eq!(pull, PullOutcome::UpToDate);
        assert_eq!(remote_head(&remote, &branch), commit);
        assert_eq!(mirror::classify(&mirror_dir), MirrorState::Populated);

        let repo = Repository::open_bare(&remote).unwrap();
        let c = repo.find_commit(commit).unwrap();
        assert_eq!(c.author().name(), Some("ops"));
        assert_eq!(c.author().email(), Some("ops@example.com"));
        assert_eq!(c.message(), Some(COMMIT_MESSAGE));
        assert_eq!(c.parent_count(), 1);

        let entry = c.tree().unwrap().get_name(STAGED_FILE).unwrap().id();
        let blob = repo.find_blob(entry).unwrap();
        assert_eq!(blob.content(), fs::read(&dump.source).unwrap().as_slice());
    }

    #[test]
    fn later_run_stacks_a_new_commit() {
        let td = tempfile::tempdir().unwrap();
        let root = td.path();
        let remote = seeded_remote(root);
        let mirror_dir = root.join("repository");

        let first = artifact(root, "a.sql", "-- first\n");
        let (c1, _, _) = published(
            run(&remote, &mirror_dir, root, &first, EmptyMirrorPolicy::Seed).unwrap(),
        );

        let second = artifact(root, "b.sql", "-- second\n");
        let (c2, branch, pull) = published(
            run(&remote, &mirror_dir, root, &second, EmptyMirrorPolicy::Seed).unwrap(),
        );

        assert_eq!(pull, PullOutcome::UpToDate);
        assert_eq!(remote_head(&remote, &branch), c2);
        let repo = Repository::open(&mirror_dir).unwrap();
        assert_eq!(repo.find_commit(c2).unwrap().parent_id(0).unwrap(), c1);
        assert_eq!(
            fs::read_to_string(mirror_dir.join(STAGED_FILE)).unwrap(),
            "-- second\n"
        );
    }

    #[test]
    fn pull_fast_forwards_to_commits_made_elsewhere() {
        let td = tempfile::tempdir().unwrap();
        let root = td.path();
        let remote = seeded_remote(root);
        let mirror_dir = root.join("repository");

        let dump = artifact(root, "a.sql", "-- a\n");
        run(&remote, &mirror_dir, root, &dump, EmptyMirrorPolicy::Seed).unwrap();

        let other = Repository::clone(&path_str(&remote), root.join("other")).unwrap();
        let foreign = commit_and_push(&other, "NOTES", "rotated keys\n");

        let (commit, branch, pull) = published(
            run(&remote, &mirror_dir, root, &dump, EmptyMirrorPolicy::Seed).unwrap(),
        );

        assert_eq!(pull, PullOutcome::FastForward(foreign));
        assert!(mirror_dir.join("NOTES").exists());
        assert_eq!(remote_head(&remote, &branch), commit);
        let repo = Repository::open(&mirror_dir).unwrap();
        assert_eq!(repo.find_commit(commit).unwrap().parent_id(0).unwrap(), foreign);
    }

    #[test]
    fn empty_remote_is_tolerated_then_seeded() {
        let td = tempfile::tempdir().unwrap();
        let root = td.path();
        let remote = bare_remote(root);
        let mirror_dir = root.join("repository");
        let dump = artifact(root, "a.sql", "-- a\n");

        let res = run(&remote, &mirror_dir, root, &dump, EmptyMirrorPolicy::Seed).unwrap();
        assert!(matches!(
            res,
            SyncResult::Deferred {
                state: MirrorState::EmptyShell,
                ..
            }
        ));
        assert_eq!(mirror::classify(&mirror_dir), MirrorState::EmptyShell);

        let (commit, branch, _) = published(
            run(&remote, &mirror_dir, root, &dump, EmptyMirrorPolicy::Seed).unwrap(),
        );
        assert_eq!(remote_head(&remote, &branch), commit);
        let repo = Repository::open(&mirror_dir).unwrap();
        assert_eq!(repo.find_commit(commit).unwrap().parent_count(), 0);
        assert_eq!(mirror::classify(&mirror_dir), MirrorState::Populated);
    }

    #[test]
    fn abort_policy_leaves_empty_mirror_alone() {
        let td = tempfile::tempdir().unwrap();
        let root = td.path();
        let remote = bare_remote(root);
        let mirror_dir = root.join("repository");
        let dump = artifact(root, "a.sql", "-- a\n");

        for _ in 0..2 {
            let res = run(&remote, &mirror_dir, root, &dump, EmptyMirrorPolicy::Abort).unwrap();
            assert!(matches!(res, SyncResult::Deferred { .. }));
        }
        assert!(!mirror_dir.join(STAGED_FILE).exists());
        assert!(Repository::open_bare(&remote).unwrap().is_empty().unwrap());
    }

    #[test]
    fn missing_remote_fails_the_clone() {
        let td = tempfile::tempdir().unwrap();
        let root = td.path();
        let mirror_dir = root.join("repository");
        let dump = artifact(root, "a.sql", "-- a\n");

        let err = run(&root.join("nope.git"), &mirror_dir, root, &dump, EmptyMirrorPolicy::Seed)
            .unwrap_err();

        assert!(matches!(err, SyncError::Clone { .. }), "{err:?}");
        assert_eq!(err.kind(), ErrorKind::Repository);
        assert_ne!(mirror::classify(&mirror_dir), MirrorState::EmptyShell);
        assert!(!mirror_dir.join(STAGED_FILE).exists());
    }

    #[test]
    fn failing_pull_aborts_before_staging() {
        let td = tempfile::tempdir().unwrap();
        let root = td.path();
        let remote = seeded_remote(root);
        let mirror_dir = root.join("repository");
        let first = artifact(root, "a.sql", "-- a\n");
        run(&remote, &mirror_dir, root, &first, EmptyMirrorPolicy::Seed).unwrap();

        let repo = Repository::open(&mirror_dir).unwrap();
        let before = repo.head().unwrap().target().unwrap();
        let gone = root.join("gone.git");
        repo.remote_set_url("origin", &path_str(&gone)).unwrap();

        let second = artifact(root, "b.sql", "-- b\n");
        let err = run(&gone, &mirror_dir, root, &second, EmptyMirrorPolicy::Seed).unwrap_err();

        assert!(matches!(err, SyncError::Pull(_)));
        assert_eq!(err.kind(), ErrorKind::Repository);
        assert_eq!(repo.head().unwrap().target().unwrap(), before);
        assert_eq!(fs::read_to_string(mirror_dir.join(STAGED_FILE)).unwrap(), "-- a\n");
    }

    #[test]
    fn diverged_history_is_fatal() {
        let td = tempfile::tempdir().unwrap();
        let root = td.path();
        let remote = seeded_remote(root);
        let mirror_dir = root.join("repository");
        let dump = artifact(root, "a.sql", "-- a\n");
        run(&remote, &mirror_dir, root, &dump, EmptyMirrorPolicy::Seed).unwrap();

        // a local commit that never reached the remote
        let mirror_repo = Repository::open(&mirror_dir).unwrap();
        fs::write(mirror_dir.join("LOCAL"), "x").unwrap();
        git::track(&mirror_repo, "LOCAL").unwrap();
        git::commit_index(&mirror_repo, "ops", "ops@example.com", "local").unwrap();

        let other = Repository::clone(&path_str(&remote), root.join("other")).unwrap();
        commit_and_push(&other, "REMOTE", "y");

        let err = run(&remote, &mirror_dir, root, &dump, EmptyMirrorPolicy::Seed).unwrap_err();
        assert!(matches!(err, SyncError::Diverged { .. }));
    }

    #[test]
    fn unreadable_artifact_aborts_before_any_network_operation() {
        let td = tempfile::tempdir().unwrap();
        let root = td.path();
        let req = SyncRequest {
            endpoint: RepositoryEndpoint::parse("git@unreachable.invalid:team/repo.git").unwrap(),
            mirror_dir: root.join("repository"),
            credential: no_key(root),
            author: ops(),
            trust: TrustStore {
                known_hosts: root.join("known_hosts"),
                keyscan: "/nonexistent/bin/ssh-keyscan".into(),
            },
            on_empty: EmptyMirrorPolicy::Seed,
        };

        let err = publish(&req, &root.join("missing.sql")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Input);
        assert!(!root.join("repository").exists());
        assert!(!root.join("known_hosts").exists());
    }

    #[test]
    fn commit_record_uses_fixed_message_and_file() {
        let rec = CommitRecord::backup(&ops());
        assert_eq!(rec.message, COMMIT_MESSAGE);
        assert_eq!(rec.files, vec!["dump.sql"]);
        assert_eq!(rec.author, ops());
    }
}
