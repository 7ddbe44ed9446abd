use git2::{
    Commit, Cred, ErrorCode, FetchOptions, Oid, PushOptions, RemoteCallbacks, Repository,
    Signature, SubmoduleUpdateOptions,
    build::{CheckoutBuilder, RepoBuilder},
};
use indicatif::ProgressBar;
use std::cell::RefCell;
use std::path::Path;
use tracing::{debug, info};

use super::{CloneOutcome, PullOutcome};
use crate::credential::Credential;
use crate::error::SyncError;
use crate::progress::transfer_bar;

/// libgit2 re-invokes the credential callback after a rejected key; stop after this many tries.
const MAX_AUTH_ATTEMPTS: u8 = 3;

/// Build `RemoteCallbacks` that authenticate with the given private key and
/// report transfer progress on `pb`.
fn remote_callbacks<'a>(cred: &'a Credential, pb: Option<&ProgressBar>) -> RemoteCallbacks<'a> {
    let mut cb = RemoteCallbacks::new();
    let mut attempts = 0u8;
    cb.credentials(move |_url, username_from_url, allowed| {
        attempts += 1;
        if attempts > MAX_AUTH_ATTEMPTS {
            return Err(git2::Error::from_str(&format!(
                "ssh key {} was rejected",
                cred.key().display()
            )));
        }
        let user = username_from_url.unwrap_or("git");
        if allowed.is_username() {
            return Cred::username(user);
        }
        Cred::ssh_key(user, None, cred.key(), cred.passphrase())
    });

    if let Some(pb) = pb {
        let bar = pb.clone();
        cb.transfer_progress(move |p| {
            bar.set_length(p.total_objects() as u64);
            bar.set_position(p.received_objects() as u64);
            true
        });
        let bar = pb.clone();
        cb.push_transfer_progress(move |current, total, _bytes| {
            bar.set_length(total as u64);
            bar.set_position(current as u64);
        });
    }
    cb
}

fn fetch_options<'a>(cred: &'a Credential, pb: Option<&ProgressBar>) -> FetchOptions<'a> {
    let mut fo = FetchOptions::new();
    fo.remote_callbacks(remote_callbacks(cred, pb));
    fo
}

/// Initialize and update all submodules, recursing into nested ones.
///
/// # Errors
/// Returns an error if any submodule fails to initialize or update.
fn update_submodules(repo: &Repository, cred: &Credential) -> Result<(), git2::Error> {
    for mut sm in repo.submodules()? {
        sm.init(false)?;
        let mut opt = SubmoduleUpdateOptions::new();
        opt.fetch(fetch_options(cred, None));
        sm.update(true, Some(&mut opt))?;
        if let Ok(nested) = sm.open() {
            update_submodules(&nested, cred)?;
        }
    }
    Ok(())
}

/// Create an empty repository at `dest` with `origin` pointing at `url`.
fn init_shell(url: &str, dest: &Path) -> Result<Repository, git2::Error> {
    let repo = Repository::init(dest)?;
    if repo.find_remote("origin").is_err() {
        repo.remote("origin", url)?;
    }
    Ok(repo)
}

/// Clone `url` into `dest`.
///
/// A remote without any history is not an error: the result is
/// [`CloneOutcome::EmptyRemote`] with an initialized repository whose
/// `origin` is configured, ready for a first commit on a later run.
///
/// # Errors
/// Any other clone or submodule failure is returned as [`SyncError::Clone`].
pub fn clone_repo(url: &str, dest: &Path, cred: &Credential) -> Result<CloneOutcome, SyncError> {
    let clone_err = |source| SyncError::Clone {
        url: url.to_string(),
        source,
    };

    let pb = transfer_bar(format!("cloning {url}"));
    let mut builder = RepoBuilder::new();
    builder.fetch_options(fetch_options(cred, Some(&pb)));
    let res = builder.clone(url, dest);
    pb.finish_and_clear();

    match res {
        Ok(repo) => {
            if repo.is_empty().map_err(clone_err)? {
                return Ok(CloneOutcome::EmptyRemote(repo));
            }
            update_submodules(&repo, cred).map_err(clone_err)?;
            Ok(CloneOutcome::Cloned(repo))
        }
        Err(e) if e.code() == ErrorCode::UnbornBranch => {
            debug!(error = %e, "clone reported an unborn remote branch");
            let repo = init_shell(url, dest).map_err(clone_err)?;
            Ok(CloneOutcome::EmptyRemote(repo))
        }
        Err(e) => Err(clone_err(e)),
    }
}

pub fn open_repo(dir: &Path) -> Result<Repository, SyncError> {
    Repository::open(dir).map_err(|source| SyncError::Open {
        path: dir.to_path_buf(),
        source,
    })
}

/// Name of the branch HEAD points to, even if it has no commit yet.
pub fn current_branch(repo: &Repository) -> Result<String, SyncError> {
    let head = repo
        .find_reference("HEAD")
        .map_err(|source| SyncError::Open {
            path: repo.path().to_path_buf(),
            source,
        })?;
    head.symbolic_target()
        .and_then(|t| t.strip_prefix("refs/heads/"))
        .map(str::to_string)
        .ok_or(SyncError::DetachedHead)
}

/// Perform `git fetch origin` into `refs/remotes/origin/*`.
fn fetch_origin(repo: &Repository, cred: &Credential) -> Result<(), git2::Error> {
    let pb = transfer_bar("fetching origin");
    let mut fo = fetch_options(cred, Some(&pb));
    let mut remote = repo.find_remote("origin")?;
    let res = remote.fetch(&["refs/heads/*:refs/remotes/origin/*"], Some(&mut fo), None);
    pb.finish_and_clear();
    res
}

/// Fetch `origin` and fast-forward `branch` to `origin/<branch>`.
///
/// Nothing new on the remote (including a remote branch that does not exist
/// yet, or a local branch that is ahead) yields [`PullOutcome::UpToDate`].
///
/// # Errors
/// - [`SyncError::Pull`] when fetching or checking out fails.
/// - [`SyncError::Diverged`] when a real merge would be required.
pub fn pull(repo: &Repository, cred: &Credential, branch: &str) -> Result<PullOutcome, SyncError> {
    fetch_origin(repo, cred).map_err(SyncError::Pull)?;

    let remote_ref = match repo.find_reference(&format!("refs/remotes/origin/{branch}")) {
        Ok(r) => r,
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(PullOutcome::UpToDate),
        Err(e) => return Err(SyncError::Pull(e)),
    };
    let fetched = repo
        .reference_to_annotated_commit(&remote_ref)
        .map_err(SyncError::Pull)?;
    let (analysis, _) = repo.merge_analysis(&[&fetched]).map_err(SyncError::Pull)?;

    if analysis.is_up_to_date() {
        return Ok(PullOutcome::UpToDate);
    }
    if !(analysis.is_fast_forward() || analysis.is_unborn()) {
        return Err(SyncError::Diverged {
            branch: branch.to_string(),
        });
    }

    let target = fetched.id();
    let local = format!("refs/heads/{branch}");
    let ff = || -> Result<(), git2::Error> {
        match repo.find_reference(&local) {
            Ok(mut r) => {
                r.set_target(target, "pull: fast-forward")?;
            }
            Err(_) => {
                repo.reference(&local, target, true, "pull: initial checkout")?;
            }
        }
        repo.set_head(&local)?;
        repo.checkout_head(Some(CheckoutBuilder::new().force()))?;
        Ok(())
    };
    ff().map_err(SyncError::Pull)?;

    info!(branch, commit = %target, "fast-forwarded to origin");
    Ok(PullOutcome::FastForward(target))
}

/// Register `rel_path` (relative to the work tree) in the index.
pub fn track(repo: &Repository, rel_path: &str) -> Result<(), SyncError> {
    let track_err = |source| SyncError::Track {
        path: rel_path.to_string(),
        source,
    };
    let mut index = repo.index().map_err(track_err)?;
    index.add_path(Path::new(rel_path)).map_err(track_err)?;
    index.write().map_err(track_err)?;
    Ok(())
}

/// Commit the current index on HEAD. The first commit of a branch has no parent.
pub fn commit_index(
    repo: &Repository,
    author_name: &str,
    author_email: &str,
    message: &str,
) -> Result<Oid, SyncError> {
    let run = || -> Result<Oid, git2::Error> {
        let sig = Signature::now(author_name, author_email)?;
        let tree_id = repo.index()?.write_tree()?;
        let tree = repo.find_tree(tree_id)?;

        let parent = match repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => None,
            Err(e) => return Err(e),
        };
        let parents: Vec<&Commit> = parent.iter().collect();

        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
    };
    run().map_err(SyncError::Commit)
}

/// Push `branch` to the same branch on `origin`.
///
/// # Errors
/// - [`SyncError::Push`] on transport or authentication failure.
/// - [`SyncError::PushRejected`] when the remote refuses the reference update.
pub fn push(repo: &Repository, cred: &Credential, branch: &str) -> Result<(), SyncError> {
    let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
    let push_err = |source| SyncError::Push {
        refspec: refspec.clone(),
        source,
    };

    let rejected: RefCell<Option<(String, String)>> = RefCell::new(None);
    {
        let pb = transfer_bar(format!("pushing {branch}"));
        let mut cb = remote_callbacks(cred, Some(&pb));
        cb.push_update_reference(|reference, status| {
            if let Some(msg) = status {
                *rejected.borrow_mut() = Some((reference.to_string(), msg.to_string()));
            }
            Ok(())
        });
        let mut po = PushOptions::new();
        po.remote_callbacks(cb);

        let mut remote = repo.find_remote("origin").map_err(push_err)?;
        let res = remote.push(&[refspec.as_str()], Some(&mut po));
        pb.finish_and_clear();
        res.map_err(push_err)?;
    }

    if let Some((reference, message)) = rejected.into_inner() {
        return Err(SyncError::PushRejected { reference, message });
    }
    Ok(())
}
