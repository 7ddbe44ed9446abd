use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::error::SyncError;

/// Externally produced file about to be committed.
#[derive(Debug, Clone)]
pub struct StagedArtifact {
    pub source: PathBuf,
    pub size: u64,
    pub sha256: String,
}

impl StagedArtifact {
    /// Check that `src` is a readable, non-empty file and fingerprint it.
    ///
    /// Runs before any network operation so a bad artifact aborts early.
    pub fn inspect(src: &Path) -> Result<Self, SyncError> {
        let (size, sha256) = sha256_file(src).map_err(|source| SyncError::ArtifactUnreadable {
            path: src.to_path_buf(),
            source,
        })?;

        if size == 0 {
            return Err(SyncError::ArtifactEmpty(src.to_path_buf()));
        }

        Ok(Self {
            source: src.to_path_buf(),
            size,
            sha256,
        })
    }
}

/// Stream `path` through SHA-256. Returns the byte count and the hex digest.
pub fn sha256_file(path: &Path) -> io::Result<(u64, String)> {
    let mut f = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    let mut size = 0u64;
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        size += n as u64;
        hasher.update(&buf[..n]);
    }
    Ok((size, hex::encode(hasher.finalize())))
}

/// Whether the file at `path` has the given hex SHA-256 digest.
pub fn matches_digest(path: &Path, sha256: &str) -> io::Result<bool> {
    sha256_file(path).map(|(_, d)| d == sha256)
}

/// Copy `src` to `dest_dir/dest_name`, creating or truncating the destination.
///
/// # Errors
/// Any read or write failure is returned as [`SyncError::Stage`].
pub fn stage(src: &Path, dest_dir: &Path, dest_name: &str) -> Result<PathBuf, SyncError> {
    let dest = dest_dir.join(dest_name);
    let stage_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| SyncError::Stage { path, source }
    };

    let mut from = File::open(src).map_err(stage_err(src))?;
    let mut to = File::create(&dest).map_err(stage_err(&dest))?;
    io::copy(&mut from, &mut to).map_err(stage_err(&dest))?;
    to.sync_all().map_err(stage_err(&dest))?;
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;

    #[test]
    fn staging_overwrites_longer_previous_content() {
        let td = tempfile::tempdir().unwrap();
        let src = td.path().join("dump-20240101120000.sql");
        fs::write(&src, "CREATE TABLE t (id int);\n").unwrap();

        let mirror = td.path().join("repository");
        fs::create_dir_all(&mirror).unwrap();
        fs::write(mirror.join("dump.sql"), "x".repeat(4096)).unwrap();

        let dest = stage(&src, &mirror, "dump.sql").unwrap();
        assert_eq!(dest, mirror.join("dump.sql"));
        assert_eq!(fs::read(&dest).unwrap(), fs::read(&src).unwrap());
    }

    #[test]
    fn staging_twice_is_idempotent() {
        let td = tempfile::tempdir().unwrap();
        let src = td.path().join("a.sql");
        fs::write(&src, vec![0u8, 159, 146, 150, 10, 255]).unwrap();

        let first = stage(&src, td.path(), "dump.sql").unwrap();
        let second = stage(&src, td.path(), "dump.sql").unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::read(&second).unwrap(), fs::read(&src).unwrap());
    }

    #[test]
    fn staging_missing_source_fails() {
        let td = tempfile::tempdir().unwrap();
        let err = stage(&td.path().join("nope.sql"), td.path(), "dump.sql").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Filesystem);
        assert!(!td.path().join("dump.sql").exists());
    }

    #[test]
    fn inspect_fingerprints_artifact() {
        let td = tempfile::tempdir().unwrap();
        let src = td.path().join("dump.sql");
        fs::write(&src, "abc").unwrap();

        let a = StagedArtifact::inspect(&src).unwrap();
        assert_eq!(a.size, 3);
        assert_eq!(
            a.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn inspect_rejects_missing_and_empty_files() {
        let td = tempfile::tempdir().unwrap();
        let missing = StagedArtifact::inspect(&td.path().join("missing.sql")).unwrap_err();
        assert!(matches!(missing, SyncError::ArtifactUnreadable { .. }));

        let empty = td.path().join("empty.sql");
        fs::write(&empty, "").unwrap();
        let err = StagedArtifact::inspect(&empty).unwrap_err();
        assert!(matches!(err, SyncError::ArtifactEmpty(_)));
        assert_eq!(err.kind(), ErrorKind::Input);
    }

    #[test]
    fn staged_copy_matches_artifact_digest() {
        let td = tempfile::tempdir().unwrap();
        let src = td.path().join("a.sql");
        fs::write(&src, "INSERT INTO t VALUES (1);\n".repeat(2000)).unwrap();
        let artifact = StagedArtifact::inspect(&src).unwrap();

        let mirror = td.path().join("repository");
        fs::create_dir_all(&mirror).unwrap();
        let dest = mirror.join("dump.sql");
        fs::write(&dest, "-- older dump\n").unwrap();
        assert!(!matches_digest(&dest, &artifact.sha256).unwrap());

        stage(&src, &mirror, "dump.sql").unwrap();
        assert!(matches_digest(&dest, &artifact.sha256).unwrap());
        assert_eq!(sha256_file(&dest).unwrap().0, artifact.size);
    }

    #[test]
    fn digest_of_missing_file_is_not_found() {
        let td = tempfile::tempdir().unwrap();
        let err = matches_digest(&td.path().join("dump.sql"), "00").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
