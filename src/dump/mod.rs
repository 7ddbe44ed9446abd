//! Database dump producer.
//!
//! Reads connection settings from `wp-config.php`, runs `mysqldump` and
//! writes a timestamped `.sql` file that the sync pipeline then publishes.

mod file;
mod wp_config;

use anyhow::{Context, Result, anyhow, bail};
use chrono::Local;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::info;

use crate::config::{DumpArgs, load_config};
use crate::progress::finish_ok;

pub use file::DumpFile;
pub use wp_config::DbCredentials;

/// Resolved settings for producing a dump.
#[derive(Debug, Clone)]
pub struct DumpSettings {
    pub wp_config: PathBuf,
    pub output_dir: PathBuf,
    pub mysqldump: String,
}

/// Run `program` (a `mysqldump` compatible tool) and stream its output to `out`.
///
/// The password is passed through `MYSQL_PWD` so it does not show up in the
/// process list. Returns the number of bytes written.
///
/// # Errors
/// Fails if the tool cannot be started, exits non-zero or prints nothing.
/// A failed dump file is removed.
pub fn dump_database(db: &DbCredentials, program: &str, out: &Path) -> Result<u64> {
    let file = File::create(out).with_context(|| format!("cannot create {}", out.display()))?;

    let status = Command::new(program)
        .args([
            "--host",
            db.host.as_str(),
            "--port",
            db.port.as_str(),
            "--user",
            db.user.as_str(),
            db.name.as_str(),
        ])
        .env("MYSQL_PWD", &db.password)
        .stdin(Stdio::null())
        .stdout(Stdio::from(file))
        .status()
        .with_context(|| format!("cannot run {program}"))?;

    let written = fs::metadata(out).map(|m| m.len()).unwrap_or(0);
    if !status.success() || written == 0 {
        let _ = fs::remove_file(out);
        bail!("couldn't dump a database, check the connection ({program}: {status})");
    }
    Ok(written)
}

/// Dump the configured database into a new timestamped file.
pub fn produce_dump(settings: &DumpSettings) -> Result<(PathBuf, u64)> {
    let db = DbCredentials::load(&settings.wp_config)?;

    fs::create_dir_all(&settings.output_dir)
        .with_context(|| format!("cannot create {}", settings.output_dir.display()))?;
    let out = DumpFile::timestamped(&settings.output_dir, Local::now().naive_local())
        .path()
        .ok_or_else(|| anyhow!("output directory is not set"))?;

    let bytes = dump_database(&db, &settings.mysqldump, &out)?;
    info!(path = %out.display(), bytes, database = %db.name, "database dumped");
    Ok((out, bytes))
}

/// CLI command: dump the database without publishing it.
pub fn cmd_dump(config: Option<&Path>, args: &DumpArgs) -> Result<()> {
    let cfg = load_config(config)?;
    let settings = cfg.dump_settings(args)?;
    let (path, bytes) = produce_dump(&settings)?;
    finish_ok(format!("wrote {} bytes to {}", bytes, path.display()));
    Ok(())
}
