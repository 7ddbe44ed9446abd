use anyhow::{Context, Result, anyhow};
use clap::Args;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::credential::Credential;
use crate::dump::DumpSettings;
use crate::endpoint::RepositoryEndpoint;
use crate::paths::{expand_tilde, paths};
use crate::sync::{Author, EmptyMirrorPolicy, SyncRequest};
use crate::trust::TrustStore;

const DEFAULT_MIRROR_DIR: &str = "repository";
const DEFAULT_WP_CONFIG: &str = "/var/www/wordpress/wp-config.php";
const DEFAULT_OUTPUT_DIR: &str = "/backups";
const DEFAULT_MYSQLDUMP: &str = "mysqldump";
const DEFAULT_KEYSCAN: &str = "ssh-keyscan";

/// Top-level configuration structure loaded from `config.toml`.
///
/// Every key is optional; command-line flags take precedence.
///
/// Example TOML:
/// ```toml
/// [repository]
/// url         = "git@gitlab.com:team/db-backups.git"
/// private_key = "~/.ssh/backup_deploy"
/// on_empty    = "seed"
///
/// [author]
/// name  = "ops"
/// email = "ops@example.com"
///
/// [dump]
/// wp_config  = "/var/www/wordpress/wp-config.php"
/// output_dir = "/backups"
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub repository: RepositorySection,
    pub author: AuthorSection,
    pub dump: DumpSection,
    pub trust: TrustSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepositorySection {
    pub url: Option<String>,
    pub directory: Option<PathBuf>,
    pub private_key: Option<PathBuf>,
    pub passphrase: Option<String>,
    pub on_empty: Option<EmptyMirrorPolicy>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthorSection {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DumpSection {
    pub wp_config: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub mysqldump: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrustSection {
    pub keyscan: Option<String>,
}

/// Repository flags shared by `push` and `backup`.
#[derive(Args, Debug, Default, Clone)]
pub struct RepoArgs {
    /// Git repository url (e.g. git@gitlab.com:username/repository-name.git)
    #[arg(long)]
    pub repository_url: Option<String>,
    /// Private key path for git login via ssh
    #[arg(long)]
    pub private_key_path: Option<PathBuf>,
    /// Git commit author name
    #[arg(long)]
    pub author_name: Option<String>,
    /// Git commit author email
    #[arg(long)]
    pub author_email: Option<String>,
    /// Local working copy of the repository
    #[arg(long)]
    pub directory: Option<PathBuf>,
}

/// Database dump flags shared by `dump` and `backup`.
#[derive(Args, Debug, Default, Clone)]
pub struct DumpArgs {
    /// Path to the WordPress configuration file (wp-config.php)
    #[arg(long)]
    pub wp_config: Option<PathBuf>,
    /// Directory that receives the database dump
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

/// Load configuration.
///
/// - `Some(path)`: the file must exist.
/// - `None`: the default location is used if present, otherwise defaults apply.
///
/// # Errors
/// - Returns an error if the file cannot be read.
/// - Returns an error if parsing the TOML fails.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let p = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let default = paths()?.config;
            if !default.exists() {
                return Ok(Config::default());
            }
            default
        }
    };
    let txt = fs::read_to_string(&p)
        .with_context(|| format!("config not found: {}", p.display()))?;
    parse_config(&txt).with_context(|| format!("failed to parse {}", p.display()))
}

pub fn parse_config(txt: &str) -> Result<Config> {
    Ok(toml::from_str(txt)?)
}

fn required<T>(flag: Option<T>, file: Option<T>, what: &str, hint: &str) -> Result<T> {
    flag.or(file)
        .ok_or_else(|| anyhow!("missing {what} (set {hint})"))
}

impl Config {
    /// Merge flags over the file and build a [`SyncRequest`].
    ///
    /// The repository address is parsed here, before any I/O happens.
    pub fn sync_request(&self, args: &RepoArgs) -> Result<SyncRequest> {
        let r = &self.repository;

        let url = required(
            args.repository_url.clone(),
            r.url.clone(),
            "repository url",
            "--repository-url or [repository].url",
        )?;
        let endpoint = RepositoryEndpoint::parse(&url)?;

        let key = required(
            args.private_key_path.clone(),
            r.private_key.clone(),
            "private key path",
            "--private-key-path or [repository].private_key",
        )?;
        let credential = Credential::resolve(&expand_tilde(&key)?, r.passphrase.clone())?;

        let author = Author {
            name: required(
                args.author_name.clone(),
                self.author.name.clone(),
                "author name",
                "--author-name or [author].name",
            )?,
            email: required(
                args.author_email.clone(),
                self.author.email.clone(),
                "author email",
                "--author-email or [author].email",
            )?,
        };

        let mirror_dir = args
            .directory
            .clone()
            .or_else(|| r.directory.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MIRROR_DIR));

        Ok(SyncRequest {
            endpoint,
            mirror_dir: expand_tilde(&mirror_dir)?,
            credential,
            author,
            trust: self.trust_store()?,
            on_empty: r.on_empty.unwrap_or_default(),
        })
    }

    /// Host keys always go to `~/.ssh/known_hosts`, the file libgit2's SSH
    /// transport checks; only the discovery program is configurable.
    pub fn trust_store(&self) -> Result<TrustStore> {
        Ok(TrustStore {
            known_hosts: paths()?.known_hosts,
            keyscan: self
                .trust
                .keyscan
                .clone()
                .unwrap_or_else(|| DEFAULT_KEYSCAN.to_string()),
        })
    }

    pub fn dump_settings(&self, args: &DumpArgs) -> Result<DumpSettings> {
        let d = &self.dump;
        let wp_config = args
            .wp_config
            .clone()
            .or_else(|| d.wp_config.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WP_CONFIG));
        let output_dir = args
            .output_dir
            .clone()
            .or_else(|| d.output_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

        Ok(DumpSettings {
            wp_config: expand_tilde(&wp_config)?,
            output_dir: expand_tilde(&output_dir)?,
            mysqldump: d
                .mysqldump
                .clone()
                .unwrap_or_else(|| DEFAULT_MYSQLDUMP.to_string()),
        })
    }
}
