use anyhow::{Result, anyhow};
use std::{
    env,
    path::{Path, PathBuf},
};

/// Well-known per-user locations.
#[derive(Clone, Debug)]
pub struct Paths {
    pub config: PathBuf,
    pub known_hosts: PathBuf,
    pub default_key: PathBuf,
}

/// Current user's home directory, taken from `$HOME`.
pub fn home_dir() -> Result<PathBuf> {
    env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("HOME is not set"))
}

/// Directory holding the dumpvault configuration.
///
/// `$XDG_CONFIG_HOME/dumpvault`, or `$HOME/.config/dumpvault` when unset.
pub fn dumpvault_home() -> Result<PathBuf> {
    let base = match env::var_os("XDG_CONFIG_HOME").filter(|x| !x.is_empty()) {
        Some(xdg) => PathBuf::from(xdg),
        None => home_dir()?.join(".config"),
    };
    Ok(base.join("dumpvault"))
}

pub fn paths() -> Result<Paths> {
    let home = home_dir()?;
    Ok(Paths {
        config: dumpvault_home()?.join("config.toml"),
        known_hosts: home.join(".ssh").join("known_hosts"),
        default_key: home.join(".ssh").join("id_rsa"),
    })
}

/// Expand a leading `~/` to the home directory. Other paths are returned unchanged.
pub fn expand_tilde(p: &Path) -> Result<PathBuf> {
    match p.strip_prefix("~") {
        Ok(rest) => Ok(home_dir()?.join(rest)),
        Err(_) => Ok(p.to_path_buf()),
    }
}
