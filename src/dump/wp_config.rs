use anyhow::{Context, Result, anyhow};
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

static DEFINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*define\(\s*'(DB_NAME|DB_USER|DB_PASSWORD|DB_HOST|DB_PORT)'\s*,\s*'(.+)'\s*\);")
        .expect("wp-config define pattern")
});

pub const MYSQL_DEFAULT_PORT: &str = "3306";

/// Connection settings for the database to dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbCredentials {
    pub name: String,
    pub host: String,
    pub port: String,
    pub user: String,
    pub password: String,
}

/// Collect the `DB_*` constants defined in a `wp-config.php` body.
pub fn parse_defines(txt: &str) -> HashMap<&str, &str> {
    txt.lines()
        .filter(|l| l.contains("DB_"))
        .filter_map(|l| DEFINE.captures(l))
        .filter_map(|c| {
            let key = c.get(1)?.as_str();
            let value = c.get(2)?.as_str();
            Some((key, value))
        })
        .collect()
}

impl DbCredentials {
    /// Build credentials from `define('DB_*', '...')` lines.
    ///
    /// `DB_NAME` and `DB_USER` are required; host defaults to `localhost`,
    /// port to `3306`, password to empty.
    pub fn from_wp_config(txt: &str) -> Result<Self> {
        let defs = parse_defines(txt);
        let get = |k: &str| defs.get(k).map(|v| v.to_string());
        Ok(Self {
            name: get("DB_NAME").ok_or_else(|| anyhow!("DB_NAME is not defined"))?,
            user: get("DB_USER").ok_or_else(|| anyhow!("DB_USER is not defined"))?,
            host: get("DB_HOST").unwrap_or_else(|| "localhost".to_string()),
            port: get("DB_PORT").unwrap_or_else(|| MYSQL_DEFAULT_PORT.to_string()),
            password: get("DB_PASSWORD").unwrap_or_default(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let txt = fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        Self::from_wp_config(&txt).with_context(|| format!("in {}", path.display()))
    }
}
