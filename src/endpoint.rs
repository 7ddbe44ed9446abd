//! Remote repository addresses.
//!
//! Two spellings are accepted:
//! - standard URLs, e.g. `ssh://git@gitlab.com:2222/team/repo.git` or
//!   `https://github.com/team/repo.git`
//! - the legacy scp-like form `user@host:path`, e.g. `git@gitlab.com:team/repo.git`
//!
//! Each spelling is its own variant with its own renderer, so an endpoint
//! always prints back the way it was written.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use url::Url;

use crate::error::SyncError;

static SCP_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^@\s/:]+)@([^:\s/]+):(\S+)$").expect("scp-like address pattern")
});

/// Parsed remote repository address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryEndpoint {
    /// `scheme://[user@]host[:port]/path`
    Url(Url),
    /// `user@host:path`
    Scp {
        user: String,
        host: String,
        path: String,
    },
}

impl RepositoryEndpoint {
    /// Parse a raw connection string.
    ///
    /// A standard URL is only accepted when it carries a host; anything else
    /// must match the legacy `user@host:path` form.
    ///
    /// # Errors
    /// Returns [`SyncError::InvalidAddress`] when neither form matches.
    pub fn parse(raw: &str) -> Result<Self, SyncError> {
        let raw = raw.trim();

        if let Ok(url) = Url::parse(raw)
            && url.host_str().is_some_and(|h| !h.is_empty())
        {
            return Ok(RepositoryEndpoint::Url(url));
        }

        let caps = SCP_LIKE
            .captures(raw)
            .ok_or_else(|| SyncError::InvalidAddress(raw.to_string()))?;

        Ok(RepositoryEndpoint::Scp {
            user: caps[1].to_string(),
            host: caps[2].to_string(),
            path: caps[3].to_string(),
        })
    }

    /// Host name used for transport and trust bootstrap.
    pub fn host(&self) -> &str {
        match self {
            RepositoryEndpoint::Url(url) => url.host_str().unwrap_or_default(),
            RepositoryEndpoint::Scp { host, .. } => host,
        }
    }

    /// Explicit port, only expressible in URL form.
    pub fn port(&self) -> Option<u16> {
        match self {
            RepositoryEndpoint::Url(url) => url.port(),
            RepositoryEndpoint::Scp { .. } => None,
        }
    }

    /// Whether the address is reached over SSH and therefore needs a trusted host key.
    pub fn uses_ssh(&self) -> bool {
        match self {
            RepositoryEndpoint::Url(url) => matches!(url.scheme(), "ssh" | "git+ssh" | "ssh+git"),
            RepositoryEndpoint::Scp { .. } => true,
        }
    }

    /// User name embedded in the address, if any.
    pub fn user(&self) -> Option<&str> {
        match self {
            RepositoryEndpoint::Url(url) => Some(url.username()).filter(|u| !u.is_empty()),
            RepositoryEndpoint::Scp { user, .. } => Some(user),
        }
    }
}

/// `Scp` always renders the `:` separator, also before an absolute path,
/// so `user@host:/srv/repo.git` prints back unchanged.
impl fmt::Display for RepositoryEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryEndpoint::Url(url) => f.write_str(url.as_str()),
            RepositoryEndpoint::Scp { user, host, path } => write!(f, "{user}@{host}:{path}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn parses_legacy_gitlab_address() {
        let ep = RepositoryEndpoint::parse("git@gitlab.com:team/repo.git").unwrap();
        assert_eq!(
            ep,
            RepositoryEndpoint::Scp {
                user: "git".into(),
                host: "gitlab.com".into(),
                path: "team/repo.git".into(),
            }
        );
        assert_eq!(ep.host(), "gitlab.com");
        assert_eq!(ep.user(), Some("git"));
        assert_eq!(ep.port(), None);
    }

    #[test]
    fn legacy_addresses_render_back_identically() {
        for s in [
            "git@gitlab.com:team/repo.git",
            "git@github.com:/srv/git/backups.git",
            "deploy.bot@10.0.0.7:backups",
            "git@host.example:group/sub/project.git",
        ] {
            let ep = RepositoryEndpoint::parse(s).unwrap();
            assert_eq!(ep.to_string(), s, "round trip of {s}");
        }
    }

    #[test]
    fn url_addresses_render_back_identically() {
        for s in [
            "ssh://git@gitlab.com:2222/team/repo.git",
            "https://github.com/team/repo.git",
            "ssh://backup.internal/srv/git/dumps.git",
        ] {
            let ep = RepositoryEndpoint::parse(s).unwrap();
            assert!(matches!(ep, RepositoryEndpoint::Url(_)));
            assert_eq!(ep.to_string(), s, "round trip of {s}");
        }
    }

    #[test]
    fn url_exposes_host_port_and_user() {
        let ep = RepositoryEndpoint::parse("ssh://git@gitlab.com:2222/team/repo.git").unwrap();
        assert_eq!(ep.host(), "gitlab.com");
        assert_eq!(ep.port(), Some(2222));
        assert_eq!(ep.user(), Some("git"));

        let ep = RepositoryEndpoint::parse("https://github.com/team/repo.git").unwrap();
        assert_eq!(ep.user(), None);
    }

    #[test]
    fn only_ssh_transports_need_host_trust() {
        let ssh = ["git@gitlab.com:team/repo.git", "ssh://git@gitlab.com/team/repo.git"];
        for s in ssh {
            assert!(RepositoryEndpoint::parse(s).unwrap().uses_ssh(), "{s}");
        }
        assert!(!RepositoryEndpoint::parse("https://github.com/team/repo.git")
            .unwrap()
            .uses_ssh());
    }

    #[test]
    fn rejects_free_text() {
        let err = RepositoryEndpoint::parse("not a valid address").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Input);
        assert!(err.to_string().contains("invalid repository address"));
    }

    #[test]
    fn rejects_url_without_host() {
        // parses as a URL with scheme "myhost" but no host, and has no user part
        assert!(RepositoryEndpoint::parse("myhost:team/repo.git").is_err());
        assert!(RepositoryEndpoint::parse("file:///srv/git/repo.git").is_err());
    }

    #[test]
    fn rejects_legacy_form_without_path() {
        assert!(RepositoryEndpoint::parse("git@gitlab.com:").is_err());
        assert!(RepositoryEndpoint::parse("git@gitlab.com").is_err());
    }
}
