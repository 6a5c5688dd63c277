//! CV-005: Module source resolution and remote module cache.
//!
//! Local sources resolve against the calling module's directory. `git::`
//! sources are cloned once into the cache directory, keyed by a BLAKE3 hash
//! of the address, and reused on later runs.

use crate::error::LoadError;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Cache directory for fetched modules, relative to the conversion root.
pub const DEFAULT_CACHE_DIR: &str = ".iacgen/modules";

/// Credentials for a module host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCredentials {
    /// Bearer token sent with fetch requests
    pub token: String,
}

/// Lookup of credentials per module host.
pub trait CredentialsSource {
    fn for_host(&self, host: &str) -> Result<Option<HostCredentials>, LoadError>;
    fn store_for_host(&self, host: &str, credentials: HostCredentials) -> Result<(), LoadError>;
    fn forget_for_host(&self, host: &str) -> Result<(), LoadError>;
}

/// Credentials source that never has credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

impl CredentialsSource for NoCredentials {
    fn for_host(&self, _host: &str) -> Result<Option<HostCredentials>, LoadError> {
        Ok(None)
    }

    fn store_for_host(&self, _host: &str, _credentials: HostCredentials) -> Result<(), LoadError> {
        Ok(())
    }

    fn forget_for_host(&self, _host: &str) -> Result<(), LoadError> {
        Ok(())
    }
}

/// A parsed module source address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleSource {
    Local(PathBuf),
    Git {
        url: String,
        reference: Option<String>,
    },
}

impl ModuleSource {
    pub fn parse(source: &str) -> Result<Self, LoadError> {
        if let Some(rest) = source.strip_prefix("git::") {
            let (url, reference) = match rest.split_once("?ref=") {
                Some((u, r)) => (u.to_string(), Some(r.to_string())),
                None => (rest.to_string(), None),
            };
            if url.is_empty() || reference.as_deref() == Some("") {
                return Err(LoadError::UnsupportedSource {
                    source_addr: source.to_string(),
                });
            }
            return Ok(Self::Git { url, reference });
        }
        if source.starts_with("./") || source.starts_with("../") || Path::new(source).is_absolute() {
            return Ok(Self::Local(PathBuf::from(source)));
        }
        Err(LoadError::UnsupportedSource {
            source_addr: source.to_string(),
        })
    }
}

/// Resolves module sources to directories on disk.
pub struct ModuleStorage {
    cache_dir: PathBuf,
    credentials: Box<dyn CredentialsSource>,
}

impl ModuleStorage {
    pub fn new(cache_dir: impl Into<PathBuf>, credentials: Box<dyn CredentialsSource>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            credentials,
        }
    }

    /// Resolve `source`, called from a module in `base`, to a directory.
    pub fn resolve(&self, source: &str, base: &Path) -> Result<PathBuf, LoadError> {
        match ModuleSource::parse(source)? {
            ModuleSource::Local(path) => Ok(base.join(path)),
            ModuleSource::Git { url, reference } => {
                let dest = self.cache_dir.join(cache_key(&url, reference.as_deref()));
                if dest.is_dir() {
                    tracing::debug!(source, dir = %dest.display(), "using cached module");
                    return Ok(dest);
                }
                let credentials = match url_host(&url) {
                    Some(host) => self.credentials.for_host(host)?,
                    None => None,
                };
                fetch_git(source, &url, reference.as_deref(), credentials.as_ref(), &dest)?;
                Ok(dest)
            }
        }
    }
}

/// Cache directory name for a git address.
pub fn cache_key(url: &str, reference: Option<&str>) -> String {
    let address = format!("{}#{}", url, reference.unwrap_or(""));
    let hash = blake3::hash(address.as_bytes());
    hash.to_hex()[..16].to_string()
}

/// Host part of a URL (`https://host/path`, `ssh://user@host/path`, `user@host:path`).
pub fn url_host(url: &str) -> Option<&str> {
    let rest = match url.split_once("://") {
        Some((_, rest)) => rest,
        None => url,
    };
    let rest = rest.rsplit_once('@').map(|(_, r)| r).unwrap_or(rest);
    let host = rest
        .split(|c: char| c == '/' || c == ':')
        .next()
        .filter(|h| !h.is_empty())?;
    Some(host)
}

/// Clone a repository into `dest` (via a temporary directory, then rename).
fn fetch_git(
    source: &str,
    url: &str,
    reference: Option<&str>,
    credentials: Option<&HostCredentials>,
    dest: &Path,
) -> Result<(), LoadError> {
    let fetch_err = |message: String| LoadError::Fetch {
        source_addr: source.to_string(),
        message,
    };

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| fetch_err(format!("cannot create {}: {}", parent.display(), e)))?;
    }
    let tmp = dest.with_extension("tmp");
    if tmp.exists() {
        std::fs::remove_dir_all(&tmp)
            .map_err(|e| fetch_err(format!("cannot clear {}: {}", tmp.display(), e)))?;
    }

    let mut cmd = Command::new("git");
    if let Some(creds) = credentials {
        cmd.arg("-c")
            .arg(format!("http.extraHeader=Authorization: Bearer {}", creds.token));
    }
    cmd.args(["clone", "--quiet", "--depth", "1"]);
    if let Some(r) = reference {
        cmd.args(["--branch", r]);
    }
    cmd.arg(url).arg(&tmp);

    tracing::debug!(source, dest = %dest.display(), "fetching module");
    let output = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| fetch_err(format!("failed to spawn git: {}", e)))?;

    if !output.status.success() {
        return Err(fetch_err(format!(
            "git clone exited with {}: {}",
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    std::fs::rename(&tmp, dest).map_err(|e| {
        fetch_err(format!(
            "cannot rename {} → {}: {}",
            tmp.display(),
            dest.display(),
            e
        ))
    })
}
