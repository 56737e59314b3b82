// ABOUTME: Trusted host registry built from known_hosts files.
// ABOUTME: Matches host patterns and decides whether a server key may be trusted.

use crate::error::{Result, SshError};
use crate::fingerprint::fingerprint;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use ssh_key::known_hosts::{HostPatterns, KnownHosts, Marker};
use ssh_key::PublicKey;
use std::fs;
use std::path::{Path, PathBuf};

/// Outcome of checking a server key against the trusted set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyVerification {
    /// A matching host entry carries this exact key.
    Trusted,
    /// No entry matches the host.
    Unknown,
    /// Entries exist for the host but none carries this key.
    Mismatch,
    /// The key is listed under `@revoked`.
    Revoked,
}

type HmacSha1 = Hmac<Sha1>;

#[derive(Debug, Clone)]
struct TrustedHost {
    hosts: HostPatterns,
    key: PublicKey,
    revoked: bool,
}

impl TrustedHost {
    fn matches(&self, name: &str) -> bool {
        match &self.hosts {
            HostPatterns::Patterns(patterns) => host_matches(patterns, name),
            HostPatterns::HashedName { salt, hash } => hashed_name_matches(salt, hash, name),
        }
    }
}

/// Known-good server keys, consulted before any credential is sent.
#[derive(Debug, Clone, Default)]
pub struct TrustedHostSet {
    entries: Vec<TrustedHost>,
}

impl TrustedHostSet {
    /// An empty set; every host is `Unknown`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and merge one or more known_hosts files.
    ///
    /// # Errors
    /// `ReadKnownHosts` if a file cannot be read, `ParseKnownHosts` on a malformed entry.
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut set = Self::new();
        for path in paths {
            let path = path.as_ref();
            let contents = fs::read_to_string(path).map_err(|e| SshError::ReadKnownHosts {
                path: path.to_path_buf(),
                source: e,
            })?;
            set.extend_from_str(&contents, &path.display().to_string())?;
        }
        tracing::debug!(entries = set.len(), "loaded trusted hosts");
        Ok(set)
    }

    /// Load `~/.ssh/known_hosts` if it exists, otherwise an empty set.
    pub fn from_default_files() -> Result<Self> {
        match default_known_hosts_path() {
            Some(path) if path.exists() => Self::from_files(&[path]),
            _ => Ok(Self::new()),
        }
    }

    /// Parse known_hosts content held in memory.
    pub fn parse(contents: &str) -> Result<Self> {
        let mut set = Self::new();
        set.extend_from_str(contents, "<memory>")?;
        Ok(set)
    }

    fn extend_from_str(&mut self, contents: &str, origin: &str) -> Result<()> {
        for entry in KnownHosts::new(contents) {
            let entry = entry.map_err(|e| SshError::ParseKnownHosts {
                origin: origin.to_string(),
                source: e,
            })?;

            let revoked = match entry.marker() {
                None => false,
                Some(Marker::Revoked) => true,
                // @cert-authority lines vouch for certificates, not plain host keys.
                Some(_) => continue,
            };

            self.entries.push(TrustedHost {
                hosts: entry.host_patterns().clone(),
                key: entry.public_key().clone(),
                revoked,
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decide whether `key` is the trusted key for `host:port`.
    pub fn verify(&self, host: &str, port: u16, key: &PublicKey) -> HostKeyVerification {
        let name = lookup_name(host, port);
        let mut matched = false;

        for entry in self.entries.iter().filter(|e| e.matches(&name)) {
            let same_key = entry.key.key_data() == key.key_data();
            if entry.revoked {
                if same_key {
                    return HostKeyVerification::Revoked;
                }
                continue;
            }
            matched = true;
            if same_key {
                // A later @revoked line still wins.
                if self.is_revoked(&name, key) {
                    return HostKeyVerification::Revoked;
                }
                return HostKeyVerification::Trusted;
            }
        }

        if matched {
            HostKeyVerification::Mismatch
        } else {
            HostKeyVerification::Unknown
        }
    }

    /// Like [`verify`](Self::verify) but turns anything other than `Trusted` into an error.
    pub fn check(&self, host: &str, port: u16, key: &PublicKey) -> Result<()> {
        let outcome = self.verify(host, port, key);
        let fp = fingerprint(key).unwrap_or_else(|_| "<unknown>".to_string());
        let reason = match outcome {
            HostKeyVerification::Trusted => {
                tracing::debug!(host, port, fingerprint = %fp, "host key trusted");
                return Ok(());
            }
            HostKeyVerification::Unknown => format!("host is not in known_hosts (key {fp})"),
            HostKeyVerification::Mismatch => {
                format!("host key {fp} does not match the known_hosts entry")
            }
            HostKeyVerification::Revoked => format!("host key {fp} is revoked"),
        };
        Err(SshError::HostVerification {
            target: format!("{host}:{port}"),
            reason,
        })
    }

    fn is_revoked(&self, name: &str, key: &PublicKey) -> bool {
        self.entries.iter().any(|e| {
            e.revoked && e.key.key_data() == key.key_data() && e.matches(name)
        })
    }
}

/// `~/.ssh/known_hosts`
pub fn default_known_hosts_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".ssh").join("known_hosts"))
}

/// Name under which OpenSSH records a host: bare for port 22, `[host]:port` otherwise.
fn lookup_name(host: &str, port: u16) -> String {
    if port == 22 {
        host.to_string()
    } else {
        format!("[{host}]:{port}")
    }
}

/// A host matches when some positive pattern matches and no negated one does.
fn host_matches(patterns: &[String], name: &str) -> bool {
    let mut positive = false;
    for pattern in patterns {
        if let Some(negated) = pattern.strip_prefix('!') {
            if wildcard_match(negated, name) {
                return false;
            }
        } else if wildcard_match(pattern, name) {
            positive = true;
        }
    }
    positive
}

/// `|1|salt|hash` entries store HMAC-SHA1(salt, name).
fn hashed_name_matches(salt: &[u8], hash: &[u8], name: &str) -> bool {
    let Ok(mut mac) = HmacSha1::new_from_slice(salt) else {
        return false;
    };
    mac.update(name.as_bytes());
    mac.verify_slice(hash).is_ok()
}

/// Case-insensitive glob with `*` and `?`.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.to_ascii_lowercase().chars().collect();
    let text: Vec<char> = text.to_ascii_lowercase().chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}
