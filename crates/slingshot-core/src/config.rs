// ABOUTME: Configuration loading for slingshot
// ABOUTME: TOML file with defaults for key storage, key size, known_hosts and nodes

use crate::node::Node;
use serde::{Deserialize, Serialize};
use slingshot_ssh::{CredentialStore, KeySpec, SshError, TrustedHostSet, DEFAULT_RSA_BITS};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default key storage root, relative to the working directory.
pub const DEFAULT_BASE_DIR: &str = ".slingshot";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory for per-identity key pairs
    pub base_dir: PathBuf,
    /// RSA modulus size for newly generated keys
    pub key_bits: usize,
    /// known_hosts files consulted before connecting (`~/` is expanded).
    /// Unset means `~/.ssh/known_hosts` when that file exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub known_hosts: Option<Vec<PathBuf>>,
    /// Managed nodes
    pub nodes: Vec<Node>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            key_bits: DEFAULT_RSA_BITS,
            known_hosts: None,
            nodes: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load from `path` if given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Look up a configured node by name.
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn credential_store(&self) -> CredentialStore {
        CredentialStore::new(expand_home(&self.base_dir))
    }

    pub fn key_spec(&self) -> KeySpec {
        KeySpec::Rsa {
            bits: self.key_bits,
        }
    }

    /// Load the configured known_hosts files; every listed file must exist.
    /// Without a list, the user's default file is used if present.
    pub fn trusted_hosts(&self) -> Result<TrustedHostSet, SshError> {
        match &self.known_hosts {
            Some(files) => {
                let paths: Vec<PathBuf> = files.iter().map(|p| expand_home(p)).collect();
                TrustedHostSet::from_files(&paths)
            }
            None => TrustedHostSet::from_default_files(),
        }
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
