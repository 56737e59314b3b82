// ABOUTME: Managed node description
// ABOUTME: Hostname, port, user and the identity its key pair is stored under

use serde::{Deserialize, Serialize};
use slingshot_ssh::{HostTarget, Identity, DEFAULT_SSH_PORT};
use std::path::PathBuf;

/// A remote machine slingshot manages. Immutable configuration; the key pair
/// itself lives in the credential store under the node's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Identity name, also the key directory under the base dir
    pub name: String,
    pub hostname: String,
    pub user: String,
    /// Defaults to 22
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_port: Option<u16>,
    /// Overrides `<base>/<name>/id_rsa`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<PathBuf>,
    /// Overrides `<base>/<name>/id_rsa.pub`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_path: Option<PathBuf>,
}

impl Node {
    pub fn new(
        name: impl Into<String>,
        hostname: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            hostname: hostname.into(),
            user: user.into(),
            ssh_port: None,
            private_key_path: None,
            public_key_path: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.ssh_port = Some(port);
        self
    }

    pub fn with_key_paths(mut self, private_key: PathBuf, public_key: PathBuf) -> Self {
        self.private_key_path = Some(private_key);
        self.public_key_path = Some(public_key);
        self
    }

    pub fn ssh_port(&self) -> u16 {
        self.ssh_port.unwrap_or(DEFAULT_SSH_PORT)
    }

    pub fn target(&self) -> HostTarget {
        HostTarget::new(&self.hostname, self.ssh_port())
    }

    /// Storage identity for this node's key pair.
    pub fn identity(&self) -> Identity {
        let mut identity = Identity::new(&self.name);
        if let Some(path) = &self.private_key_path {
            identity = identity.with_private_key_path(path);
        }
        if let Some(path) = &self.public_key_path {
            identity = identity.with_public_key_path(path);
        }
        identity
    }
}
