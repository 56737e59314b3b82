// ABOUTME: Key pair persistence keyed by logical identity.
// ABOUTME: Resolves <base>/<identity>/id_rsa{,.pub}, writes private keys 0600, loads and checks pairs.

use crate::error::{Result, SshError};
use crate::key::KeyPair;
use ssh_key::{PrivateKey, PublicKey};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name of the private key inside an identity directory.
pub const PRIVATE_KEY_FILE: &str = "id_rsa";

/// File name of the public key inside an identity directory.
pub const PUBLIC_KEY_FILE: &str = "id_rsa.pub";

/// Logical name of something that owns a key pair (a node or a provider account),
/// with optional explicit file locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    name: String,
    private_key_path: Option<PathBuf>,
    public_key_path: Option<PathBuf>,
}

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            private_key_path: None,
            public_key_path: None,
        }
    }

    /// Store the private key at `path` instead of the derived location.
    pub fn with_private_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key_path = Some(path.into());
        self
    }

    /// Store the public key at `path` instead of the derived location.
    pub fn with_public_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.public_key_path = Some(path.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Resolved storage locations of one identity's key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPaths {
    pub private_key: PathBuf,
    pub public_key: PathBuf,
}

/// Maps identities to key files under a base directory.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    base_dir: PathBuf,
}

impl CredentialStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve where an identity's keys live. Overrides win; otherwise
    /// `<base>/<name>/id_rsa` and `<base>/<name>/id_rsa.pub`.
    pub fn paths(&self, identity: &Identity) -> KeyPaths {
        let dir = self.base_dir.join(&identity.name);
        KeyPaths {
            private_key: identity
                .private_key_path
                .clone()
                .unwrap_or_else(|| dir.join(PRIVATE_KEY_FILE)),
            public_key: identity
                .public_key_path
                .clone()
                .unwrap_or_else(|| dir.join(PUBLIC_KEY_FILE)),
        }
    }

    /// True only if both halves are present, readable and belong together.
    /// A pair left mismatched by an interrupted save counts as absent.
    pub fn key_pair_exists(&self, identity: &Identity) -> bool {
        match self.load(identity) {
            Ok(_) => true,
            Err(SshError::KeyNotFound { .. }) => false,
            Err(e) => {
                tracing::warn!(identity = identity.name(), error = %e, "stored key pair is unusable");
                false
            }
        }
    }

    /// Load the stored pair for `identity`.
    ///
    /// # Errors
    /// `SshError::KeyNotFound` if either file is missing, `ReadKey`/`ParseKey` for
    /// unreadable or malformed files, `KeyMismatch` if the halves do not belong together.
    pub fn load(&self, identity: &Identity) -> Result<KeyPair> {
        let paths = self.paths(identity);

        let private_data = read_key_file(identity, &paths.private_key)?;
        let private_key =
            PrivateKey::from_openssh(private_data.as_bytes()).map_err(|e| SshError::ParseKey {
                path: paths.private_key.clone(),
                source: e,
            })?;

        let public_data = read_key_file(identity, &paths.public_key)?;
        let public_key =
            PublicKey::from_openssh(public_data.trim()).map_err(|e| SshError::ParseKey {
                path: paths.public_key.clone(),
                source: e,
            })?;

        if public_key.key_data() != private_key.public_key().key_data() {
            return Err(SshError::KeyMismatch {
                path: paths.public_key,
            });
        }

        KeyPair::from_private_key(private_key)
    }

    /// Persist `pair` for `identity`, replacing whatever was there.
    ///
    /// Creates missing parent directories. The private key file is restricted to
    /// the owner (0600 on Unix), including when an existing file is overwritten.
    pub fn save(&self, identity: &Identity, pair: &KeyPair) -> Result<()> {
        let paths = self.paths(identity);

        for path in [&paths.private_key, &paths.public_key] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|e| SshError::CreateDirectory {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        // Stage both halves first so a failed write never touches the stored pair.
        let private_staged = staging_path(&paths.private_key);
        let public_staged = staging_path(&paths.public_key);
        write_private_key(&private_staged, pair.private_openssh().as_bytes())?;
        let public_line = format!("{}\n", pair.public_line());
        fs::write(&public_staged, public_line.as_bytes()).map_err(|e| SshError::WriteKey {
            path: public_staged.clone(),
            source: e,
        })?;

        commit(&private_staged, &paths.private_key)?;
        commit(&public_staged, &paths.public_key)?;

        tracing::info!(
            identity = identity.name(),
            private_key = %paths.private_key.display(),
            public_key = %paths.public_key.display(),
            "stored key pair"
        );
        Ok(())
    }
}

/// `<path>.tmp` next to the final file, so the rename stays on one filesystem.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn commit(staged: &Path, path: &Path) -> Result<()> {
    fs::rename(staged, path).map_err(|e| {
        let _ = fs::remove_file(staged);
        SshError::WriteKey {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

fn read_key_file(identity: &Identity, path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SshError::KeyNotFound {
                identity: identity.name.clone(),
                path: path.to_path_buf(),
            }
        } else {
            SshError::ReadKey {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })
}

fn write_private_key(path: &Path, contents: &[u8]) -> Result<()> {
    let write_err = |e| SshError::WriteKey {
        path: path.to_path_buf(),
        source: e,
    };

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path).map_err(write_err)?;

    // The mode above only applies to newly created files.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(|e| SshError::SetPermissions {
                path: path.to_path_buf(),
                source: e,
            })?;
    }

    file.write_all(contents).map_err(write_err)?;
    file.sync_all().map_err(write_err)
}
