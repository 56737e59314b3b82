// ABOUTME: Error types for SSH key, storage and session operations using thiserror.
// ABOUTME: Typed failures for generation, storage, host trust, auth and remote exec.

use std::path::PathBuf;
use thiserror::Error;

/// Boxed transport-level cause (libssh2 or socket I/O).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during SSH key and session operations.
#[derive(Error, Debug)]
pub enum SshError {
    /// Requested key size is not accepted by the algorithm.
    #[error("invalid RSA key size {bits} (expected {min}..={max} bits, multiple of 8)")]
    InvalidKeySize { bits: usize, min: usize, max: usize },

    /// Failed to generate an SSH key.
    #[error("failed to generate SSH key: {0}")]
    GenerateKey(#[source] ssh_key::Error),

    /// Failed to serialize a key.
    #[error("failed to serialize key: {0}")]
    SerializeKey(#[source] ssh_key::Error),

    /// Failed to sign or verify with a key.
    #[error("signature operation failed: {0}")]
    Signature(#[source] ssh_key::Error),

    /// No key pair is stored for the identity.
    #[error("no key pair for identity '{identity}' at {path}")]
    KeyNotFound { identity: String, path: PathBuf },

    /// Failed to read a key file from disk.
    #[error("failed to read SSH key from {path}: {source}")]
    ReadKey {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse an SSH key.
    #[error("failed to parse SSH key from {path}: {source}")]
    ParseKey {
        path: PathBuf,
        #[source]
        source: ssh_key::Error,
    },

    /// Stored public key does not belong to the stored private key.
    #[error("public key at {path} does not match its private key")]
    KeyMismatch { path: PathBuf },

    /// Failed to write a key file to disk.
    #[error("failed to write key to {path}: {source}")]
    WriteKey {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create a directory.
    #[error("failed to create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to set file permissions.
    #[error("failed to set permissions on {path}: {source}")]
    SetPermissions {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to read a known_hosts file.
    #[error("failed to read known hosts from {path}: {source}")]
    ReadKnownHosts {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A known_hosts file contains an entry that cannot be parsed.
    #[error("failed to parse known hosts from {origin}: {source}")]
    ParseKnownHosts {
        origin: String,
        #[source]
        source: ssh_key::Error,
    },

    /// The remote host key is not trusted.
    #[error("host key verification failed for {target}: {reason}")]
    HostVerification { target: String, reason: String },

    /// Could not open a TCP connection.
    #[error("failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// The server rejected the credential.
    #[error("authentication failed for {user}@{target}: {message}")]
    Auth {
        user: String,
        target: String,
        message: String,
    },

    /// A remote command exited with a non-zero status or was killed by a signal.
    #[error("remote command '{command}' {}: {stderr}", exit_description(.exit_status, .signal))]
    Exec {
        command: String,
        exit_status: i32,
        /// Signal name without the `SIG` prefix, when the command was killed.
        signal: Option<String>,
        stderr: String,
    },

    /// Transport broke during handshake, channel setup or command I/O.
    #[error("SSH transport error on {target}: {source}")]
    Transport {
        target: String,
        #[source]
        source: BoxError,
    },
}

/// Result type alias using SshError.
pub type Result<T> = std::result::Result<T, SshError>;

impl SshError {
    pub(crate) fn transport(target: impl Into<String>, source: impl Into<BoxError>) -> Self {
        SshError::Transport {
            target: target.into(),
            source: source.into(),
        }
    }
}

fn exit_description(exit_status: &i32, signal: &Option<String>) -> String {
    match signal {
        Some(signal) => format!("was killed by signal {signal}"),
        None => format!("exited with status {exit_status}"),
    }
}
