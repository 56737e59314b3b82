// ABOUTME: SSH building blocks for slingshot: key pairs, key storage, host trust, sessions.
// ABOUTME: Re-exports the public API used by slingshot-core and the CLI.

pub mod error;
pub mod fingerprint;
pub mod key;
pub mod known_hosts;
pub mod session;
pub mod store;

pub use error::{Result, SshError};
pub use fingerprint::fingerprint;
pub use key::{generate, generate_rsa, KeyPair, KeySpec, DEFAULT_RSA_BITS};
pub use known_hosts::{default_known_hosts_path, HostKeyVerification, TrustedHostSet};
pub use session::{Connector, HostTarget, RemoteSession, Ssh2Connector, DEFAULT_SSH_PORT};
pub use store::{CredentialStore, Identity, KeyPaths};

pub use secrecy::SecretString;
