// ABOUTME: CLI library components for the slingshot binary.
// ABOUTME: Node resolution, key selection, token lookup and output formatting.

//! # slingshot-cli
//!
//! ```text
//! slingshot
//! ├── node
//! │   ├── init <name>               # Install a generated key on a node
//! │   └── exec <name> -- <cmd>...   # Run commands with the stored key
//! ├── keygen <identity>             # Create a stored key pair
//! └── git
//!     ├── add-key <provider>        # Register a stored public key
//!     ├── remove-key <provider> <id>
//!     └── providers                 # List known providers
//! ```

use anyhow::{bail, Result};
use slingshot_core::{Config, Node};
use slingshot_ssh::KeySpec;

/// Version of the slingshot CLI
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Connection overrides given on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct NodeOverrides {
    pub host: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
}

/// Find `name` in the config and apply overrides, or build the node from the
/// overrides alone when it is not configured.
pub fn resolve_node(config: &Config, name: &str, overrides: NodeOverrides) -> Result<Node> {
    let mut node = match config.node(name) {
        Some(node) => node.clone(),
        None => {
            let (Some(host), Some(user)) = (&overrides.host, &overrides.user) else {
                bail!("node '{name}' is not configured; pass --host and --user");
            };
            Node::new(name, host.as_str(), user.as_str())
        }
    };

    if let Some(host) = overrides.host {
        node.hostname = host;
    }
    if let Some(user) = overrides.user {
        node.user = user;
    }
    if let Some(port) = overrides.port {
        node.ssh_port = Some(port);
    }
    Ok(node)
}

/// Ed25519 wins over an explicit size; otherwise `bits` or the configured default.
pub fn key_spec(config: &Config, bits: Option<usize>, ed25519: bool) -> KeySpec {
    if ed25519 {
        KeySpec::Ed25519
    } else {
        KeySpec::Rsa {
            bits: bits.unwrap_or(config.key_bits),
        }
    }
}

/// Environment variable holding the access token for `provider`,
/// e.g. `GITHUB_ACCESS_TOKEN`.
pub fn token_env_var(provider: &str) -> String {
    let name: String = provider
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{name}_ACCESS_TOKEN")
}

/// One line per command as `$ cmd > output`.
pub fn format_exec_output(command: &str, output: &str) -> String {
    format!("$ {command} > {}", output.trim_end())
}
