// ABOUTME: Core library for slingshot node management
// ABOUTME: Node model, configuration, SSH trust bootstrap and remote command execution

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod node;

pub use bootstrap::{
    authorized_keys_append_command, Bootstrapper, InitOptions, KeySource, SystemKeySource,
};
pub use config::{expand_home, Config, ConfigError, DEFAULT_BASE_DIR};
pub use error::ExecCmdsError;
pub use node::Node;
