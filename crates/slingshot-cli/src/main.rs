// ABOUTME: CLI entry point for slingshot.
// ABOUTME: Dispatches node, keygen and git subcommands.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use slingshot_cli::{
    format_exec_output, key_spec, resolve_node, token_env_var, NodeOverrides, VERSION,
};
use slingshot_core::{Bootstrapper, Config, InitOptions};
use slingshot_git::{KeyId, ProviderRegistry};
use slingshot_ssh::{generate, Identity, TrustedHostSet};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "slingshot")]
#[command(about = "Bootstrap SSH trust on nodes and manage Git provider keys")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, env = "SLINGSHOT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Node trust and remote execution
    #[command(subcommand)]
    Node(NodeCommands),

    /// Generate and store a key pair for an identity
    Keygen {
        /// Identity name (node name or provider alias)
        identity: String,

        /// RSA key size
        #[arg(long)]
        bits: Option<usize>,

        /// Generate an Ed25519 key instead of RSA
        #[arg(long)]
        ed25519: bool,

        /// Replace an existing key pair
        #[arg(long)]
        force: bool,
    },

    /// Git provider key management
    #[command(subcommand)]
    Git(GitCommands),

    /// Show version information
    Version,
}

#[derive(clap::Args)]
struct ConnectArgs {
    /// Node hostname (overrides config)
    #[arg(long, env = "REMOTE_HOST")]
    host: Option<String>,

    /// Remote user (overrides config)
    #[arg(long, env = "REMOTE_USER")]
    user: Option<String>,

    /// SSH port (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// known_hosts file to trust instead of the configured ones
    #[arg(long, env = "KNOWN_HOST_FILE")]
    known_hosts: Option<PathBuf>,
}

impl ConnectArgs {
    fn overrides(&self) -> NodeOverrides {
        NodeOverrides {
            host: self.host.clone(),
            user: self.user.clone(),
            port: self.port,
        }
    }

    fn trusted_hosts(&self, config: &Config) -> Result<TrustedHostSet> {
        let trusted = match &self.known_hosts {
            Some(path) => TrustedHostSet::from_files(&[path]),
            None => config.trusted_hosts(),
        };
        trusted.context("failed to load known_hosts")
    }
}

#[derive(Subcommand)]
enum NodeCommands {
    /// Generate a key for a node and install it with password login
    Init {
        /// Node name
        name: String,

        #[command(flatten)]
        connect: ConnectArgs,

        /// Regenerate and reinstall even if a key is already stored
        #[arg(long)]
        force: bool,

        /// RSA key size
        #[arg(long)]
        bits: Option<usize>,

        /// Generate an Ed25519 key instead of RSA
        #[arg(long)]
        ed25519: bool,

        /// Login password (prompted for when absent)
        #[arg(long, env = "REMOTE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Run commands on a node with its stored key
    Exec {
        /// Node name
        name: String,

        #[command(flatten)]
        connect: ConnectArgs,

        /// Commands to run, in order
        #[arg(last = true, required = true)]
        commands: Vec<String>,
    },
}

#[derive(Subcommand)]
enum GitCommands {
    /// Register a stored public key with a provider
    AddKey {
        /// Provider name or hostname
        provider: String,

        /// Identity whose public key is registered
        #[arg(long)]
        identity: String,

        /// Key title shown by the provider
        #[arg(long, default_value = "slingshot")]
        title: String,

        /// Access token (defaults to <PROVIDER>_ACCESS_TOKEN)
        #[arg(long)]
        token: Option<String>,
    },

    /// Remove a key from a provider by id
    RemoveKey {
        /// Provider name or hostname
        provider: String,

        /// Key id returned by add-key
        id: KeyId,

        /// Access token (defaults to <PROVIDER>_ACCESS_TOKEN)
        #[arg(long)]
        token: Option<String>,
    },

    /// List known providers
    Providers,
}

fn main() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    slingshot_log::init();

    let cli = Cli::parse();
    let config = Config::load_or_default(cli.config.as_deref())?;
    tracing::debug!(
        config = ?cli.config,
        base_dir = %config.base_dir.display(),
        nodes = config.nodes.len(),
        "configuration loaded"
    );

    match cli.command {
        Commands::Node(cmd) => run_node(&config, cmd),
        Commands::Keygen {
            identity,
            bits,
            ed25519,
            force,
        } => run_keygen(&config, &identity, bits, ed25519, force),
        Commands::Git(cmd) => run_git(&config, cmd),
        Commands::Version => {
            println!("slingshot {VERSION}");
            Ok(())
        }
    }
}

/// Handle node subcommands
fn run_node(config: &Config, cmd: NodeCommands) -> Result<()> {
    let bootstrap = Bootstrapper::ssh2(config.credential_store());

    match cmd {
        NodeCommands::Init {
            name,
            connect,
            force,
            bits,
            ed25519,
            password,
        } => {
            let node = resolve_node(config, &name, connect.overrides())?;
            let trusted = connect.trusted_hosts(config)?;
            tracing::debug!(
                node = %node.name,
                trusted_entries = trusted.len(),
                "loaded known_hosts"
            );
            let password = match password {
                Some(p) => SecretString::from(p),
                None => prompt_password(&node.user, &node.hostname)?,
            };
            let options = InitOptions::new(key_spec(config, bits, ed25519)).force(force);

            let installed = bootstrap
                .init_ssh(&node, &password, options, &trusted)
                .with_context(|| format!("failed to bootstrap node '{}'", node.name))?;
            if installed {
                println!("Installed a new key on {} ({})", node.name, node.target());
            } else {
                println!(
                    "Key for {} already exists; use --force to regenerate",
                    node.name
                );
            }
            Ok(())
        }
        NodeCommands::Exec {
            name,
            connect,
            commands,
        } => {
            let node = resolve_node(config, &name, connect.overrides())?;
            let trusted = connect.trusted_hosts(config)?;

            match bootstrap.exec_cmds(&node, commands.as_slice(), &trusted) {
                Ok(outputs) => {
                    for (command, output) in commands.iter().zip(&outputs) {
                        println!("{}", format_exec_output(command, output));
                    }
                    Ok(())
                }
                Err(e) => {
                    for (command, output) in commands.iter().zip(&e.outputs) {
                        println!("{}", format_exec_output(command, output));
                    }
                    Err(e).with_context(|| format!("command failed on node '{}'", node.name))
                }
            }
        }
    }
}

fn prompt_password(user: &str, host: &str) -> Result<SecretString> {
    let password = dialoguer::Password::new()
        .with_prompt(format!("Password for {user}@{host}"))
        .interact()
        .context("failed to read password")?;
    Ok(SecretString::from(password))
}

/// Generate and store a key pair for a provider alias or node
fn run_keygen(
    config: &Config,
    identity: &str,
    bits: Option<usize>,
    ed25519: bool,
    force: bool,
) -> Result<()> {
    let store = config.credential_store();
    let identity = Identity::new(identity);
    if store.key_pair_exists(&identity) && !force {
        bail!(
            "key pair for '{}' already exists; use --force to replace it",
            identity.name()
        );
    }

    let comment = format!("slingshot@{}", identity.name());
    let pair = generate(key_spec(config, bits, ed25519), &comment)?;
    store.save(&identity, &pair)?;
    tracing::info!(identity = %identity.name(), "stored key pair");

    let paths = store.paths(&identity);
    println!("Private key: {}", paths.private_key.display());
    println!("Public key:  {}", paths.public_key.display());
    println!("Fingerprint: {}", pair.fingerprint()?);
    Ok(())
}

/// Handle git subcommands
fn run_git(config: &Config, cmd: GitCommands) -> Result<()> {
    let registry = ProviderRegistry::builtin()?;

    match cmd {
        GitCommands::AddKey {
            provider,
            identity,
            title,
            token,
        } => {
            let provider = registry.get(&provider)?;
            let token = resolve_token(provider.name(), token)?;
            let pair = config
                .credential_store()
                .load(&Identity::new(&identity))
                .with_context(|| format!("no usable key pair for '{identity}'"))?;

            let id = provider
                .add_key(pair.public_line(), &title, &token)
                .with_context(|| format!("failed to add key to {}", provider.name()))?;
            tracing::info!(provider = provider.name(), %id, %identity, "registered public key");
            println!("{id}");
            Ok(())
        }
        GitCommands::RemoveKey {
            provider,
            id,
            token,
        } => {
            let provider = registry.get(&provider)?;
            let token = resolve_token(provider.name(), token)?;
            provider
                .remove_key(id, &token)
                .with_context(|| format!("failed to remove key {id} from {}", provider.name()))?;
            tracing::info!(provider = provider.name(), %id, "removed public key");
            println!("Removed key {id} from {}", provider.name());
            Ok(())
        }
        GitCommands::Providers => {
            for name in registry.names() {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn resolve_token(provider: &str, token: Option<String>) -> Result<SecretString> {
    if let Some(token) = token {
        return Ok(SecretString::from(token));
    }
    let var = token_env_var(provider);
    std::env::var(&var)
        .map(SecretString::from)
        .with_context(|| format!("no token given; set {var} or pass --token"))
}
