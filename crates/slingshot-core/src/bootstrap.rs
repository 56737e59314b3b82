// ABOUTME: Node trust bootstrap and key-authenticated remote execution
// ABOUTME: Installs a generated public key over a password session, then runs commands with it

use crate::error::ExecCmdsError;
use crate::node::Node;
use secrecy::SecretString;
use slingshot_ssh::{
    generate, Connector, CredentialStore, KeyPair, KeySpec, RemoteSession, Result,
    Ssh2Connector, TrustedHostSet,
};

/// Produces fresh key pairs for bootstrap.
pub trait KeySource {
    fn generate(&self, spec: KeySpec, comment: &str) -> Result<KeyPair>;
}

/// Generates keys from the operating system RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemKeySource;

impl KeySource for SystemKeySource {
    fn generate(&self, spec: KeySpec, comment: &str) -> Result<KeyPair> {
        generate(spec, comment)
    }
}

/// Options for [`Bootstrapper::init_ssh`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitOptions {
    /// Regenerate and reinstall even if a key pair is already stored.
    pub force: bool,
    pub key_spec: KeySpec,
}

impl InitOptions {
    pub fn new(key_spec: KeySpec) -> Self {
        Self {
            force: false,
            key_spec,
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Drives bootstrap and command execution for nodes.
pub struct Bootstrapper<C, K = SystemKeySource> {
    store: CredentialStore,
    connector: C,
    keys: K,
}

impl Bootstrapper<Ssh2Connector> {
    /// Real SSH transport and system key generation.
    pub fn ssh2(store: CredentialStore) -> Self {
        Self::new(store, Ssh2Connector::new())
    }
}

impl<C: Connector> Bootstrapper<C> {
    pub fn new(store: CredentialStore, connector: C) -> Self {
        Self::with_key_source(store, connector, SystemKeySource)
    }
}

impl<C: Connector, K: KeySource> Bootstrapper<C, K> {
    pub fn with_key_source(store: CredentialStore, connector: C, keys: K) -> Self {
        Self {
            store,
            connector,
            keys,
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Make sure `node` trusts a locally stored key pair.
    ///
    /// Returns `Ok(false)` without generating anything or connecting when a
    /// pair is already stored and `force` is off. Otherwise generates a pair,
    /// stores it (replacing any previous one), logs in with `password` and
    /// appends the public line to the remote `~/.ssh/authorized_keys`.
    /// Returns `Ok(true)` once the key is installed.
    ///
    /// Keys written before a later failure are left on disk.
    pub fn init_ssh(
        &self,
        node: &Node,
        password: &SecretString,
        options: InitOptions,
        trusted: &TrustedHostSet,
    ) -> Result<bool> {
        let identity = node.identity();
        let do_init = options.force || !self.store.key_pair_exists(&identity);
        if !do_init {
            tracing::info!(node = %node.name, "key pair already stored, skipping bootstrap");
            return Ok(false);
        }

        let comment = format!("slingshot@{}", node.name);
        let pair = self.keys.generate(options.key_spec, &comment)?;
        self.store.save(&identity, &pair)?;
        let fingerprint = pair.fingerprint()?;
        tracing::info!(node = %node.name, %fingerprint, "generated key pair for node");

        let target = node.target();
        let mut session =
            self.connector
                .open_with_password(&target, &node.user, password, trusted)?;
        session.exec(&authorized_keys_append_command(pair.public_line()))?;
        tracing::info!(node = %node.name, remote = %target, "installed public key");

        if let Err(e) = session.close() {
            tracing::warn!(node = %node.name, error = %e, "failed to close session cleanly");
        }
        Ok(true)
    }

    /// Run `commands` in order on `node`, authenticating with its stored key.
    ///
    /// Returns one stdout per command. Stops at the first failure; the error
    /// carries the outputs of the commands that completed before it.
    pub fn exec_cmds<S: AsRef<str>>(
        &self,
        node: &Node,
        commands: &[S],
        trusted: &TrustedHostSet,
    ) -> std::result::Result<Vec<String>, ExecCmdsError> {
        let pair = self
            .store
            .load(&node.identity())
            .map_err(ExecCmdsError::before_first)?;

        let target = node.target();
        let mut session = self
            .connector
            .open_with_key_pair(&target, &node.user, &pair, trusted)
            .map_err(ExecCmdsError::before_first)?;

        let mut outputs = Vec::with_capacity(commands.len());
        for command in commands {
            match session.exec(command.as_ref()) {
                Ok(output) => outputs.push(output),
                Err(e) => return Err(ExecCmdsError::new(outputs, e)),
            }
        }
        tracing::debug!(node = %node.name, count = outputs.len(), "remote commands completed");

        if let Err(e) = session.close() {
            tracing::warn!(node = %node.name, error = %e, "failed to close session cleanly");
        }
        Ok(outputs)
    }
}

/// Shell command that appends `public_line` to the remote authorized_keys,
/// creating `~/.ssh` with mode 0700 if needed.
pub fn authorized_keys_append_command(public_line: &str) -> String {
    format!(
        "mkdir -p ~/.ssh && chmod 700 ~/.ssh && printf '%s\\n' {} >> ~/.ssh/authorized_keys",
        shell_quote(public_line.trim_end())
    )
}

/// POSIX single-quote `s`.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
