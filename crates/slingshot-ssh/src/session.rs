// ABOUTME: Authenticated remote sessions and blocking command execution.
// ABOUTME: Connector/RemoteSession seam with an ssh2 implementation that verifies host keys first.

use crate::error::{Result, SshError};
use crate::key::KeyPair;
use crate::known_hosts::TrustedHostSet;
use secrecy::{ExposeSecret, SecretString};
use ssh_key::PublicKey;
use std::fmt;
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Where to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTarget {
    pub host: String,
    pub port: u16,
}

impl HostTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for HostTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One authenticated channel to a host. Commands run sequentially.
///
/// Implementations release the transport when dropped, so an early return
/// never leaks a connection; `close` is the orderly path.
pub trait RemoteSession {
    /// Run `command`, block until it exits and return its stdout.
    ///
    /// # Errors
    /// `SshError::Exec` on a non-zero exit status, `SshError::Transport` if the
    /// connection breaks.
    fn exec(&mut self, command: &str) -> Result<String>;

    /// Close the session.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Opens sessions. Both constructors verify the host key against `trusted`
/// before any credential is sent.
pub trait Connector {
    fn open_with_password(
        &self,
        target: &HostTarget,
        user: &str,
        password: &SecretString,
        trusted: &TrustedHostSet,
    ) -> Result<Box<dyn RemoteSession>>;

    fn open_with_key_pair(
        &self,
        target: &HostTarget,
        user: &str,
        key_pair: &KeyPair,
        trusted: &TrustedHostSet,
    ) -> Result<Box<dyn RemoteSession>>;
}

impl<C: Connector + ?Sized> Connector for &C {
    fn open_with_password(
        &self,
        target: &HostTarget,
        user: &str,
        password: &SecretString,
        trusted: &TrustedHostSet,
    ) -> Result<Box<dyn RemoteSession>> {
        (**self).open_with_password(target, user, password, trusted)
    }

    fn open_with_key_pair(
        &self,
        target: &HostTarget,
        user: &str,
        key_pair: &KeyPair,
        trusted: &TrustedHostSet,
    ) -> Result<Box<dyn RemoteSession>> {
        (**self).open_with_key_pair(target, user, key_pair, trusted)
    }
}

/// libssh2-backed connector.
#[derive(Debug, Clone, Default)]
pub struct Ssh2Connector {
    timeout: Option<Duration>,
}

impl Ssh2Connector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound connect and per-operation blocking time. Unset means block until
    /// the transport resolves.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// TCP connect, handshake and host key verification. The returned session
    /// is not yet authenticated.
    fn handshake(&self, target: &HostTarget, trusted: &TrustedHostSet) -> Result<Ssh2Session> {
        let name = target.to_string();
        let tcp = self.connect_tcp(target)?;

        let mut session = ssh2::Session::new().map_err(|e| SshError::transport(&name, e))?;
        if let Some(timeout) = self.timeout {
            session.set_timeout(timeout.as_millis().try_into().unwrap_or(u32::MAX));
        }
        session.set_tcp_stream(tcp);

        // From here on the guard disconnects on every early return.
        let mut guard = Ssh2Session {
            session,
            target: name.clone(),
            closed: false,
        };
        guard
            .session
            .handshake()
            .map_err(|e| SshError::transport(&name, e))?;

        let host_key = server_host_key(&guard.session, &name)?;
        trusted.check(&target.host, target.port, &host_key)?;

        Ok(guard)
    }

    fn connect_tcp(&self, target: &HostTarget) -> Result<TcpStream> {
        let connect_err = |e| SshError::Connect {
            target: target.to_string(),
            source: e,
        };
        let tcp = match self.timeout {
            Some(timeout) => {
                let addr = (target.host.as_str(), target.port)
                    .to_socket_addrs()
                    .map_err(connect_err)?
                    .next()
                    .ok_or_else(|| {
                        connect_err(std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            "host resolved to no addresses",
                        ))
                    })?;
                TcpStream::connect_timeout(&addr, timeout).map_err(connect_err)?
            }
            None => TcpStream::connect((target.host.as_str(), target.port)).map_err(connect_err)?,
        };
        Ok(tcp)
    }
}

impl Connector for Ssh2Connector {
    fn open_with_password(
        &self,
        target: &HostTarget,
        user: &str,
        password: &SecretString,
        trusted: &TrustedHostSet,
    ) -> Result<Box<dyn RemoteSession>> {
        let session = self.handshake(target, trusted)?;
        session
            .session
            .userauth_password(user, password.expose_secret())
            .map_err(|e| auth_error(user, target, e))?;
        session.ensure_authenticated(user)?;

        tracing::info!(remote = %target, user, method = "password", "ssh session opened");
        Ok(Box::new(session))
    }

    fn open_with_key_pair(
        &self,
        target: &HostTarget,
        user: &str,
        key_pair: &KeyPair,
        trusted: &TrustedHostSet,
    ) -> Result<Box<dyn RemoteSession>> {
        let session = self.handshake(target, trusted)?;
        session
            .session
            .userauth_pubkey_memory(
                user,
                Some(key_pair.public_line()),
                key_pair.private_openssh(),
                None,
            )
            .map_err(|e| auth_error(user, target, e))?;
        session.ensure_authenticated(user)?;

        tracing::info!(remote = %target, user, method = "publickey", "ssh session opened");
        Ok(Box::new(session))
    }
}

fn auth_error(user: &str, target: &HostTarget, e: ssh2::Error) -> SshError {
    SshError::Auth {
        user: user.to_string(),
        target: target.to_string(),
        message: e.message().to_string(),
    }
}

fn server_host_key(session: &ssh2::Session, target: &str) -> Result<PublicKey> {
    let (bytes, _kind) = session.host_key().ok_or_else(|| {
        SshError::HostVerification {
            target: target.to_string(),
            reason: "server did not present a host key".to_string(),
        }
    })?;
    PublicKey::from_bytes(bytes).map_err(|e| SshError::HostVerification {
        target: target.to_string(),
        reason: format!("unsupported host key: {e}"),
    })
}

struct Ssh2Session {
    session: ssh2::Session,
    target: String,
    closed: bool,
}

impl Ssh2Session {
    fn ensure_authenticated(&self, user: &str) -> Result<()> {
        if self.session.authenticated() {
            Ok(())
        } else {
            Err(SshError::Auth {
                user: user.to_string(),
                target: self.target.clone(),
                message: "server did not accept the credential".to_string(),
            })
        }
    }
}

impl RemoteSession for Ssh2Session {
    fn exec(&mut self, command: &str) -> Result<String> {
        let target = self.target.clone();
        let transport = |e: ssh2::Error| SshError::transport(&target, e);

        let mut channel = ChannelGuard(self.session.channel_session().map_err(transport)?);
        tracing::debug!(remote = %self.target, command, "exec");
        channel.0.exec(command).map_err(transport)?;

        self.session.set_blocking(false);
        let drained = {
            let mut stdout = channel.0.stream(0);
            let mut stderr = channel.0.stderr();
            drain_interleaved(&mut stdout, &mut stderr, || channel.0.eof())
        };
        self.session.set_blocking(true);
        let (stdout, stderr) = drained.map_err(|e| SshError::transport(&target, e))?;

        channel.0.wait_close().map_err(transport)?;
        let exit_status = channel.0.exit_status().map_err(transport)?;
        let signal = channel.0.exit_signal().map_err(transport)?.exit_signal;

        command_outcome(
            command,
            exit_status,
            signal,
            String::from_utf8_lossy(&stderr).trim_end(),
        )?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.closed = true;
        self.session
            .disconnect(None, "slingshot session closed", None)
            .map_err(|e| SshError::transport(&self.target, e))?;
        tracing::debug!(remote = %self.target, "ssh session closed");
        Ok(())
    }
}

impl Drop for Ssh2Session {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self
                .session
                .disconnect(None, "slingshot session aborted", None);
            tracing::debug!(remote = %self.target, "ssh session released");
        }
    }
}

/// Read stdout and stderr in turns until both are exhausted and `eof` holds,
/// so a chatty stream cannot stall the other one behind a full channel window.
/// Sources are expected to be non-blocking; `WouldBlock` means no data yet.
fn drain_interleaved<O: Read, E: Read>(
    stdout: &mut O,
    stderr: &mut E,
    eof: impl Fn() -> bool,
) -> std::io::Result<(Vec<u8>, Vec<u8>)> {
    let mut out = Vec::new();
    let mut err = Vec::new();
    let mut buf = [0u8; 16 * 1024];

    loop {
        // `|` so both streams are polled every round.
        let progressed =
            read_some(stdout, &mut buf, &mut out)? | read_some(stderr, &mut buf, &mut err)?;
        if !progressed {
            if eof() {
                return Ok((out, err));
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

fn read_some(source: &mut impl Read, buf: &mut [u8], sink: &mut Vec<u8>) -> std::io::Result<bool> {
    match source.read(buf) {
        Ok(0) => Ok(false),
        Ok(n) => {
            sink.extend_from_slice(&buf[..n]);
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(true),
        Err(e) => Err(e),
    }
}

/// A command succeeded only if it exited with status 0 and no signal.
fn command_outcome(
    command: &str,
    exit_status: i32,
    signal: Option<String>,
    stderr: &str,
) -> Result<()> {
    if exit_status == 0 && signal.is_none() {
        return Ok(());
    }
    Err(SshError::Exec {
        command: command.to_string(),
        exit_status,
        signal,
        stderr: stderr.to_string(),
    })
}

/// Closes the channel when it leaves scope, whichever way exec returns.
struct ChannelGuard(ssh2::Channel);

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        let _ = self.0.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Hands out fixed chunks, reporting `WouldBlock` between them.
    struct Trickle {
        chunks: Vec<Vec<u8>>,
        stall: bool,
        drained: Rc<Cell<bool>>,
    }

    impl Trickle {
        fn new(total: usize, chunk: usize) -> Self {
            let mut chunks = Vec::new();
            let mut left = total;
            while left > 0 {
                let n = left.min(chunk);
                chunks.push(vec![b'x'; n]);
                left -= n;
            }
            chunks.reverse();
            Self {
                drained: Rc::new(Cell::new(chunks.is_empty())),
                chunks,
                stall: false,
            }
        }
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.stall = !self.stall;
            if self.stall && !self.chunks.is_empty() {
                return Err(std::io::ErrorKind::WouldBlock.into());
            }
            let Some(mut chunk) = self.chunks.pop() else {
                return Ok(0);
            };
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                self.chunks.push(chunk.split_off(n));
            }
            self.drained.set(self.chunks.is_empty());
            Ok(n)
        }
    }

    #[test]
    fn test_drain_reads_large_stderr_alongside_stdout() {
        let mut stdout = Trickle::new(10, 4);
        let mut stderr = Trickle::new(3 * 1024 * 1024, 32 * 1024);
        let (out_done, err_done) = (Rc::clone(&stdout.drained), Rc::clone(&stderr.drained));

        let (out, err) =
            drain_interleaved(&mut stdout, &mut stderr, || out_done.get() && err_done.get())
                .unwrap();
        assert_eq!(out.len(), 10);
        assert_eq!(err.len(), 3 * 1024 * 1024);
    }

    #[test]
    fn test_drain_waits_for_eof() {
        let polls = Cell::new(0);
        let mut stdout = Trickle::new(0, 1);
        let mut stderr = Trickle::new(0, 1);
        let (out, err) = drain_interleaved(&mut stdout, &mut stderr, || {
            polls.set(polls.get() + 1);
            polls.get() >= 3
        })
        .unwrap();
        assert!(out.is_empty() && err.is_empty());
        assert_eq!(polls.get(), 3);
    }

    #[test]
    fn test_command_outcome_success() {
        assert!(command_outcome("true", 0, None, "").is_ok());
    }

    #[test]
    fn test_command_outcome_non_zero_status() {
        let err = command_outcome("false", 1, None, "nope").unwrap_err();
        assert!(matches!(
            err,
            SshError::Exec { exit_status: 1, signal: None, ref stderr, .. } if stderr == "nope"
        ));
    }

    #[test]
    fn test_command_killed_by_signal_fails_despite_zero_status() {
        let err = command_outcome("kill -9 $$", 0, Some("KILL".to_string()), "").unwrap_err();
        assert!(matches!(err, SshError::Exec { ref signal, .. } if signal.as_deref() == Some("KILL")));
        assert!(err.to_string().contains("signal KILL"));
    }

    #[test]
    fn test_host_target_display() {
        assert_eq!(HostTarget::new("node-a", 22).to_string(), "node-a:22");
        assert_eq!(HostTarget::new("10.0.0.5", 2222).to_string(), "10.0.0.5:2222");
    }

    #[test]
    fn test_connect_refused_is_connect_error() {
        // Bind then drop a listener so the port is very likely closed.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let connector = Ssh2Connector::new().with_timeout(Duration::from_secs(2));
        let result = connector.open_with_password(
            &HostTarget::new("127.0.0.1", port),
            "nobody",
            &SecretString::from("secret".to_string()),
            &TrustedHostSet::new(),
        );
        assert!(matches!(result, Err(SshError::Connect { .. })));
    }

    #[test]
    fn test_non_ssh_peer_fails_before_auth() {
        use std::io::Write;

        // A peer that speaks garbage instead of the SSH banner.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let _ = stream.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n");
            }
        });

        let connector = Ssh2Connector::new().with_timeout(Duration::from_secs(5));
        let result = connector.open_with_password(
            &HostTarget::new("127.0.0.1", port),
            "nobody",
            &SecretString::from("secret".to_string()),
            &TrustedHostSet::new(),
        );
        assert!(matches!(result, Err(SshError::Transport { .. })));
        server.join().unwrap();
    }
}
