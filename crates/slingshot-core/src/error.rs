// ABOUTME: Error types for slingshot-core
// ABOUTME: Remote command failures that keep the output gathered before the failure

use slingshot_ssh::SshError;
use thiserror::Error;

/// `exec_cmds` failed part way. `outputs` holds one entry per command that
/// succeeded before the failure, in order.
#[derive(Debug, Error)]
#[error("remote command failed after {} successful command(s): {source}", .outputs.len())]
pub struct ExecCmdsError {
    pub outputs: Vec<String>,
    #[source]
    pub source: SshError,
}

impl ExecCmdsError {
    pub(crate) fn new(outputs: Vec<String>, source: SshError) -> Self {
        Self { outputs, source }
    }

    /// Failure before any command ran.
    pub(crate) fn before_first(source: SshError) -> Self {
        Self::new(Vec::new(), source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_display_counts_completed_commands() {
        let err = ExecCmdsError::new(
            vec!["a\n".into(), "b\n".into()],
            SshError::Exec {
                command: "false".into(),
                exit_status: 1,
                signal: None,
                stderr: String::new(),
            },
        );
        let msg = err.to_string();
        assert!(msg.contains("after 2 successful command(s)"));
        assert!(msg.contains("false"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_before_first_has_no_outputs() {
        let err = ExecCmdsError::before_first(SshError::KeyNotFound {
            identity: "node-a".into(),
            path: "/tmp/none".into(),
        });
        assert!(err.outputs.is_empty());
        assert!(matches!(err.source, SshError::KeyNotFound { .. }));
    }
}
