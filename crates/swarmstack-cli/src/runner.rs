//! Shell command execution.
//!
//! Drivers never spawn processes directly; they go through a
//! [`CommandRunner`] so install flows can be exercised without a host.

use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

pub trait CommandRunner {
    /// Run `command`, streaming its output to the terminal.
    fn run(&self, command: &str) -> Result<(), CommandError>;

    /// Run `command` and return its trimmed stdout.
    fn capture(&self, command: &str) -> Result<String, CommandError>;

    /// Run `command` and report only whether it succeeded.
    fn succeeds(&self, command: &str) -> bool {
        self.capture(command).is_ok()
    }
}

/// Runs commands through `sh -c`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&self, command: &str) -> Result<(), CommandError> {
        debug!(command, "run");
        let status = Command::new("sh")
            .args(["-c", command])
            .status()
            .map_err(|source| CommandError::Spawn {
                command: command.to_string(),
                source,
            })?;

        if !status.success() {
            return Err(CommandError::Failed {
                command: command.to_string(),
                status: status.to_string(),
                stderr: String::new(),
            });
        }
        Ok(())
    }

    fn capture(&self, command: &str) -> Result<String, CommandError> {
        debug!(command, "capture");
        let output = Command::new("sh")
            .args(["-c", command])
            .stdin(Stdio::null())
            .output()
            .map_err(|source| CommandError::Spawn {
                command: command.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(CommandError::Failed {
                command: command.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Quote `value` for inclusion in a `sh -c` command line.
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}
