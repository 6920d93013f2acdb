//! Shell-command refresh collaborator
//!
//! Runs a command to produce a fresh value for a key. The command is run as
//! `sh -c <command> stash-refresh <key>`, so the key is available as `$1` and
//! also as the `STASH_KEY` environment variable. Standard output is parsed as
//! JSON when possible and otherwise taken as a trimmed string.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::error::BoxError;
use crate::handler::Refresh;
use crate::value::{parse_loose, Value};

/// Errors that can occur while running a refresh command
#[derive(Debug, Error)]
pub enum CommandError {
    /// The shell could not be started
    #[error("failed to start refresh command: {0}")]
    Spawn(#[from] std::io::Error),

    /// The command exited unsuccessfully
    #[error("refresh command exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    /// The command did not finish in time
    #[error("refresh command timed out after {0:?}")]
    TimedOut(Duration),
}

/// Refreshes keys by running a shell command
#[derive(Debug, Clone)]
pub struct CommandRefresher {
    /// Command line passed to `sh -c`
    command: String,
    /// Upper bound on the command's run time
    timeout: Option<Duration>,
}

impl CommandRefresher {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout: None,
        }
    }

    /// Kills the command and fails the refresh when it runs longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Runs the command for `key` and parses its output
    pub async fn run(&self, key: &str) -> Result<Value, CommandError> {
        debug!(key, command = %self.command, "running refresh command");

        let child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .arg("stash-refresh")
            .arg(key)
            .env("STASH_KEY", key)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| CommandError::TimedOut(limit))??,
            None => child.wait_with_output().await?,
        };

        if !output.status.success() {
            return Err(CommandError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(parse_loose(&String::from_utf8_lossy(&output.stdout)))
    }
}

#[async_trait]
impl Refresh for CommandRefresher {
    async fn refresh(&self, key: &str) -> Result<Value, BoxError> {
        Ok(self.run(key).await?)
    }
}
