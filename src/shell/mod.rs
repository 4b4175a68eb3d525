//! Shell Runner
//!
//! The collaborator that executes a single task command. The contract is
//! deliberately narrow: a non-zero exit is a *successful* call whose
//! result carries the status; an error is returned only when the command
//! text is unusable or the interpreter cannot be constructed. Each command
//! gets a fixed wall-clock budget, after which it is killed and reported
//! as a non-zero exit.

use std::collections::HashMap;
use std::io::{self, Write};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Wall-clock budget for a single command.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

/// Exit status reported for a command that exceeded the budget.
pub const TIMEOUT_STATUS: i32 = 124;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("Unparseable command {0:?}")]
    Unparseable(String),

    #[error("Could not construct shell for command {cmd:?}: {source}")]
    Interpreter {
        cmd: String,
        #[source]
        source: io::Error,
    },
}

/// The outcome of one shell command. `status != 0` is a result, not an
/// error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub cmd: String,
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

impl CommandResult {
    pub fn ok(&self) -> bool {
        self.status == 0
    }
}

/// Output sinks for a run. Results always capture stdout/stderr in full;
/// the sinks additionally receive them as commands finish, and may simply
/// discard.
pub struct IoStream {
    stdout: Box<dyn Write + Send>,
    stderr: Box<dyn Write + Send>,
}

impl IoStream {
    pub fn new(stdout: Box<dyn Write + Send>, stderr: Box<dyn Write + Send>) -> Self {
        Self { stdout, stderr }
    }

    /// The real process streams.
    pub fn os() -> Self {
        Self::new(Box::new(io::stdout()), Box::new(io::stderr()))
    }

    /// Swallow everything.
    pub fn null() -> Self {
        Self::new(Box::new(io::sink()), Box::new(io::sink()))
    }

    pub fn write_stdout(&mut self, text: &str) {
        let _ = self.stdout.write_all(text.as_bytes());
        let _ = self.stdout.flush();
    }

    pub fn write_stderr(&mut self, text: &str) {
        let _ = self.stderr.write_all(text.as_bytes());
        let _ = self.stderr.flush();
    }
}

/// Executes a single command for a task.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run `cmd` with the given extra environment. The environment is
    /// merged over the process environment; where a name collides the
    /// given value wins.
    async fn run(
        &self,
        cmd: &str,
        task_name: &str,
        stream: &mut IoStream,
        env: &HashMap<String, String>,
    ) -> Result<CommandResult, ShellError>;
}

/// The default runner: hands the command line to the host `sh -c`.
#[derive(Debug, Default)]
pub struct ShellRunner;

#[async_trait]
impl Runner for ShellRunner {
    async fn run(
        &self,
        cmd: &str,
        task_name: &str,
        stream: &mut IoStream,
        env: &HashMap<String, String>,
    ) -> Result<CommandResult, ShellError> {
        if cmd.trim().is_empty() {
            return Err(ShellError::Unparseable(cmd.to_string()));
        }

        log::debug!("task {}: running {:?}", task_name, cmd);
        let mut command = tokio::process::Command::new("sh");
        command
            .arg("-c")
            .arg(cmd)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|source| ShellError::Interpreter {
            cmd: cmd.to_string(),
            source,
        })?;

        let result = match tokio::time::timeout(COMMAND_TIMEOUT, child.wait_with_output()).await {
            Ok(output) => {
                let output = output.map_err(|source| ShellError::Interpreter {
                    cmd: cmd.to_string(),
                    source,
                })?;
                CommandResult {
                    cmd: cmd.to_string(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    status: output.status.code().unwrap_or(-1),
                }
            }
            // dropping the future kills the child (kill_on_drop); the
            // timeout is a non-zero exit, not an error
            Err(_) => CommandResult {
                cmd: cmd.to_string(),
                stdout: String::new(),
                stderr: format!(
                    "command timed out after {} seconds\n",
                    COMMAND_TIMEOUT.as_secs()
                ),
                status: TIMEOUT_STATUS,
            },
        };

        stream.write_stdout(&result.stdout);
        stream.write_stderr(&result.stderr);
        Ok(result)
    }
}
