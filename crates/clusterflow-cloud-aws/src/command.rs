//! External process runner
//!
//! The only place the execution context turns into environment variables.

use crate::error::{AwsError, Result};
use clusterflow_cloud::ExecutionContext;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// How a command's standard streams are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Streams {
    /// Capture stdout and stderr.
    Captured,
    /// Share the terminal, for long-running or prompting commands.
    Inherited,
}

#[derive(Debug, Clone)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    stdin: Option<Vec<u8>>,
    streams: Streams,
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub status: String,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
            stdin: None,
            streams: Streams::Captured,
        }
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn inherit_output(mut self) -> Self {
        self.streams = Streams::Inherited;
        self
    }

    /// Run to completion. A non-zero exit is reported in the output, not as
    /// an error.
    pub async fn output(&self, ctx: &ExecutionContext) -> Result<CommandOutput> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(ctx.env_vars());
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        cmd.stdin(if self.stdin.is_some() {
            Stdio::piped()
        } else if self.streams == Streams::Inherited {
            Stdio::inherit()
        } else {
            Stdio::null()
        });
        match self.streams {
            Streams::Captured => {
                cmd.stdout(Stdio::piped());
                cmd.stderr(Stdio::piped());
            }
            Streams::Inherited => {
                cmd.stdout(Stdio::inherit());
                cmd.stderr(Stdio::inherit());
            }
        }

        tracing::debug!("Running: {} {}", self.program, self.args.join(" "));

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound => AwsError::ToolNotFound(self.program.clone()),
            _ => AwsError::IoError(e),
        })?;

        // Stdin is fed while the output pipes drain, so a child that writes
        // before it has read all of its input cannot block on a full pipe.
        let pipe = child.stdin.take();
        let feed = async {
            if let (Some(input), Some(mut pipe)) = (&self.stdin, pipe) {
                pipe.write_all(input).await?;
                // Closing stdin lets the child see EOF.
                drop(pipe);
            }
            Ok::<_, std::io::Error>(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;
        match fed {
            // A child may exit without reading everything; its status says
            // whether that was a failure.
            Err(e) if e.kind() != ErrorKind::BrokenPipe => return Err(e.into()),
            _ => {}
        }
        Ok(CommandOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Run and fail on a non-zero exit.
    pub async fn run(&self, ctx: &ExecutionContext) -> Result<CommandOutput> {
        let output = self.output(ctx).await?;
        if !output.success {
            return Err(AwsError::CommandFailed {
                program: self.program.clone(),
                status: output.status,
                stderr: if output.stderr.is_empty() {
                    "see output above".to_string()
                } else {
                    output.stderr
                },
            });
        }
        Ok(output)
    }
}

/// Owned argument list from string slices.
pub(crate) fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}
