// src/worker/server.rs — Worker subprocess speaking the server protocol over stdio

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::WorkerChannel;
use crate::infra::errors::ToolError;

const PROMPT_OK: &str = "%%% OK";
const PROMPT_FAILURE: &str = "%%% FAILURE";

/// How long to wait for an exit status after the worker closes its output.
const REAP_GRACE: Duration = Duration::from_millis(200);

/// A running worker process for one problem module.
pub struct ServerProcess {
    module: String,
    process: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    scratch: TempDir,
    stop_timeout: Duration,
}

impl ServerProcess {
    /// Spawn `program` and wait for its ready prompt.
    ///
    /// The process is killed if the returned value is dropped without `stop`.
    pub async fn launch<S: AsRef<OsStr>>(
        module: &str,
        program: S,
        args: &[String],
        stop_timeout: Duration,
    ) -> Result<Self, ToolError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            // Worker diagnostics go to our stderr, never into the protocol stream
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut process = cmd.spawn()?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to capture worker stdin"))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to capture worker stdout"))?;

        let scratch = tempfile::Builder::new()
            .prefix(&format!("futhark-tool-{module}-"))
            .tempdir()?;

        let mut server = Self {
            module: module.to_string(),
            process,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            scratch,
            stop_timeout,
        };

        // Greeting: the server prints its prompt once it is ready for commands
        let banner = server.read_reply().await?;
        if !banner.is_empty() {
            tracing::debug!("Worker '{}' banner: {}", module, banner.join(" | "));
        }
        tracing::debug!("Worker '{}' ready (pid {:?})", module, server.pid());

        Ok(server)
    }

    async fn write_command(&mut self, command: &[&str]) -> Result<(), ToolError> {
        if let Some(word) = command
            .iter()
            .find(|w| w.is_empty() || w.chars().any(char::is_whitespace))
        {
            return Err(ToolError::InvalidInput(format!(
                "server command word {word:?} is empty or contains whitespace"
            )));
        }

        let mut line = command.join(" ");
        line.push('\n');

        let module = self.module.clone();
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ToolError::broken(&module, "worker has been stopped"))?;
        let written = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        }
        .await;
        if let Err(e) = written {
            return Err(ToolError::broken(
                &module,
                format!("failed to send '{}': {e}", command[0]),
            ));
        }
        Ok(())
    }

    /// Read lines up to the next ready prompt.
    async fn read_reply(&mut self) -> Result<Vec<String>, ToolError> {
        let mut lines = Vec::new();
        let mut failed = false;

        loop {
            let mut line = String::new();
            let n = match self.stdout.read_line(&mut line).await {
                Ok(n) => n,
                Err(e) => {
                    return Err(ToolError::broken(
                        &self.module,
                        format!("unreadable worker output: {e}"),
                    ))
                }
            };
            if n == 0 {
                let reason = self.exit_reason().await;
                return Err(ToolError::broken(&self.module, reason));
            }

            let line = line.trim_end_matches(['\r', '\n']);
            match line {
                PROMPT_OK => break,
                PROMPT_FAILURE => failed = true,
                _ => lines.push(line.to_string()),
            }
        }

        if failed {
            Err(ToolError::WorkerFailure {
                module: self.module.clone(),
                message: lines.join("\n"),
            })
        } else {
            Ok(lines)
        }
    }

    async fn exit_reason(&mut self) -> String {
        match tokio::time::timeout(REAP_GRACE, self.process.wait()).await {
            Ok(Ok(status)) => format!("worker exited unexpectedly ({status})"),
            _ => "worker closed its output unexpectedly".to_string(),
        }
    }
}

#[async_trait]
impl WorkerChannel for ServerProcess {
    fn module(&self) -> &str {
        &self.module
    }

    fn pid(&self) -> Option<u32> {
        self.process.id()
    }

    fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    async fn send(&mut self, command: &[&str]) -> Result<Vec<String>, ToolError> {
        if command.is_empty() {
            return Err(ToolError::InvalidInput("empty server command".into()));
        }
        tracing::trace!("Worker '{}' <- {}", self.module, command.join(" "));
        self.write_command(command).await?;
        self.read_reply().await
    }

    /// Close stdin so the server exits on its own, then kill it if it lingers.
    async fn stop(&mut self) -> Result<(), ToolError> {
        if self.stdin.take().is_none() {
            return Ok(());
        }

        match tokio::time::timeout(self.stop_timeout, self.process.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!("Worker '{}' stopped ({})", self.module, status);
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                tracing::warn!(
                    "Worker '{}' did not exit within {:?}, killing it",
                    self.module,
                    self.stop_timeout
                );
                self.process.kill().await?;
            }
        }
        Ok(())
    }
}
