// src/worker/builder.rs — Compile a problem module and launch its worker

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{ServerProcess, WorkerChannel};
use crate::infra::config::{Config, FutharkConfig};
use crate::infra::errors::ToolError;

/// Produces a ready worker channel for a problem module.
#[async_trait]
pub trait Builder: Send + Sync {
    /// Compile (if needed) and launch the worker for `module`.
    ///
    /// Failures are [`ToolError::Build`] carrying the full diagnostic text.
    async fn build(&self, module: &str) -> Result<Box<dyn WorkerChannel>, ToolError>;
}

/// Builds workers with `futhark <backend> --server <module>.fut`.
pub struct FutharkBuilder {
    compiler: String,
    backend: String,
    source_dir: PathBuf,
    cflags: String,
    stop_timeout: Duration,
}

impl FutharkBuilder {
    pub fn new(futhark: &FutharkConfig, stop_timeout: Duration) -> Self {
        Self {
            compiler: futhark.compiler.clone(),
            backend: futhark.effective_backend().to_string(),
            source_dir: futhark.source_dir.clone(),
            cflags: futhark.cflags.clone(),
            stop_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.futhark, config.worker.stop_timeout())
    }

    pub fn source_path(&self, module: &str) -> PathBuf {
        self.source_dir.join(format!("{module}.fut"))
    }

    pub fn server_path(&self, module: &str) -> PathBuf {
        self.source_dir.join(module)
    }

    async fn compile(&self, module: &str) -> Result<(), ToolError> {
        let compiler = which::which(&self.compiler).map_err(|e| ToolError::Build {
            module: module.to_string(),
            output: format!("Futhark compiler '{}' not found: {e}", self.compiler),
        })?;

        let source = self.source_path(module);
        tracing::info!(
            "Compiling '{}' with {} backend: {}",
            module,
            self.backend,
            source.display()
        );

        let output = Command::new(&compiler)
            .arg(&self.backend)
            .arg("--server")
            .arg(&source)
            .env("CFLAGS", &self.cflags)
            .output()
            .await
            .map_err(|e| ToolError::Build {
                module: module.to_string(),
                output: format!("failed to run {}: {e}", compiler.display()),
            })?;

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ToolError::Build {
                module: module.to_string(),
                output: format!("{stdout}{stderr}"),
            });
        }
        Ok(())
    }
}

/// Module names become file names and server command words, so only plain
/// identifiers are accepted.
pub fn validate_module_name(module: &str) -> Result<(), ToolError> {
    let valid = !module.is_empty()
        && module
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ToolError::Build {
            module: module.to_string(),
            output: format!("invalid module name {module:?}"),
        })
    }
}

#[async_trait]
impl Builder for FutharkBuilder {
    async fn build(&self, module: &str) -> Result<Box<dyn WorkerChannel>, ToolError> {
        validate_module_name(module)?;
        self.compile(module).await?;

        let program = absolute(&self.server_path(module));
        let server = ServerProcess::launch(module, &program, &[], self.stop_timeout)
            .await
            .map_err(|e| ToolError::Build {
                module: module.to_string(),
                output: format!("failed to launch {}: {}", program.display(), e.diagnostic()),
            })?;
        Ok(Box::new(server))
    }
}

/// `Command` resolves bare relative names through PATH; anchor them to the
/// working directory instead.
fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}
