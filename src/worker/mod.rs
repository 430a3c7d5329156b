// src/worker/mod.rs — Worker channels: one external compute process per problem module
//
// A channel speaks the Futhark server protocol: one command line in, output
// lines back, terminated by `%%% OK`. `&mut self` on every round trip keeps
// at most one call outstanding.

pub mod builder;
pub mod server;
pub mod values;

use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;

use crate::infra::errors::ToolError;
use values::FutharkValue;

pub use builder::{Builder, FutharkBuilder};
pub use server::ServerProcess;

/// Live connection to the worker process serving one problem module.
#[async_trait]
pub trait WorkerChannel: Send {
    /// Problem module this worker was built from.
    fn module(&self) -> &str;

    /// OS process id of the worker, if it is still running.
    fn pid(&self) -> Option<u32>;

    /// Directory for value files exchanged with the worker.
    fn scratch_dir(&self) -> &Path;

    /// Send one command and wait for its reply lines.
    ///
    /// A `%%% FAILURE` reply is a [`ToolError::WorkerFailure`]; a dead or
    /// garbled worker is a [`ToolError::ChannelBroken`].
    async fn send(&mut self, command: &[&str]) -> Result<Vec<String>, ToolError>;

    /// Terminate the worker and release its resources.
    async fn stop(&mut self) -> Result<(), ToolError>;

    /// Call an entry point, returning the measured runtime in nanoseconds.
    ///
    /// Uses the worker's own `runtime:` report (microseconds) when present,
    /// otherwise the wall-clock time of the round trip.
    async fn call(
        &mut self,
        entry: &str,
        outputs: &[&str],
        inputs: &[&str],
    ) -> Result<u64, ToolError> {
        let mut command = Vec::with_capacity(2 + outputs.len() + inputs.len());
        command.push("call");
        command.push(entry);
        command.extend_from_slice(outputs);
        command.extend_from_slice(inputs);

        let started = Instant::now();
        let lines = self.send(&command).await?;
        let elapsed = started.elapsed().as_nanos() as u64;

        for line in &lines {
            if let Some(rest) = line.strip_prefix("runtime:") {
                let micros: u64 = rest.trim().parse().map_err(|_| {
                    ToolError::broken(self.module(), format!("unparsable runtime line: {line}"))
                })?;
                return Ok(micros.saturating_mul(1000));
            }
        }
        Ok(elapsed)
    }

    /// Load `value` into the worker under the variable `name`.
    async fn restore(&mut self, name: &str, value: &FutharkValue) -> Result<(), ToolError> {
        let path = self.scratch_dir().join(format!("{name}.in"));
        tokio::fs::write(&path, value.encode()).await?;
        let path = path.to_string_lossy().into_owned();
        let type_name = value.type_name();
        self.send(&["restore", path.as_str(), name, type_name.as_str()])
            .await?;
        Ok(())
    }

    /// Read back the variable `name` from the worker.
    async fn store(&mut self, name: &str) -> Result<FutharkValue, ToolError> {
        let path = self.scratch_dir().join(format!("{name}.out"));
        let path_str = path.to_string_lossy().into_owned();
        // A stale file from an earlier store must not pass for this one
        let _ = tokio::fs::remove_file(&path).await;
        self.send(&["store", path_str.as_str(), name]).await?;

        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            ToolError::broken(self.module(), format!("worker stored no value for '{name}': {e}"))
        })?;
        let (value, _) = FutharkValue::decode(&bytes).map_err(|e| {
            ToolError::broken(self.module(), format!("undecodable value for '{name}': {e}"))
        })?;
        Ok(value)
    }

    async fn free(&mut self, names: &[&str]) -> Result<(), ToolError> {
        if names.is_empty() {
            return Ok(());
        }
        let mut command = vec!["free"];
        command.extend_from_slice(names);
        self.send(&command).await?;
        Ok(())
    }

    /// Free variables that may or may not exist. The worker refusing to free an
    /// unknown variable is not an error; a broken worker still is.
    async fn discard(&mut self, names: &[&str]) -> Result<(), ToolError> {
        for name in names {
            match self.free(&[*name]).await {
                Ok(()) | Err(ToolError::WorkerFailure { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
