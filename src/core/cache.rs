// src/core/cache.rs — Build cache: per-module worker lifecycle
//
// UNBUILT -> BUILDING -> READY | FAILED, READY -> STOPPED on shutdown,
// READY -> BROKEN when a call finds the worker dead or garbled.
//
// Only the single dispatcher loop touches the cache, one request at a time,
// so there is no locking here.

use std::collections::HashMap;

use crate::infra::errors::ToolError;
use crate::worker::{Builder, WorkerChannel};

/// Lifecycle state of one module's worker.
pub enum WorkerState {
    Building,
    Ready(Box<dyn WorkerChannel>),
    /// Build failed; holds the full diagnostic text.
    Failed(String),
    /// A call broke the channel; holds the reason.
    Broken(String),
    Stopped,
}

/// Payload-free view of [`WorkerState`], for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Unbuilt,
    Building,
    Ready,
    Failed,
    Broken,
    Stopped,
}

impl WorkerState {
    pub fn status(&self) -> WorkerStatus {
        match self {
            WorkerState::Building => WorkerStatus::Building,
            WorkerState::Ready(_) => WorkerStatus::Ready,
            WorkerState::Failed(_) => WorkerStatus::Failed,
            WorkerState::Broken(_) => WorkerStatus::Broken,
            WorkerState::Stopped => WorkerStatus::Stopped,
        }
    }
}

pub struct BuildCache {
    builder: Box<dyn Builder>,
    entries: HashMap<String, WorkerState>,
}

impl BuildCache {
    pub fn new(builder: Box<dyn Builder>) -> Self {
        Self {
            builder,
            entries: HashMap::new(),
        }
    }

    pub fn status(&self, module: &str) -> WorkerStatus {
        self.entries
            .get(module)
            .map(WorkerState::status)
            .unwrap_or(WorkerStatus::Unbuilt)
    }

    /// Return the module's worker, building it unless it is already READY.
    ///
    /// A FAILED, BROKEN or STOPPED module is rebuilt and its entry overwritten
    /// with the new outcome.
    pub async fn ensure(&mut self, module: &str) -> Result<&mut dyn WorkerChannel, ToolError> {
        if self.status(module) == WorkerStatus::Ready {
            tracing::debug!("Worker '{}' already ready, reusing it", module);
        } else {
            self.build(module).await?;
        }
        self.channel(module)
    }

    /// The READY worker for `module`. Never builds.
    pub fn channel(&mut self, module: &str) -> Result<&mut dyn WorkerChannel, ToolError> {
        let not_ready = |reason: String| ToolError::ModuleNotReady {
            module: module.to_string(),
            reason,
        };
        match self.entries.get_mut(module) {
            Some(WorkerState::Ready(channel)) => Ok(channel.as_mut()),
            Some(WorkerState::Failed(output)) => Err(not_ready(format!("build failed:\n{output}"))),
            Some(WorkerState::Broken(reason)) => Err(not_ready(format!(
                "worker broke ({reason}); define the module again"
            ))),
            Some(WorkerState::Stopped) => Err(not_ready("worker was stopped".into())),
            Some(WorkerState::Building) => Err(not_ready("build in progress".into())),
            None => Err(not_ready("module has not been defined".into())),
        }
    }

    /// Stop the module's worker and mark it BROKEN so it needs a fresh define.
    pub async fn mark_broken(&mut self, module: &str, reason: &str) {
        tracing::warn!("Worker '{}' broken: {}", module, reason);
        if let Some(WorkerState::Ready(mut channel)) = self.entries.remove(module) {
            if let Err(e) = channel.stop().await {
                tracing::warn!("Worker '{}' stop error: {}", module, e);
            }
        }
        self.entries
            .insert(module.to_string(), WorkerState::Broken(reason.to_string()));
    }

    /// Stop every READY worker. Other entries keep their state.
    pub async fn shutdown_all(&mut self) {
        let ready: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, state)| matches!(state, WorkerState::Ready(_)))
            .map(|(name, _)| name.clone())
            .collect();
        for module in ready {
            self.stop(&module).await;
        }
    }

    /// Process id of the module's worker, if it is READY and running.
    pub fn pid(&self, module: &str) -> Option<u32> {
        match self.entries.get(module) {
            Some(WorkerState::Ready(channel)) => channel.pid(),
            _ => None,
        }
    }

    /// Process ids of all live workers.
    pub fn live_pids(&self) -> Vec<u32> {
        self.entries
            .values()
            .filter_map(|state| match state {
                WorkerState::Ready(channel) => channel.pid(),
                _ => None,
            })
            .collect()
    }

    async fn build(&mut self, module: &str) -> Result<(), ToolError> {
        self.stop(module).await;
        self.entries
            .insert(module.to_string(), WorkerState::Building);

        match self.builder.build(module).await {
            Ok(channel) => {
                tracing::info!("Worker '{}' ready (pid {:?})", module, channel.pid());
                self.entries
                    .insert(module.to_string(), WorkerState::Ready(channel));
                Ok(())
            }
            Err(e) => {
                let output = e.diagnostic();
                tracing::warn!("Build of '{}' failed", module);
                tracing::debug!("Build output for '{}':\n{}", module, output);
                self.entries
                    .insert(module.to_string(), WorkerState::Failed(output));
                Err(e)
            }
        }
    }

    async fn stop(&mut self, module: &str) {
        if let Some(WorkerState::Ready(mut channel)) = self.entries.remove(module) {
            if let Err(e) = channel.stop().await {
                tracing::warn!("Worker '{}' stop error: {}", module, e);
            }
            self.entries.insert(module.to_string(), WorkerState::Stopped);
        }
    }
}
