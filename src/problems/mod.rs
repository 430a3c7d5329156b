// src/problems/mod.rs — Problem modules and the function resolver
//
// A problem module is a named bundle of routines run against a live worker:
// `prepare` pushes the evaluate input into the worker, and each target calls
// an entry point and reads back its result. Routines are registered by
// (module, function) name and resolved at evaluate time.

pub mod gmm;
pub mod hello;
pub mod llsq;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::infra::errors::ToolError;
use crate::worker::values::{ElemType, FutharkValue};
use crate::worker::WorkerChannel;

/// Name of the routine every module exposes for loading input.
pub const PREPARE: &str = "prepare";

/// Result of one routine invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub output: Value,
    /// One measured runtime per internal run, in nanoseconds.
    pub times: Vec<u64>,
}

/// A routine callable against a worker channel.
#[async_trait]
pub trait Routine: Send + Sync {
    async fn invoke(
        &self,
        worker: &mut dyn WorkerChannel,
        input: &Value,
    ) -> Result<Evaluation, ToolError>;
}

/// Maps (module, function) names to routines.
pub struct ModuleRegistry {
    modules: HashMap<String, HashMap<String, Arc<dyn Routine>>>,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
        }
    }

    /// Registry with every bundled problem module.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        hello::register(&mut registry);
        llsq::register(&mut registry);
        gmm::register(&mut registry);
        registry
    }

    /// Register a routine, replacing any previous one under the same name.
    pub fn register(&mut self, module: &str, function: &str, routine: Arc<dyn Routine>) {
        self.modules
            .entry(module.to_string())
            .or_default()
            .insert(function.to_string(), routine);
    }

    /// Look up a routine by module and function name.
    pub fn resolve(&self, module: &str, function: &str) -> Result<Arc<dyn Routine>, ToolError> {
        let functions = self
            .modules
            .get(module)
            .ok_or_else(|| ToolError::UnknownModule {
                module: module.to_string(),
            })?;
        functions
            .get(function)
            .cloned()
            .ok_or_else(|| ToolError::UnknownFunction {
                module: module.to_string(),
                function: function.to_string(),
            })
    }

    /// List registered module names, sorted.
    pub fn modules(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modules.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

// ─── Declarative routines ───────────────────────────────────────────────────

/// One worker variable loaded from the evaluate input.
#[derive(Debug, Clone, Copy)]
pub struct Param {
    /// Input object key, or `None` to use the whole input.
    pub key: Option<&'static str>,
    /// Worker variable name.
    pub var: &'static str,
    pub elem: ElemType,
    pub rank: usize,
}

impl Param {
    pub const fn field(key: &'static str, elem: ElemType, rank: usize) -> Self {
        Self {
            key: Some(key),
            var: key,
            elem,
            rank,
        }
    }

    pub const fn whole(var: &'static str, elem: ElemType, rank: usize) -> Self {
        Self {
            key: None,
            var,
            elem,
            rank,
        }
    }

    fn value(&self, input: &Value) -> Result<FutharkValue, ToolError> {
        let raw = match self.key {
            None => input,
            Some(key) => input
                .get(key)
                .ok_or_else(|| ToolError::InvalidInput(format!("missing input field '{key}'")))?,
        };
        FutharkValue::from_json(raw, self.elem, self.rank).map_err(|e| match e {
            ToolError::InvalidInput(msg) => {
                ToolError::InvalidInput(format!("input '{}': {msg}", self.key.unwrap_or(self.var)))
            }
            other => other,
        })
    }
}

/// `prepare`: restore each parameter into the worker, replacing earlier values.
pub struct Restore {
    pub params: &'static [Param],
}

#[async_trait]
impl Routine for Restore {
    async fn invoke(
        &self,
        worker: &mut dyn WorkerChannel,
        input: &Value,
    ) -> Result<Evaluation, ToolError> {
        // Convert everything first so bad input leaves the worker untouched
        let values = self
            .params
            .iter()
            .map(|p| p.value(input).map(|v| (p.var, v)))
            .collect::<Result<Vec<_>, ToolError>>()?;

        let vars: Vec<&str> = self.params.iter().map(|p| p.var).collect();
        worker.discard(&vars).await?;
        for (var, value) in &values {
            worker.restore(var, value).await?;
        }
        Ok(Evaluation::default())
    }
}

/// How the stored outputs of an entry point become the JSON output.
#[derive(Debug, Clone, Copy)]
pub enum OutputShape {
    /// The entry point has one output, returned as-is.
    Single,
    /// One output per key, returned as an object.
    Object(&'static [&'static str]),
}

/// A target: call `entry` once per run, then read back its outputs.
pub struct CallEntry {
    pub entry: &'static str,
    pub inputs: &'static [&'static str],
    pub outputs: &'static [&'static str],
    pub shape: OutputShape,
}

#[async_trait]
impl Routine for CallEntry {
    async fn invoke(
        &self,
        worker: &mut dyn WorkerChannel,
        input: &Value,
    ) -> Result<Evaluation, ToolError> {
        let runs = runs(input)?;

        // Outputs left over from an earlier, interrupted evaluation
        worker.discard(self.outputs).await?;

        let mut times = Vec::new();
        for run in 0..runs {
            if run > 0 {
                worker.free(self.outputs).await?;
            }
            times.push(worker.call(self.entry, self.outputs, self.inputs).await?);
        }

        let mut stored = Vec::with_capacity(self.outputs.len());
        for out in self.outputs {
            stored.push(worker.store(out).await?.to_json());
        }
        worker.free(self.outputs).await?;

        let output = match self.shape {
            OutputShape::Single => stored.into_iter().next().unwrap_or(Value::Null),
            OutputShape::Object(keys) => {
                Value::Object(keys.iter().map(|k| k.to_string()).zip(stored).collect::<Map<_, _>>())
            }
        };
        Ok(Evaluation { output, times })
    }
}

/// Upper bound on `runs` in one evaluate request.
pub const MAX_RUNS: u64 = 10_000;

/// Number of timed runs requested by the input's `runs` field (default 1).
pub fn runs(input: &Value) -> Result<usize, ToolError> {
    match input.get("runs") {
        None => Ok(1),
        Some(v) => match v.as_u64() {
            Some(n) if (1..=MAX_RUNS).contains(&n) => Ok(n as usize),
            _ => Err(ToolError::InvalidInput(format!(
                "'runs' must be an integer between 1 and {MAX_RUNS}, got {v}"
            ))),
        },
    }
}
