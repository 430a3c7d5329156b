// src/core/mod.rs — Core: build cache and command dispatcher

pub mod cache;
pub mod dispatcher;

pub use cache::{BuildCache, WorkerState, WorkerStatus};
pub use dispatcher::{Dispatcher, ToolIdentity};
