// src/problems/hello.rs — Smoke-test problem: square and double a scalar

use std::sync::Arc;

use super::{CallEntry, ModuleRegistry, OutputShape, Param, Restore, PREPARE};
use crate::worker::values::ElemType;

const PARAMS: &[Param] = &[Param::whole("input", ElemType::F64, 0)];

pub fn register(registry: &mut ModuleRegistry) {
    registry.register("hello", PREPARE, Arc::new(Restore { params: PARAMS }));
    for entry in ["square", "double"] {
        registry.register(
            "hello",
            entry,
            Arc::new(CallEntry {
                entry,
                inputs: &["input"],
                outputs: &["output"],
                shape: OutputShape::Single,
            }),
        );
    }
}
