// src/problems/llsq.rs — Linear least squares: primal value and gradient

use std::sync::Arc;

use super::{CallEntry, ModuleRegistry, OutputShape, Param, Restore, PREPARE};
use crate::worker::values::ElemType;

const PARAMS: &[Param] = &[
    Param::field("x", ElemType::F64, 1),
    Param::field("n", ElemType::I64, 0),
];

const INPUTS: &[&str] = &["x", "n"];

pub fn register(registry: &mut ModuleRegistry) {
    registry.register("llsq", PREPARE, Arc::new(Restore { params: PARAMS }));
    for entry in ["primal", "gradient"] {
        registry.register(
            "llsq",
            entry,
            Arc::new(CallEntry {
                entry,
                inputs: INPUTS,
                outputs: &["output"],
                shape: OutputShape::Single,
            }),
        );
    }
}
