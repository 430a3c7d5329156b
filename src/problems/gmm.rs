// src/problems/gmm.rs — Gaussian mixture model: objective and jacobian
//
// Input fields follow the eval's JSON: `alpha` (k), `means` (k x d),
// `icf` (k x d(d+1)/2), `x` (n x d) and the Wishart prior `gamma`, `m`.

use std::sync::Arc;

use super::{CallEntry, ModuleRegistry, OutputShape, Param, Restore, PREPARE};
use crate::worker::values::ElemType;

const PARAMS: &[Param] = &[
    Param::field("alpha", ElemType::F64, 1),
    Param::field("means", ElemType::F64, 2),
    Param::field("icf", ElemType::F64, 2),
    Param::field("x", ElemType::F64, 2),
    Param::field("gamma", ElemType::F64, 0),
    Param::field("m", ElemType::I64, 0),
];

const INPUTS: &[&str] = &["alpha", "means", "icf", "x", "gamma", "m"];

/// Gradient components, in the order `calculate_jacobian` returns them.
const JACOBIAN_KEYS: &[&str] = &["alpha", "means", "icf"];

pub fn register(registry: &mut ModuleRegistry) {
    registry.register("gmm", PREPARE, Arc::new(Restore { params: PARAMS }));
    registry.register(
        "gmm",
        "objective",
        Arc::new(CallEntry {
            entry: "calculate_objective",
            inputs: INPUTS,
            outputs: &["objective"],
            shape: OutputShape::Single,
        }),
    );
    registry.register(
        "gmm",
        "jacobian",
        Arc::new(CallEntry {
            entry: "calculate_jacobian",
            inputs: INPUTS,
            outputs: &["d_alpha", "d_means", "d_icf"],
            shape: OutputShape::Object(JACOBIAN_KEYS),
        }),
    );
}
