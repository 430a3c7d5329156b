// benches/benchmarks.rs — Performance benchmarks (criterion)
//
// The adapter's own overhead sits between the orchestrator and the worker:
//   1. Request decoding and response encoding on the JSON line protocol
//   2. Converting problem inputs to and from the worker's binary value format

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::{json, Value};

use futhark_tool::protocol::{codec, Response, Timing};
use futhark_tool::worker::values::{ElemType, FutharkValue};

// ─── Helpers ────────────────────────────────────────────────────────────────

/// A `rows` x `cols` matrix of floats as JSON.
fn matrix(rows: usize, cols: usize) -> Value {
    let rows: Vec<Value> = (0..rows)
        .map(|i| {
            let row: Vec<f64> = (0..cols).map(|j| ((i * cols + j) as f64).sin()).collect();
            json!(row)
        })
        .collect();
    Value::Array(rows)
}

/// An evaluate request line carrying a GMM-sized input object.
fn evaluate_line(points: usize, dims: usize, clusters: usize) -> String {
    json!({
        "id": 17,
        "kind": "evaluate",
        "module": "gmm",
        "function": "objective",
        "input": {
            "alpha": vec![0.5; clusters],
            "means": matrix(clusters, dims),
            "icf": matrix(clusters, dims * (dims + 1) / 2),
            "x": matrix(points, dims),
            "gamma": 1.0,
            "m": 0,
            "runs": 1
        }
    })
    .to_string()
}

// ─── Benchmark: Protocol codec ──────────────────────────────────────────────

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    let define = json!({"id": 1, "kind": "define", "module": "hello"}).to_string();
    group.bench_function("decode_define", |b| {
        b.iter(|| codec::decode(black_box(&define)).expect("decode"))
    });

    let small = evaluate_line(100, 2, 5);
    group.bench_function("decode_evaluate_100_points", |b| {
        b.iter(|| codec::decode(black_box(&small)).expect("decode"))
    });

    let large = evaluate_line(10_000, 10, 25);
    group.bench_function("decode_evaluate_10k_points", |b| {
        b.iter(|| codec::decode(black_box(&large)).expect("decode"))
    });

    let response = Response::evaluated(
        json!(17),
        json!({"alpha": vec![0.1; 25], "means": matrix(25, 10), "icf": matrix(25, 55)}),
        (0..10).map(|i| Timing::evaluate(1_000 + i)).collect(),
    );
    group.bench_function("encode_jacobian_response", |b| {
        b.iter(|| codec::encode(black_box(&response)))
    });

    group.finish();
}

// ─── Benchmark: Binary value format ─────────────────────────────────────────

fn bench_values(c: &mut Criterion) {
    let mut group = c.benchmark_group("values");

    let json_matrix = matrix(1_000, 100);
    group.bench_function("from_json_1000x100", |b| {
        b.iter(|| FutharkValue::from_json(black_box(&json_matrix), ElemType::F64, 2).expect("convert"))
    });

    let value = FutharkValue::from_json(&json_matrix, ElemType::F64, 2).expect("convert");
    group.bench_function("encode_1000x100", |b| b.iter(|| black_box(&value).encode()));

    let bytes = value.encode();
    group.bench_function("decode_1000x100", |b| {
        b.iter(|| FutharkValue::decode(black_box(&bytes)).expect("decode"))
    });

    group.bench_function("to_json_1000x100", |b| b.iter(|| black_box(&value).to_json()));

    group.finish();
}

// ─── Main ───────────────────────────────────────────────────────────────────

criterion_group!(benches, bench_codec, bench_values);
criterion_main!(benches);
