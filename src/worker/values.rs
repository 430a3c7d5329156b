// src/worker/values.rs — Futhark binary data format
//
// Layout of one value:
//   b'b' | version (2) | rank (u8) | 4-byte type tag | rank x u64 LE dims | LE elements
//
// Values travel to and from the worker as files: `restore` reads them,
// `store` writes them.

use serde_json::{Number, Value};

use crate::infra::errors::ToolError;

const MAGIC: u8 = b'b';
const VERSION: u8 = 2;

/// Element types this adapter exchanges with workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElemType {
    F32,
    F64,
    I32,
    I64,
    Bool,
}

impl ElemType {
    fn tag(self) -> &'static [u8; 4] {
        match self {
            ElemType::F32 => b" f32",
            ElemType::F64 => b" f64",
            ElemType::I32 => b" i32",
            ElemType::I64 => b" i64",
            ElemType::Bool => b"bool",
        }
    }

    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b" f32" => Some(ElemType::F32),
            b" f64" => Some(ElemType::F64),
            b" i32" => Some(ElemType::I32),
            b" i64" => Some(ElemType::I64),
            b"bool" => Some(ElemType::Bool),
            _ => None,
        }
    }

    fn size(self) -> usize {
        match self {
            ElemType::F32 | ElemType::I32 => 4,
            ElemType::F64 | ElemType::I64 => 8,
            ElemType::Bool => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ElemType::F32 => "f32",
            ElemType::F64 => "f64",
            ElemType::I32 => "i32",
            ElemType::I64 => "i64",
            ElemType::Bool => "bool",
        }
    }
}

/// Flat element storage in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub enum Elements {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    Bool(Vec<bool>),
}

impl Elements {
    fn new(elem: ElemType) -> Self {
        match elem {
            ElemType::F32 => Elements::F32(Vec::new()),
            ElemType::F64 => Elements::F64(Vec::new()),
            ElemType::I32 => Elements::I32(Vec::new()),
            ElemType::I64 => Elements::I64(Vec::new()),
            ElemType::Bool => Elements::Bool(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Elements::F32(v) => v.len(),
            Elements::F64(v) => v.len(),
            Elements::I32(v) => v.len(),
            Elements::I64(v) => v.len(),
            Elements::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn elem_type(&self) -> ElemType {
        match self {
            Elements::F32(_) => ElemType::F32,
            Elements::F64(_) => ElemType::F64,
            Elements::I32(_) => ElemType::I32,
            Elements::I64(_) => ElemType::I64,
            Elements::Bool(_) => ElemType::Bool,
        }
    }

    /// Append one JSON scalar, checking it fits the element type.
    fn push_json(&mut self, v: &Value) -> Result<(), ToolError> {
        let elem = self.elem_type().name();
        let mismatch = || ToolError::InvalidInput(format!("{v} is not a valid {elem}"));
        match self {
            Elements::F32(out) => out.push(v.as_f64().ok_or_else(mismatch)? as f32),
            Elements::F64(out) => out.push(v.as_f64().ok_or_else(mismatch)?),
            Elements::I32(out) => {
                let n = v.as_i64().ok_or_else(mismatch)?;
                out.push(i32::try_from(n).map_err(|_| mismatch())?);
            }
            Elements::I64(out) => out.push(v.as_i64().ok_or_else(mismatch)?),
            Elements::Bool(out) => out.push(v.as_bool().ok_or_else(mismatch)?),
        }
        Ok(())
    }

    fn json_at(&self, i: usize) -> Value {
        match self {
            Elements::F32(v) => float_json(v[i] as f64),
            Elements::F64(v) => float_json(v[i]),
            Elements::I32(v) => Value::from(v[i]),
            Elements::I64(v) => Value::from(v[i]),
            Elements::Bool(v) => Value::from(v[i]),
        }
    }
}

/// Non-finite floats have no JSON representation and come out as null.
fn float_json(x: f64) -> Value {
    Number::from_f64(x).map(Value::Number).unwrap_or(Value::Null)
}

/// A scalar or regular array as stored by the worker.
#[derive(Debug, Clone, PartialEq)]
pub struct FutharkValue {
    pub shape: Vec<u64>,
    pub elements: Elements,
}

impl FutharkValue {
    pub fn f64(x: f64) -> Self {
        Self {
            shape: Vec::new(),
            elements: Elements::F64(vec![x]),
        }
    }

    pub fn i64(x: i64) -> Self {
        Self {
            shape: Vec::new(),
            elements: Elements::I64(vec![x]),
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn elem_type(&self) -> ElemType {
        self.elements.elem_type()
    }

    /// Futhark type name as used by `restore`, e.g. `[][]f64`.
    pub fn type_name(&self) -> String {
        format!("{}{}", "[]".repeat(self.rank()), self.elem_type().name())
    }

    /// Build a value of the given element type and rank from nested JSON arrays.
    /// Ragged arrays are rejected.
    pub fn from_json(value: &Value, elem: ElemType, rank: usize) -> Result<Self, ToolError> {
        let mut shape: Vec<u64> = Vec::with_capacity(rank);
        let mut probe = value;
        for depth in 0..rank {
            let arr = probe.as_array().ok_or_else(|| {
                ToolError::InvalidInput(format!(
                    "expected an array of rank {rank}, found a non-array at depth {depth}"
                ))
            })?;
            shape.push(arr.len() as u64);
            match arr.first() {
                Some(first) => probe = first,
                None => {
                    // Empty dimension: remaining dims are zero
                    shape.resize(rank, 0);
                    break;
                }
            }
        }

        // The shape is only a guess from the first row at each depth; storage
        // grows with the elements actually present.
        let mut elements = Elements::new(elem);
        flatten(value, &shape, 0, &mut elements)?;

        Ok(Self { shape, elements })
    }

    /// Rebuild nested JSON arrays (or a scalar for rank 0).
    pub fn to_json(&self) -> Value {
        let mut next = 0;
        nest(&self.elements, &self.shape, &mut next)
    }

    pub fn encode(&self) -> Vec<u8> {
        let elem = self.elem_type();
        let mut out =
            Vec::with_capacity(7 + 8 * self.shape.len() + elem.size() * self.elements.len());
        out.push(MAGIC);
        out.push(VERSION);
        out.push(self.shape.len() as u8);
        out.extend_from_slice(elem.tag());
        for d in &self.shape {
            out.extend_from_slice(&d.to_le_bytes());
        }
        match &self.elements {
            Elements::F32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            Elements::F64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            Elements::I32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            Elements::I64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            Elements::Bool(v) => v.iter().for_each(|x| out.push(u8::from(*x))),
        }
        out
    }

    /// Decode one value from the front of `bytes`, returning it and the rest.
    pub fn decode(bytes: &[u8]) -> Result<(Self, &[u8]), String> {
        let mut r = Reader { bytes };
        let magic = r.take(1)?[0];
        if magic != MAGIC {
            return Err(format!("bad magic byte {magic:#04x}"));
        }
        let version = r.take(1)?[0];
        if version != VERSION {
            return Err(format!("unsupported binary format version {version}"));
        }
        let rank = r.take(1)?[0] as usize;
        let tag = r.take(4)?;
        let elem = ElemType::from_tag(tag)
            .ok_or_else(|| format!("unsupported type tag {:?}", String::from_utf8_lossy(tag)))?;

        let mut shape = Vec::with_capacity(rank);
        for _ in 0..rank {
            shape.push(r.u64()?);
        }
        let total = shape
            .iter()
            .try_fold(1u64, |acc, d| acc.checked_mul(*d))
            .ok_or("array dimensions overflow")? as usize;
        let data = r.take(total.checked_mul(elem.size()).ok_or("array size overflow")?)?;

        let elements = match elem {
            ElemType::F32 => Elements::F32(
                data.chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            ElemType::F64 => Elements::F64(
                data.chunks_exact(8)
                    .map(|c| f64::from_le_bytes(eight(c)))
                    .collect(),
            ),
            ElemType::I32 => Elements::I32(
                data.chunks_exact(4)
                    .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            ElemType::I64 => Elements::I64(
                data.chunks_exact(8)
                    .map(|c| i64::from_le_bytes(eight(c)))
                    .collect(),
            ),
            ElemType::Bool => Elements::Bool(data.iter().map(|b| *b != 0).collect()),
        };

        Ok((Self { shape, elements }, r.bytes))
    }
}

fn eight(c: &[u8]) -> [u8; 8] {
    [c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], String> {
        if self.bytes.len() < n {
            return Err(format!(
                "truncated value: wanted {n} bytes, {} left",
                self.bytes.len()
            ));
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    fn u64(&mut self) -> Result<u64, String> {
        Ok(u64::from_le_bytes(eight(self.take(8)?)))
    }
}

fn flatten(
    value: &Value,
    shape: &[u64],
    depth: usize,
    out: &mut Elements,
) -> Result<(), ToolError> {
    if depth == shape.len() {
        return out.push_json(value);
    }
    let arr = value.as_array().ok_or_else(|| {
        ToolError::InvalidInput(format!("expected an array at depth {depth}, got {value}"))
    })?;
    if arr.len() as u64 != shape[depth] {
        return Err(ToolError::InvalidInput(format!(
            "irregular array: expected {} elements at depth {depth}, found {}",
            shape[depth],
            arr.len()
        )));
    }
    for item in arr {
        flatten(item, shape, depth + 1, out)?;
    }
    Ok(())
}

fn nest(elements: &Elements, shape: &[u64], next: &mut usize) -> Value {
    match shape.split_first() {
        None => {
            let v = elements.json_at(*next);
            *next += 1;
            v
        }
        Some((d, rest)) => Value::Array((0..*d).map(|_| nest(elements, rest, next)).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_scalar_f64_layout() {
        let bytes = FutharkValue::f64(4.0).encode();
        assert_eq!(
            bytes,
            vec![b'b', 2, 0, b' ', b'f', b'6', b'4', 0, 0, 0, 0, 0, 0, 0x10, 0x40]
        );
    }

    #[test]
    fn test_matrix_shape_and_type_name() {
        let v = FutharkValue::from_json(&json!([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]), ElemType::F64, 2)
            .unwrap();
        assert_eq!(v.shape, vec![2, 3]);
        assert_eq!(v.type_name(), "[][]f64");

        let bytes = v.encode();
        // header: magic, version, rank, tag, two dims
        assert_eq!(bytes.len(), 7 + 16 + 6 * 8);
        assert_eq!(&bytes[7..15], &2u64.to_le_bytes());
        assert_eq!(&bytes[15..23], &3u64.to_le_bytes());

        let (back, rest) = FutharkValue::decode(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(back.to_json(), json!([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]));
    }

    #[test]
    fn test_decode_consecutive_values() {
        let mut bytes = FutharkValue::i64(7).encode();
        bytes.extend(FutharkValue::f64(0.5).encode());
        let (first, rest) = FutharkValue::decode(&bytes).unwrap();
        let (second, rest) = FutharkValue::decode(rest).unwrap();
        assert!(rest.is_empty());
        assert_eq!(first.to_json(), json!(7));
        assert_eq!(second.to_json(), json!(0.5));
    }

    #[test]
    fn test_ragged_array_rejected() {
        let err = FutharkValue::from_json(&json!([[1.0, 2.0], [3.0]]), ElemType::F64, 2);
        assert!(matches!(err, Err(ToolError::InvalidInput(_))));
    }

    #[test]
    fn test_ragged_array_with_long_first_row_rejected() {
        let rows = 200_000;
        let mut x = vec![json!(vec![1.0; rows])];
        x.extend((1..rows).map(|_| json!([1.0])));
        let err = FutharkValue::from_json(&Value::Array(x), ElemType::F64, 2).unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
        assert!(err.to_string().contains("irregular array"), "{err}");
    }

    #[test]
    fn test_wrong_element_type_rejected() {
        let err = FutharkValue::from_json(&json!([1.5, 2.5]), ElemType::I64, 1);
        assert!(matches!(err, Err(ToolError::InvalidInput(_))));
        let err = FutharkValue::from_json(&json!("3"), ElemType::F64, 0);
        assert!(matches!(err, Err(ToolError::InvalidInput(_))));
    }

    #[test]
    fn test_empty_array() {
        let v = FutharkValue::from_json(&json!([]), ElemType::F64, 2).unwrap();
        assert_eq!(v.shape, vec![0, 0]);
        assert!(v.elements.is_empty());
        assert_eq!(v.to_json(), json!([]));
    }

    #[test]
    fn test_decode_errors() {
        assert!(FutharkValue::decode(b"").is_err());
        assert!(FutharkValue::decode(b"x\x02\x00 f64").is_err());
        assert!(FutharkValue::decode(b"b\x01\x00 f64").is_err());
        assert!(FutharkValue::decode(b"b\x02\x00 u16\x00\x00").is_err());
        // Declares one f64 element but carries only four bytes of it
        assert!(FutharkValue::decode(b"b\x02\x01 f64\x01\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00").is_err());
    }

    #[test]
    fn test_non_finite_becomes_null() {
        assert_eq!(FutharkValue::f64(f64::NAN).to_json(), Value::Null);
    }
}
