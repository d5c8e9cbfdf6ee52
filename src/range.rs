// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Conversion between source ranges and their policy-side JSON form.
//!
//! Decoding errors name the offending path because they are shown to
//! policy authors, e.g. `range.start.line is not a number, got string`.

use crate::hcl::{Pos, Range};

use anyhow::{anyhow, bail, Result};
use serde_json::{json, Map, Value};

/// Name of the JSON kind of a value, as used in decoding errors.
pub fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn range_to_json(rng: &Range) -> Value {
    json!({
        "filename": rng.filename,
        "start": pos_to_json(&rng.start),
        "end": pos_to_json(&rng.end),
    })
}

fn pos_to_json(pos: &Pos) -> Value {
    json!({
        "line": pos.line,
        "column": pos.column,
        "byte": pos.byte,
    })
}

fn field<'a>(obj: &'a Map<String, Value>, name: &str) -> &'a Value {
    obj.get(name).unwrap_or(&Value::Null)
}

pub fn json_to_range(v: &Value, path: &str) -> Result<Range> {
    let rng = json_to_object(v, path)?;
    let filename = json_to_string(field(rng, "filename"), &format!("{path}.filename"))?;
    let start = json_to_pos(field(rng, "start"), &format!("{path}.start"))?;
    let end = json_to_pos(field(rng, "end"), &format!("{path}.end"))?;
    Ok(Range {
        filename,
        start,
        end,
    })
}

fn json_to_pos(v: &Value, path: &str) -> Result<Pos> {
    let pos = json_to_object(v, path)?;
    Ok(Pos {
        line: json_to_int(field(pos, "line"), &format!("{path}.line"))?,
        column: json_to_int(field(pos, "column"), &format!("{path}.column"))?,
        byte: json_to_int(field(pos, "byte"), &format!("{path}.byte"))?,
    })
}

pub fn json_to_object<'a>(v: &'a Value, path: &str) -> Result<&'a Map<String, Value>> {
    v.as_object()
        .ok_or_else(|| anyhow!("{path} is not object, got {}", kind_of(v)))
}

pub fn json_to_string(v: &Value, path: &str) -> Result<String> {
    match v {
        Value::String(s) => Ok(s.clone()),
        _ => bail!("{path} is not string, got {}", kind_of(v)),
    }
}

pub fn json_to_int(v: &Value, path: &str) -> Result<usize> {
    let Value::Number(n) = v else {
        bail!("{path} is not a number, got {}", kind_of(v));
    };
    match n.as_u64() {
        Some(i) => Ok(i as usize),
        None => match n.as_f64() {
            Some(f) if f >= 0.0 && f.fract() == 0.0 => Ok(f as usize),
            _ => bail!("{path} is not a non-negative integer, got {n}"),
        },
    }
}
