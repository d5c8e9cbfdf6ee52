// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::hcl::{Pos, Range};
use crate::range::*;

use anyhow::Result;
use serde_json::json;

fn decode_error(v: serde_json::Value) -> String {
    match json_to_range(&v, "range") {
        Ok(r) => panic!("decoded {r:?}"),
        Err(e) => e.to_string(),
    }
}

#[test]
fn encode() -> Result<()> {
    let rng = Range::new(
        "main.tf",
        Pos {
            line: 3,
            column: 19,
            byte: 52,
        },
        Pos {
            line: 3,
            column: 29,
            byte: 62,
        },
    );
    let doc = range_to_json(&rng);
    assert_eq!(
        doc,
        json!({
            "filename": "main.tf",
            "start": {"line": 3, "column": 19, "byte": 52},
            "end": {"line": 3, "column": 29, "byte": 62},
        })
    );
    assert_eq!(json_to_range(&doc, "range")?, rng);
    Ok(())
}

#[test]
fn integral_floats_are_accepted() -> Result<()> {
    let doc = json!({
        "filename": "main.tf",
        "start": {"line": 1.0, "column": 1, "byte": 0},
        "end": {"line": 1, "column": 1, "byte": 0.0},
    });
    assert_eq!(
        json_to_range(&doc, "range")?,
        Range::new("main.tf", Pos::INITIAL, Pos::INITIAL)
    );
    Ok(())
}

#[test]
fn decode_errors() {
    assert_eq!(decode_error(json!("foo")), "range is not object, got string");
    assert_eq!(
        decode_error(json!({"start": {}, "end": {}})),
        "range.filename is not string, got null"
    );
    assert_eq!(
        decode_error(json!({"filename": "main.tf", "start": "foo", "end": {}})),
        "range.start is not object, got string"
    );
    assert_eq!(
        decode_error(json!({
            "filename": "main.tf",
            "start": {"line": "1", "column": 1, "byte": 0},
            "end": {"line": 1, "column": 1, "byte": 0},
        })),
        "range.start.line is not a number, got string"
    );
    assert_eq!(
        decode_error(json!({
            "filename": "main.tf",
            "start": {"line": 1, "column": 1, "byte": 0},
            "end": {"line": 1, "column": -1, "byte": 0},
        })),
        "range.end.column is not a non-negative integer, got -1"
    );
}
