// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::hcl::*;
use crate::schema::*;

use anyhow::Result;
use serde_json::{json, Value};

fn compile(v: Value) -> Result<(BodySchema, TypeMap)> {
    let Value::Object(obj) = v else {
        panic!("schema must be an object");
    };
    json_to_schema(&obj, "schema")
}

fn compile_error(v: Value) -> String {
    match compile(v) {
        Ok((schema, _)) => panic!("compiled {schema:?}"),
        Err(e) => e.to_string(),
    }
}

#[test]
fn attribute() -> Result<()> {
    let (schema, ty_map) = compile(json!({"instance_type": "string"}))?;
    assert_eq!(
        schema.attributes,
        vec![AttributeSchema {
            name: "instance_type".to_string()
        }]
    );
    assert!(schema.blocks.is_empty());
    assert_eq!(ty_map.len(), 1);
    assert_eq!(ty_map["schema.instance_type"], Type::String);
    Ok(())
}

#[test]
fn nested_block() -> Result<()> {
    let (schema, ty_map) = compile(json!({
        "ebs_block_device": {
            "volume_size": "number",
            "tags": "map(string)",
        },
        "user_data": "expr",
    }))?;

    assert_eq!(schema.attributes.len(), 1);
    let [block] = schema.blocks.as_slice() else {
        panic!("expected one block, got {:?}", schema.blocks);
    };
    assert_eq!(block.kind, "ebs_block_device");
    assert!(block.label_names.is_empty());
    assert_eq!(block.body.attributes.len(), 2);

    assert_eq!(ty_map["schema.user_data"], Type::Expr);
    assert_eq!(ty_map["schema.ebs_block_device.volume_size"], Type::Number);
    assert_eq!(
        ty_map["schema.ebs_block_device.tags"],
        Type::Map(Box::new(Type::String))
    );
    Ok(())
}

#[test]
fn labels() -> Result<()> {
    let (schema, ty_map) = compile(json!({"dynamic": {"__labels": ["type"]}}))?;

    assert_eq!(
        schema.blocks,
        vec![BlockSchema {
            kind: "dynamic".to_string(),
            label_names: vec!["type".to_string()],
            body: BodySchema::default(),
        }]
    );
    assert!(ty_map.is_empty());
    Ok(())
}

#[test]
fn compile_errors() {
    assert_eq!(
        compile_error(json!({"nested": {"number": 1}})),
        "schema.nested.number is not string or object, got number"
    );
    assert_eq!(
        compile_error(json!({"nested": {"number": "unknown"}})),
        "type constraint parse error in schema.nested.number; Invalid type specification; The keyword \"unknown\" is not a valid type specification."
    );
    assert_eq!(
        compile_error(json!({"dynamic": {"__labels": "type"}})),
        "schema.dynamic.__labels is not array of string, got string"
    );
    assert_eq!(
        compile_error(json!({"dynamic": {"__labels": [1]}})),
        "schema.dynamic.__labels is not array of string, got array"
    );
}
