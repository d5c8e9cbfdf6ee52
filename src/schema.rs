// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::hcl::{
    parse_expression, type_constraint, AttributeSchema, BlockSchema, BodySchema, Pos, Type,
};
use crate::range::kind_of;

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use serde_json::{Map, Value};

/// Dotted schema path (e.g. `schema.ebs_block_device.volume_size`) to the
/// type constraint declared for it.
pub type TypeMap = BTreeMap<String, Type>;

/// Key of a block schema that lists the block's label names.
pub const LABELS_KEY: &str = "__labels";

/// Pseudo type selecting the raw expression rather than its value.
pub const EXPR_TYPE: &str = "expr";

/// Compiles a policy-side schema into a content schema and the types of its
/// attributes.
///
/// A string value declares an attribute with that type constraint; an
/// object value declares a nested block.
pub fn json_to_schema(input: &Map<String, Value>, path: &str) -> Result<(BodySchema, TypeMap)> {
    let mut ty_map = TypeMap::new();
    let schema = compile(input, path, &mut ty_map)?;
    Ok((schema, ty_map))
}

fn compile(input: &Map<String, Value>, path: &str, ty_map: &mut TypeMap) -> Result<BodySchema> {
    let mut schema = BodySchema::default();

    for (name, value) in input {
        let key = format!("{path}.{name}");

        match value {
            Value::String(spec) => {
                ty_map.insert(key.clone(), parse_type(spec, &key)?);
                schema.attributes.push(AttributeSchema { name: name.clone() });
            }
            Value::Object(inner) => {
                let mut inner = inner.clone();
                let label_names = match inner.remove(LABELS_KEY) {
                    Some(labels) => labels_of(&labels, &key)?,
                    None => vec![],
                };
                schema.blocks.push(BlockSchema {
                    kind: name.clone(),
                    label_names,
                    body: compile(&inner, &key, ty_map)?,
                });
            }
            _ => bail!("{key} is not string or object, got {}", kind_of(value)),
        }
    }

    Ok(schema)
}

fn parse_type(spec: &str, key: &str) -> Result<Type> {
    if spec == EXPR_TYPE {
        return Ok(Type::Expr);
    }
    let expr = match parse_expression(spec, "", Pos::INITIAL) {
        Ok(expr) => expr,
        Err(e) => bail!("type constraint parse error in {key}; {e}"),
    };
    match type_constraint(&expr) {
        Ok(ty) => Ok(ty),
        Err(e) => bail!("type constraint parse error in {key}; {e}"),
    }
}

fn labels_of(labels: &Value, key: &str) -> Result<Vec<String>> {
    let err = || anyhow::anyhow!("{key}.{LABELS_KEY} is not array of string, got {}", kind_of(labels));
    let Value::Array(items) = labels else {
        return Err(err());
    };
    items
        .iter()
        .map(|v| v.as_str().map(str::to_string).ok_or_else(err))
        .collect()
}
