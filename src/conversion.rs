// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Documents handed to policies, and the decoding of what policies return.

use crate::engine::Issue;
use crate::hcl::{Attribute, BodyContent, ContentBlock, Expr, Type};
use crate::range::{json_to_object, json_to_range, json_to_string, range_to_json};
use crate::runner::{ExpandMode, GetModuleContentOption, Runner, RunnerError};
use crate::schema::TypeMap;

use anyhow::{anyhow, bail, Result};
use serde_json::{json, Map, Value};

/// Document of an expression:
/// `{value?, unknown, sensitive, ephemeral, range}`.
///
/// `value` is set only for wholly known values without confidentiality
/// marks. The `expr` pseudo type yields `{value: <source text>, range}`.
pub fn expr_to_json(expr: &Expr, ty_map: &TypeMap, path: &str, runner: &dyn Runner) -> Result<Value> {
    let Some(ty) = ty_map.get(path) else {
        panic!("cannot get type of {path}");
    };

    if *ty == Type::Expr {
        return Ok(raw_expr_to_json(expr));
    }

    let mut ret = Map::new();
    ret.insert("unknown".to_string(), Value::Bool(false));
    ret.insert("sensitive".to_string(), Value::Bool(false));
    ret.insert("ephemeral".to_string(), Value::Bool(false));
    ret.insert("range".to_string(), range_to_json(&expr.range()));

    let value = match runner.evaluate_expr(expr, None) {
        Ok(value) => value,
        Err(e) if matches!(e.downcast_ref::<RunnerError>(), Some(RunnerError::Sensitive)) => {
            ret.insert("unknown".to_string(), Value::Bool(true));
            ret.insert("sensitive".to_string(), Value::Bool(true));
            return Ok(Value::Object(ret));
        }
        Err(e) => return Err(e),
    };

    let marks = value.deep_marks();
    if !marks.is_empty() {
        ret.insert("unknown".to_string(), Value::Bool(true));
        ret.insert("sensitive".to_string(), Value::Bool(marks.sensitive));
        ret.insert("ephemeral".to_string(), Value::Bool(marks.ephemeral));
        return Ok(Value::Object(ret));
    }

    if !value.is_wholly_known() {
        ret.insert("unknown".to_string(), Value::Bool(true));
        return Ok(Value::Object(ret));
    }

    // `any` takes the type inferred from the value.
    let ty = if ty.has_dynamic_types() {
        value.ty()
    } else {
        ty.clone()
    };
    let value = value
        .convert(&ty)
        .map_err(|e| anyhow!("type error in {}; {e}", expr.range()))?;
    ret.insert("value".to_string(), value.to_json()?);

    Ok(Value::Object(ret))
}

/// `{value: <source text>, range}`
pub fn raw_expr_to_json(expr: &Expr) -> Value {
    json!({
        "value": expr.text(),
        "range": range_to_json(&expr.range()),
    })
}

/// Attributes become expression documents, blocks become arrays of nested
/// block documents in declaration order.
pub fn body_to_json(
    body: &BodyContent,
    ty_map: &TypeMap,
    path: &str,
    runner: &dyn Runner,
) -> Result<Map<String, Value>> {
    let mut ret = Map::new();

    for (name, attr) in &body.attributes {
        let value = expr_to_json(&attr.expr, ty_map, &format!("{path}.{name}"), runner)?;
        ret.insert(name.clone(), value);
    }

    for block in &body.blocks {
        let doc = nested_block_to_json(block, ty_map, &format!("{path}.{}", block.kind), runner)?;
        match ret
            .entry(block.kind.clone())
            .or_insert_with(|| Value::Array(vec![]))
        {
            Value::Array(docs) => docs.push(doc),
            v => bail!("{path}.{} is declared as both an attribute and a block, got {v}", block.kind),
        }
    }

    Ok(ret)
}

/// `{config, labels, decl_range}`. `labels` is null for unlabeled blocks.
pub fn nested_block_to_json(
    block: &ContentBlock,
    ty_map: &TypeMap,
    path: &str,
    runner: &dyn Runner,
) -> Result<Value> {
    let config = body_to_json(&block.body, ty_map, path, runner)?;
    let labels = if block.labels.is_empty() {
        Value::Null
    } else {
        json!(block.labels)
    };

    Ok(json!({
        "config": config,
        "labels": labels,
        "decl_range": range_to_json(&block.def_range),
    }))
}

fn label(block: &ContentBlock, idx: usize) -> Result<&str> {
    match block.labels.get(idx) {
        Some(l) => Ok(l),
        None => bail!("{}: {} block has no label at {idx}", block.def_range, block.kind),
    }
}

/// `{type, name, config, decl_range}` for blocks labeled with type and name.
pub fn typed_blocks_to_json(
    blocks: &[ContentBlock],
    ty_map: &TypeMap,
    path: &str,
    runner: &dyn Runner,
) -> Result<Vec<Value>> {
    blocks
        .iter()
        .map(|block| {
            Ok(json!({
                "type": label(block, 0)?,
                "name": label(block, 1)?,
                "config": body_to_json(&block.body, ty_map, path, runner)?,
                "decl_range": range_to_json(&block.def_range),
            }))
        })
        .collect()
}

/// `{name, config, decl_range}` for blocks labeled with a name.
pub fn named_blocks_to_json(
    blocks: &[ContentBlock],
    ty_map: &TypeMap,
    path: &str,
    runner: &dyn Runner,
) -> Result<Vec<Value>> {
    blocks
        .iter()
        .map(|block| {
            Ok(json!({
                "name": label(block, 0)?,
                "config": body_to_json(&block.body, ty_map, path, runner)?,
                "decl_range": range_to_json(&block.def_range),
            }))
        })
        .collect()
}

/// `{config, decl_range}` for unlabeled blocks.
pub fn blocks_to_json(
    blocks: &[ContentBlock],
    ty_map: &TypeMap,
    path: &str,
    runner: &dyn Runner,
) -> Result<Vec<Value>> {
    blocks
        .iter()
        .map(|block| {
            Ok(json!({
                "config": body_to_json(&block.body, ty_map, path, runner)?,
                "decl_range": range_to_json(&block.def_range),
            }))
        })
        .collect()
}

/// `{name, expr, decl_range}` per local value.
pub fn locals_to_json<'a>(
    locals: impl IntoIterator<Item = &'a Attribute>,
    runner: &dyn Runner,
) -> Result<Vec<Value>> {
    let mut ret = vec![];
    for attr in locals {
        let ty_map = TypeMap::from([(attr.name.clone(), Type::Dynamic)]);
        let expr = expr_to_json(&attr.expr, &ty_map, &attr.name, runner)?;
        ret.push(json!({
            "name": attr.name,
            "expr": expr,
            "decl_range": range_to_json(&attr.range()),
        }));
    }
    Ok(ret)
}

/// Decodes `{expand_mode?: "none" | "expand"}`. An absent `expand_mode`
/// leaves the choice to the host.
pub fn json_to_option(v: &Value, path: &str) -> Result<GetModuleContentOption> {
    let mut out = GetModuleContentOption::default();

    for (k, v) in json_to_object(v, path)? {
        match k.as_str() {
            "expand_mode" => {
                let mode = json_to_string(v, &format!("{path}.{k}"))?;
                out.expand_mode = Some(match mode.as_str() {
                    "none" => ExpandMode::None,
                    "expand" => ExpandMode::Expand,
                    _ => bail!("unknown expand mode: {mode}"),
                });
            }
            _ => bail!("unknown option: {k}"),
        }
    }

    Ok(out)
}

/// Decodes `{msg, range}`.
pub fn json_to_issue(v: &Value, path: &str) -> Result<Issue> {
    let obj = json_to_object(v, path)?;
    let msg = json_to_string(obj.get("msg").unwrap_or(&Value::Null), &format!("{path}.msg"))?;
    let range = json_to_range(
        obj.get("range").unwrap_or(&Value::Null),
        &format!("{path}.range"),
    )?;

    Ok(Issue {
        message: msg,
        range,
    })
}
