// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! `hcl.*` builtins working on raw expressions, i.e. documents of
//! attributes declared with the `expr` type.

use super::types::{self, array_of};
use super::{Decl, Function};
use crate::conversion::raw_expr_to_json;
use crate::hcl::content;
use crate::hcl::{parse_expression, Expr};
use crate::range::{json_to_object, json_to_range, range_to_json};

use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde_json::{json, Value};

fn decl(name: &str, result: types::PolicyType) -> Decl {
    Decl {
        name: name.to_string(),
        args: vec![types::RAW_EXPR.clone()],
        result,
        memoize: true,
        nondeterministic: false,
    }
}

/// Parses `{value, range}` back into an expression located where it was
/// declared.
fn parse_raw_expr(v: &Value) -> Result<Expr> {
    let obj = json_to_object(v, "expr")?;
    let value = obj
        .get("value")
        .ok_or_else(|| anyhow!("expr must have a 'value' key"))?
        .as_str()
        .ok_or_else(|| anyhow!("expr value must be a string"))?;
    let range = json_to_range(
        obj.get("range")
            .ok_or_else(|| anyhow!("expr must have a 'range' key"))?,
        "expr.range",
    )?;
    parse_expression(value, &range.filename, range.start)
}

/// `hcl.expr_list(expr)`: elements of a static list expression as
/// `array[raw_expr]`.
pub fn expr_list() -> Function {
    Function::Function1(
        decl("hcl.expr_list", array_of(&types::RAW_EXPR)),
        Arc::new(|arg: &Value| {
            let expr = parse_raw_expr(arg)?;
            let items = content::expr_list(&expr)?;
            Ok(Value::Array(items.iter().map(|e| raw_expr_to_json(e)).collect()))
        }),
    )
}

/// `hcl.expr_map(expr)`: pairs of a static map expression as
/// `array[{key, value}]`.
pub fn expr_map() -> Function {
    Function::Function1(
        decl("hcl.expr_map", array_of(&types::KEY_VALUE)),
        Arc::new(|arg: &Value| {
            let expr = parse_raw_expr(arg)?;
            let pairs = content::expr_map(&expr)?;
            Ok(Value::Array(
                pairs
                    .iter()
                    .map(|(k, v)| {
                        json!({
                            "key": raw_expr_to_json(k),
                            "value": raw_expr_to_json(v),
                        })
                    })
                    .collect(),
            ))
        }),
    )
}

/// `hcl.expr_call(expr)`: name and arguments of a static function call.
pub fn expr_call() -> Function {
    Function::Function1(
        decl("hcl.expr_call", types::CALL.clone()),
        Arc::new(|arg: &Value| {
            let expr = parse_raw_expr(arg)?;
            let call = content::expr_call(&expr)?;
            let arguments: Vec<Value> =
                call.arguments.iter().map(|e| raw_expr_to_json(e)).collect();
            Ok(json!({
                "name": call.name,
                "name_range": range_to_json(&call.name_range),
                "arguments": arguments,
                "args_range": range_to_json(&call.args_range),
            }))
        }),
    )
}
