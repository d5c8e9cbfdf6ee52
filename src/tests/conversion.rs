// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::common::*;
use crate::conversion::*;
use crate::hcl::{parse_expression, Expr, Marks, Pos, Type};
use crate::range::range_to_json;
use crate::runner::{ExpandMode, Runner};
use crate::schema::{json_to_schema, TypeMap};
use crate::tester::TestRunner;

use anyhow::Result;
use serde_json::{json, Value};

const VARIABLES_TF: &str = r#"
variable "secret" {
  default   = "x"
  sensitive = true
}

variable "ephemeral" {
  default   = "y"
  ephemeral = true
}

variable "unset" {
}
"#;

fn expr(src: &str) -> Result<Expr> {
    parse_expression(src, "main.tf", Pos::INITIAL)
}

fn convert(src: &str, ty: Type, runner: &dyn Runner) -> Result<Value> {
    let ty_map = TypeMap::from([("schema.attr".to_string(), ty)]);
    expr_to_json(&expr(src)?, &ty_map, "schema.attr", runner)
}

fn doc(unknown: bool, sensitive: bool, ephemeral: bool, src: &str) -> Result<Value> {
    Ok(json!({
        "unknown": unknown,
        "sensitive": sensitive,
        "ephemeral": ephemeral,
        "range": range_to_json(&expr(src)?.range()),
    }))
}

fn with_value(mut doc: Value, value: Value) -> Value {
    doc["value"] = value;
    doc
}

#[test]
fn known_values() -> Result<()> {
    let runner = TestRunner::default();

    assert_eq!(
        convert("\"t1.micro\"", Type::String, &runner)?,
        with_value(doc(false, false, false, "\"t1.micro\"")?, json!("t1.micro"))
    );
    assert_eq!(
        convert("1", Type::String, &runner)?,
        with_value(doc(false, false, false, "1")?, json!("1"))
    );
    assert_eq!(
        convert("{ a = 1, b = [true] }", Type::Dynamic, &runner)?,
        with_value(
            doc(false, false, false, "{ a = 1, b = [true] }")?,
            json!({"a": 1, "b": [true]})
        )
    );
    assert_eq!(
        convert("null", Type::Number, &runner)?,
        with_value(doc(false, false, false, "null")?, Value::Null)
    );
    Ok(())
}

#[test]
fn refused_values_are_sensitive() -> Result<()> {
    assert_eq!(
        convert("var.foo", Type::String, &FixedRunner::Refuse)?,
        doc(true, true, false, "var.foo")?
    );
    Ok(())
}

#[test]
fn marks_take_precedence_over_type() -> Result<()> {
    let runner = FixedRunner::marked(Marks {
        sensitive: true,
        ephemeral: true,
    });
    // The value would not convert to a number.
    let got = convert("var.foo", Type::Number, &runner)?;
    assert_eq!(got, doc(true, true, true, "var.foo")?);
    assert!(got.get("value").is_none());
    Ok(())
}

#[test]
fn variables() -> Result<()> {
    let runner = TestRunner::new(&files(&[("variables.tf", VARIABLES_TF)]))?;

    assert_eq!(
        convert("var.secret", Type::String, &runner)?,
        doc(true, true, false, "var.secret")?
    );
    assert_eq!(
        convert("[var.secret]", Type::List(Box::new(Type::String)), &runner)?,
        doc(true, true, false, "[var.secret]")?
    );
    assert_eq!(
        convert("var.ephemeral", Type::String, &runner)?,
        doc(true, false, true, "var.ephemeral")?
    );
    assert_eq!(
        convert("var.unset", Type::String, &runner)?,
        doc(true, false, false, "var.unset")?
    );
    assert_eq!(
        convert("[var.unset, \"a\"]", Type::Dynamic, &runner)?,
        doc(true, false, false, "[var.unset, \"a\"]")?
    );
    Ok(())
}

#[test]
fn type_error() -> Result<()> {
    match convert("\"foo\"", Type::Number, &TestRunner::default()) {
        Ok(v) => panic!("converted to {v}"),
        Err(e) => assert_eq!(
            e.to_string(),
            "type error in main.tf:1,1-6; a number is required"
        ),
    }
    Ok(())
}

#[test]
fn raw_expressions() -> Result<()> {
    let runner = TestRunner::new(&files(&[("variables.tf", VARIABLES_TF)]))?;
    // Not evaluated, so sensitivity does not matter.
    assert_eq!(
        convert("var.secret", Type::Expr, &runner)?,
        json!({
            "value": "var.secret",
            "range": range_to_json(&expr("var.secret")?.range()),
        })
    );
    Ok(())
}

#[test]
#[should_panic(expected = "cannot get type of schema.attr")]
fn undeclared_path() {
    let _ = expr_to_json(
        &Expr::Static {
            range: Default::default(),
            value: crate::hcl::Value::Null,
        },
        &TypeMap::new(),
        "schema.attr",
        &TestRunner::default(),
    );
}

#[test]
fn nested_blocks() -> Result<()> {
    let runner = TestRunner::new(&files(&[(
        "main.tf",
        r#"
resource "aws_instance" "main" {
  ebs_block_device {
    volume_size = 10
  }

  ebs_block_device {
    volume_size = 20
  }
}
"#,
    )]))?;

    let schema = json!({"ebs_block_device": {"volume_size": "number"}});
    let (schema, ty_map) = json_to_schema(schema.as_object().unwrap(), "schema")?;
    let content = runner.get_module_content(
        &crate::hcl::BodySchema {
            blocks: vec![crate::hcl::BlockSchema {
                kind: "resource".to_string(),
                label_names: vec!["type".to_string(), "name".to_string()],
                body: schema,
            }],
            ..Default::default()
        },
        None,
    )?;

    let docs = typed_blocks_to_json(&content.blocks, &ty_map, "schema", &runner)?;
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["type"], json!("aws_instance"));
    assert_eq!(docs[0]["name"], json!("main"));

    let devices = docs[0]["config"]["ebs_block_device"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0]["labels"], Value::Null);
    assert_eq!(devices[0]["config"]["volume_size"]["value"], json!(10));
    assert_eq!(devices[1]["config"]["volume_size"]["value"], json!(20));
    assert_eq!(devices[1]["decl_range"]["start"]["line"], json!(7));
    Ok(())
}

#[test]
fn options() -> Result<()> {
    assert_eq!(json_to_option(&json!({}), "options")?.expand_mode, None);
    assert_eq!(
        json_to_option(&json!({"expand_mode": "none"}), "options")?.expand_mode,
        Some(ExpandMode::None)
    );
    assert_eq!(
        json_to_option(&json!({"expand_mode": "expand"}), "options")?.expand_mode,
        Some(ExpandMode::Expand)
    );

    let err = |v: Value| match json_to_option(&v, "options") {
        Ok(o) => panic!("decoded {o:?}"),
        Err(e) => e.to_string(),
    };
    assert_eq!(err(json!({"expand_mode": "all"})), "unknown expand mode: all");
    assert_eq!(err(json!({"mode": "none"})), "unknown option: mode");
    assert_eq!(
        err(json!({"expand_mode": 1})),
        "options.expand_mode is not string, got number"
    );
    Ok(())
}

#[test]
fn issues() -> Result<()> {
    let range = range_to_json(&expr("\"t1.micro\"")?.range());
    let issue = json_to_issue(&json!({"msg": "bad", "range": range}), "issue")?;
    assert_eq!(issue.message, "bad");
    assert_eq!(issue.range, expr("\"t1.micro\"")?.range());

    match json_to_issue(&json!({"range": range}), "issue") {
        Ok(i) => panic!("decoded {i:?}"),
        Err(e) => assert_eq!(e.to_string(), "issue.msg is not string, got null"),
    }
    Ok(())
}
