// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::common::MAIN_TF;
use crate::hcl::*;

use std::collections::BTreeMap;

use anyhow::{bail, Result};

fn pos(line: usize, column: usize, byte: usize) -> Pos {
    Pos { line, column, byte }
}

fn resource_schema(attrs: &[&str]) -> BodySchema {
    BodySchema {
        blocks: vec![BlockSchema {
            kind: "resource".to_string(),
            label_names: vec!["type".to_string(), "name".to_string()],
            body: BodySchema {
                attributes: attrs
                    .iter()
                    .map(|a| AttributeSchema {
                        name: a.to_string(),
                    })
                    .collect(),
                ..BodySchema::default()
            },
        }],
        ..BodySchema::default()
    }
}

fn eval(src: &str) -> Result<Value> {
    evaluate(&parse_expression(src, "test.tf", Pos::INITIAL)?, None)
}

#[test]
fn block_and_attribute_ranges() -> Result<()> {
    let file = parse_file("main.tf", MAIN_TF)?;
    let content = partial_content(file.body.as_body_ref(), &resource_schema(&["instance_type"]))?;

    let [block] = content.blocks.as_slice() else {
        bail!("expected one block, got {}", content.blocks.len());
    };
    assert_eq!(block.labels, vec!["aws_instance", "main"]);
    assert_eq!(
        block.def_range,
        Range::new("main.tf", pos(2, 1, 1), pos(2, 31, 31))
    );
    assert_eq!(
        block.type_range,
        Range::new("main.tf", pos(2, 1, 1), pos(2, 9, 9))
    );

    let attr = &block.body.attributes["instance_type"];
    assert_eq!(attr.expr.text(), "\"t1.micro\"");
    assert_eq!(
        attr.expr.range(),
        Range::new("main.tf", pos(3, 19, 52), pos(3, 29, 62))
    );
    assert_eq!(evaluate(&attr.expr, None)?, Value::from("t1.micro"));
    Ok(())
}

#[test]
fn unknown_blocks_are_ignored() -> Result<()> {
    let file = parse_file(
        "main.tf",
        r#"
provider "aws" {
  region = "us-east-1"
}

resource "aws_instance" "main" {
  ami = "ami-123"

  ebs_block_device {
    volume_size = 10
  }
}
"#,
    )?;
    let content = partial_content(file.body.as_body_ref(), &resource_schema(&["instance_type"]))?;

    assert_eq!(content.blocks.len(), 1);
    assert!(content.blocks[0].body.attributes.is_empty());
    assert!(content.blocks[0].body.blocks.is_empty());
    Ok(())
}

#[test]
fn missing_label() -> Result<()> {
    let file = parse_file("main.tf", "resource \"aws_instance\" {\n}\n")?;
    match partial_content(file.body.as_body_ref(), &resource_schema(&[])) {
        Ok(_) => bail!("partial_content succeeded with a missing label"),
        Err(e) => assert!(
            e.to_string().contains("Missing name for resource"),
            "unexpected error: {e}"
        ),
    }
    Ok(())
}

#[test]
fn json_syntax() -> Result<()> {
    let file = parse_file(
        "main.tf.json",
        r#"{"resource": {"aws_instance": {"main": {"instance_type": "t1.micro"}}}}"#,
    )?;
    let content = partial_content(file.body.as_body_ref(), &resource_schema(&["instance_type"]))?;

    let [block] = content.blocks.as_slice() else {
        bail!("expected one block, got {}", content.blocks.len());
    };
    assert_eq!(block.labels, vec!["aws_instance", "main"]);
    let attr = &block.body.attributes["instance_type"];
    assert_eq!(evaluate(&attr.expr, None)?, Value::from("t1.micro"));
    assert_eq!(attr.expr.range().start, pos(1, 58, 57));
    Ok(())
}

#[test]
fn json_root_must_be_object() {
    assert!(parse_file("main.tf.json", "[]").is_err());
}

#[test]
fn lexer_errors() {
    match parse_expression("1e+", "main.tf", Pos::INITIAL) {
        Ok(e) => panic!("parsed as {e:?}"),
        Err(e) => assert!(e.to_string().contains("exponent requires digits"), "{e}"),
    }
    match parse_file("main.tf", "a = 1\r b = 2\n") {
        Ok(_) => panic!("lone carriage return was accepted"),
        Err(e) => assert!(e.to_string().contains("\\r must be followed by \\n"), "{e}"),
    }
}

#[test]
fn expression_at_position() -> Result<()> {
    let expr = parse_expression("var.foo", "main.tf", pos(3, 19, 52))?;
    assert_eq!(
        expr.range(),
        Range::new("main.tf", pos(3, 19, 52), pos(3, 26, 59))
    );
    Ok(())
}

#[test]
fn constant_expressions() -> Result<()> {
    assert_eq!(eval("1 + 2 * 3")?, Value::from(7i64));
    assert_eq!(eval("true ? \"a\" : \"b\"")?, Value::from("a"));
    assert_eq!(eval("!false && 2 >= 1")?, Value::Bool(true));
    assert_eq!(
        eval("[for s in [\"a\", \"b\"] : \"${s}-x\"]")?,
        Value::Tuple(vec![Value::from("a-x"), Value::from("b-x")])
    );
    assert_eq!(
        eval("{ name = \"foo\" }")?,
        Value::Object(BTreeMap::from([("name".to_string(), Value::from("foo"))]))
    );
    Ok(())
}

#[test]
fn function_calls_are_not_allowed() {
    match eval("upper(\"a\")") {
        Ok(v) => panic!("function call evaluated to {v:?}"),
        Err(e) => assert!(e.to_string().contains("Function calls not allowed"), "{e}"),
    }
}

#[test]
fn variables_carry_marks() -> Result<()> {
    let ctx = EvalContext {
        variables: BTreeMap::from([(
            "var".to_string(),
            Value::Object(BTreeMap::from([(
                "foo".to_string(),
                Value::from("secret").mark(Marks::SENSITIVE),
            )])),
        )]),
    };

    let value = evaluate(&parse_expression("[var.foo]", "", Pos::INITIAL)?, Some(&ctx))?;
    assert_eq!(value.deep_marks(), Marks::SENSITIVE);
    assert!(value.is_wholly_known());

    let value = evaluate(&parse_expression("\"${var.foo}-x\"", "", Pos::INITIAL)?, Some(&ctx))?;
    assert_eq!(value.unmark(), (Value::from("secret-x"), Marks::SENSITIVE));
    Ok(())
}

#[test]
fn type_constraints() -> Result<()> {
    let ty = |src: &str| -> Result<Type> {
        type_constraint(&parse_expression(src, "", Pos::INITIAL)?)
    };

    assert_eq!(ty("list(string)")?, Type::List(Box::new(Type::String)));
    assert_eq!(ty("map(any)")?, Type::Map(Box::new(Type::Dynamic)));
    match ty("object({ a = string, b = optional(number) })")? {
        Type::Object { attrs, optional } => {
            assert_eq!(attrs.len(), 2);
            assert!(optional.contains("b"));
            assert!(!optional.contains("a"));
        }
        t => bail!("expected an object type, got {t:?}"),
    }

    match ty("object({ c = optional(number, 5) })") {
        Ok(t) => bail!("unexpected type {t:?}"),
        Err(e) => assert_eq!(
            e.to_string(),
            "Invalid type specification; Optional attribute modifier expects only one argument: the attribute type."
        ),
    }

    match ty("unknown") {
        Ok(t) => bail!("unexpected type {t:?}"),
        Err(e) => assert_eq!(
            e.to_string(),
            "Invalid type specification; The keyword \"unknown\" is not a valid type specification."
        ),
    }
    Ok(())
}

#[test]
fn conversion() -> Result<()> {
    let tuple = Value::Tuple(vec![Value::from("a"), Value::from(1i64)]);
    assert_eq!(
        tuple.convert(&Type::List(Box::new(Type::String)))?,
        Value::List(vec![Value::from("a"), Value::from("1")])
    );
    assert_eq!(Value::from("1").convert(&Type::Number)?, Value::from(1i64));
    assert!(Value::from("a").convert(&Type::Number).is_err());

    let marked = Value::from("1").mark(Marks::EPHEMERAL);
    assert_eq!(
        marked.convert(&Type::Number)?.unmark(),
        (Value::from(1i64), Marks::EPHEMERAL)
    );
    Ok(())
}

#[test]
fn template_directives() -> Result<()> {
    assert_eq!(eval("\"%{if true}yes%{else}no%{endif}\"")?, Value::from("yes"));
    assert_eq!(eval("\"%{if 1 > 2}yes%{endif}!\"")?, Value::from("!"));
    assert_eq!(
        eval("\"%{for x in [1, 2]}${x},%{endfor}\"")?,
        Value::from("1,2,")
    );
    assert_eq!(
        eval("\"%{for k, v in { a = 1, b = 2 }}${k}=${v};%{endfor}\"")?,
        Value::from("a=1;b=2;")
    );
    assert_eq!(
        eval("\"a %{~ if true ~} b %{~ endif ~} c\"")?,
        Value::from("abc")
    );
    assert_eq!(eval("\"x ${~ \"y\" ~} z\"")?, Value::from("xyz"));
    assert_eq!(eval("\"%%{if}\"")?, Value::from("%{if}"));
    Ok(())
}

#[test]
fn template_directives_in_heredocs() -> Result<()> {
    let src = "<<-EOT\n  %{ for s in [\"a\", \"b\"] ~}\n  - ${s}\n  %{ endfor ~}\nEOT\n";
    assert_eq!(eval(src)?, Value::from("- a\n- b\n"));
    Ok(())
}

#[test]
fn template_directives_with_variables() -> Result<()> {
    let ctx = EvalContext {
        variables: BTreeMap::from([(
            "var".to_string(),
            Value::Object(BTreeMap::from([
                ("on".to_string(), Value::Unknown),
                ("names".to_string(), Value::Tuple(vec![Value::from("a")]).mark(Marks::SENSITIVE)),
            ])),
        )]),
    };
    let eval = |src: &str| evaluate(&parse_expression(src, "", Pos::INITIAL)?, Some(&ctx));

    assert_eq!(eval("\"%{if var.on}x%{endif}\"")?, Value::Unknown);
    assert_eq!(
        eval("\"%{for n in var.names}${n}%{endfor}\"")?.unmark(),
        (Value::from("a"), Marks::SENSITIVE)
    );
    Ok(())
}

#[test]
fn unbalanced_directives() {
    for (src, want) in [
        ("\"%{if true}yes\"", "unterminated `if` directive"),
        ("\"%{for x in []}\"", "unterminated `for` directive"),
        ("\"%{endif}\"", "unexpected `endif` directive"),
        ("\"%{if true}%{endfor}\"", "unexpected `endfor` directive in `if`"),
        ("\"%{while true}\"", "invalid template directive `while`"),
    ] {
        match parse_expression(src, "", Pos::INITIAL) {
            Ok(e) => panic!("{src} parsed as {e:?}"),
            Err(e) => assert!(e.to_string().contains(want), "{src}: {e}"),
        }
    }
}

#[test]
fn directives_do_not_block_other_attributes() -> Result<()> {
    let file = parse_file(
        "main.tf",
        r#"
resource "aws_instance" "main" {
  instance_type = "t2.micro"
  user_data     = <<-EOT
    %{ if true ~}
    echo hello
    %{ endif ~}
  EOT
}
"#,
    )?;
    let content = partial_content(
        file.body.as_body_ref(),
        &resource_schema(&["instance_type", "user_data"]),
    )?;
    let attrs = &content.blocks[0].body.attributes;
    assert_eq!(evaluate(&attrs["instance_type"].expr, None)?, Value::from("t2.micro"));
    assert_eq!(evaluate(&attrs["user_data"].expr, None)?, Value::from("echo hello\n"));
    Ok(())
}

#[test]
fn exact_integers() -> Result<()> {
    assert_eq!(
        eval("12345678901234567890")?.to_json()?,
        serde_json::json!(12345678901234567890u64)
    );
    assert_eq!(
        Value::from("12345678901234567890")
            .convert(&Type::Number)?
            .to_json()?,
        serde_json::json!(12345678901234567890u64)
    );
    assert_eq!(
        eval("9007199254740993 + 1")?.to_json()?,
        serde_json::json!(9007199254740994i64)
    );
    assert_eq!(eval("6 / 3")?.to_json()?, serde_json::json!(2));
    assert_eq!(eval("6 / 4")?.to_json()?, serde_json::json!(1.5));
    assert_eq!(eval("-7 % 3")?.to_json()?, serde_json::json!(-1));
    assert_eq!(
        Value::from(2.5).convert(&Type::String)?,
        Value::from("2.5")
    );
    Ok(())
}
