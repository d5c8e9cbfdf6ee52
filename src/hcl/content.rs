// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::hcl::ast::*;
use crate::hcl::lexer::{Range, Span};
use crate::hcl::value::Value;

use std::collections::BTreeMap;

use anyhow::{bail, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SchemaMode {
    #[default]
    Default,
    // Every attribute of the body is selected and blocks are not allowed.
    JustAttributes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSchema {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSchema {
    pub kind: String,
    pub label_names: Vec<String>,
    pub body: BodySchema,
}

/// Shape of the content to retrieve from a body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodySchema {
    pub mode: SchemaMode,
    pub attributes: Vec<AttributeSchema>,
    pub blocks: Vec<BlockSchema>,
}

impl BodySchema {
    fn attribute(&self, name: &str) -> bool {
        self.mode == SchemaMode::JustAttributes || self.attributes.iter().any(|a| a.name == name)
    }

    fn block(&self, kind: &str) -> Option<&BlockSchema> {
        self.blocks.iter().find(|b| b.kind == kind)
    }
}

#[derive(Debug, Clone)]
pub struct ContentBlock {
    pub kind: String,
    pub labels: Vec<String>,
    pub body: BodyContent,
    pub def_range: Range,
    pub type_range: Range,
    pub label_ranges: Vec<Range>,
}

/// Attributes and blocks of a body that matched a schema.
#[derive(Debug, Clone, Default)]
pub struct BodyContent {
    pub attributes: BTreeMap<String, Attribute>,
    pub blocks: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Copy)]
pub enum BodyRef<'a> {
    Native(&'a Body),
    Json(&'a Expr),
}

impl FileBody {
    pub fn as_body_ref(&self) -> BodyRef<'_> {
        match self {
            FileBody::Native(body) => BodyRef::Native(body),
            FileBody::Json(expr) => BodyRef::Json(expr),
        }
    }
}

/// Extracts the content described by `schema`. Attributes and blocks that
/// are not part of the schema are ignored.
pub fn partial_content(body: BodyRef<'_>, schema: &BodySchema) -> Result<BodyContent> {
    match body {
        BodyRef::Native(body) => native_content(body, schema),
        BodyRef::Json(expr) => json_content(expr, schema),
    }
}

fn native_content(body: &Body, schema: &BodySchema) -> Result<BodyContent> {
    let mut content = BodyContent::default();
    for attr in &body.attributes {
        if schema.attribute(&attr.name) {
            content.attributes.insert(attr.name.clone(), attr.clone());
        }
    }

    for block in &body.blocks {
        if schema.mode == SchemaMode::JustAttributes {
            bail!(
                "{}: Unexpected \"{}\" block; Blocks are not allowed here.",
                block.def_range(),
                block.kind
            );
        }
        let Some(bs) = schema.block(&block.kind) else {
            continue;
        };
        check_labels(bs, block.labels.len(), &block.def_range())?;
        content.blocks.push(ContentBlock {
            kind: block.kind.clone(),
            labels: block.labels.iter().map(|l| l.value.clone()).collect(),
            body: native_content(&block.body, &bs.body)?,
            def_range: block.def_range(),
            type_range: block.kind_span.range(),
            label_ranges: block.labels.iter().map(|l| l.span.range()).collect(),
        });
    }
    Ok(content)
}

fn check_labels(schema: &BlockSchema, got: usize, range: &Range) -> Result<()> {
    let want = schema.label_names.len();
    if got > want {
        bail!(
            "{range}: Extraneous label for {}; No more labels are expected.",
            schema.kind
        );
    }
    if got < want {
        bail!(
            "{range}: Missing {} for {}; All {} blocks must have {want} labels ({}).",
            schema.label_names[got],
            schema.kind,
            schema.kind,
            schema.label_names.join(", ")
        );
    }
    Ok(())
}

/// Name given by an object key: a bare identifier or a literal string.
pub fn object_key(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Variable { name, .. } => Some(name.clone()),
        Expr::Literal {
            value: Value::String(s),
            ..
        } => Some(s.clone()),
        Expr::Template { parts, .. } => {
            let mut out = String::new();
            for part in parts {
                match part {
                    TemplatePart::Literal(s) => out.push_str(s),
                    _ => return None,
                }
            }
            Some(out)
        }
        _ => None,
    }
}

fn json_items(expr: &Expr) -> Result<&[ObjectItem]> {
    match expr {
        Expr::Object { items, .. } => Ok(items),
        _ => bail!(
            "{}: Incorrect JSON value type; A JSON object is required here, setting the arguments for this block.",
            expr.range()
        ),
    }
}

fn json_content(expr: &Expr, schema: &BodySchema) -> Result<BodyContent> {
    let mut content = BodyContent::default();
    for item in json_items(expr)? {
        let Some(name) = object_key(&item.key) else {
            bail!(
                "{}: Invalid JSON object property name; Property names must be literal strings.",
                item.key.range()
            );
        };
        let Some(key_span) = item.key.span() else {
            continue;
        };

        if schema.attribute(&name) {
            let span = match item.value.span() {
                Some(value_span) => key_span.to(value_span),
                None => key_span.clone(),
            };
            content.attributes.insert(
                name.clone(),
                Attribute {
                    name,
                    name_span: key_span.clone(),
                    expr: item.value.clone(),
                    span,
                },
            );
        } else if let Some(bs) = schema.block(&name) {
            json_blocks(bs, &item.value, key_span, vec![], &mut content.blocks)?;
        }
    }
    Ok(content)
}

// Labels are consumed from nested object keys. At any level an array of
// objects declares several blocks.
fn json_blocks(
    schema: &BlockSchema,
    value: &Expr,
    type_span: &Span,
    labels: Vec<(String, Span)>,
    out: &mut Vec<ContentBlock>,
) -> Result<()> {
    if let Expr::Tuple { items, .. } = value {
        for item in items {
            json_blocks(schema, item, type_span, labels.clone(), out)?;
        }
        return Ok(());
    }

    if labels.len() < schema.label_names.len() {
        for item in json_items(value)? {
            let (Some(label), Some(span)) = (object_key(&item.key), item.key.span()) else {
                bail!(
                    "{}: Invalid JSON object property name; Property names must be literal strings.",
                    item.key.range()
                );
            };
            let mut labels = labels.clone();
            labels.push((label, span.clone()));
            json_blocks(schema, &item.value, type_span, labels, out)?;
        }
        return Ok(());
    }

    let def_range = match labels.last() {
        Some((_, span)) => type_span.to(span).range(),
        None => type_span.range(),
    };
    out.push(ContentBlock {
        kind: schema.kind.clone(),
        labels: labels.iter().map(|(l, _)| l.clone()).collect(),
        body: json_content(value, &schema.body)?,
        def_range,
        type_range: type_span.range(),
        label_ranges: labels.iter().map(|(_, s)| s.range()).collect(),
    });
    Ok(())
}

fn static_error(expr: &Expr, detail: &str) -> anyhow::Error {
    anyhow::anyhow!("{}: Invalid expression; {detail}", expr.range())
}

/// Elements of a static list expression.
pub fn expr_list(expr: &Expr) -> Result<Vec<Ref<Expr>>> {
    match expr {
        Expr::Tuple { items, .. } => Ok(items.clone()),
        _ => Err(static_error(expr, "A static list expression is required.")),
    }
}

/// Key/value pairs of a static map expression.
pub fn expr_map(expr: &Expr) -> Result<Vec<(Ref<Expr>, Ref<Expr>)>> {
    match expr {
        Expr::Object { items, .. } => Ok(items
            .iter()
            .map(|i| (i.key.clone(), i.value.clone()))
            .collect()),
        _ => Err(static_error(expr, "A static map expression is required.")),
    }
}

pub struct StaticCall {
    pub name: String,
    pub name_range: Range,
    pub arguments: Vec<Ref<Expr>>,
    pub args_range: Range,
}

/// Name and arguments of a static function call expression.
pub fn expr_call(expr: &Expr) -> Result<StaticCall> {
    match expr {
        Expr::Call {
            name,
            name_span,
            args,
            args_span,
            ..
        } => Ok(StaticCall {
            name: name.clone(),
            name_range: name_span.range(),
            arguments: args.clone(),
            args_range: args_span.range(),
        }),
        _ => Err(static_error(expr, "A static function call is required.")),
    }
}
