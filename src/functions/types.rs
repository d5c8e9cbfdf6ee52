// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Descriptors of the documents exchanged with policies.
//!
//! The evaluator only knows the arity of a builtin, so argument values are
//! checked against these descriptors before a builtin runs. They also
//! document what each builtin returns.

use core::fmt;

use serde_json::Value;

/// Number of block levels described structurally. Blocks nested deeper are
/// described as `any` since a descriptor cannot refer to itself.
pub const NESTED_BLOCK_DEPTH: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyType {
    Any,
    String,
    Number,
    Boolean,
    Array(Box<PolicyType>),
    Object {
        fields: Vec<(&'static str, PolicyType)>,
        // Type of the values under any other key.
        dynamic: Option<Box<PolicyType>>,
    },
    Or(Vec<PolicyType>),
    Named(&'static str, Box<PolicyType>),
}

impl PolicyType {
    /// Whether `v` conforms to the descriptor. Static object fields may be
    /// absent.
    pub fn accepts(&self, v: &Value) -> bool {
        match (self, v) {
            (PolicyType::Any, _) => true,
            (PolicyType::String, Value::String(_)) => true,
            (PolicyType::Number, Value::Number(_)) => true,
            (PolicyType::Boolean, Value::Bool(_)) => true,
            (PolicyType::Array(item), Value::Array(items)) => items.iter().all(|i| item.accepts(i)),
            (PolicyType::Object { fields, dynamic }, Value::Object(obj)) => {
                obj.iter().all(|(k, v)| {
                    match fields.iter().find(|(name, _)| name == k) {
                        Some((_, ty)) => ty.accepts(v),
                        None => dynamic.as_ref().is_some_and(|d| d.accepts(v)),
                    }
                })
            }
            (PolicyType::Or(types), _) => types.iter().any(|t| t.accepts(v)),
            (PolicyType::Named(_, ty), _) => ty.accepts(v),
            _ => false,
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyType::Any => write!(f, "any"),
            PolicyType::String => write!(f, "string"),
            PolicyType::Number => write!(f, "number"),
            PolicyType::Boolean => write!(f, "boolean"),
            PolicyType::Array(item) => write!(f, "array[{item}]"),
            PolicyType::Object { fields, dynamic } => {
                write!(f, "object<")?;
                for (idx, (name, ty)) in fields.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {ty}")?;
                }
                if let Some(d) = dynamic {
                    if !fields.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "[string: {d}]")?;
                }
                write!(f, ">")
            }
            PolicyType::Or(types) => {
                write!(f, "any<")?;
                for (idx, ty) in types.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{ty}")?;
                }
                write!(f, ">")
            }
            PolicyType::Named(name, _) => write!(f, "{name}"),
        }
    }
}

fn object(fields: Vec<(&'static str, PolicyType)>) -> PolicyType {
    PolicyType::Object {
        fields,
        dynamic: None,
    }
}

fn dynamic_object(value: PolicyType) -> PolicyType {
    PolicyType::Object {
        fields: vec![],
        dynamic: Some(Box::new(value)),
    }
}

fn named(name: &'static str, ty: PolicyType) -> PolicyType {
    PolicyType::Named(name, Box::new(ty))
}

fn array(item: PolicyType) -> PolicyType {
    PolicyType::Array(Box::new(item))
}

fn nested_block(depth: usize) -> PolicyType {
    if depth == 0 {
        return PolicyType::Any;
    }
    object(vec![
        ("config", body(depth - 1)),
        ("labels", PolicyType::Or(vec![array(PolicyType::String), PolicyType::Any])),
        ("decl_range", RANGE.clone()),
    ])
}

fn body(depth: usize) -> PolicyType {
    dynamic_object(PolicyType::Or(vec![
        EXPR.clone(),
        array(nested_block(depth)),
    ]))
}

lazy_static::lazy_static! {
    pub static ref POS: PolicyType = named("pos", object(vec![
        ("line", PolicyType::Number),
        ("column", PolicyType::Number),
        ("byte", PolicyType::Number),
    ]));

    pub static ref RANGE: PolicyType = named("range", object(vec![
        ("filename", PolicyType::String),
        ("start", POS.clone()),
        ("end", POS.clone()),
    ]));

    // The nested mapping is recursive; values are not described further.
    pub static ref SCHEMA: PolicyType = named("schema", dynamic_object(PolicyType::Any));

    pub static ref OPTIONS: PolicyType = named("options", dynamic_object(PolicyType::String));

    pub static ref EXPR: PolicyType = named("expr", object(vec![
        ("value", PolicyType::Any),
        ("unknown", PolicyType::Boolean),
        ("sensitive", PolicyType::Boolean),
        ("ephemeral", PolicyType::Boolean),
        ("range", RANGE.clone()),
    ]));

    pub static ref RAW_EXPR: PolicyType = named("raw_expr", object(vec![
        ("value", PolicyType::String),
        ("range", RANGE.clone()),
    ]));

    pub static ref BODY: PolicyType = named("body", body(NESTED_BLOCK_DEPTH - 1));

    pub static ref NESTED_BLOCK: PolicyType =
        named("nested_block", nested_block(NESTED_BLOCK_DEPTH - 1));

    pub static ref TYPED_BLOCK: PolicyType = named("typed_block", object(vec![
        ("type", PolicyType::String),
        ("name", PolicyType::String),
        ("config", BODY.clone()),
        ("decl_range", RANGE.clone()),
    ]));

    pub static ref NAMED_BLOCK: PolicyType = named("named_block", object(vec![
        ("name", PolicyType::String),
        ("config", BODY.clone()),
        ("decl_range", RANGE.clone()),
    ]));

    pub static ref BLOCK: PolicyType = named("block", object(vec![
        ("config", BODY.clone()),
        ("decl_range", RANGE.clone()),
    ]));

    pub static ref LOCAL: PolicyType = named("local", object(vec![
        ("name", PolicyType::String),
        ("expr", EXPR.clone()),
        ("decl_range", RANGE.clone()),
    ]));

    pub static ref ISSUE: PolicyType = named("issue", object(vec![
        ("msg", PolicyType::String),
        ("range", RANGE.clone()),
    ]));

    pub static ref KEY_VALUE: PolicyType = object(vec![
        ("key", RAW_EXPR.clone()),
        ("value", RAW_EXPR.clone()),
    ]);

    pub static ref CALL: PolicyType = object(vec![
        ("name", PolicyType::String),
        ("name_range", RANGE.clone()),
        ("arguments", array(RAW_EXPR.clone())),
        ("args_range", RANGE.clone()),
    ]);

    /// Virtual file name to source, the trailing argument of mock functions.
    pub static ref FILES: PolicyType = dynamic_object(PolicyType::String);
}

/// `array[T]`
pub fn array_of(item: &PolicyType) -> PolicyType {
    array(item.clone())
}

/// Number of block levels a block descriptor describes before degrading
/// to `any`.
pub fn block_depth(ty: &PolicyType) -> usize {
    match ty {
        PolicyType::Named(_, ty) => block_depth(ty),
        PolicyType::Object { fields, .. } => {
            let Some((_, config)) = fields.iter().find(|(name, _)| *name == "config") else {
                return 0;
            };
            let inner = match config {
                PolicyType::Named(_, ty) => ty.as_ref(),
                ty => ty,
            };
            let nested = match inner {
                PolicyType::Object {
                    dynamic: Some(d), ..
                } => match d.as_ref() {
                    PolicyType::Or(types) => types.iter().find_map(|t| match t {
                        PolicyType::Array(item) => Some(block_depth(item)),
                        _ => None,
                    }),
                    _ => None,
                },
                _ => None,
            };
            1 + nested.unwrap_or(0)
        }
        _ => 0,
    }
}
