// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::hcl::ast::*;

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;

/// A type constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    // `any`
    Dynamic,
    Bool,
    Number,
    String,
    List(Box<Type>),
    Set(Box<Type>),
    Map(Box<Type>),
    Object {
        attrs: BTreeMap<String, Type>,
        optional: BTreeSet<String>,
    },
    Tuple(Vec<Type>),
    // Not a value type. Selects the raw expression instead of its value.
    Expr,
}

impl Type {
    pub fn has_dynamic_types(&self) -> bool {
        match self {
            Type::Dynamic => true,
            Type::List(t) | Type::Set(t) | Type::Map(t) => t.has_dynamic_types(),
            Type::Object { attrs, .. } => attrs.values().any(|t| t.has_dynamic_types()),
            Type::Tuple(types) => types.iter().any(|t| t.has_dynamic_types()),
            _ => false,
        }
    }

    pub fn friendly_name(&self) -> String {
        match self {
            Type::Dynamic => "dynamic".to_string(),
            Type::Bool => "bool".to_string(),
            Type::Number => "number".to_string(),
            Type::String => "string".to_string(),
            Type::List(t) => format!("list of {}", t.friendly_name()),
            Type::Set(t) => format!("set of {}", t.friendly_name()),
            Type::Map(t) => format!("map of {}", t.friendly_name()),
            Type::Object { .. } => "object".to_string(),
            Type::Tuple(_) => "tuple".to_string(),
            Type::Expr => "expr".to_string(),
        }
    }
}

fn invalid(detail: &str) -> anyhow::Error {
    anyhow::anyhow!("Invalid type specification; {detail}")
}

/// Interprets an expression as a type constraint.
pub fn type_constraint(expr: &Expr) -> Result<Type> {
    match expr {
        Expr::Variable { name, .. } => match name.as_str() {
            "any" => Ok(Type::Dynamic),
            "bool" => Ok(Type::Bool),
            "number" => Ok(Type::Number),
            "string" => Ok(Type::String),
            "list" | "map" | "set" => Err(invalid(&format!(
                "The {name} type constructor requires one argument specifying the element type."
            ))),
            "object" => Err(invalid(
                "The object type constructor requires one argument specifying the attribute types as a map.",
            )),
            "tuple" => Err(invalid(
                "The tuple type constructor requires one argument specifying the element types as a list.",
            )),
            _ => Err(invalid(&format!(
                "The keyword \"{name}\" is not a valid type specification."
            ))),
        },
        Expr::Call { name, args, .. } => {
            match name.as_str() {
                "list" => Ok(Type::List(Box::new(element_type(name, args)?))),
                "set" => Ok(Type::Set(Box::new(element_type(name, args)?))),
                "map" => Ok(Type::Map(Box::new(element_type(name, args)?))),
                "object" => match args.as_slice() {
                    [arg] => object_type(arg),
                    _ => Err(invalid(
                        "The object type constructor requires one argument specifying the attribute types as a map.",
                    )),
                },
                "tuple" => match args.as_slice() {
                    [arg] => match arg.as_ref() {
                        Expr::Tuple { items, .. } => {
                            let mut types = Vec::with_capacity(items.len());
                            for item in items {
                                types.push(type_constraint(item)?);
                            }
                            Ok(Type::Tuple(types))
                        }
                        _ => Err(invalid("Tuple type constructor requires a list of element types.")),
                    },
                    _ => Err(invalid(
                        "The tuple type constructor requires one argument specifying the element types as a list.",
                    )),
                },
                "optional" => Err(invalid(
                    "Keyword \"optional\" is valid only as a modifier for object type attributes.",
                )),
                "any" | "bool" | "number" | "string" => Err(invalid(&format!(
                    "Primitive type keyword \"{name}\" does not expect arguments."
                ))),
                _ => Err(invalid(&format!(
                    "Keyword \"{name}\" is not a valid type constructor."
                ))),
            }
        }
        Expr::Parens { inner, .. } => type_constraint(inner),
        _ => Err(invalid(
            "A type specification is either a primitive type keyword (bool, number, string) or a complex type constructor call, like list(string).",
        )),
    }
}

fn element_type(name: &str, args: &[Ref<Expr>]) -> Result<Type> {
    match args {
        [arg] => type_constraint(arg),
        _ => Err(invalid(&format!(
            "The {name} type constructor requires one argument specifying the element type."
        ))),
    }
}

fn object_type(arg: &Expr) -> Result<Type> {
    let Expr::Object { items, .. } = arg else {
        return Err(invalid(
            "Object type constructor requires a map whose keys are attribute names and whose values are the corresponding attribute types."
        ));
    };

    let mut attrs = BTreeMap::new();
    let mut optional = BTreeSet::new();
    for item in items {
        let name = match item.key.as_ref() {
            Expr::Variable { name, .. } => name.clone(),
            Expr::Template { parts, .. } => match parts.as_slice() {
                [TemplatePart::Literal(s)] => s.clone(),
                _ => return Err(invalid("Object constructor map keys must be attribute names.")),
            },
            _ => return Err(invalid("Object constructor map keys must be attribute names.")),
        };

        let ty = match item.value.as_ref() {
            Expr::Call { name: f, args, .. } if f == "optional" => {
                optional.insert(name.clone());
                match args.as_slice() {
                    [ty] => type_constraint(ty)?,
                    [_, _] => return Err(invalid(
                        "Optional attribute modifier expects only one argument: the attribute type."
                    )),
                    _ => return Err(invalid(
                        "Optional attribute modifier requires the attribute type as its argument."
                    )),
                }
            }
            e => type_constraint(e)?,
        };
        attrs.insert(name, ty);
    }
    Ok(Type::Object { attrs, optional })
}
