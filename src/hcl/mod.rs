// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A compact front end for the Terraform configuration language: native and
//! JSON syntax, values with confidentiality marks, type constraints and
//! schema-driven content extraction.

pub mod ast;
pub mod content;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod typeexpr;
pub mod value;

pub use ast::{Attribute, Expr, File, FileBody};
pub use content::{
    partial_content, AttributeSchema, BlockSchema, BodyContent, BodySchema, ContentBlock,
    SchemaMode,
};
pub use eval::{evaluate, EvalContext};
pub use lexer::{Pos, Range, Source};
pub use parser::{parse_expression, parse_file};
pub use typeexpr::{type_constraint, Type};
pub use value::{Marks, Number, Value};
