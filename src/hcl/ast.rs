// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::hcl::lexer::*;
use crate::hcl::value::Value;

use core::{cmp, fmt, ops::Deref};
use std::sync::Arc;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

pub struct NodeRef<T> {
    r: Arc<T>,
}

impl<T> Clone for NodeRef<T> {
    fn clone(&self) -> Self {
        Self { r: self.r.clone() }
    }
}

impl<T: fmt::Debug> fmt::Debug for NodeRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.r.as_ref().fmt(f)
    }
}

impl<T> cmp::PartialEq for NodeRef<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.r, &other.r)
    }
}

impl<T> cmp::Eq for NodeRef<T> {}

impl<T> Deref for NodeRef<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.r
    }
}

impl<T> AsRef<T> for NodeRef<T> {
    fn as_ref(&self) -> &T {
        self.deref()
    }
}

impl<T> NodeRef<T> {
    pub fn new(t: T) -> Self {
        Self { r: Arc::new(t) }
    }
}

pub type Ref<T> = NodeRef<T>;

#[derive(Debug, Clone)]
pub enum TemplatePart {
    Literal(String),
    Interp(Ref<Expr>),

    // %{if cond} ... %{else} ... %{endif}
    If {
        condition: Ref<Expr>,
        then: Vec<TemplatePart>,
        otherwise: Vec<TemplatePart>,
    },

    // %{for k, v in coll} ... %{endfor}
    For {
        key_var: Option<String>,
        value_var: String,
        collection: Ref<Expr>,
        body: Vec<TemplatePart>,
    },
}

#[derive(Debug, Clone)]
pub enum SplatStep {
    Attr(String),
    Index(Ref<Expr>),
}

#[derive(Debug, Clone)]
pub struct ObjectItem {
    pub key: Ref<Expr>,
    pub value: Ref<Expr>,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal {
        span: Span,
        value: Value,
    },

    // A value that has no source text of its own, e.g. a JSON scalar
    // re-read as an expression.
    Static {
        range: Range,
        value: Value,
    },

    Template {
        span: Span,
        parts: Vec<TemplatePart>,
    },

    Variable {
        span: Span,
        name: String,
    },

    GetAttr {
        span: Span,
        target: Ref<Expr>,
        name: String,
    },

    Index {
        span: Span,
        target: Ref<Expr>,
        key: Ref<Expr>,
    },

    Splat {
        span: Span,
        source: Ref<Expr>,
        steps: Vec<SplatStep>,
    },

    Parens {
        span: Span,
        inner: Ref<Expr>,
    },

    Tuple {
        span: Span,
        items: Vec<Ref<Expr>>,
    },

    Object {
        span: Span,
        items: Vec<ObjectItem>,
    },

    Call {
        span: Span,
        name: String,
        name_span: Span,
        args: Vec<Ref<Expr>>,
        expand_final: bool,
        // From the opening to the closing parenthesis, inclusive.
        args_span: Span,
    },

    Unary {
        span: Span,
        op: UnaryOp,
        operand: Ref<Expr>,
    },

    Binary {
        span: Span,
        op: BinaryOp,
        lhs: Ref<Expr>,
        rhs: Ref<Expr>,
    },

    Conditional {
        span: Span,
        condition: Ref<Expr>,
        then: Ref<Expr>,
        otherwise: Ref<Expr>,
    },

    For {
        span: Span,
        key_var: Option<String>,
        value_var: String,
        collection: Ref<Expr>,
        key: Option<Ref<Expr>>,
        value: Ref<Expr>,
        condition: Option<Ref<Expr>>,
        group: bool,
    },
}

impl Expr {
    pub fn span(&self) -> Option<&Span> {
        use Expr::*;
        match self {
            Static { .. } => None,
            Literal { span, .. }
            | Template { span, .. }
            | Variable { span, .. }
            | GetAttr { span, .. }
            | Index { span, .. }
            | Splat { span, .. }
            | Parens { span, .. }
            | Tuple { span, .. }
            | Object { span, .. }
            | Call { span, .. }
            | Unary { span, .. }
            | Binary { span, .. }
            | Conditional { span, .. }
            | For { span, .. } => Some(span),
        }
    }

    pub fn range(&self) -> Range {
        match self {
            Expr::Static { range, .. } => range.clone(),
            _ => match self.span() {
                Some(span) => span.range(),
                None => Range::default(),
            },
        }
    }

    /// Source text of the expression.
    pub fn text(&self) -> &str {
        match self.span() {
            Some(span) => span.text(),
            None => "",
        }
    }

    /// A bare identifier used where a name is expected, e.g. an object key
    /// or a keyword such as `string` in a type constraint.
    pub fn as_keyword(&self) -> Option<&str> {
        match self {
            Expr::Variable { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub name_span: Span,
    pub expr: Ref<Expr>,
    pub span: Span,
}

impl Attribute {
    pub fn range(&self) -> Range {
        self.span.range()
    }
}

#[derive(Debug, Clone)]
pub struct Label {
    pub value: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub kind: String,
    pub kind_span: Span,
    pub labels: Vec<Label>,
    pub body: Body,
    pub span: Span,
}

impl Block {
    /// From the block type keyword to the end of the last label.
    pub fn def_range(&self) -> Range {
        match self.labels.last() {
            Some(label) => self.kind_span.to(&label.span).range(),
            None => self.kind_span.range(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Body {
    pub attributes: Vec<Attribute>,
    pub blocks: Vec<Block>,
}

/// Parsed body of a configuration file.
#[derive(Debug, Clone)]
pub enum FileBody {
    Native(Body),
    // JSON syntax files keep the root object expression. Blocks and
    // attributes are recognized only once a schema is applied.
    Json(Ref<Expr>),
}

#[derive(Debug, Clone)]
pub struct File {
    pub name: String,
    pub source: Source,
    pub body: FileBody,
}

impl File {
    pub fn bytes(&self) -> &[u8] {
        self.source.contents().as_bytes()
    }
}
