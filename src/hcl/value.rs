// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::hcl::typeexpr::Type;

use core::cmp::Ordering;
use core::fmt;
use core::ops;
use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Result};

/// Confidentiality marks carried by a value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Marks {
    pub sensitive: bool,
    pub ephemeral: bool,
}

impl Marks {
    pub const SENSITIVE: Marks = Marks {
        sensitive: true,
        ephemeral: false,
    };

    pub const EPHEMERAL: Marks = Marks {
        sensitive: false,
        ephemeral: true,
    };

    pub fn is_empty(&self) -> bool {
        !self.sensitive && !self.ephemeral
    }

    pub fn union(self, other: Marks) -> Marks {
        Marks {
            sensitive: self.sensitive || other.sensitive,
            ephemeral: self.ephemeral || other.ephemeral,
        }
    }
}

/// A number. Integers are kept exact as long as they fit, other numbers are
/// floats.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Int(i128),
    Float(f64),
}

// Largest integer a float represents exactly.
const MAX_SAFE_INT: f64 = 9_007_199_254_740_992.0;

impl Number {
    pub fn from_f64(n: f64) -> Number {
        if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INT {
            Number::Int(n as i128)
        } else {
            Number::Float(n)
        }
    }

    /// Parses a decimal literal.
    pub fn parse(s: &str) -> Option<Number> {
        let digits = s.strip_prefix('-').unwrap_or(s);
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(i) = s.parse::<i128>() {
                return Some(Number::Int(i));
            }
        }
        match s.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => Some(Number::from_f64(n)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Int(i) => *i as f64,
            Number::Float(f) => *f,
        }
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            Number::Int(i) => usize::try_from(*i).ok(),
            Number::Float(_) => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.as_f64() == 0.0
    }

    fn int_op(
        self,
        rhs: Number,
        int: fn(i128, i128) -> Option<i128>,
        float: fn(f64, f64) -> f64,
    ) -> Number {
        match (self, rhs) {
            (Number::Int(a), Number::Int(b)) => match int(a, b) {
                Some(i) => Number::Int(i),
                None => Number::from_f64(float(a as f64, b as f64)),
            },
            (a, b) => Number::from_f64(float(a.as_f64(), b.as_f64())),
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        match self {
            Number::Int(i) => {
                if let Ok(i) = i64::try_from(*i) {
                    Ok(serde_json::Value::from(i))
                } else if let Ok(u) = u64::try_from(*i) {
                    Ok(serde_json::Value::from(u))
                } else {
                    Number::Float(*i as f64).to_json()
                }
            }
            Number::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| anyhow!("cannot serialize number {f}")),
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Number) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (a, b) => a.as_f64() == b.as_f64(),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a.partial_cmp(b),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

impl ops::Neg for Number {
    type Output = Number;

    fn neg(self) -> Number {
        match self {
            Number::Int(i) => match i.checked_neg() {
                Some(i) => Number::Int(i),
                None => Number::Float(-(i as f64)),
            },
            Number::Float(f) => Number::Float(-f),
        }
    }
}

impl ops::Add for Number {
    type Output = Number;

    fn add(self, rhs: Number) -> Number {
        self.int_op(rhs, i128::checked_add, |a, b| a + b)
    }
}

impl ops::Sub for Number {
    type Output = Number;

    fn sub(self, rhs: Number) -> Number {
        self.int_op(rhs, i128::checked_sub, |a, b| a - b)
    }
}

impl ops::Mul for Number {
    type Output = Number;

    fn mul(self, rhs: Number) -> Number {
        self.int_op(rhs, i128::checked_mul, |a, b| a * b)
    }
}

impl ops::Div for Number {
    type Output = Number;

    fn div(self, rhs: Number) -> Number {
        let exact = |a: i128, b: i128| match a.checked_rem(b) {
            Some(0) => a.checked_div(b),
            _ => None,
        };
        self.int_op(rhs, exact, |a, b| a / b)
    }
}

impl ops::Rem for Number {
    type Output = Number;

    fn rem(self, rhs: Number) -> Number {
        self.int_op(rhs, i128::checked_rem, |a, b| a % b)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            Number::Float(n) => write!(f, "{n}"),
        }
    }
}

/// A configuration value.
///
/// Values are dynamically typed; collection kinds are kept apart so that
/// conversion to a type constraint behaves like the configuration
/// language's own type system. `Unknown` stands for a value that is not
/// known until apply time.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Unknown,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<Value>),
    // Sorted and deduplicated.
    Set(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Tuple(Vec<Value>),
    Object(BTreeMap<String, Value>),
    Marked(Box<Value>, Marks),
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(Number::from_f64(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(Number::Int(n.into()))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(Number::Int(n as i128))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_json() {
            Ok(v) => write!(f, "{v}"),
            Err(_) => write!(f, "(unknown)"),
        }
    }
}

impl Value {
    pub fn new_set(mut items: Vec<Value>) -> Value {
        items.sort_by_key(|v| v.to_string());
        items.dedup();
        Value::Set(items)
    }

    /// Wraps the value with the given marks, merging with existing ones.
    pub fn mark(self, marks: Marks) -> Value {
        if marks.is_empty() {
            return self;
        }
        match self {
            Value::Marked(inner, m) => Value::Marked(inner, m.union(marks)),
            v => Value::Marked(Box::new(v), marks),
        }
    }

    /// Removes the top-level marks.
    pub fn unmark(self) -> (Value, Marks) {
        match self {
            Value::Marked(inner, m) => (*inner, m),
            v => (v, Marks::default()),
        }
    }

    pub fn unmarked(&self) -> &Value {
        match self {
            Value::Marked(inner, _) => inner,
            v => v,
        }
    }

    /// Marks found anywhere in the value.
    pub fn deep_marks(&self) -> Marks {
        match self {
            Value::Marked(inner, m) => m.union(inner.deep_marks()),
            Value::List(items) | Value::Set(items) | Value::Tuple(items) => items
                .iter()
                .fold(Marks::default(), |acc, v| acc.union(v.deep_marks())),
            Value::Map(fields) | Value::Object(fields) => fields
                .values()
                .fold(Marks::default(), |acc, v| acc.union(v.deep_marks())),
            _ => Marks::default(),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self.unmarked(), Value::Unknown)
    }

    pub fn is_null(&self) -> bool {
        matches!(self.unmarked(), Value::Null)
    }

    pub fn is_wholly_known(&self) -> bool {
        match self.unmarked() {
            Value::Unknown => false,
            Value::List(items) | Value::Set(items) | Value::Tuple(items) => {
                items.iter().all(|v| v.is_wholly_known())
            }
            Value::Map(fields) | Value::Object(fields) => {
                fields.values().all(|v| v.is_wholly_known())
            }
            _ => true,
        }
    }

    /// The concrete type of a value. Unknown and null values are `Dynamic`.
    pub fn ty(&self) -> Type {
        match self.unmarked() {
            Value::Null | Value::Unknown | Value::Marked(..) => Type::Dynamic,
            Value::Bool(_) => Type::Bool,
            Value::Number(_) => Type::Number,
            Value::String(_) => Type::String,
            Value::List(items) => Type::List(Box::new(element_type(items))),
            Value::Set(items) => Type::Set(Box::new(element_type(items))),
            Value::Map(fields) => {
                let items: Vec<Value> = fields.values().cloned().collect();
                Type::Map(Box::new(element_type(&items)))
            }
            Value::Tuple(items) => Type::Tuple(items.iter().map(|v| v.ty()).collect()),
            Value::Object(fields) => Type::Object {
                attrs: fields.iter().map(|(k, v)| (k.clone(), v.ty())).collect(),
                optional: Default::default(),
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self.unmarked() {
            Value::Null => "null",
            Value::Unknown => "unknown",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Tuple(_) => "tuple",
            Value::Object(_) => "object",
            Value::Marked(..) => "marked",
        }
    }

    /// Canonical JSON encoding of a wholly known, unmarked value.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Unknown => bail!("value is not known"),
            Value::Marked(..) => bail!("value has marks, so it cannot be serialized as JSON"),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => n.to_json()?,
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) | Value::Set(items) | Value::Tuple(items) => {
                let mut out = Vec::with_capacity(items.len());
                for v in items {
                    out.push(v.to_json()?);
                }
                serde_json::Value::Array(out)
            }
            Value::Map(fields) | Value::Object(fields) => {
                let mut out = serde_json::Map::new();
                for (k, v) in fields {
                    out.insert(k.clone(), v.to_json()?);
                }
                serde_json::Value::Object(out)
            }
        })
    }

    /// Converts the value so that it conforms to the given type constraint.
    pub fn convert(self, ty: &Type) -> Result<Value> {
        let (value, marks) = self.unmark();
        Ok(convert_unmarked(value, ty)?.mark(marks))
    }
}

fn element_type(items: &[Value]) -> Type {
    let mut ty = Type::Dynamic;
    for item in items {
        let t = item.ty();
        if ty == Type::Dynamic {
            ty = t;
        } else if t != Type::Dynamic && t != ty {
            return Type::Dynamic;
        }
    }
    ty
}

fn convert_items(items: Vec<Value>, ty: &Type) -> Result<Vec<Value>> {
    items.into_iter().map(|v| v.convert(ty)).collect()
}

fn convert_unmarked(value: Value, ty: &Type) -> Result<Value> {
    if matches!(value, Value::Null | Value::Unknown) {
        return Ok(value);
    }
    match ty {
        Type::Dynamic | Type::Expr => Ok(value),
        Type::String => match value {
            Value::String(_) => Ok(value),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            _ => bail!("string required"),
        },
        Type::Number => match value {
            Value::Number(_) => Ok(value),
            Value::String(s) => match Number::parse(&s) {
                Some(n) => Ok(Value::Number(n)),
                None => bail!("a number is required"),
            },
            Value::Bool(_) => bail!("a number is required"),
            _ => bail!("number required"),
        },
        Type::Bool => match value {
            Value::Bool(_) => Ok(value),
            Value::String(s) => match s.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => bail!("a bool is required"),
            },
            Value::Number(_) => bail!("a bool is required"),
            _ => bail!("bool required"),
        },
        Type::List(ety) => match value {
            Value::List(items) | Value::Set(items) | Value::Tuple(items) => {
                Ok(Value::List(convert_items(items, ety)?))
            }
            _ => bail!("{} required", ty.friendly_name()),
        },
        Type::Set(ety) => match value {
            Value::List(items) | Value::Set(items) | Value::Tuple(items) => {
                Ok(Value::new_set(convert_items(items, ety)?))
            }
            _ => bail!("{} required", ty.friendly_name()),
        },
        Type::Map(ety) => match value {
            Value::Map(fields) | Value::Object(fields) => {
                let mut out = BTreeMap::new();
                for (k, v) in fields {
                    out.insert(k, v.convert(ety)?);
                }
                Ok(Value::Map(out))
            }
            _ => bail!("{} required", ty.friendly_name()),
        },
        Type::Object { attrs, optional } => match value {
            Value::Map(mut fields) | Value::Object(mut fields) => {
                let mut out = BTreeMap::new();
                for (name, aty) in attrs {
                    match fields.remove(name) {
                        Some(v) => {
                            out.insert(name.clone(), v.convert(aty)?);
                        }
                        None if optional.contains(name) => {
                            out.insert(name.clone(), Value::Null);
                        }
                        None => bail!("attribute \"{name}\" is required"),
                    }
                }
                Ok(Value::Object(out))
            }
            _ => bail!("object required"),
        },
        Type::Tuple(etys) => match value {
            Value::List(items) | Value::Tuple(items) => {
                if items.len() != etys.len() {
                    bail!("tuple required");
                }
                let mut out = Vec::with_capacity(items.len());
                for (v, t) in items.into_iter().zip(etys.iter()) {
                    out.push(v.convert(t)?);
                }
                Ok(Value::Tuple(out))
            }
            _ => bail!("tuple required"),
        },
    }
}
