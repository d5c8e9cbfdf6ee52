// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::hcl::ast::*;
use crate::hcl::typeexpr::Type;
use crate::hcl::value::*;

use std::collections::BTreeMap;

use anyhow::{bail, Result};

/// Variables visible to an expression. Function calls are never available.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    pub variables: BTreeMap<String, Value>,
}

fn diag(expr: &Expr, summary: &str, detail: &str) -> anyhow::Error {
    anyhow::anyhow!("{}: {summary}; {detail}", expr.range())
}

/// Evaluates an expression. Without a context, only constant expressions
/// are allowed.
pub fn evaluate(expr: &Expr, ctx: Option<&EvalContext>) -> Result<Value> {
    Evaluator { ctx }.eval(expr)
}

struct Evaluator<'a> {
    ctx: Option<&'a EvalContext>,
}

impl<'a> Evaluator<'a> {
    fn eval(&self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal { value, .. } | Expr::Static { value, .. } => Ok(value.clone()),
            Expr::Parens { inner, .. } => self.eval(inner),
            Expr::Template { parts, .. } => self.eval_template(expr, parts),
            Expr::Variable { name, .. } => self.eval_variable(expr, name),
            Expr::GetAttr { target, name, .. } => {
                let target = self.eval(target)?;
                get_attr(expr, target, name)
            }
            Expr::Index { target, key, .. } => {
                let target = self.eval(target)?;
                let key = self.eval(key)?;
                index(expr, target, key)
            }
            Expr::Splat { source, steps, .. } => self.eval_splat(expr, source, steps),
            Expr::Tuple { items, .. } => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Ok(Value::Tuple(values))
            }
            Expr::Object { items, .. } => {
                let mut fields = BTreeMap::new();
                let mut marks = Marks::default();
                for item in items {
                    let key = match item.key.as_keyword() {
                        Some(name) => Value::String(name.to_string()),
                        None => self.eval(&item.key)?,
                    };
                    let (key, m) = key.unmark();
                    marks = marks.union(m);
                    let key = match key {
                        Value::Unknown => return Ok(Value::Unknown),
                        Value::Null => bail!(diag(
                            &item.key,
                            "Invalid object key",
                            "Key expression in object constructor must not be null."
                        )),
                        k => match k.convert(&Type::String) {
                            Ok(Value::String(s)) => s,
                            _ => bail!(diag(
                                &item.key,
                                "Incorrect key type",
                                "Can't use this value as a key: string required."
                            )),
                        },
                    };
                    fields.insert(key, self.eval(&item.value)?);
                }
                Ok(Value::Object(fields).mark(marks))
            }
            Expr::Call { name, .. } => match self.ctx {
                None => bail!(diag(
                    expr,
                    "Function calls not allowed",
                    "Functions may not be called here."
                )),
                Some(_) => bail!(diag(
                    expr,
                    "Call to unknown function",
                    &format!("There is no function named \"{name}\".")
                )),
            },
            Expr::Unary { op, operand, .. } => {
                let (v, marks) = self.eval(operand)?.unmark();
                let result = match (op, v) {
                    (_, Value::Unknown) => Value::Unknown,
                    (UnaryOp::Neg, v) => match v.convert(&Type::Number) {
                        Ok(Value::Number(n)) => Value::Number(-n),
                        _ => bail!(diag(expr, "Invalid operand", "a number is required.")),
                    },
                    (UnaryOp::Not, v) => match v.convert(&Type::Bool) {
                        Ok(Value::Bool(b)) => Value::Bool(!b),
                        _ => bail!(diag(expr, "Invalid operand", "a bool is required.")),
                    },
                };
                Ok(result.mark(marks))
            }
            Expr::Binary { op, lhs, rhs, .. } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                binary(expr, *op, lhs, rhs)
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
                ..
            } => {
                let (cond, marks) = self.eval(condition)?.unmark();
                match cond {
                    Value::Unknown => Ok(Value::Unknown),
                    c => match c.convert(&Type::Bool) {
                        Ok(Value::Bool(true)) => Ok(self.eval(then)?.mark(marks)),
                        Ok(Value::Bool(false)) => Ok(self.eval(otherwise)?.mark(marks)),
                        _ => bail!(diag(
                            condition,
                            "Incorrect condition type",
                            "The condition expression must be of type bool."
                        )),
                    },
                }
            }
            Expr::For { .. } => self.eval_for(expr),
        }
    }

    fn eval_variable(&self, expr: &Expr, name: &str) -> Result<Value> {
        let Some(ctx) = self.ctx else {
            bail!(diag(
                expr,
                "Variables not allowed",
                "Variables may not be used here."
            ));
        };
        match ctx.variables.get(name) {
            Some(v) => Ok(v.clone()),
            None => bail!(diag(
                expr,
                "Unknown variable",
                &format!("There is no variable named \"{name}\".")
            )),
        }
    }

    fn eval_template(&self, expr: &Expr, parts: &[TemplatePart]) -> Result<Value> {
        // A lone interpolation yields its value unconverted.
        if let [TemplatePart::Interp(e)] = parts {
            return self.eval(e);
        }

        let mut out = Rendered::default();
        self.render(expr, parts, &mut out)?;
        let value = if out.known {
            Value::String(out.text)
        } else {
            Value::Unknown
        };
        Ok(value.mark(out.marks))
    }

    fn render(&self, expr: &Expr, parts: &[TemplatePart], out: &mut Rendered) -> Result<()> {
        for part in parts {
            match part {
                TemplatePart::Literal(s) => out.text.push_str(s),
                TemplatePart::Interp(e) => {
                    let (v, m) = self.eval(e)?.unmark();
                    out.marks = out.marks.union(m);
                    match v {
                        Value::Unknown => out.known = false,
                        Value::Null => bail!(diag(
                            e,
                            "Invalid template interpolation value",
                            "The expression result is null. Cannot include a null value in a string template."
                        )),
                        v => match v.convert(&Type::String) {
                            Ok(Value::String(s)) => out.text.push_str(&s),
                            _ => bail!(diag(
                                expr,
                                "Invalid template interpolation value",
                                "Cannot include the given value in a string template: string required."
                            )),
                        },
                    }
                }
                TemplatePart::If {
                    condition,
                    then,
                    otherwise,
                } => {
                    let (cond, m) = self.eval(condition)?.unmark();
                    out.marks = out.marks.union(m);
                    match cond {
                        Value::Unknown => out.known = false,
                        Value::Null => bail!(diag(
                            condition,
                            "Invalid template if condition",
                            "The condition value is null. Conditions must either be true or false."
                        )),
                        c => match c.convert(&Type::Bool) {
                            Ok(Value::Bool(true)) => self.render(expr, then, out)?,
                            Ok(Value::Bool(false)) => self.render(expr, otherwise, out)?,
                            _ => bail!(diag(
                                condition,
                                "Invalid template if condition",
                                "The condition must be of type bool."
                            )),
                        },
                    }
                }
                TemplatePart::For {
                    key_var,
                    value_var,
                    collection,
                    body,
                } => {
                    let (coll, m) = self.eval(collection)?.unmark();
                    out.marks = out.marks.union(m);
                    let pairs = match coll {
                        Value::Unknown => {
                            out.known = false;
                            continue;
                        }
                        Value::Null => bail!(diag(
                            collection,
                            "Invalid template for directive",
                            "Cannot iterate over a null value."
                        )),
                        c => match pairs(c) {
                            Some(pairs) => pairs,
                            None => bail!(diag(
                                collection,
                                "Invalid template for directive",
                                "A value of type collection or structural type is required."
                            )),
                        },
                    };

                    let mut scope = self.ctx.cloned().unwrap_or_default();
                    for (k, v) in pairs {
                        if let Some(kv) = key_var {
                            scope.variables.insert(kv.clone(), k);
                        }
                        scope.variables.insert(value_var.clone(), v);
                        Evaluator { ctx: Some(&scope) }.render(expr, body, out)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn eval_splat(&self, expr: &Expr, source: &Expr, steps: &[SplatStep]) -> Result<Value> {
        let (source, marks) = self.eval(source)?.unmark();
        let items = match source {
            Value::Unknown => return Ok(Value::Unknown.mark(marks)),
            Value::Null => vec![],
            Value::List(items) | Value::Set(items) | Value::Tuple(items) => items,
            v => vec![v],
        };
        let mut out = Vec::with_capacity(items.len());
        for mut item in items {
            for step in steps {
                item = match step {
                    SplatStep::Attr(name) => get_attr(expr, item, name)?,
                    SplatStep::Index(key) => {
                        let key = self.eval(key)?;
                        index(expr, item, key)?
                    }
                };
            }
            out.push(item);
        }
        Ok(Value::Tuple(out).mark(marks))
    }

    fn eval_for(&self, expr: &Expr) -> Result<Value> {
        let Expr::For {
            key_var,
            value_var,
            collection,
            key,
            value,
            condition,
            group,
            ..
        } = expr
        else {
            bail!(diag(expr, "Invalid expression", "not a for expression"));
        };

        let (coll, marks) = self.eval(collection)?.unmark();
        let pairs = match coll {
            Value::Unknown => return Ok(Value::Unknown),
            c => match pairs(c) {
                Some(pairs) => pairs,
                None => bail!(diag(
                    collection,
                    "Iteration over non-iterable value",
                    "A value of type collection or structural type is required."
                )),
            },
        };

        let mut base = self.ctx.cloned().unwrap_or_default();
        let mut tuple = vec![];
        let mut object: BTreeMap<String, Value> = BTreeMap::new();
        let mut grouped: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        for (k, v) in pairs {
            if let Some(kv) = key_var {
                base.variables.insert(kv.clone(), k);
            }
            base.variables.insert(value_var.clone(), v);
            let scope = Evaluator { ctx: Some(&base) };

            if let Some(cond) = condition {
                match scope.eval(cond)?.unmark().0 {
                    Value::Unknown => return Ok(Value::Unknown),
                    Value::Bool(true) => (),
                    Value::Bool(false) => continue,
                    _ => bail!(diag(
                        cond,
                        "Invalid for expression condition",
                        "The value of the 'if' clause must be a bool."
                    )),
                }
            }

            match key {
                None => tuple.push(scope.eval(value)?),
                Some(key_expr) => {
                    let k = match scope.eval(key_expr)?.unmark().0 {
                        Value::Unknown => return Ok(Value::Unknown),
                        k => match k.convert(&Type::String) {
                            Ok(Value::String(s)) => s,
                            _ => bail!(diag(
                                key_expr,
                                "Invalid object key",
                                "Key expression in 'for' expression must be a string."
                            )),
                        },
                    };
                    let v = scope.eval(value)?;
                    if *group {
                        grouped.entry(k).or_default().push(v);
                    } else if object.insert(k.clone(), v).is_some() {
                        bail!(diag(
                            key_expr,
                            "Duplicate object key",
                            &format!("Two different items produced the key \"{k}\" in this 'for' expression.")
                        ));
                    }
                }
            }
        }

        let result = match key {
            None => Value::Tuple(tuple),
            Some(_) if *group => Value::Object(
                grouped
                    .into_iter()
                    .map(|(k, v)| (k, Value::Tuple(v)))
                    .collect(),
            ),
            Some(_) => Value::Object(object),
        };
        Ok(result.mark(marks))
    }
}

struct Rendered {
    text: String,
    marks: Marks,
    known: bool,
}

impl Default for Rendered {
    fn default() -> Self {
        Self {
            text: String::new(),
            marks: Marks::default(),
            known: true,
        }
    }
}

// Key and element pairs of a collection, in iteration order.
fn pairs(coll: Value) -> Option<Vec<(Value, Value)>> {
    match coll {
        Value::List(items) | Value::Set(items) | Value::Tuple(items) => Some(
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (Value::from(i), v))
                .collect(),
        ),
        Value::Map(fields) | Value::Object(fields) => Some(
            fields
                .into_iter()
                .map(|(k, v)| (Value::String(k), v))
                .collect(),
        ),
        _ => None,
    }
}

fn get_attr(expr: &Expr, target: Value, name: &str) -> Result<Value> {
    let (target, marks) = target.unmark();
    let value = match target {
        Value::Unknown => Value::Unknown,
        Value::Object(mut fields) | Value::Map(mut fields) => match fields.remove(name) {
            Some(v) => v,
            None => bail!(diag(
                expr,
                "Unsupported attribute",
                &format!("This object does not have an attribute named \"{name}\".")
            )),
        },
        Value::Null => bail!(diag(
            expr,
            "Attempt to get attribute from null value",
            "This value is null, so it does not have any attributes."
        )),
        v => bail!(diag(
            expr,
            "Unsupported attribute",
            &format!("Can't access attributes on a primitive-typed value ({}).", v.kind())
        )),
    };
    Ok(value.mark(marks))
}

fn index(expr: &Expr, target: Value, key: Value) -> Result<Value> {
    let (target, tmarks) = target.unmark();
    let (key, kmarks) = key.unmark();
    let marks = tmarks.union(kmarks);
    if matches!(target, Value::Unknown) || matches!(key, Value::Unknown) {
        return Ok(Value::Unknown.mark(marks));
    }
    let value = match target {
        Value::List(items) | Value::Tuple(items) => {
            let idx = match key.convert(&Type::Number) {
                Ok(Value::Number(n)) => n.as_index(),
                _ => None,
            };
            let idx = match idx {
                Some(idx) => idx,
                None => bail!(diag(
                    expr,
                    "Invalid index",
                    "The given key does not identify an element in this collection value: a whole number is required."
                )),
            };
            match items.into_iter().nth(idx) {
                Some(v) => v,
                None => bail!(diag(
                    expr,
                    "Invalid index",
                    "The given key does not identify an element in this collection value: the given index is greater than or equal to the length of the collection."
                )),
            }
        }
        Value::Map(mut fields) | Value::Object(mut fields) => {
            let name = match key.convert(&Type::String) {
                Ok(Value::String(s)) => s,
                _ => bail!(diag(
                    expr,
                    "Invalid index",
                    "The given key does not identify an element in this collection value: string required."
                )),
            };
            match fields.remove(&name) {
                Some(v) => v,
                None => bail!(diag(
                    expr,
                    "Invalid index",
                    "The given key does not identify an element in this collection value."
                )),
            }
        }
        Value::Null => bail!(diag(
            expr,
            "Attempt to index null value",
            "This value is null, so it does not have any indices."
        )),
        v => bail!(diag(
            expr,
            "Invalid index",
            &format!("This value does not have any indices ({}).", v.kind())
        )),
    };
    Ok(value.mark(marks))
}

fn binary(expr: &Expr, op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
    let (lhs, lmarks) = lhs.unmark();
    let (rhs, rmarks) = rhs.unmark();
    let marks = lmarks.union(rmarks);

    let result = match op {
        BinaryOp::Eq | BinaryOp::Ne => {
            if !lhs.is_wholly_known() || !rhs.is_wholly_known() {
                Value::Unknown
            } else {
                let eq = lhs == rhs;
                Value::Bool(if op == BinaryOp::Eq { eq } else { !eq })
            }
        }
        BinaryOp::And | BinaryOp::Or => {
            if matches!(lhs, Value::Unknown) || matches!(rhs, Value::Unknown) {
                Value::Unknown
            } else {
                let (Ok(Value::Bool(a)), Ok(Value::Bool(b))) =
                    (lhs.convert(&Type::Bool), rhs.convert(&Type::Bool))
                else {
                    bail!(diag(expr, "Invalid operand", "a bool is required."));
                };
                Value::Bool(if op == BinaryOp::And { a && b } else { a || b })
            }
        }
        _ => {
            if matches!(lhs, Value::Unknown) || matches!(rhs, Value::Unknown) {
                Value::Unknown
            } else {
                let (Ok(Value::Number(a)), Ok(Value::Number(b))) =
                    (lhs.convert(&Type::Number), rhs.convert(&Type::Number))
                else {
                    bail!(diag(expr, "Invalid operand", "a number is required."));
                };
                match op {
                    BinaryOp::Lt => Value::Bool(a < b),
                    BinaryOp::Le => Value::Bool(a <= b),
                    BinaryOp::Gt => Value::Bool(a > b),
                    BinaryOp::Ge => Value::Bool(a >= b),
                    BinaryOp::Add => Value::Number(a + b),
                    BinaryOp::Sub => Value::Number(a - b),
                    BinaryOp::Mul => Value::Number(a * b),
                    BinaryOp::Div => {
                        if b.is_zero() {
                            bail!(diag(expr, "Operation failed", "can't divide by zero"));
                        }
                        Value::Number(a / b)
                    }
                    _ => {
                        if b.is_zero() {
                            bail!(diag(expr, "Operation failed", "can't use modulo by zero"));
                        }
                        Value::Number(a % b)
                    }
                }
            }
        }
    };
    Ok(result.mark(marks))
}
