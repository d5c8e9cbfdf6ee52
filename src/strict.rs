// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Compile checks applied to policies before they are loaded.
//!
//! Local variables assigned with `:=` must be referenced somewhere else in
//! the rule declaring them.

use anyhow::{bail, Result};
use regorus::unstable::{
    AssignOp, Expr, Literal, LiteralStmt, Parser, Query, Rule, RuleAssign, RuleHead, Source, Span,
};

#[derive(Default)]
struct Vars<'a> {
    assigned: Vec<&'a Span>,
    used: Vec<&'a Span>,
}

impl<'a> Vars<'a> {
    fn expr(&mut self, expr: &'a Expr) {
        match expr {
            Expr::Var { span, .. } => self.used.push(span),
            Expr::Array { items, .. } | Expr::Set { items, .. } => {
                items.iter().for_each(|i| self.expr(i))
            }
            Expr::Object { fields, .. } => {
                for (_, k, v) in fields {
                    self.expr(k);
                    self.expr(v);
                }
            }
            Expr::ArrayCompr { term, query, .. } | Expr::SetCompr { term, query, .. } => {
                self.expr(term);
                self.query(query);
            }
            Expr::ObjectCompr {
                key, value, query, ..
            } => {
                self.expr(key);
                self.expr(value);
                self.query(query);
            }
            Expr::Call { fcn, params, .. } => {
                self.expr(fcn);
                params.iter().for_each(|p| self.expr(p));
            }
            Expr::UnaryExpr { expr, .. } => self.expr(expr),
            Expr::RefDot { refr, .. } => self.expr(refr),
            Expr::RefBrack { refr, index, .. } => {
                self.expr(refr);
                self.expr(index);
            }
            Expr::BinExpr { lhs, rhs, .. }
            | Expr::BoolExpr { lhs, rhs, .. }
            | Expr::ArithExpr { lhs, rhs, .. } => {
                self.expr(lhs);
                self.expr(rhs);
            }
            Expr::AssignExpr { op, lhs, rhs, .. } => {
                if matches!(op, AssignOp::ColEq) {
                    self.declare(lhs);
                } else {
                    self.expr(lhs);
                }
                self.expr(rhs);
            }
            Expr::Membership {
                key,
                value,
                collection,
                ..
            } => {
                if let Some(key) = key {
                    self.expr(key);
                }
                self.expr(value);
                self.expr(collection);
            }
            _ => (),
        }
    }

    // Variables on the left of `:=`, possibly destructured.
    fn declare(&mut self, lhs: &'a Expr) {
        match lhs {
            Expr::Var { span, .. } if span.text() != "_" => self.assigned.push(span),
            Expr::Array { items, .. } => items.iter().for_each(|i| self.declare(i)),
            Expr::Object { fields, .. } => {
                for (_, k, v) in fields {
                    self.expr(k);
                    self.declare(v);
                }
            }
            _ => self.expr(lhs),
        }
    }

    fn stmt(&mut self, stmt: &'a LiteralStmt) {
        match &stmt.literal {
            Literal::SomeVars { .. } => (),
            Literal::SomeIn {
                key,
                value,
                collection,
                ..
            } => {
                if let Some(key) = key {
                    self.expr(key);
                }
                self.expr(value);
                self.expr(collection);
            }
            Literal::Expr { expr, .. } | Literal::NotExpr { expr, .. } => self.expr(expr),
            Literal::Every { domain, query, .. } => {
                self.expr(domain);
                self.query(query);
            }
        }
        for m in &stmt.with_mods {
            self.expr(&m.refr);
            self.expr(&m.r#as);
        }
    }

    fn query(&mut self, query: &'a Query) {
        query.stmts.iter().for_each(|s| self.stmt(s));
    }

    fn assign(&mut self, assign: &'a Option<RuleAssign>) {
        if let Some(assign) = assign {
            self.expr(&assign.value);
        }
    }

    fn rule(&mut self, rule: &'a Rule) {
        match rule {
            Rule::Spec { head, bodies, .. } => {
                match head {
                    RuleHead::Compr { refr, assign, .. } => {
                        self.expr(refr);
                        self.assign(assign);
                    }
                    RuleHead::Set { refr, key, .. } => {
                        self.expr(refr);
                        if let Some(key) = key {
                            self.expr(key);
                        }
                    }
                    RuleHead::Func {
                        refr, args, assign, ..
                    } => {
                        self.expr(refr);
                        args.iter().for_each(|a| self.expr(a));
                        self.assign(assign);
                    }
                }
                for body in bodies {
                    self.assign(&body.assign);
                    self.query(&body.query);
                }
            }
            Rule::Default { refr, value, .. } => {
                self.expr(refr);
                self.expr(value);
            }
        }
    }

    fn unused(&self) -> impl Iterator<Item = &'a Span> + '_ {
        self.assigned.iter().copied().filter(|a| {
            !self
                .used
                .iter()
                .any(|u| u.text() == a.text() && u.start != a.start)
        })
    }
}

/// Rejects policies with unused local assignments.
pub fn check(modules: &[(String, String)]) -> Result<()> {
    let mut errors = vec![];

    for (path, rego) in modules {
        let source = Source::from_contents(path.clone(), rego.clone())?;
        let mut parser = Parser::new(&source)?;
        parser.enable_rego_v1()?;
        let module = parser.parse()?;

        for rule in &module.policy {
            let mut vars = Vars::default();
            vars.rule(rule);
            for span in vars.unused() {
                errors.push(format!(
                    "{}:{}: rego_compile_error: assigned var {} unused",
                    span.source.file(),
                    span.line,
                    span.text()
                ));
            }
        }
    }

    match errors.as_slice() {
        [] => Ok(()),
        [error] => bail!("1 error occurred: {error}"),
        _ => bail!("{} errors occurred:\n{}", errors.len(), errors.join("\n")),
    }
}
