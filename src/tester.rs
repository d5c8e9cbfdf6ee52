// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory runner used by mock functions while testing policies.
//!
//! Only `variable` declarations are interpreted. Their defaults are the sole
//! values visible to expressions; dynamic blocks, meta-arguments and
//! override files are not considered.

use crate::hcl::{
    evaluate, parse_file, partial_content, AttributeSchema, BlockSchema, BodyContent, BodySchema,
    EvalContext, Expr, File, Marks, Range, Value,
};
use crate::runner::{EvaluateExprOption, GetModuleContentOption, HostRule, Runner};

use std::collections::BTreeMap;

use anyhow::{bail, Result};

#[derive(Debug, Clone)]
struct Variable {
    default: Option<Value>,
    marks: Marks,
    decl_range: Range,
}

#[derive(Debug, Clone, Default)]
pub struct TestRunner {
    files: BTreeMap<String, File>,
    variables: BTreeMap<String, Variable>,
}

impl TestRunner {
    /// Parses `files` (file name to source). `*.json` files use the JSON
    /// syntax.
    pub fn new(files: &BTreeMap<String, String>) -> Result<Self> {
        let mut runner = TestRunner::default();
        for (name, src) in files {
            runner.files.insert(name.clone(), parse_file(name, src)?);
        }

        let schema = BodySchema {
            blocks: vec![BlockSchema {
                kind: "variable".to_string(),
                label_names: vec!["name".to_string()],
                body: BodySchema {
                    attributes: ["default", "sensitive", "ephemeral"]
                        .iter()
                        .map(|name| AttributeSchema {
                            name: name.to_string(),
                        })
                        .collect(),
                    ..BodySchema::default()
                },
            }],
            ..BodySchema::default()
        };

        for file in runner.files.values() {
            let content = partial_content(file.body.as_body_ref(), &schema)?;
            for block in content.blocks {
                let Some(name) = block.labels.first() else {
                    continue;
                };
                let mut variable = Variable {
                    default: None,
                    marks: Marks::default(),
                    decl_range: block.def_range.clone(),
                };
                if let Some(attr) = block.body.attributes.get("default") {
                    variable.default = Some(evaluate(&attr.expr, None)?);
                }
                if let Some(attr) = block.body.attributes.get("sensitive") {
                    variable.marks.sensitive = decode_bool(&attr.expr)?;
                }
                if let Some(attr) = block.body.attributes.get("ephemeral") {
                    variable.marks.ephemeral = decode_bool(&attr.expr)?;
                }
                log::trace!("test runner: variable {name} declared at {}", variable.decl_range);
                runner.variables.insert(name.clone(), variable);
            }
        }

        Ok(runner)
    }

    fn eval_context(&self) -> EvalContext {
        let vars = self
            .variables
            .iter()
            .map(|(name, v)| {
                let value = v.default.clone().unwrap_or(Value::Unknown);
                (name.clone(), value.mark(v.marks))
            })
            .collect();

        EvalContext {
            variables: BTreeMap::from([("var".to_string(), Value::Object(vars))]),
        }
    }
}

fn decode_bool(expr: &Expr) -> Result<bool> {
    match evaluate(expr, None)?.unmarked() {
        Value::Bool(b) => Ok(*b),
        v => bail!(
            "{}: Unsuitable value type; Unsuitable value: a bool is required, got {}",
            expr.range(),
            v.kind()
        ),
    }
}

impl Runner for TestRunner {
    fn get_module_content(
        &self,
        schema: &BodySchema,
        _opts: Option<&GetModuleContentOption>,
    ) -> Result<BodyContent> {
        let mut content = BodyContent::default();
        for file in self.files.values() {
            let c = partial_content(file.body.as_body_ref(), schema)?;
            content.attributes.extend(c.attributes);
            content.blocks.extend(c.blocks);
        }
        Ok(content)
    }

    fn evaluate_expr(&self, expr: &Expr, _opts: Option<&EvaluateExprOption>) -> Result<Value> {
        evaluate(expr, Some(&self.eval_context()))
    }

    fn get_files(&self) -> Result<BTreeMap<String, File>> {
        Ok(self.files.clone())
    }

    fn emit_issue(&self, _rule: &dyn HostRule, _message: &str, _range: &Range) -> Result<()> {
        panic!("Not implemented in test runner")
    }
}
