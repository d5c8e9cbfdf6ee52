// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::hcl::{BodyContent, BodySchema, Expr, File, Marks, Range, Value};
use crate::runner::*;
use crate::tester::TestRunner;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;

pub const MAIN_TF: &str = r#"
resource "aws_instance" "main" {
  instance_type = "t1.micro"
}
"#;

pub fn files(files: &[(&str, &str)]) -> BTreeMap<String, String> {
    files
        .iter()
        .map(|(name, src)| (name.to_string(), src.to_string()))
        .collect()
}

pub fn runner(fixture: &[(&str, &str)]) -> Result<Arc<dyn Runner>> {
    Ok(Arc::new(TestRunner::new(&files(fixture))?))
}

/// Runner whose expressions all evaluate to the same outcome.
pub enum FixedRunner {
    Value(Value),
    Refuse,
}

impl FixedRunner {
    pub fn marked(marks: Marks) -> Self {
        FixedRunner::Value(Value::from("secret").mark(marks))
    }
}

impl Runner for FixedRunner {
    fn get_module_content(
        &self,
        _schema: &BodySchema,
        _opts: Option<&GetModuleContentOption>,
    ) -> Result<BodyContent> {
        Ok(BodyContent::default())
    }

    fn evaluate_expr(&self, _expr: &Expr, _opts: Option<&EvaluateExprOption>) -> Result<Value> {
        match self {
            FixedRunner::Value(v) => Ok(v.clone()),
            FixedRunner::Refuse => Err(RunnerError::Sensitive.into()),
        }
    }

    fn get_files(&self) -> Result<BTreeMap<String, File>> {
        Ok(BTreeMap::new())
    }

    fn emit_issue(&self, _rule: &dyn HostRule, _message: &str, _range: &Range) -> Result<()> {
        Ok(())
    }
}
