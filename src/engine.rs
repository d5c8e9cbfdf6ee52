// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::config::{Policies, Settings};
use crate::conversion::json_to_issue;
use crate::functions::{self, Builtin, Function};
use crate::hcl::Range;
use crate::runner::Runner;
use crate::strict;

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};

/// All rules live in this package.
pub const PACKAGE: &str = "tflint";

/// A finding produced by a rule or a failing test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub message: String,
    /// Zero for test failures.
    pub range: Range,
}

/// Evaluates policies and returns issues.
///
/// The compiled policies and the data document are shared by all rules.
/// Each evaluation works on a copy with the builtins bound to the runner of
/// that evaluation.
pub struct Engine {
    // The evaluator is `Send` but not `Sync`; it is only locked to be cloned.
    base: Mutex<regorus::Engine>,
    modules: Vec<(String, String)>,
    mocks: Vec<Function>,
    trace: bool,
}

fn kind_of(v: &regorus::Value) -> &'static str {
    match v {
        regorus::Value::Null => "null",
        regorus::Value::Bool(_) => "bool",
        regorus::Value::Number(_) => "number",
        regorus::Value::String(_) => "string",
        regorus::Value::Array(_) => "array",
        regorus::Value::Set(_) => "set",
        regorus::Value::Object(_) => "object",
        regorus::Value::Undefined => "undefined",
    }
}

fn register(engine: &mut regorus::Engine, builtin: Builtin) -> Result<()> {
    let name = builtin.name.clone();
    let nargs = builtin.nargs;
    engine.add_extension(
        name,
        nargs,
        Box::new(move |args: Vec<regorus::Value>| -> Result<regorus::Value> {
            let mut params = Vec::with_capacity(args.len());
            for arg in &args {
                params.push(serde_json::to_value(arg)?);
            }
            let ret = builtin.call(&params)?;
            Ok(serde_json::from_value::<regorus::Value>(ret)?)
        }),
    )
}

impl Engine {
    pub fn new(policies: &Policies, settings: &Settings) -> Result<Self> {
        // A malformed mock declaration fails here, not mid-inspection.
        let mocks = functions::mock_functions();

        let mut base = regorus::Engine::new();
        base.set_rego_v0(false);
        base.set_strict_builtin_errors(true);
        base.set_gather_prints(true);

        for (path, rego) in &policies.modules {
            log::debug!("loading policy {path}");
            base.add_policy(path.clone(), rego.clone())?;
        }
        strict::check(&policies.modules)?;
        for data in &policies.data {
            base.add_data(data.clone())?;
        }

        Ok(Self {
            base: Mutex::new(base),
            modules: policies.modules.clone(),
            mocks,
            trace: settings.trace,
        })
    }

    /// Sources of the loaded policies as `(path, rego)` pairs.
    pub fn modules(&self) -> &[(String, String)] {
        &self.modules
    }

    /// Mock siblings of the host builtins.
    pub fn mocks(&self) -> &[Function] {
        &self.mocks
    }

    fn instance(&self, builtins: Vec<Builtin>) -> Result<regorus::Engine> {
        let mut engine = self
            .base
            .lock()
            .map_err(|_| anyhow!("policy engine poisoned"))?
            .clone();
        for builtin in builtins {
            register(&mut engine, builtin)?;
        }
        Ok(engine)
    }

    fn eval(&self, engine: &mut regorus::Engine, query: String) -> Result<regorus::QueryResults> {
        let results = engine.eval_query(query, self.trace);
        // Prints and traces are forwarded even when evaluation fails.
        for line in engine.take_prints()? {
            log::debug!("{line}");
        }
        results
    }

    /// Evaluates `data.tflint.<rule>`, which must be a set of issues.
    pub fn run_query(&self, rule: &str, runner: Arc<dyn Runner>) -> Result<Vec<Issue>> {
        // Mock functions are not needed outside of testing, but policies
        // referring to them must still compile.
        let builtins = functions::functions(runner)
            .iter()
            .chain(self.mocks.iter())
            .map(|f| f.rego())
            .collect();
        let mut engine = self.instance(builtins)?;
        let results = self.eval(&mut engine, format!("data.{PACKAGE}.{rule}"))?;

        let mut issues = vec![];
        for result in &results.result {
            for expr in &result.expressions {
                let regorus::Value::Set(items) = &expr.value else {
                    bail!("issue is not set, got {}", kind_of(&expr.value));
                };
                for item in items.iter() {
                    issues.push(json_to_issue(&serde_json::to_value(item)?, "issue")?);
                }
            }
        }
        log::debug!("{rule}: {} issue(s)", issues.len());

        Ok(issues)
    }

    /// Runs the test `data.tflint.<test>`. An error or a result other than
    /// `true` is reported as an issue without a range.
    pub fn run_test(&self, test: &str, runner: Arc<dyn Runner>) -> Result<Vec<Issue>> {
        let builtins = functions::functions(runner)
            .iter()
            .chain(self.mocks.iter())
            .map(|f| f.tester())
            .collect();
        let mut engine = self.instance(builtins)?;

        let passed = match self.eval(&mut engine, format!("data.{PACKAGE}.{test}")) {
            Ok(results) => results
                .result
                .iter()
                .flat_map(|r| r.expressions.iter())
                .any(|e| e.value == regorus::Value::Bool(true)),
            Err(e) => {
                return Ok(vec![Issue {
                    message: format!("test errored: {e}"),
                    range: Range::default(),
                }])
            }
        };

        if passed {
            log::debug!("{test}: passed");
            return Ok(vec![]);
        }
        Ok(vec![Issue {
            message: "test failed".to_string(),
            range: Range::default(),
        }])
    }
}
