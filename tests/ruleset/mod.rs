// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use test_generator::test_resources;
use tflint_ruleset_opa::hcl::{BodyContent, BodySchema, Expr, File, Range};
use tflint_ruleset_opa::range::range_to_json;
use tflint_ruleset_opa::*;

/// Forwards to a [`TestRunner`] and records emitted issues.
struct RecordingRunner {
    inner: TestRunner,
    issues: Mutex<Vec<Value>>,
}

impl RecordingRunner {
    fn new(files: &BTreeMap<String, String>) -> Result<Self> {
        Ok(Self {
            inner: TestRunner::new(files)?,
            issues: Mutex::new(vec![]),
        })
    }

    fn issues(&self) -> Vec<Value> {
        self.issues.lock().map(|i| i.clone()).unwrap_or_default()
    }
}

impl Runner for RecordingRunner {
    fn get_module_content(
        &self,
        schema: &BodySchema,
        opts: Option<&GetModuleContentOption>,
    ) -> Result<BodyContent> {
        self.inner.get_module_content(schema, opts)
    }

    fn evaluate_expr(
        &self,
        expr: &Expr,
        opts: Option<&EvaluateExprOption>,
    ) -> Result<tflint_ruleset_opa::hcl::Value> {
        self.inner.evaluate_expr(expr, opts)
    }

    fn get_files(&self) -> Result<BTreeMap<String, File>> {
        self.inner.get_files()
    }

    fn emit_issue(&self, rule: &dyn HostRule, message: &str, range: &Range) -> Result<()> {
        let issue = json!({
            "rule": rule.name(),
            "severity": rule.severity().to_string(),
            "message": message,
            "range": range_to_json(range),
        });
        match self.issues.lock() {
            Ok(mut issues) => issues.push(issue),
            Err(_) => bail!("issue list poisoned"),
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
#[serde(deny_unknown_fields)]
struct WantIssue {
    rule: String,
    severity: Option<String>,
    message: Option<String>,
    message_contains: Option<String>,
    range: Option<Value>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
#[serde(deny_unknown_fields)]
struct TestCase {
    note: String,
    policies: BTreeMap<String, String>,
    #[serde(default)]
    files: BTreeMap<String, String>,
    #[serde(default)]
    test: bool,
    #[serde(default)]
    rules: BTreeMap<String, RuleConfig>,
    #[serde(default)]
    want_issues: Vec<WantIssue>,
    want_error: Option<String>,
    skip: Option<bool>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct YamlTest {
    cases: Vec<TestCase>,
}

fn display_values(c: &Value, e: &Value) -> Result<String> {
    Ok(format!(
        "\nleft  = {}\nright = {}\n",
        serde_json::to_string_pretty(c)?,
        serde_json::to_string_pretty(e)?
    ))
}

fn check_issue(got: &Value, want: &WantIssue) -> Result<()> {
    let expected = serde_json::to_value(want)?;
    let mismatch = |field: &str| -> Result<()> {
        bail!("{field} mismatch{}", display_values(got, &expected)?)
    };

    if got["rule"] != want.rule.as_str() {
        mismatch("rule")?;
    }
    if let Some(severity) = &want.severity {
        if got["severity"] != severity.as_str() {
            mismatch("severity")?;
        }
    }
    let message = got["message"].as_str().unwrap_or_default();
    if let Some(m) = &want.message {
        if message != m {
            println!("message mismatch :\n{}", prettydiff::diff_chars(m, message));
            mismatch("message")?;
        }
    }
    if let Some(m) = &want.message_contains {
        if !message.contains(m.as_str()) {
            mismatch("message")?;
        }
    }
    if let Some(range) = &want.range {
        if &got["range"] != range {
            mismatch("range")?;
        }
    }
    Ok(())
}

fn run_case(case: &TestCase) -> Result<()> {
    let policies = Policies {
        modules: case
            .policies
            .iter()
            .map(|(path, rego)| (path.clone(), rego.clone()))
            .collect(),
        data: vec![],
    };
    let settings = Settings {
        test: case.test,
        ..Settings::default()
    };

    let runner = Arc::new(RecordingRunner::new(&case.files)?);
    let mut ruleset = RuleSet::new();
    let result = ruleset
        .apply_policies(&policies, &case.rules, &settings)
        .and_then(|_| ruleset.check(runner.clone()));

    match (result, &case.want_error) {
        (Ok(()), None) => (),
        (Ok(()), Some(e)) => bail!("check succeeded, expected error containing `{e}`"),
        (Err(actual), Some(expected)) => {
            let actual = actual.to_string();
            if !actual.contains(expected.as_str()) {
                bail!("error mismatch\nactual   = {actual}\nexpected = {expected}");
            }
            return Ok(());
        }
        (Err(e), None) => return Err(e),
    }

    let issues = runner.issues();
    if issues.len() != case.want_issues.len() {
        bail!(
            "the number of emitted issues ({}) and expected issues ({}) is not equal\n{}",
            issues.len(),
            case.want_issues.len(),
            serde_json::to_string_pretty(&issues)?
        );
    }
    for (got, want) in issues.iter().zip(case.want_issues.iter()) {
        check_issue(got, want)?;
    }
    Ok(())
}

fn yaml_test_impl(file: &str) -> Result<()> {
    let yaml_str = std::fs::read_to_string(file)?;
    let test: YamlTest = serde_yaml::from_str(&yaml_str)?;

    println!("running {file}");

    for case in &test.cases {
        print!("case {} ", case.note);
        if case.skip == Some(true) {
            println!("skipped");
            continue;
        }
        run_case(case)?;
        println!("passed");
    }

    Ok(())
}

fn yaml_test(file: &str) -> Result<()> {
    match yaml_test_impl(file) {
        Ok(_) => Ok(()),
        Err(e) => {
            // If Err is returned, it doesn't always get printed by cargo test.
            // Therefore, panic with the error.
            panic!("{}", e);
        }
    }
}

#[test_resources("tests/ruleset/cases/*.yaml")]
fn run(path: &str) {
    yaml_test(path).unwrap()
}

#[test]
fn policy_directory() -> Result<()> {
    let config = Config {
        policy_dir: Some("tests/ruleset/policies".to_string()),
        ..Config::default()
    };

    let mut ruleset = RuleSet::new();
    ruleset.apply_config(&config, &Settings::default())?;
    assert_eq!(ruleset.rule_names(), vec!["opa_deny_instance_type"]);

    let files = BTreeMap::from([(
        "main.tf".to_string(),
        r#"
resource "aws_instance" "allowed" {
  instance_type = "t3.micro"
}

resource "aws_instance" "denied" {
  instance_type = "m5.large"
}
"#
        .to_string(),
    )]);
    let runner = Arc::new(RecordingRunner::new(&files)?);
    ruleset.check(runner.clone())?;

    let issues = runner.issues();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0]["message"], json!("m5.large is not allowed"));
    assert_eq!(issues[0]["range"]["start"]["line"], json!(7));
    Ok(())
}

#[test]
fn missing_policy_directory() {
    let config = Config {
        policy_dirs: vec!["tests/ruleset/no-such-dir".to_string()],
        ..Config::default()
    };
    match RuleSet::new().apply_config(&config, &Settings::default()) {
        Ok(_) => panic!("missing policy directory was accepted"),
        Err(e) => assert_eq!(
            e.to_string(),
            "failed to load policies; policy directory tests/ruleset/no-such-dir does not exist"
        ),
    }
}

#[test]
fn engine_is_shared_across_threads() -> Result<()> {
    let policies = Policies {
        modules: vec![(
            "main.rego".to_string(),
            r#"package tflint

notice_count contains issue if {
	n := count(terraform.resources("*", {}, {}))
	issue := tflint.issue(sprintf("%d", [n]), terraform.module_range())
}
"#
            .to_string(),
        )],
        data: vec![],
    };
    let mut ruleset = RuleSet::new();
    ruleset.apply_policies(&policies, &BTreeMap::new(), &Settings::default())?;
    let ruleset = Arc::new(ruleset);

    let handles: Vec<_> = (0..4)
        .map(|n| {
            let ruleset = ruleset.clone();
            std::thread::spawn(move || -> Result<Vec<Value>> {
                let src = "resource \"a\" \"b\" {\n}\n".repeat(n);
                let files = BTreeMap::from([("main.tf".to_string(), src)]);
                let runner = Arc::new(RecordingRunner::new(&files)?);
                ruleset.check(runner.clone())?;
                Ok(runner.issues())
            })
        })
        .collect();

    for (n, handle) in handles.into_iter().enumerate() {
        let issues = match handle.join() {
            Ok(issues) => issues?,
            Err(_) => bail!("check panicked"),
        };
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0]["message"], json!(n.to_string()));
    }
    Ok(())
}
