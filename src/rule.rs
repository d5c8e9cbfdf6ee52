// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Rules defined in policies.
//!
//! Top-level rules of the `tflint` package are turned into checks by the
//! prefix of their name:
//!
//! | prefix                  | kind      | severity |
//! |-------------------------|-----------|----------|
//! | `deny_`, `violation_`   | check     | error    |
//! | `warn_`                 | check     | warning  |
//! | `notice_`               | check     | notice   |
//! | `test_`                 | test      | error    |
//!
//! The name seen by the host is the rule name prefixed with `opa_`. Rules
//! can be disabled and checks given another severity by name in the
//! ruleset configuration.

use crate::config::RuleConfig;
use crate::engine::Engine;
use crate::runner::{HostRule, Runner, Severity};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::Result;
use regorus::unstable::{Expr, Parser, Rule as RegoRule, RuleHead, Source};

/// Prefix of the host-visible name of rules.
pub const NAME_PREFIX: &str = "opa_";

/// Kind of rule implied by a rule name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Check(Severity),
    Test,
}

pub fn classify(name: &str) -> Option<Classification> {
    if name.starts_with("deny_") || name.starts_with("violation_") {
        Some(Classification::Check(Severity::Error))
    } else if name.starts_with("warn_") {
        Some(Classification::Check(Severity::Warning))
    } else if name.starts_with("notice_") {
        Some(Classification::Check(Severity::Notice))
    } else if name.starts_with("test_") {
        Some(Classification::Test)
    } else {
        None
    }
}

/// A check: evaluates to a set of issues.
pub struct Rule {
    engine: Arc<Engine>,
    name: String,
    rego_name: String,
    severity: Severity,
    location: String,
    enabled: bool,
}

impl Rule {
    pub fn new(rego_name: &str, severity: Severity, location: String, engine: Arc<Engine>) -> Self {
        Self {
            engine,
            name: format!("{NAME_PREFIX}{rego_name}"),
            rego_name: rego_name.to_string(),
            severity,
            location,
            enabled: true,
        }
    }

    pub fn rego_name(&self) -> &str {
        &self.rego_name
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl HostRule for Rule {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    fn link(&self) -> String {
        self.location.clone()
    }

    fn check(&self, runner: Arc<dyn Runner>) -> Result<()> {
        for issue in self.engine.run_query(&self.rego_name, runner.clone())? {
            runner.emit_issue(self, &issue.message, &issue.range)?;
        }
        Ok(())
    }
}

/// A policy test. Failures are reported as issues.
pub struct TestRule {
    engine: Arc<Engine>,
    name: String,
    rego_name: String,
    location: String,
    enabled: bool,
}

impl TestRule {
    pub fn new(rego_name: &str, location: String, engine: Arc<Engine>) -> Self {
        Self {
            engine,
            name: format!("{NAME_PREFIX}{rego_name}"),
            rego_name: rego_name.to_string(),
            location,
            enabled: true,
        }
    }

    pub fn rego_name(&self) -> &str {
        &self.rego_name
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl HostRule for TestRule {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn severity(&self) -> Severity {
        Severity::Error
    }

    fn link(&self) -> String {
        self.location.clone()
    }

    fn check(&self, runner: Arc<dyn Runner>) -> Result<()> {
        for issue in self.engine.run_test(&self.rego_name, runner.clone())? {
            runner.emit_issue(self, &issue.message, &issue.range)?;
        }
        Ok(())
    }
}

/// A rule declaration found in a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    /// `file:line`
    pub location: String,
}

// Root variable of the reference a rule is defined at: `deny_x` for both
// `deny_x contains ...` and `deny_x.y[z] := ...`.
fn rule_name(rule: &RegoRule) -> Option<String> {
    let mut refr: &Expr = match rule {
        RegoRule::Spec { head, .. } => match head {
            RuleHead::Compr { refr, .. }
            | RuleHead::Set { refr, .. }
            | RuleHead::Func { refr, .. } => &**refr,
        },
        RegoRule::Default { refr, .. } => &**refr,
    };
    loop {
        match refr {
            Expr::Var { span, .. } => return Some(span.text().to_string()),
            Expr::RefDot { refr: r, .. } | Expr::RefBrack { refr: r, .. } => refr = &**r,
            _ => return None,
        }
    }
}

/// Top-level rule declarations of the given modules. Only the first
/// declaration of each name is kept.
pub fn declarations(modules: &[(String, String)]) -> Result<Vec<Declaration>> {
    let mut seen = BTreeSet::new();
    let mut out = vec![];

    for (path, rego) in modules {
        let source = Source::from_contents(path.clone(), rego.clone())?;
        let mut parser = Parser::new(&source)?;
        parser.enable_rego_v1()?;
        let module = parser.parse()?;

        for rule in &module.policy {
            let Some(name) = rule_name(rule) else {
                continue;
            };
            if !seen.insert(name.clone()) {
                continue;
            }
            let span = rule.span();
            out.push(Declaration {
                name,
                location: format!("{}:{}", span.source.file(), span.line),
            });
        }
    }

    Ok(out)
}

/// Rules of the engine's policies. Checks are returned normally, tests in
/// test mode. `overrides` is keyed by the host-visible name.
pub fn discover(
    engine: Arc<Engine>,
    test_mode: bool,
    overrides: &BTreeMap<String, RuleConfig>,
) -> Result<Vec<Arc<dyn HostRule>>> {
    let mut rules: Vec<Arc<dyn HostRule>> = vec![];
    let mut unused: BTreeSet<&str> = overrides.keys().map(String::as_str).collect();
    let default = RuleConfig::default();

    for decl in declarations(engine.modules())? {
        let name = format!("{NAME_PREFIX}{}", decl.name);
        let config = overrides.get(&name).unwrap_or(&default);
        let enabled = config.enabled.unwrap_or(true);

        match classify(&decl.name) {
            Some(Classification::Check(severity)) if !test_mode => {
                unused.remove(name.as_str());
                let mut rule = Rule::new(&decl.name, severity, decl.location, engine.clone())
                    .with_enabled(enabled);
                if let Some(severity) = config.severity {
                    rule = rule.with_severity(severity);
                }
                log::debug!(
                    "rule {} ({}, enabled={enabled}) at {}",
                    decl.name,
                    rule.severity(),
                    rule.link()
                );
                rules.push(Arc::new(rule));
            }
            Some(Classification::Test) if test_mode => {
                unused.remove(name.as_str());
                log::debug!("test {} (enabled={enabled}) at {}", decl.name, decl.location);
                let rule =
                    TestRule::new(&decl.name, decl.location, engine.clone()).with_enabled(enabled);
                rules.push(Arc::new(rule));
            }
            _ => log::trace!("skipping {}", decl.name),
        }
    }

    for name in unused {
        log::warn!("rule {name} is configured but not defined by any policy");
    }

    Ok(rules)
}
