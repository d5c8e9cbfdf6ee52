// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::config::{Policies, RuleConfig, Settings};
use crate::engine::Engine;
use crate::rule::*;
use crate::ruleset::RuleSet;
use crate::runner::Severity;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;

const MAIN_REGO: &str = r#"package tflint

deny_x contains "x" if {
	false
}

violation_v contains "v" if {
	false
}

warn_w contains "w" if {
	false
}

notice_n contains "n" if {
	false
}

test_t if {
	true
}

default other := false

helper(x) := x
"#;

const MORE_REGO: &str = r#"package tflint

deny_x contains "more" if {
	true
}

default deny_d := false
"#;

fn policies() -> Policies {
    Policies {
        modules: vec![
            ("policies/main.rego".to_string(), MAIN_REGO.to_string()),
            ("policies/more.rego".to_string(), MORE_REGO.to_string()),
        ],
        data: vec![],
    }
}

#[test]
fn classification() {
    let cases = [
        ("deny_x", Some(Classification::Check(Severity::Error))),
        ("violation_x", Some(Classification::Check(Severity::Error))),
        ("warn_x", Some(Classification::Check(Severity::Warning))),
        ("notice_x", Some(Classification::Check(Severity::Notice))),
        ("test_x", Some(Classification::Test)),
        ("other_x", None),
        ("deny", None),
    ];
    for (name, want) in cases {
        assert_eq!(classify(name), want, "{name}");
    }
}

#[test]
fn first_declaration_wins() -> Result<()> {
    let decls = declarations(&policies().modules)?;
    let names: Vec<&str> = decls.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "deny_x",
            "violation_v",
            "warn_w",
            "notice_n",
            "test_t",
            "other",
            "helper",
            "deny_d"
        ]
    );
    assert_eq!(decls[0].location, "policies/main.rego:3");
    assert_eq!(decls[7].location, "policies/more.rego:7");
    Ok(())
}

#[test]
fn checks() -> Result<()> {
    let engine = Arc::new(Engine::new(&policies(), &Settings::default())?);
    let rules = discover(engine, false, &BTreeMap::new())?;

    let got: Vec<(String, Severity, String)> = rules
        .iter()
        .map(|r| (r.name(), r.severity(), r.link()))
        .collect();
    assert_eq!(
        got,
        vec![
            (
                "opa_deny_x".to_string(),
                Severity::Error,
                "policies/main.rego:3".to_string()
            ),
            (
                "opa_violation_v".to_string(),
                Severity::Error,
                "policies/main.rego:7".to_string()
            ),
            (
                "opa_warn_w".to_string(),
                Severity::Warning,
                "policies/main.rego:11".to_string()
            ),
            (
                "opa_notice_n".to_string(),
                Severity::Notice,
                "policies/main.rego:15".to_string()
            ),
            (
                "opa_deny_d".to_string(),
                Severity::Error,
                "policies/more.rego:7".to_string()
            ),
        ]
    );
    assert!(rules.iter().all(|r| r.enabled()));
    Ok(())
}

#[test]
fn tests_in_test_mode() -> Result<()> {
    let engine = Arc::new(Engine::new(&policies(), &Settings::default())?);
    let rules = discover(engine, true, &BTreeMap::new())?;

    let names: Vec<String> = rules.iter().map(|r| r.name()).collect();
    assert_eq!(names, vec!["opa_test_t"]);
    assert_eq!(rules[0].severity(), Severity::Error);
    Ok(())
}

#[test]
fn ruleset() -> Result<()> {
    let mut ruleset = RuleSet::new();
    assert_eq!(ruleset.name(), "opa");
    assert!(ruleset.rules().is_empty());

    ruleset.apply_policies(&policies(), &BTreeMap::new(), &Settings::default())?;
    assert_eq!(ruleset.rule_names().len(), 5);
    assert!(ruleset.engine().is_some());

    ruleset.apply_policies(
        &policies(),
        &BTreeMap::new(),
        &Settings {
            test: true,
            ..Settings::default()
        },
    )?;
    assert_eq!(ruleset.rule_names(), vec!["opa_test_t"]);
    Ok(())
}

#[test]
fn invalid_policy() {
    let policies = Policies {
        modules: vec![("bad.rego".to_string(), "package tflint\n\ndeny_x contains".to_string())],
        data: vec![],
    };
    match RuleSet::new().apply_policies(&policies, &BTreeMap::new(), &Settings::default()) {
        Ok(_) => panic!("invalid policy was accepted"),
        Err(e) => {
            let e = e.to_string();
            assert!(e.starts_with("failed to initialize a policy engine; "), "{e}");
            assert!(e.contains("bad.rego"), "{e}");
        }
    }
}

#[test]
fn names_from_rule_heads() -> Result<()> {
    let modules = vec![(
        "heads.rego".to_string(),
        r#"package tflint

deny_obj[k] := 1 if {
	some k in ["a"]
}

warn_nested.inner := "x" if {
	false
}

default  notice_spaced := false

deny_fn(x) := x
"#
        .to_string(),
    )];
    let names: Vec<String> = declarations(&modules)?.into_iter().map(|d| d.name).collect();
    assert_eq!(
        names,
        vec!["deny_obj", "warn_nested", "notice_spaced", "deny_fn"]
    );
    Ok(())
}

#[test]
fn rule_overrides() -> Result<()> {
    let engine = Arc::new(Engine::new(&policies(), &Settings::default())?);
    let overrides = BTreeMap::from([
        (
            "opa_deny_x".to_string(),
            RuleConfig {
                enabled: Some(false),
                severity: None,
            },
        ),
        (
            "opa_warn_w".to_string(),
            RuleConfig {
                enabled: None,
                severity: Some(Severity::Error),
            },
        ),
        (
            "opa_undefined".to_string(),
            RuleConfig {
                enabled: Some(false),
                severity: None,
            },
        ),
    ]);
    let rules = discover(engine, false, &overrides)?;

    let got: Vec<(String, bool, Severity)> = rules
        .iter()
        .map(|r| (r.name(), r.enabled(), r.severity()))
        .collect();
    assert_eq!(
        got,
        vec![
            ("opa_deny_x".to_string(), false, Severity::Error),
            ("opa_violation_v".to_string(), true, Severity::Error),
            ("opa_warn_w".to_string(), true, Severity::Error),
            ("opa_notice_n".to_string(), true, Severity::Notice),
            ("opa_deny_d".to_string(), true, Severity::Error),
        ]
    );
    Ok(())
}

#[test]
fn unused_assignment() {
    let policies = Policies {
        modules: vec![(
            "main.rego".to_string(),
            r#"package tflint

deny_test contains issue if {
	unused := "foo"
	issue := tflint.issue("x", terraform.module_range())
}
"#
            .to_string(),
        )],
        data: vec![],
    };
    match RuleSet::new().apply_policies(&policies, &BTreeMap::new(), &Settings::default()) {
        Ok(_) => panic!("unused assignment was accepted"),
        Err(e) => assert_eq!(
            e.to_string(),
            "failed to initialize a policy engine; 1 error occurred: main.rego:4: rego_compile_error: assigned var unused unused"
        ),
    }
}

#[test]
fn used_assignments() -> Result<()> {
    let policies = Policies {
        modules: vec![(
            "main.rego".to_string(),
            r#"package tflint

deny_test contains issue if {
	[first, _] := ["a", "b"]
	v := first
	names := [n | some n in [v]]
	count(names) > 5
	issue := tflint.issue("x", terraform.module_range())
}
"#
            .to_string(),
        )],
        data: vec![],
    };
    Engine::new(&policies, &Settings::default())?;
    Ok(())
}

#[test]
fn mocks_are_derived_with_the_engine() -> Result<()> {
    let engine = Engine::new(&policies(), &Settings::default())?;
    let names: Vec<&str> = engine.mocks().iter().map(|f| f.name()).collect();
    assert!(names.contains(&"terraform.mock_resources"), "{names:?}");
    assert!(names.iter().all(|n| n.contains(".mock_")), "{names:?}");
    Ok(())
}
