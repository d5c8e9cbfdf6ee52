// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Policies written in Rego inspecting Terraform configuration.
//!
//! Configuration content is exposed to policies through builtins such as
//! `terraform.resources`, which return JSON documents annotated with
//! source ranges. Rules named `deny_*`, `violation_*`, `warn_*` and
//! `notice_*` in package `tflint` become checks; `test_*` rules become
//! tests run against mock configuration.

pub mod config;
pub mod conversion;
pub mod engine;
pub mod functions;
pub mod hcl;
pub mod range;
pub mod rule;
pub mod ruleset;
pub mod runner;
pub mod schema;
pub mod strict;
pub mod tester;

pub use config::{Config, Policies, PolicyDirs, RuleConfig, Settings};
pub use engine::{Engine, Issue};
pub use rule::{Rule, TestRule};
pub use ruleset::RuleSet;
pub use runner::{
    EvaluateExprOption, ExpandMode, GetModuleContentOption, HostRule, Runner, RunnerError,
    Severity,
};
pub use tester::TestRunner;

#[cfg(test)]
mod tests;
