// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Contract between the ruleset and the linter that hosts it.

use crate::hcl::{BodyContent, BodySchema, Expr, File, Range, Value};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Distinguished failures reported by a [`Runner`].
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The value is confidential and the host refuses to materialize it.
    #[error("sensitive value cannot be retrieved")]
    Sensitive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandMode {
    /// Expand `count`/`for_each` and dynamic blocks.
    Expand,
    /// Return declarations as written.
    None,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetModuleContentOption {
    pub expand_mode: Option<ExpandMode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluateExprOption {
    pub expand_mode: Option<ExpandMode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Notice,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Notice => "NOTICE",
        })
    }
}

/// Access to the configuration being linted.
pub trait Runner: Send + Sync {
    /// Content of the root module matching `schema`.
    fn get_module_content(
        &self,
        schema: &BodySchema,
        opts: Option<&GetModuleContentOption>,
    ) -> Result<BodyContent>;

    /// Value of an expression of the module. Confidential values are either
    /// returned marked or rejected with [`RunnerError::Sensitive`].
    fn evaluate_expr(&self, expr: &Expr, opts: Option<&EvaluateExprOption>) -> Result<Value>;

    /// Parsed files of the module keyed by file name.
    fn get_files(&self) -> Result<BTreeMap<String, File>>;

    fn emit_issue(&self, rule: &dyn HostRule, message: &str, range: &Range) -> Result<()>;
}

/// A check as seen by the host.
pub trait HostRule: Send + Sync {
    fn name(&self) -> String;

    fn enabled(&self) -> bool;

    fn severity(&self) -> Severity;

    fn link(&self) -> String {
        String::new()
    }

    fn check(&self, runner: Arc<dyn Runner>) -> Result<()>;
}
