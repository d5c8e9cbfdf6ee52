// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::types::{self, PolicyType};
use super::{Decl, Function};

use std::sync::Arc;

use serde_json::json;

/// `tflint.issue(msg, range)`: the issue document a rule returns.
pub fn issue() -> Function {
    Function::Function2(
        Decl {
            name: "tflint.issue".to_string(),
            args: vec![PolicyType::String, types::RANGE.clone()],
            result: types::ISSUE.clone(),
            memoize: true,
            nondeterministic: false,
        },
        Arc::new(|msg: &serde_json::Value, range: &serde_json::Value| {
            Ok(json!({
                "msg": msg,
                "range": range,
            }))
        }),
    )
}
