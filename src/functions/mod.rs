// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builtins exposed to policies.
//!
//! Every builtin is declared once with a fixed arity. Builtins that read
//! the configuration through a [`Runner`] also get a mock sibling
//! (`terraform.resources` -> `terraform.mock_resources`) taking the
//! configuration files as an extra trailing argument.

pub mod hcl;
pub mod terraform;
pub mod tflint;
pub mod types;

use crate::runner::Runner;
use crate::tester::TestRunner;
use types::PolicyType;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use serde_json::Value;

/// Declaration of a builtin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decl {
    /// `<namespace>.<name>`
    pub name: String,
    pub args: Vec<PolicyType>,
    pub result: PolicyType,
    /// Results are cached per query for identical arguments.
    pub memoize: bool,
    pub nondeterministic: bool,
}

pub type Impl1 = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;
pub type Impl2 = Arc<dyn Fn(&Value, &Value) -> Result<Value> + Send + Sync>;
pub type Impl3 = Arc<dyn Fn(&Value, &Value, &Value) -> Result<Value> + Send + Sync>;
pub type Impl4 = Arc<dyn Fn(&Value, &Value, &Value, &Value) -> Result<Value> + Send + Sync>;
pub type ImplDyn = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

#[derive(Clone)]
pub enum Function {
    Function1(Decl, Impl1),
    Function2(Decl, Impl2),
    Function3(Decl, Impl3),
    Function4(Decl, Impl4),
    FunctionDyn(Decl, ImplDyn),
}

impl core::fmt::Debug for Function {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Function").field(&self.decl().name).finish()
    }
}

/// A builtin that reads the configuration through the given runner.
pub type HostFunction = fn(Arc<dyn Runner>) -> Function;

impl Function {
    pub fn decl(&self) -> &Decl {
        match self {
            Function::Function1(decl, _)
            | Function::Function2(decl, _)
            | Function::Function3(decl, _)
            | Function::Function4(decl, _)
            | Function::FunctionDyn(decl, _) => decl,
        }
    }

    pub fn name(&self) -> &str {
        &self.decl().name
    }

    pub fn nargs(&self) -> usize {
        self.decl().args.len()
    }

    /// Checks the arguments against the declaration and runs the builtin.
    pub fn invoke(&self, args: &[Value]) -> Result<Value> {
        let decl = self.decl();
        if args.len() != decl.args.len() {
            bail!(
                "{}: expects {} arguments, got {}",
                decl.name,
                decl.args.len(),
                args.len()
            );
        }
        for (idx, (arg, ty)) in args.iter().zip(decl.args.iter()).enumerate() {
            if !ty.accepts(arg) {
                bail!(
                    "{}: invalid argument {}: expected {ty}, got {}",
                    decl.name,
                    idx + 1,
                    crate::range::kind_of(arg)
                );
            }
        }

        match self {
            Function::Function1(_, f) => f(&args[0]),
            Function::Function2(_, f) => f(&args[0], &args[1]),
            Function::Function3(_, f) => f(&args[0], &args[1], &args[2]),
            Function::Function4(_, f) => f(&args[0], &args[1], &args[2], &args[3]),
            Function::FunctionDyn(_, f) => f(args),
        }
    }

    /// Registration used for rule evaluation. Memoized builtins cache their
    /// results for the lifetime of the returned builtin.
    pub fn rego(&self) -> Builtin {
        let cache = if self.decl().memoize {
            Some(Arc::new(Mutex::new(HashMap::new())))
        } else {
            None
        };
        Builtin {
            name: self.decl().name.clone(),
            nargs: self.nargs() as u8,
            function: self.clone(),
            cache,
        }
    }

    /// Registration used when running policy tests. Results are never
    /// cached since a test may call a builtin with different fixtures.
    pub fn tester(&self) -> Builtin {
        Builtin {
            name: self.decl().name.clone(),
            nargs: self.nargs() as u8,
            function: self.clone(),
            cache: None,
        }
    }
}

type Cache = Arc<Mutex<HashMap<String, Value>>>;

/// A builtin ready to be registered with the evaluator.
#[derive(Clone)]
pub struct Builtin {
    pub name: String,
    pub nargs: u8,
    function: Function,
    cache: Option<Cache>,
}

impl Builtin {
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        let Some(cache) = &self.cache else {
            return self.function.invoke(args);
        };

        let key = serde_json::to_string(args)?;
        if let Some(v) = cache.lock().map_err(|_| anyhow!("cache poisoned"))?.get(&key) {
            return Ok(v.clone());
        }
        let v = self.function.invoke(args)?;
        cache
            .lock()
            .map_err(|_| anyhow!("cache poisoned"))?
            .insert(key, v.clone());
        Ok(v)
    }
}

/// Declaration of the mock sibling of `decl`.
///
/// # Panics
///
/// When `decl.name` is not of the form `<namespace>.<name>`.
pub fn mock_decl(decl: &Decl) -> Decl {
    let parts: Vec<&str> = decl.name.split('.').collect();
    let [namespace, name] = parts.as_slice() else {
        panic!("function should be named with \"<namespace>.<name>\", got {}", decl.name);
    };

    let mut args = decl.args.clone();
    args.push(types::FILES.clone());

    Decl {
        name: format!("{namespace}.mock_{name}"),
        args,
        result: decl.result.clone(),
        memoize: decl.memoize,
        nondeterministic: decl.nondeterministic,
    }
}

fn fixture_runner(files: &Value) -> Result<Arc<dyn Runner>> {
    let files: BTreeMap<String, String> = serde_json::from_value(files.clone())?;
    Ok(Arc::new(TestRunner::new(&files)?))
}

/// Derives the mock sibling of a host function. The mock parses its last
/// argument into an in-memory runner and runs the same implementation
/// against it.
pub fn derive_mock(base: HostFunction) -> Function {
    let placeholder: Arc<dyn Runner> = Arc::new(TestRunner::default());
    let template = base(placeholder);
    let decl = mock_decl(template.decl());

    match template {
        Function::Function1(..) => Function::Function2(
            decl,
            Arc::new(move |a: &Value, files: &Value| {
                base(fixture_runner(files)?).invoke(&[a.clone()])
            }),
        ),
        Function::Function2(..) => Function::Function3(
            decl,
            Arc::new(move |a: &Value, b: &Value, files: &Value| {
                base(fixture_runner(files)?).invoke(&[a.clone(), b.clone()])
            }),
        ),
        Function::Function3(..) => Function::Function4(
            decl,
            Arc::new(move |a: &Value, b: &Value, c: &Value, files: &Value| {
                base(fixture_runner(files)?).invoke(&[a.clone(), b.clone(), c.clone()])
            }),
        ),
        Function::Function4(..) | Function::FunctionDyn(..) => {
            panic!("{}: mock functions take at most 4 arguments", template.name())
        }
    }
}

/// Builtins reading the configuration through a runner.
pub const HOST_FUNCTIONS: &[HostFunction] = &[
    terraform::resources,
    terraform::data_sources,
    terraform::ephemeral_resources,
    terraform::actions,
    terraform::module_calls,
    terraform::providers,
    terraform::settings,
    terraform::variables,
    terraform::outputs,
    terraform::checks,
    terraform::locals,
    terraform::moved_blocks,
    terraform::imports,
    terraform::removed_blocks,
];

/// All live builtins bound to `runner`.
pub fn functions(runner: Arc<dyn Runner>) -> Vec<Function> {
    let mut out: Vec<Function> = HOST_FUNCTIONS.iter().map(|f| f(runner.clone())).collect();
    out.push(terraform::module_range(runner));
    out.push(tflint::issue());
    out.push(hcl::expr_list());
    out.push(hcl::expr_map());
    out.push(hcl::expr_call());
    out
}

/// Mock siblings of all host functions. They are registered in every mode
/// so that policies referring to them always compile.
pub fn mock_functions() -> Vec<Function> {
    HOST_FUNCTIONS.iter().map(|f| derive_mock(*f)).collect()
}

/// Decodes a string argument.
pub(crate) fn as_str<'a>(v: &'a Value, path: &str) -> Result<&'a str> {
    v.as_str()
        .ok_or_else(|| anyhow!("{path} is not string, got {}", crate::range::kind_of(v)))
}
