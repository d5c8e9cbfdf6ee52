// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Ruleset configuration and policy loading.

use crate::runner::Severity;

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

pub const POLICY_DIRS_ENV: &str = "TFLINT_OPA_POLICY_DIRS";
pub const TRACE_ENV: &str = "TFLINT_OPA_TRACE";
pub const TEST_ENV: &str = "TFLINT_OPA_TEST";

const LOCAL_POLICY_ROOT: &str = "./.tflint.d/policies";
const POLICY_ROOT: &str = "~/.tflint.d/policies";

/// Settings of the `opa` ruleset block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub policy_dir: Option<String>,
    #[serde(default)]
    pub policy_dirs: Vec<String>,
    /// Overrides keyed by rule name, e.g. `opa_deny_x`.
    #[serde(default)]
    pub rules: BTreeMap<String, RuleConfig>,
}

/// Override of a single rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub severity: Option<Severity>,
}

/// Environment flags, read once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settings {
    /// Log evaluation traces at debug level.
    pub trace: bool,
    /// Run `test_` rules instead of checks.
    pub test: bool,
}

fn truthy(v: Option<String>) -> bool {
    matches!(v, Some(v) if !v.is_empty() && v != "false" && v != "0")
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            trace: truthy(env::var(TRACE_ENV).ok()),
            test: truthy(env::var(TEST_ENV).ok()),
        }
    }
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

/// Expands a leading `~`.
pub fn expand_home(dir: &str) -> Result<PathBuf> {
    match dir.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\') => {
            let home = home_dir()
                .ok_or_else(|| anyhow!("cannot expand {dir}; home directory is unknown"))?;
            Ok(home.join(rest.trim_start_matches(['/', '\\'])))
        }
        Some(_) => bail!("cannot expand user-specific home dir: {dir}"),
        None => Ok(PathBuf::from(dir)),
    }
}

/// Directory list resolved from configuration and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDirs {
    pub dirs: Vec<PathBuf>,
    /// Set when falling back to the default home directory, which may
    /// legitimately not exist.
    pub optional: bool,
}

impl Config {
    /// Resolves the directories to load policies from, by priority:
    ///
    /// 1. `policy_dirs` and `policy_dir` of the configuration
    /// 2. `TFLINT_OPA_POLICY_DIRS`, separated by `,`
    /// 3. `./.tflint.d/policies`, if it exists
    /// 4. `~/.tflint.d/policies`
    pub fn policy_dirs(&self) -> Result<PolicyDirs> {
        self.resolve(env::var(POLICY_DIRS_ENV).ok().as_deref())
    }

    fn resolve(&self, env_dirs: Option<&str>) -> Result<PolicyDirs> {
        let configured: Vec<PathBuf> = self
            .policy_dirs
            .iter()
            .chain(self.policy_dir.iter())
            .map(|d| expand_home(d))
            .collect::<Result<_>>()?;
        if !configured.is_empty() {
            return Ok(PolicyDirs {
                dirs: configured,
                optional: false,
            });
        }

        let from_env: Vec<PathBuf> = env_dirs
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(expand_home)
            .collect::<Result<_>>()?;
        if !from_env.is_empty() {
            return Ok(PolicyDirs {
                dirs: from_env,
                optional: false,
            });
        }

        if Path::new(LOCAL_POLICY_ROOT).exists() {
            return Ok(PolicyDirs {
                dirs: vec![PathBuf::from(LOCAL_POLICY_ROOT)],
                optional: false,
            });
        }

        Ok(PolicyDirs {
            dirs: vec![expand_home(POLICY_ROOT)?],
            optional: true,
        })
    }
}

/// Policy modules and data documents read from the policy directories.
#[derive(Debug, Clone, Default)]
pub struct Policies {
    /// `(path, rego)` pairs.
    pub modules: Vec<(String, String)>,
    pub data: Vec<regorus::Value>,
}

impl Policies {
    /// Walks the directories. `*.rego` files are modules; `*.json`,
    /// `*.yaml` and `*.yml` files are data documents rooted at the path of
    /// their directory relative to the policy directory.
    pub fn load(dirs: &PolicyDirs) -> Result<Self> {
        let mut policies = Policies::default();

        for dir in &dirs.dirs {
            if !dir.is_dir() {
                if dirs.optional {
                    log::debug!("policy directory {} does not exist", dir.display());
                    continue;
                }
                bail!("policy directory {} does not exist", dir.display());
            }

            let mut entries: Vec<_> = WalkDir::new(dir)
                .sort_by_file_name()
                .into_iter()
                .collect::<std::result::Result<_, _>>()?;
            entries.retain(|e| e.file_type().is_file());

            for entry in entries {
                let path = entry.path();
                let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
                if !matches!(ext, "rego" | "json" | "yaml" | "yml") {
                    continue;
                }
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                log::trace!("loading {}", path.display());

                if ext == "rego" {
                    policies
                        .modules
                        .push((path.display().to_string(), contents));
                    continue;
                }

                let doc: serde_json::Value = match ext {
                    "json" => serde_json::from_str(&contents)
                        .with_context(|| format!("failed to parse {}", path.display()))?,
                    _ => serde_yaml::from_str(&contents)
                        .with_context(|| format!("failed to parse {}", path.display()))?,
                };

                let rel = path.parent().and_then(|p| p.strip_prefix(dir).ok());
                policies.data.push(serde_json::from_value(root_at(doc, rel))?);
            }
        }

        Ok(policies)
    }
}

// Wraps `doc` into objects named after the components of `rel`.
fn root_at(doc: serde_json::Value, rel: Option<&Path>) -> serde_json::Value {
    let Some(rel) = rel else {
        return doc;
    };
    rel.components().rev().fold(doc, |acc, c| {
        let mut obj = serde_json::Map::new();
        obj.insert(c.as_os_str().to_string_lossy().to_string(), acc);
        serde_json::Value::Object(obj)
    })
}
