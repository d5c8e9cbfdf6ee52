// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::config::{Config, Policies, RuleConfig, Settings};
use crate::engine::Engine;
use crate::rule::discover;
use crate::runner::{HostRule, Runner};

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};

/// The `opa` ruleset. Its rules are defined by the loaded policies.
#[derive(Default)]
pub struct RuleSet {
    engine: Option<Arc<Engine>>,
    rules: Vec<Arc<dyn HostRule>>,
}

impl RuleSet {
    pub const NAME: &'static str = "opa";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(&self) -> &'static str {
        Self::NAME
    }

    pub fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Loads the policies and discovers their rules.
    pub fn apply_config(&mut self, config: &Config, settings: &Settings) -> Result<()> {
        let dirs = config.policy_dirs()?;
        let policies =
            Policies::load(&dirs).map_err(|e| anyhow!("failed to load policies; {e:#}"))?;
        self.apply_policies(&policies, &config.rules, settings)
    }

    /// Builds the engine from already loaded policies and applies the rule
    /// overrides to the discovered rules.
    pub fn apply_policies(
        &mut self,
        policies: &Policies,
        overrides: &BTreeMap<String, RuleConfig>,
        settings: &Settings,
    ) -> Result<()> {
        let engine = Arc::new(
            Engine::new(policies, settings)
                .map_err(|e| anyhow!("failed to initialize a policy engine; {e:#}"))?,
        );
        self.rules = discover(engine.clone(), settings.test, overrides)?;
        self.engine = Some(engine);
        Ok(())
    }

    pub fn engine(&self) -> Option<&Arc<Engine>> {
        self.engine.as_ref()
    }

    pub fn rules(&self) -> &[Arc<dyn HostRule>] {
        &self.rules
    }

    pub fn rule_names(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Runs every enabled rule against the runner.
    pub fn check(&self, runner: Arc<dyn Runner>) -> Result<()> {
        for rule in self.rules.iter().filter(|r| r.enabled()) {
            rule.check(runner.clone())
                .map_err(|e| anyhow!("failed to check \"{}\" rule; {e}", rule.name()))?;
        }
        Ok(())
    }
}
