// SPDX-License-Identifier: Apache-2.0

//! Declarative attack chains: loading, validation, planning, and strictly
//! sequential execution.
//!
//! A chain execution moves through `Loaded -> Validated -> Planned -> Executing ->
//! Completed`, or ends in `Aborted` on validation failure or cancellation. Steps
//! run in declared order only: later steps may depend on device or world state
//! mutated by earlier ones, so there is no reordering and no parallelism within a
//! chain. The chain is fail-open: a failed step is recorded and the remaining
//! steps still run, because red-team chains want full-chain visibility over
//! early-exit efficiency.
//!
//! Two artifact shapes are accepted: the replay form (`chain_steps` with inline
//! `device_type`/`device_name` per step) and the scenario form (`attack_chain`
//! steps referencing a declared `devices` list by `device`).

use crate::{
    cancel::CancelToken,
    module::{AttackOutcome, ModuleRegistry},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{collections::HashSet, fs::read_to_string, path::Path, time::Instant};
use strum::Display;
use tracing::{info, warn};

/// A device declared by a scenario, referenced by steps through its name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub name: String,
    #[serde(rename = "type", alias = "device_type")]
    pub device_type: String,
    #[serde(default, flatten)]
    pub profile: Map<String, Value>,
}

fn default_action() -> String {
    "unknown".to_string()
}

/// One entry in a chain definition. Read-only once the chain is loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStep {
    /// Scenario form: reference to a declared device by name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Replay form: inline device type, no declaration needed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(default = "default_action")]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vuln: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl ChainStep {
    /// Vulnerability reference, either inline or nested under scenario-form params
    fn vuln(&self) -> Option<&Value> {
        self.vuln
            .as_ref()
            .or_else(|| self.params.as_ref().and_then(|p| p.get("vuln")))
    }

    fn options(&self) -> Value {
        self.options
            .clone()
            .or_else(|| {
                self.params
                    .as_ref()
                    .and_then(|p| p.get("options"))
                    .cloned()
            })
            .unwrap_or_else(|| Value::Object(Map::new()))
    }
}

/// A declarative multi-step chain plus metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub devices: Vec<DeviceProfile>,
    #[serde(default, rename = "chain_steps", alias = "attack_chain")]
    pub steps: Vec<ChainStep>,
}

impl ChainDefinition {
    /// Parse a chain definition from a JSON file. Unreadable sources, parse
    /// failures, a missing name, and an empty step list are all `MalformedChain`.
    pub fn load<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let source = read_to_string(path).map_err(|e| Error::MalformedChain {
            reason: format!("unreadable chain source {}: {}", path.display(), e),
        })?;
        let definition: Self =
            serde_json::from_str(&source).map_err(|e| Error::MalformedChain {
                reason: format!("invalid chain JSON in {}: {}", path.display(), e),
            })?;
        definition.check_structure()?;
        Ok(definition)
    }

    fn check_structure(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::MalformedChain {
                reason: "chain has no name".to_string(),
            });
        }
        if self.steps.is_empty() {
            return Err(Error::MalformedChain {
                reason: format!("chain {} has no steps", self.name),
            });
        }
        Ok(())
    }
}

/// A step resolved to a concrete device descriptor
#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub device: DeviceDescriptor,
    pub action: String,
    pub vuln: Option<Value>,
    pub options: Value,
}

#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    pub name: String,
    pub device_type: String,
    pub profile: Map<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    steps: Vec<PlannedStep>,
}

impl ExecutionPlan {
    pub fn steps(&self) -> &[PlannedStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Outcome of one executed step. Appended in order, never skipped: every planned
/// step produces exactly one result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub device: String,
    pub action: String,
    pub success: bool,
    pub impact: String,
    pub log: String,
    #[serde(default)]
    pub elapsed_ms: u64,
}

/// The ordered outcomes of one chain execution. Owned by the engine while the
/// chain runs, handed by value to reporting afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainResult {
    pub chain_name: String,
    pub steps: Vec<StepResult>,
}

impl ChainResult {
    /// Overall success is the logical AND of all step successes
    pub fn overall_success(&self) -> bool {
        self.steps.iter().all(|s| s.success)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ChainState {
    Loaded,
    Validated,
    Planned,
    Executing,
    Completed,
    Aborted,
}

/// Drives one chain through its lifecycle
#[derive(Debug)]
pub struct ChainRunner {
    chain: ChainDefinition,
    state: ChainState,
    plan: Option<ExecutionPlan>,
}

impl ChainRunner {
    pub fn load<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        Self::new(ChainDefinition::load(path)?)
    }

    pub fn new(chain: ChainDefinition) -> Result<Self> {
        chain.check_structure()?;
        Ok(Self {
            chain,
            state: ChainState::Loaded,
            plan: None,
        })
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    pub fn chain(&self) -> &ChainDefinition {
        &self.chain
    }

    /// Validate the chain: declared device names must be unique, and scenario-form
    /// steps must reference declared devices. Non-mutating over the definition and
    /// repeatable; a failure moves the runner to `Aborted`.
    pub fn validate(&mut self) -> Result<()> {
        match self.check_valid() {
            Ok(()) => {
                self.state = ChainState::Validated;
                Ok(())
            }
            Err(e) => {
                self.state = ChainState::Aborted;
                Err(e)
            }
        }
    }

    fn check_valid(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for device in &self.chain.devices {
            if !seen.insert(device.name.as_str()) {
                return Err(Error::Validation {
                    reason: format!("duplicate device name {}", device.name),
                });
            }
        }
        for (index, step) in self.chain.steps.iter().enumerate() {
            if let Some(reference) = &step.device {
                if !seen.contains(reference.as_str()) {
                    return Err(Error::Validation {
                        reason: format!(
                            "step {} references undeclared device {}",
                            index, reference
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    /// Resolve each step to a concrete device descriptor. Steps with no resolvable
    /// target are dropped with a warning rather than failing the chain: partial
    /// plans are an explicit policy.
    pub fn plan(&mut self) -> Result<&ExecutionPlan> {
        if !matches!(self.state, ChainState::Validated | ChainState::Planned) {
            return Err(Error::ChainState {
                expected: ChainState::Validated.to_string(),
                found: self.state.to_string(),
            });
        }

        let mut steps = Vec::with_capacity(self.chain.steps.len());
        for (index, step) in self.chain.steps.iter().enumerate() {
            let device = if let Some(reference) = &step.device {
                match self.chain.devices.iter().find(|d| &d.name == reference) {
                    Some(declared) => DeviceDescriptor {
                        name: declared.name.clone(),
                        device_type: declared.device_type.clone(),
                        profile: declared.profile.clone(),
                    },
                    None => {
                        warn!(
                            "Dropping step {} of chain {}: device {} not found",
                            index, self.chain.name, reference
                        );
                        continue;
                    }
                }
            } else if let Some(device_type) = &step.device_type {
                DeviceDescriptor {
                    name: step
                        .device_name
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string()),
                    device_type: device_type.clone(),
                    profile: Map::new(),
                }
            } else {
                warn!(
                    "Dropping step {} of chain {}: no resolvable target device",
                    index, self.chain.name
                );
                continue;
            };

            steps.push(PlannedStep {
                device,
                action: step.action.clone(),
                vuln: step.vuln().cloned(),
                options: step.options(),
            });
        }

        info!(
            "Planned chain {}: {} of {} steps",
            self.chain.name,
            steps.len(),
            self.chain.steps.len()
        );
        self.plan = Some(ExecutionPlan { steps });
        self.state = ChainState::Planned;
        Ok(self.plan.as_ref().unwrap_or(&EMPTY_PLAN))
    }

    /// Execute the plan in declared order. See [`execute_cancellable`](Self::execute_cancellable).
    pub fn execute(&mut self, registry: &ModuleRegistry) -> Result<ChainResult> {
        self.execute_cancellable(registry, &CancelToken::new())
    }

    /// Execute the plan in declared order, strictly sequentially. Every step
    /// produces exactly one result: a registered module with a vulnerability
    /// reference runs craft+simulate (its outcome copied verbatim, a module error
    /// recorded as a failed step), anything else passes through in mock mode. The
    /// chain is fail-open; step failures never halt it. Cancellation between steps
    /// stops the chain, moves it to `Aborted`, and returns the partial results
    /// accumulated so far.
    pub fn execute_cancellable(
        &mut self,
        registry: &ModuleRegistry,
        cancel: &CancelToken,
    ) -> Result<ChainResult> {
        let plan = self.plan.clone().ok_or_else(|| Error::ChainState {
            expected: ChainState::Planned.to_string(),
            found: self.state.to_string(),
        })?;

        self.state = ChainState::Executing;
        let mut results = Vec::with_capacity(plan.len());
        let mut aborted = false;

        for step in plan.steps() {
            if cancel.is_cancelled() {
                warn!(
                    "Chain {} cancelled after {} of {} steps",
                    self.chain.name,
                    results.len(),
                    plan.len()
                );
                aborted = true;
                break;
            }

            let started = Instant::now();
            let outcome = run_step(step, registry);
            let result = StepResult {
                device: step.device.name.clone(),
                action: step.action.clone(),
                success: outcome.success,
                impact: outcome.impact,
                log: outcome.log,
                elapsed_ms: started.elapsed().as_millis() as u64,
            };
            info!(
                "Chain {} step on {}: action={} success={}",
                self.chain.name, result.device, result.action, result.success
            );
            results.push(result);
        }

        self.state = if aborted {
            ChainState::Aborted
        } else {
            ChainState::Completed
        };

        Ok(ChainResult {
            chain_name: self.chain.name.clone(),
            steps: results,
        })
    }
}

static EMPTY_PLAN: ExecutionPlan = ExecutionPlan { steps: Vec::new() };

fn run_step(step: &PlannedStep, registry: &ModuleRegistry) -> AttackOutcome {
    match (registry.get(&step.device.device_type), &step.vuln) {
        (Some(module), Some(vuln)) => {
            match module
                .craft_exploit(vuln, &step.options)
                .and_then(|exploit| module.simulate_attack(&exploit))
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        "Module for {} failed on {}: {}",
                        step.device.device_type, step.device.name, e
                    );
                    AttackOutcome {
                        success: false,
                        impact: format!("Module failure: {}", e),
                        log: format!(
                            "Step {} on {} failed in the {} module",
                            step.action, step.device.name, step.device.device_type
                        ),
                    }
                }
            }
        }
        // Pass-through mode: no module for the device type, or no vulnerability
        // reference. A synthetic outcome keeps the aggregate complete.
        _ => AttackOutcome {
            success: true,
            impact: "Mock impact.".to_string(),
            log: format!("Replayed {} on {} (mock)", step.action, step.device.name),
        },
    }
}
