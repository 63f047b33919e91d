// SPDX-License-Identifier: Apache-2.0

//! Exploit module capability and registry. The chain engine never interprets
//! vulnerability semantics itself: any type that can craft an exploit for a
//! vulnerability reference and simulate the attack is a valid module, selected by
//! device-type key at plan time. Polymorphism is by capability, never inheritance:
//! medical, automotive, industrial, consumer, and smart-city modules all register
//! behind the same trait.

use crate::{
    cancel::CancelToken,
    emulator::HilEmulator,
    outcome::{OutcomeSource, Threshold},
    sandbox::RunConfig,
    Error, Result,
};
use serde::Serialize;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::Mutex,
};
use tracing::debug;

/// A crafted exploit, ready to be simulated
#[derive(Debug, Clone, Serialize)]
pub struct Exploit {
    pub target: String,
    pub vuln_type: String,
    pub payload: String,
    pub success_rate: f64,
    pub options: Value,
}

/// The result of simulating one attack
#[derive(Debug, Clone, Serialize)]
pub struct AttackOutcome {
    pub success: bool,
    pub impact: String,
    pub log: String,
}

/// Capability pair every exploit module provides. Vulnerability references and
/// options are opaque JSON to the core.
pub trait ExploitModule: Send + Sync {
    fn craft_exploit(&self, vuln: &Value, options: &Value) -> Result<Exploit>;
    fn simulate_attack(&self, exploit: &Exploit) -> Result<AttackOutcome>;
}

/// Registry mapping device-type keys to exploit modules, resolved once per step at
/// execution time
#[derive(Default)]
pub struct ModuleRegistry {
    modules: HashMap<String, Box<dyn ExploitModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<S>(&mut self, device_type: S, module: Box<dyn ExploitModule>)
    where
        S: Into<String>,
    {
        self.modules.insert(device_type.into(), module);
    }

    pub fn get(&self, device_type: &str) -> Option<&dyn ExploitModule> {
        self.modules.get(device_type).map(|m| m.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Deterministic simulation module for one device category. Success is decided by
/// an injected [`OutcomeSource`] (threshold by default, seeded PRNG for simulation
/// modes); impact comes from a vulnerability-type table.
pub struct SimulatedModule {
    device_type: String,
    device_name: String,
    success_rate: f64,
    outcomes: Mutex<Box<dyn OutcomeSource>>,
}

impl SimulatedModule {
    pub const DEFAULT_SUCCESS_RATE: f64 = 0.85;

    pub fn new<T, N>(device_type: T, device_name: N) -> Self
    where
        T: Into<String>,
        N: Into<String>,
    {
        Self::with_outcomes(device_type, device_name, Box::new(Threshold::default()))
    }

    pub fn with_outcomes<T, N>(
        device_type: T,
        device_name: N,
        outcomes: Box<dyn OutcomeSource>,
    ) -> Self
    where
        T: Into<String>,
        N: Into<String>,
    {
        Self {
            device_type: device_type.into(),
            device_name: device_name.into(),
            success_rate: Self::DEFAULT_SUCCESS_RATE,
            outcomes: Mutex::new(outcomes),
        }
    }

    pub fn success_rate(mut self, success_rate: f64) -> Self {
        self.success_rate = success_rate;
        self
    }

    fn estimate_impact(vuln_type: &str) -> &'static str {
        match vuln_type {
            "buffer_overflow" => "Possible silent takeover or device crash.",
            "hardcoded_credentials" => "Remote access to device functions.",
            "weak_crypto" => "Firmware update interception or manipulation.",
            "replay_attack" => "Command injection through replayed traffic.",
            "dos" => "Device unavailable to operators.",
            _ => "Unknown impact.",
        }
    }
}

impl ExploitModule for SimulatedModule {
    fn craft_exploit(&self, vuln: &Value, options: &Value) -> Result<Exploit> {
        let vuln_type = vuln
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Module {
                device_type: self.device_type.clone(),
                reason: "vulnerability reference has no type".to_string(),
            })?
            .to_string();
        let location = vuln
            .get("location")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        debug!(
            "Crafting {} exploit for {} at {}",
            self.device_type, vuln_type, location
        );
        Ok(Exploit {
            target: self.device_name.clone(),
            vuln_type: vuln_type.clone(),
            payload: format!("exploit payload for {} at {}", vuln_type, location),
            success_rate: self.success_rate,
            options: options.clone(),
        })
    }

    fn simulate_attack(&self, exploit: &Exploit) -> Result<AttackOutcome> {
        let success = self
            .outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .decide(exploit.success_rate);
        Ok(AttackOutcome {
            success,
            impact: Self::estimate_impact(&exploit.vuln_type).to_string(),
            log: format!(
                "Attack simulated on {} for {}",
                exploit.target, exploit.vuln_type
            ),
        })
    }
}

/// Exploit module backed by the HIL emulator: every simulated attack is one real
/// (or mock) emulation run of the configured firmware+payload pair, and the
/// outcome reflects the run's exit status and risk score.
pub struct HilModule {
    emulator: HilEmulator,
    config: RunConfig,
    cancel: CancelToken,
}

impl HilModule {
    pub fn new(emulator: HilEmulator, config: RunConfig, cancel: CancelToken) -> Self {
        Self {
            emulator,
            config,
            cancel,
        }
    }
}

impl ExploitModule for HilModule {
    fn craft_exploit(&self, vuln: &Value, options: &Value) -> Result<Exploit> {
        let vuln_type = vuln
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        Ok(Exploit {
            target: self.emulator.target().to_string(),
            vuln_type,
            payload: self.config.payload().display().to_string(),
            success_rate: 1.0,
            options: options.clone(),
        })
    }

    fn simulate_attack(&self, exploit: &Exploit) -> Result<AttackOutcome> {
        let output = self
            .emulator
            .run_cancellable(&self.config, &self.cancel)
            .map_err(|e| Error::Module {
                device_type: exploit.target.clone(),
                reason: e.to_string(),
            })?;
        Ok(AttackOutcome {
            success: output.execution.status().is_success(),
            impact: format!(
                "Risk {:.2} ({}) on {} backend",
                output.risk.score(),
                output.risk.rule(),
                output.execution.backend()
            ),
            log: format!(
                "HIL run of {} for {}: {:?} in {}ms",
                exploit.payload,
                exploit.vuln_type,
                output.execution.status(),
                output.execution.duration().as_millis()
            ),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::Result;
    use serde_json::json;

    #[test]
    fn test_craft_fields() -> Result<()> {
        let module = SimulatedModule::new("medical", "pump1");
        let exploit = module.craft_exploit(
            &json!({"type": "buffer_overflow", "location": "dose_control"}),
            &json!({"stealth": true}),
        )?;
        assert_eq!(exploit.target, "pump1");
        assert_eq!(exploit.vuln_type, "buffer_overflow");
        assert!(exploit.payload.contains("dose_control"));
        assert_eq!(exploit.options["stealth"], json!(true));
        Ok(())
    }

    #[test]
    fn test_craft_requires_vuln_type() {
        let module = SimulatedModule::new("medical", "pump1");
        assert!(matches!(
            module.craft_exploit(&json!({"location": "x"}), &json!({})),
            Err(Error::Module {
                device_type: _,
                reason: _
            })
        ));
    }

    #[test]
    fn test_default_outcome_is_deterministic() -> Result<()> {
        let module = SimulatedModule::new("medical", "pump1");
        let exploit = module.craft_exploit(&json!({"type": "weak_crypto"}), &json!({}))?;
        let first = module.simulate_attack(&exploit)?;
        let second = module.simulate_attack(&exploit)?;
        assert_eq!(first.success, second.success);
        assert!(first.success, "Default rate clears the default threshold");
        assert_eq!(first.impact, "Firmware update interception or manipulation.");
        Ok(())
    }

    #[test]
    fn test_low_rate_fails_deterministically() -> Result<()> {
        let module = SimulatedModule::new("medical", "pump1").success_rate(0.1);
        let exploit = module.craft_exploit(&json!({"type": "dos"}), &json!({}))?;
        assert!(!module.simulate_attack(&exploit)?.success);
        Ok(())
    }

    #[test]
    fn test_registry_dispatch() -> Result<()> {
        let mut registry = ModuleRegistry::new();
        registry.register("medical", Box::new(SimulatedModule::new("medical", "pump1")));
        assert!(registry.get("medical").is_some());
        assert!(registry.get("automotive").is_none());
        Ok(())
    }
}
