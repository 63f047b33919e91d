// SPDX-License-Identifier: Apache-2.0

//! End-to-end chain replay: definition file in, persisted report out

use anyhow::Result;
use nanohil::{
    cancel::CancelToken,
    chain::{ChainRunner, ChainState},
    module::{AttackOutcome, Exploit, ExploitModule, ModuleRegistry, SimulatedModule},
    report,
};
use serde_json::{json, Value};
use std::fs::write;
use tempdir::TempDir;

struct AlwaysSucceeds;

impl ExploitModule for AlwaysSucceeds {
    fn craft_exploit(&self, vuln: &Value, options: &Value) -> nanohil::Result<Exploit> {
        Ok(Exploit {
            target: "test-device".to_string(),
            vuln_type: vuln
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            payload: "integration payload".to_string(),
            success_rate: 1.0,
            options: options.clone(),
        })
    }

    fn simulate_attack(&self, exploit: &Exploit) -> nanohil::Result<AttackOutcome> {
        Ok(AttackOutcome {
            success: true,
            impact: format!("Confirmed {} exposure.", exploit.vuln_type),
            log: format!("Exploited {} on {}", exploit.vuln_type, exploit.target),
        })
    }
}

/// Requests cancellation while its own step is executing
struct CancelsDuringStep {
    token: CancelToken,
}

impl ExploitModule for CancelsDuringStep {
    fn craft_exploit(&self, _vuln: &Value, options: &Value) -> nanohil::Result<Exploit> {
        Ok(Exploit {
            target: "test-device".to_string(),
            vuln_type: "dos".to_string(),
            payload: String::new(),
            success_rate: 1.0,
            options: options.clone(),
        })
    }

    fn simulate_attack(&self, _exploit: &Exploit) -> nanohil::Result<AttackOutcome> {
        self.token.cancel();
        Ok(AttackOutcome {
            success: true,
            impact: "Partial drill.".to_string(),
            log: "Operator aborted mid-chain".to_string(),
        })
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_file_to_report_pipeline() -> Result<()> {
    let dir = TempDir::new("chain-replay")?;
    let chain_path = dir.path().join("hospital.json");
    write(
        &chain_path,
        serde_json::to_string(&json!({
            "name": "hospital chain",
            "chain_steps": [
                {
                    "device_type": "medical",
                    "device_name": "pump1",
                    "action": "exploit",
                    "vuln": {"type": "buffer_overflow", "location": "dose_control"}
                },
                {
                    "device_type": "medical",
                    "device_name": "monitor1",
                    "action": "exfiltrate",
                    "vuln": {"type": "hardcoded_credentials"}
                },
                {
                    "device_type": "hvac",
                    "device_name": "vent1",
                    "action": "probe"
                }
            ]
        }))?,
    )?;

    let mut runner = ChainRunner::load(&chain_path)?;
    runner.validate()?;
    assert_eq!(runner.plan()?.len(), 3);

    let mut registry = ModuleRegistry::new();
    registry.register("medical", Box::new(SimulatedModule::new("medical", "pump1")));
    let results = runner.execute(&registry)?;
    assert_eq!(runner.state(), ChainState::Completed);
    assert_eq!(results.steps.len(), 3);

    // Two module-backed steps, one pass-through for the unregistered type
    assert_eq!(
        results.steps[0].impact,
        "Possible silent takeover or device crash."
    );
    assert_eq!(results.steps[1].impact, "Remote access to device functions.");
    assert_eq!(results.steps[2].impact, "Mock impact.");

    let summary = report::summarize(&results);
    assert_eq!(summary.total_steps, 3);
    assert_eq!(summary.successes, 3);
    assert!(summary.overall_success);

    let report_path = report::persist(
        &results,
        &summary,
        dir.path().join("hospital_attackreplay_report.json"),
    )?;
    let loaded = report::load(&report_path)?;
    assert_eq!(loaded.chain_name, "hospital chain");
    assert_eq!(loaded.results.len(), 3);
    assert_eq!(loaded.summary, summary);

    Ok(())
}

#[test]
fn test_single_step_replay_with_module() -> Result<()> {
    let mut runner = ChainRunner::new(serde_json::from_value(json!({
        "name": "t1",
        "chain_steps": [
            {
                "device_type": "medical",
                "device_name": "pump1",
                "action": "exploit",
                "vuln": {"type": "buffer_overflow"}
            }
        ]
    }))?)?;
    runner.validate()?;
    runner.plan()?;

    let mut registry = ModuleRegistry::new();
    registry.register("medical", Box::new(AlwaysSucceeds));
    let results = runner.execute(&registry)?;

    assert_eq!(results.steps.len(), 1);
    assert!(results.steps[0].success);
    assert!(!results.steps[0].impact.is_empty());
    Ok(())
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_cancelled_chain_persists_partial_report() -> Result<()> {
    let dir = TempDir::new("chain-replay")?;
    let mut runner = ChainRunner::new(serde_json::from_value(json!({
        "name": "aborted",
        "chain_steps": [
            {"device_type": "flaky", "device_name": "d1", "action": "a", "vuln": {"type": "dos"}},
            {"device_type": "flaky", "device_name": "d2", "action": "b", "vuln": {"type": "dos"}},
            {"device_type": "flaky", "device_name": "d3", "action": "c", "vuln": {"type": "dos"}}
        ]
    }))?)?;
    runner.validate()?;
    runner.plan()?;

    let token = CancelToken::new();
    let mut registry = ModuleRegistry::new();
    registry.register(
        "flaky",
        Box::new(CancelsDuringStep {
            token: token.clone(),
        }),
    );

    let results = runner.execute_cancellable(&registry, &token)?;
    assert_eq!(runner.state(), ChainState::Aborted);
    assert_eq!(
        results.steps.len(),
        1,
        "Cancellation after step 1 must record exactly that step"
    );

    // Partial results still make a valid report
    let summary = report::summarize(&results);
    let path = report::persist(&results, &summary, dir.path().join("partial.json"))?;
    let loaded = report::load(&path)?;
    assert_eq!(loaded.results.len(), 1);
    assert_eq!(loaded.summary.total_steps, 1);
    Ok(())
}
