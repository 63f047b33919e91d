// SPDX-License-Identifier: Apache-2.0

//! Blue-team drill simulation: load a drill configuration of incidents and defense
//! strategies, plan a response per incident, and simulate whether each response
//! holds. Outcomes are a deterministic function of incident severity and chosen
//! action so drills are reproducible.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    fs::{read_to_string, write},
    path::{Path, PathBuf},
};
use tracing::info;

fn default_severity() -> String {
    "medium".to_string()
}

fn default_scenario_name() -> String {
    "UnnamedDrill".to_string()
}

/// One simulated incident the defenders must respond to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_severity")]
    pub severity: String,
    #[serde(default, flatten)]
    pub details: Map<String, Value>,
}

/// A defense strategy keyed by the incident type it responds to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub incident_type: String,
    pub action: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrillConfig {
    #[serde(default = "default_scenario_name")]
    pub scenario_name: String,
    #[serde(default)]
    pub incidents: Vec<Incident>,
    #[serde(default)]
    pub defense_strategies: Vec<Strategy>,
}

/// The recorded response to one incident
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefenseResult {
    pub incident_type: String,
    pub severity: String,
    pub action: String,
    pub success: bool,
    pub log: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrillReport {
    pub scenario_name: String,
    pub defense_results: Vec<DefenseResult>,
}

impl DrillConfig {
    pub fn load<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let source = read_to_string(path).map_err(|e| Error::MalformedDrill {
            reason: format!("unreadable drill source {}: {}", path.display(), e),
        })?;
        let config: Self = serde_json::from_str(&source).map_err(|e| Error::MalformedDrill {
            reason: format!("invalid drill JSON in {}: {}", path.display(), e),
        })?;
        if config.incidents.is_empty() {
            return Err(Error::MalformedDrill {
                reason: format!("drill {} has no incidents", config.scenario_name),
            });
        }
        Ok(config)
    }

    /// Pick the first declared strategy matching the incident type; fall back to
    /// isolating the device when no strategy is declared
    pub fn plan_defense(&self, incident: &Incident) -> Strategy {
        self.defense_strategies
            .iter()
            .find(|s| s.incident_type == incident.kind)
            .cloned()
            .unwrap_or_else(|| Strategy {
                incident_type: incident.kind.clone(),
                action: "isolate_device".to_string(),
                description: "Default containment: isolate the affected device.".to_string(),
            })
    }

    /// Run the whole drill: plan and simulate a defense for every incident in
    /// declared order
    pub fn run(&self) -> DrillReport {
        let results = self
            .incidents
            .iter()
            .map(|incident| {
                let strategy = self.plan_defense(incident);
                let success = simulate_defense(incident, &strategy);
                info!(
                    "Drill {}: {} ({}) defended with {} success={}",
                    self.scenario_name, incident.kind, incident.severity, strategy.action, success
                );
                DefenseResult {
                    incident_type: incident.kind.clone(),
                    severity: incident.severity.clone(),
                    action: strategy.action.clone(),
                    success,
                    log: format!(
                        "Responded to {} incident with {}",
                        incident.kind, strategy.action
                    ),
                }
            })
            .collect();
        DrillReport {
            scenario_name: self.scenario_name.clone(),
            defense_results: results,
        }
    }
}

/// Severity policy: the more severe the incident, the fewer actions contain it
fn simulate_defense(incident: &Incident, strategy: &Strategy) -> bool {
    match incident.severity.as_str() {
        "critical" => matches!(strategy.action.as_str(), "isolate_device" | "shutdown_network"),
        "high" => matches!(strategy.action.as_str(), "isolate_device" | "patch_firmware"),
        _ => true,
    }
}

pub fn persist_report<P>(report: &DrillReport, path: P) -> Result<PathBuf>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let serialized = serde_json::to_string_pretty(report).map_err(|e| Error::MalformedReport {
        reason: e.to_string(),
    })?;
    write(path, serialized).map_err(|e| Error::Write {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(path.to_path_buf())
}
