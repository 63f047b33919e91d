// SPDX-License-Identifier: Apache-2.0

//! Result aggregation and report persistence. Summarization is pure: it reads the
//! ordered step results and computes counts, overall success, and the impact
//! narrative, without touching engine or device state. Persistence is the only
//! side effect, and failing to write never loses the in-memory results.

use crate::{
    chain::{ChainResult, StepResult},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::{
    fs::{read_to_string, write},
    path::{Path, PathBuf},
};
use tracing::info;

/// Aggregate view of one chain execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Summary {
    pub total_steps: usize,
    pub successes: usize,
    pub failures: usize,
    /// AND of all step successes; an empty result set is vacuously successful
    pub overall_success: bool,
    /// Impact strings of every step, in execution order. A failed step's impact
    /// still belongs in the report.
    pub impacts: Vec<String>,
}

/// The persisted report shape: name, per-step results, and the summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub chain_name: String,
    pub results: Vec<StepResult>,
    pub summary: Summary,
}

/// Compute the summary for a chain result. Pure over its input.
pub fn summarize(result: &ChainResult) -> Summary {
    let successes = result.steps.iter().filter(|s| s.success).count();
    Summary {
        total_steps: result.steps.len(),
        successes,
        failures: result.steps.len() - successes,
        overall_success: result.steps.iter().all(|s| s.success),
        impacts: result.steps.iter().map(|s| s.impact.clone()).collect(),
    }
}

/// Serialize the report to pretty JSON at `path`. Returns the path written so
/// callers can surface it to the operator.
pub fn persist<P>(result: &ChainResult, summary: &Summary, path: P) -> Result<PathBuf>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let report = Report {
        chain_name: result.chain_name.clone(),
        results: result.steps.clone(),
        summary: summary.clone(),
    };
    let serialized = serde_json::to_string_pretty(&report).map_err(|e| Error::MalformedReport {
        reason: e.to_string(),
    })?;
    write(path, serialized).map_err(|e| Error::Write {
        path: path.to_path_buf(),
        source: e,
    })?;
    info!("Report for chain {} written to {}", report.chain_name, path.display());
    Ok(path.to_path_buf())
}

/// Read a previously persisted report back
pub fn load<P>(path: P) -> Result<Report>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let source = read_to_string(path).map_err(|e| Error::MalformedReport {
        reason: format!("unreadable report {}: {}", path.display(), e),
    })?;
    serde_json::from_str(&source).map_err(|e| Error::MalformedReport {
        reason: format!("invalid report JSON in {}: {}", path.display(), e),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::Result;
    use tempdir::TempDir;

    fn step(device: &str, success: bool, impact: &str) -> StepResult {
        StepResult {
            device: device.to_string(),
            action: "exploit".to_string(),
            success,
            impact: impact.to_string(),
            log: String::new(),
            elapsed_ms: 3,
        }
    }

    fn mixed_result() -> ChainResult {
        ChainResult {
            chain_name: "mixed".to_string(),
            steps: vec![
                step("pump1", true, "Possible silent takeover or device crash."),
                step("ecu1", false, "Unknown impact."),
                step("plc1", true, "Device unavailable to operators."),
            ],
        }
    }

    #[test]
    fn test_summary_counts() {
        let summary = summarize(&mixed_result());
        assert_eq!(summary.total_steps, 3);
        assert_eq!(summary.successes, 2);
        assert_eq!(summary.failures, 1);
        assert!(!summary.overall_success);
    }

    #[test]
    fn test_impacts_cover_all_steps_in_order() {
        let summary = summarize(&mixed_result());
        assert_eq!(
            summary.impacts,
            vec![
                "Possible silent takeover or device crash.".to_string(),
                "Unknown impact.".to_string(),
                "Device unavailable to operators.".to_string()
            ]
        );
    }

    #[test]
    fn test_empty_result_is_vacuously_successful() {
        let summary = summarize(&ChainResult {
            chain_name: "empty".to_string(),
            steps: Vec::new(),
        });
        assert_eq!(summary.total_steps, 0);
        assert!(summary.overall_success);
        assert!(summary.impacts.is_empty());
    }

    #[test]
    fn test_summarize_is_pure() {
        let result = mixed_result();
        assert_eq!(summarize(&result), summarize(&result));
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_persist_and_load_round_trip() -> Result<()> {
        let dir = TempDir::new("report-test")?;
        let result = mixed_result();
        let summary = summarize(&result);
        let path = persist(&result, &summary, dir.path().join("mixed_report.json"))?;
        let report = load(&path)?;
        assert_eq!(report.chain_name, "mixed");
        assert_eq!(report.results.len(), 3);
        assert_eq!(report.summary, summary);
        Ok(())
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_persist_failure_is_write_error() {
        let result = mixed_result();
        let summary = summarize(&result);
        assert!(matches!(
            persist(&result, &summary, "/nonexistent/dir/report.json"),
            Err(Error::Write { path: _, source: _ })
        ));
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_load_rejects_invalid_json() -> Result<()> {
        let dir = TempDir::new("report-test")?;
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json")?;
        assert!(matches!(
            load(&path),
            Err(Error::MalformedReport { reason: _ })
        ));
        Ok(())
    }
}
