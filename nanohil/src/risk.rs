// SPDX-License-Identifier: Apache-2.0

//! Pre-brick risk scoring. A pure, total mapping from a captured
//! [`ExecutionResult`] to a bounded score: no I/O, no failure, same input always
//! produces the same score.
//!
//! Rules are evaluated in order against the captured stderr, first match wins:
//! hard-fault signatures dominate generic error text even when both appear.
//! Timeout and spawn-failure exit statuses floor the score at 0.7 regardless of
//! text, but never lower a crash-signature match.

use crate::sandbox::{ExecutionResult, ExitStatus};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Signatures of a crash or unrecoverable fault in emulator output
const CRASH_SIGNATURES: &[&str] = &["segfault", "segmentation fault", "sigsegv", "panic"];

pub const CRASH_SCORE: f64 = 0.9;
pub const ERROR_SCORE: f64 = 0.7;
pub const BASELINE_SCORE: f64 = 0.2;

/// Which rule produced a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum RiskRule {
    CrashSignature,
    ErrorSignature,
    Baseline,
    Timeout,
    SpawnFailure,
}

/// A bounded risk score in [0.0, 1.0] and the rule that produced it. Derived
/// deterministically from an [`ExecutionResult`]; never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    score: f64,
    rule: RiskRule,
}

impl RiskScore {
    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn rule(&self) -> RiskRule {
        self.rule
    }
}

/// Score one execution result. Pure and total.
pub fn score(result: &ExecutionResult) -> RiskScore {
    let stderr = result.stderr_lossy().to_lowercase();

    let (score, rule) = if CRASH_SIGNATURES.iter().any(|sig| stderr.contains(sig)) {
        (CRASH_SCORE, RiskRule::CrashSignature)
    } else if stderr.contains("error") {
        (ERROR_SCORE, RiskRule::ErrorSignature)
    } else {
        (BASELINE_SCORE, RiskRule::Baseline)
    };

    // A run that never produced usable output is at least as suspect as one that
    // printed an error, whatever its text said. Cancellation is an operator
    // decision, not a finding, and scores from text alone.
    match result.status() {
        ExitStatus::Timeout if score < ERROR_SCORE => RiskScore {
            score: ERROR_SCORE,
            rule: RiskRule::Timeout,
        },
        ExitStatus::SpawnFailure if score < ERROR_SCORE => RiskScore {
            score: ERROR_SCORE,
            rule: RiskRule::SpawnFailure,
        },
        _ => RiskScore { score, rule },
    }
}
