// SPDX-License-Identifier: Apache-2.0

//! Hardware-in-the-loop emulator facade: one uniform `run` over the process-based
//! backend (sandboxed external emulator) and the mock backend (deterministic
//! synthetic result for targets without an available emulator, e.g. FPGA logic
//! blocks). Every run comes back with a risk score attached and a line appended to
//! the injected per-target log sink.

use crate::{
    arch::BackendMode,
    cancel::CancelToken,
    logsink::LogSink,
    risk::{self, RiskScore},
    sandbox::{self, ExecutionResult, ExitStatus, RunConfig},
    Result,
};
use derive_builder::Builder;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

/// One emulation run: the captured execution and its risk score. An emulator never
/// returns an execution without a score.
#[derive(Debug, Clone)]
pub struct EmulationOutput {
    pub execution: ExecutionResult,
    pub risk: RiskScore,
}

#[derive(Builder, Debug)]
pub struct HilEmulator {
    #[builder(setter(into))]
    /// Logical target name; keys the per-target log file
    target: String,
    log_sink: Arc<LogSink>,
}

impl HilEmulator {
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Run one firmware+payload pair. See [`run_cancellable`](Self::run_cancellable).
    pub fn run(&self, config: &RunConfig) -> Result<EmulationOutput> {
        self.run_cancellable(config, &CancelToken::new())
    }

    /// Run one firmware+payload pair, observing a cancellation token.
    ///
    /// An unsupported architecture on the process backend is a configuration-time
    /// hard error, raised before any dispatch: no sandbox directory is created and
    /// no process is spawned.
    pub fn run_cancellable(
        &self,
        config: &RunConfig,
        cancel: &CancelToken,
    ) -> Result<EmulationOutput> {
        let execution = match config.backend() {
            BackendMode::Process => {
                config.emulator_binary()?;
                sandbox::execute_cancellable(config, cancel)?
            }
            BackendMode::Mock => mock_execution(config),
        };

        let risk = risk::score(&execution);

        info!(
            "HIL run on {}: arch={} backend={} status={:?} risk={:.2} ({})",
            self.target,
            config.arch(),
            execution.backend(),
            execution.status(),
            risk.score(),
            risk.rule()
        );

        // A run whose log line cannot be written is still a valid run
        if let Err(e) = self.log_sink.append(
            &self.target,
            &format!(
                "arch={} backend={} status={:?} duration_ms={} risk={:.2} rule={}",
                config.arch(),
                execution.backend(),
                execution.status(),
                execution.duration().as_millis(),
                risk.score(),
                risk.rule()
            ),
        ) {
            warn!("Failed to append run log for {}: {}", self.target, e);
        }

        Ok(EmulationOutput { execution, risk })
    }

    /// Retrieve everything logged for this emulator's target
    pub fn get_logs(&self) -> Result<String> {
        self.log_sink.read(&self.target)
    }
}

/// Synthesize a deterministic result without spawning anything. Tagged with the
/// mock backend so the score is never misread as hardware-validated.
fn mock_execution(config: &RunConfig) -> ExecutionResult {
    let payload = config
        .payload()
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| config.payload().display().to_string());
    ExecutionResult::new(
        ExitStatus::Exited { code: 0 },
        format!(
            "[mock] ran {} on {} (no hardware validation)\n",
            payload,
            config.arch()
        )
        .into_bytes(),
        Vec::new(),
        Duration::ZERO,
        BackendMode::Mock,
    )
}
