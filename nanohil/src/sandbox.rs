// SPDX-License-Identifier: Apache-2.0

//! Sandboxed execution of one emulator run. Every invocation gets a fresh,
//! exclusively-owned run directory, the firmware and payload artifacts are copied in
//! under their base names, and exactly one child process is spawned, supervised, and
//! reaped. The directory is removed on every exit path, including timeout, panic,
//! and cancellation.
//!
//! Backend failures never escape as errors from here: a missing emulator binary, a
//! killed child, or an elapsed timeout all come back as ordinary
//! [`ExecutionResult`] states, because a crash or hang IS a finding, not a bug in
//! the tool. Only caller mistakes (missing artifacts, unsupported architecture) and
//! infrastructure failures (directory creation) are returned as errors, and both are
//! detected before any process is spawned.

use crate::{
    arch::{Architecture, BackendMode},
    cancel::CancelToken,
    Error, Result,
};
use command_wait::{CommandWaitError, CommandWaitExt, WaitStatus};
use derive_builder::Builder;
use run_dir::RunDirBuilder;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    process::Command,
    time::{Duration, Instant},
};
use tracing::{debug, trace};

/// Prefix for sandbox run directories, scoped so leftover directories are
/// attributable (and detectable in tests)
pub const SANDBOX_DIR_PREFIX: &str = "nanohil.sandbox";

/// Resource limits applied to a sandboxed run. The memory limit is handed to the
/// emulator (`-m`); the CPU limit caps the supervised wall-clock wait together with
/// the configured timeout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub memory_mb: Option<u64>,
    pub cpu_seconds: Option<u64>,
}

#[derive(Builder, Debug, Clone)]
/// Immutable per-invocation input for one sandboxed emulator run
pub struct RunConfig {
    /// Target instruction-set architecture, selects the emulator binary
    arch: Architecture,
    #[builder(setter(into))]
    /// Firmware artifact booted by the emulator
    firmware: PathBuf,
    #[builder(setter(into))]
    /// Payload artifact handed to the booted firmware as init
    payload: PathBuf,
    #[builder(default)]
    /// Backend mode; mock synthesizes a result without spawning a process
    backend: BackendMode,
    #[builder(default = "RunConfig::DEFAULT_TIMEOUT")]
    /// Wall-clock bound on the emulator run; elapsing it is a reportable outcome
    timeout: Duration,
    #[builder(default)]
    limits: ResourceLimits,
    #[builder(default, setter(into, strip_option))]
    /// Optional emulator binary override for nonstandard installs
    emulator: Option<PathBuf>,
}

impl RunConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn arch(&self) -> Architecture {
        self.arch
    }

    pub fn firmware(&self) -> &Path {
        &self.firmware
    }

    pub fn payload(&self) -> &Path {
        &self.payload
    }

    pub fn backend(&self) -> BackendMode {
        self.backend
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn limits(&self) -> ResourceLimits {
        self.limits
    }

    pub fn emulator(&self) -> Option<&Path> {
        self.emulator.as_deref()
    }

    /// The binary the process backend would invoke for this configuration. Fails
    /// with `UnsupportedArchitecture` when no binary exists and no override is set.
    pub fn emulator_binary(&self) -> Result<PathBuf> {
        match &self.emulator {
            Some(path) => Ok(path.clone()),
            None => Ok(PathBuf::from(self.arch.emulator_binary()?)),
        }
    }

    fn effective_timeout(&self) -> Duration {
        match self.limits.cpu_seconds {
            Some(secs) => self.timeout.min(Duration::from_secs(secs)),
            None => self.timeout,
        }
    }
}

/// How a sandboxed run finished. Timeout, spawn failure, and cancellation are
/// ordinary statuses here, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ExitStatus {
    Exited { code: i32 },
    Signaled { signal: i32 },
    Timeout,
    SpawnFailure,
    Cancelled,
}

impl ExitStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Exited { code: 0 })
    }
}

/// Captured output of one sandboxed run. Immutable once produced.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    duration: Duration,
    backend: BackendMode,
}

impl ExecutionResult {
    pub fn new(
        status: ExitStatus,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
        duration: Duration,
        backend: BackendMode,
    ) -> Self {
        Self {
            status,
            stdout,
            stderr,
            duration,
            backend,
        }
    }

    pub fn status(&self) -> ExitStatus {
        self.status
    }

    pub fn stdout(&self) -> &[u8] {
        &self.stdout
    }

    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn backend(&self) -> BackendMode {
        self.backend
    }
}

/// Run one emulator invocation in a fresh sandbox. See [`execute_cancellable`].
pub fn execute(config: &RunConfig) -> Result<ExecutionResult> {
    execute_cancellable(config, &CancelToken::new())
}

/// Run one emulator invocation in a fresh sandbox, observing a cancellation token.
///
/// Preconditions (checked before any directory is created or process spawned):
/// firmware and payload must exist (`ArtifactNotFound`), and the architecture must
/// have an emulator binary unless one is overridden (`UnsupportedArchitecture`).
///
/// Safe to call from any number of threads concurrently; every invocation owns its
/// directory and child exclusively.
pub fn execute_cancellable(
    config: &RunConfig,
    cancel: &CancelToken,
) -> Result<ExecutionResult> {
    if !config.firmware().is_file() {
        return Err(Error::ArtifactNotFound {
            path: config.firmware().to_path_buf(),
        });
    }
    if !config.payload().is_file() {
        return Err(Error::ArtifactNotFound {
            path: config.payload().to_path_buf(),
        });
    }
    let binary = config.emulator_binary()?;

    // Removed on drop on every path below, including early returns and panics
    let dir = RunDirBuilder::default()
        .prefix(SANDBOX_DIR_PREFIX)
        .build()
        .map_err(|e| Error::Sandbox {
            reason: e.to_string(),
        })?;

    let firmware = dir.stage(config.firmware()).map_err(|e| Error::Sandbox {
        reason: e.to_string(),
    })?;
    let payload = dir.stage(config.payload()).map_err(|e| Error::Sandbox {
        reason: e.to_string(),
    })?;

    let mut command = Command::new(&binary);
    command
        .arg("-kernel")
        .arg(&firmware)
        .arg("-append")
        // Argument vector, never a shell string: payload paths must not be able to
        // inject into the invocation
        .arg(format!("init={}", payload.display()))
        .arg("-nographic")
        .current_dir(dir.path());

    if let Some(memory_mb) = config.limits().memory_mb {
        command.arg("-m").arg(format!("{}M", memory_mb));
    }

    trace!(
        "Sandbox run: {} -kernel {} in {}",
        binary.display(),
        firmware.display(),
        dir.path().display()
    );

    let started = Instant::now();
    let result = match command.wait_with_deadline(config.effective_timeout(), || {
        cancel.is_cancelled()
    }) {
        Ok(output) => {
            let status = match output.status {
                WaitStatus::Exited(code) => ExitStatus::Exited { code },
                WaitStatus::Signaled(signal) => ExitStatus::Signaled { signal },
                WaitStatus::TimedOut => ExitStatus::Timeout,
                WaitStatus::Cancelled => ExitStatus::Cancelled,
            };
            ExecutionResult::new(
                status,
                output.stdout,
                output.stderr,
                output.duration,
                BackendMode::Process,
            )
        }
        // A binary that cannot be spawned is a reportable outcome for the run, not
        // an error for the caller
        Err(CommandWaitError::Spawn { source }) => ExecutionResult::new(
            ExitStatus::SpawnFailure,
            Vec::new(),
            source.to_string().into_bytes(),
            started.elapsed(),
            BackendMode::Process,
        ),
        Err(CommandWaitError::Wait { source }) => {
            return Err(Error::Sandbox {
                reason: format!("Failed to supervise child: {}", source),
            })
        }
    };

    debug!(
        "Sandbox run finished: {:?} in {:?}",
        result.status(),
        result.duration()
    );

    Ok(result)
}
