// SPDX-License-Identifier: Apache-2.0

//! Orchestration core for sandboxed hardware-in-the-loop (HIL) security testing.
//!
//! The crate drives an external emulator process with a firmware+payload pair inside
//! an isolated, always-cleaned-up sandbox directory, scores the captured output for
//! risk, and chains such runs into declarative multi-step attack scenarios with
//! structured, persisted reports.
//!
//! Component layering, leaf-first:
//!
//! - [`sandbox`]: isolated per-run directories, supervised emulator processes
//! - [`risk`]: pure, ordered-rule scoring of captured execution output
//! - [`emulator`]: uniform process/mock backend dispatch with per-target logs
//! - [`chain`]: declarative attack chains, validated, planned, and executed
//!   strictly in order with a fail-open policy
//! - [`report`]: summaries and persisted report artifacts

#![deny(clippy::unwrap_used)]

pub mod arch;
pub mod cancel;
pub mod chain;
pub mod drill;
pub mod emulator;
pub mod error;
pub mod logsink;
pub mod module;
pub mod outcome;
pub mod report;
pub mod risk;
pub mod sandbox;

pub use error::{Error, Result};
