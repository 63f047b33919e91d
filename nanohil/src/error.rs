// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the orchestration core.
//!
//! Configuration errors (`ArtifactNotFound`, `UnsupportedArchitecture`,
//! `MalformedChain`, `Validation`) are caller mistakes detected before anything is
//! spawned and are never retried. Execution outcomes (timeout, spawn failure,
//! cancellation, nonzero exit) are NOT errors: they are first-class
//! [`ExitStatus`](crate::sandbox::ExitStatus) states, always scored and reported.
//! Infrastructure failures (`Write`, `Sandbox`) are surfaced to the immediate
//! caller and reported distinctly from execution outcomes.

use std::{io, path::PathBuf};
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Artifact not found: {path}")]
    ArtifactNotFound { path: PathBuf },
    #[error("Unsupported architecture: {arch}")]
    UnsupportedArchitecture { arch: String },
    #[error("Malformed chain: {reason}")]
    MalformedChain { reason: String },
    #[error("Malformed drill: {reason}")]
    MalformedDrill { reason: String },
    #[error("Malformed report: {reason}")]
    MalformedReport { reason: String },
    #[error("Chain validation failed: {reason}")]
    Validation { reason: String },
    #[error("Invalid chain state: expected {expected}, found {found}")]
    ChainState { expected: String, found: String },
    #[error("Failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("Sandbox infrastructure failure: {reason}")]
    Sandbox { reason: String },
    #[error("Exploit module failure for {device_type}: {reason}")]
    Module { device_type: String, reason: String },
}
