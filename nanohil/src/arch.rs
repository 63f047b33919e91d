// SPDX-License-Identifier: Apache-2.0

//! Target architectures and emulation backend modes

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Instruction-set architectures the emulation backends understand. `Other` covers
/// targets with no process-based emulator (FPGA logic blocks, exotic ISAs); such
/// targets can only run on the mock backend.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Arm,
    Riscv,
    Mips,
    Other,
}

impl Architecture {
    /// Map a free-form chip name (CLI input, device profile field) onto an
    /// architecture. Unknown chips map to `Other` rather than failing: whether
    /// `Other` is acceptable depends on the backend mode and is checked there.
    pub fn from_chip(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "arm" | "armv7" | "armv8" | "cortex-m" | "cortex-a" => Self::Arm,
            "riscv" | "risc-v" | "riscv32" | "riscv64" => Self::Riscv,
            "mips" | "mips32" => Self::Mips,
            _ => Self::Other,
        }
    }

    /// The process-backend emulator binary for this architecture, one binary name
    /// per supported architecture. Fails before anything is spawned for
    /// architectures with no emulator.
    pub fn emulator_binary(&self) -> Result<&'static str> {
        match self {
            Self::Arm => Ok("qemu-system-arm"),
            Self::Riscv => Ok("qemu-system-riscv32"),
            Self::Mips => Ok("qemu-system-mips"),
            Self::Other => Err(Error::UnsupportedArchitecture {
                arch: self.to_string(),
            }),
        }
    }
}

/// How a run is executed: against a real external emulator process, or synthesized
/// deterministically without spawning anything. Mock results are tagged so scores
/// are never misread as hardware-validated.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    #[default]
    Process,
    Mock,
}
