// SPDX-License-Identifier: Apache-2.0

//! `nanohil` command line: one-shot HIL emulation runs and attack-chain
//! orchestration (scenario dry runs, chain replay, blue-team drills).
//!
//! Orchestration outcomes are not process failures: a chain whose attacks fail
//! still exits zero with the failures in the report. Only infrastructure problems
//! (malformed artifacts, unwritable reports, sandbox failures) exit nonzero.

use anyhow::Result;
use clap::{Parser, Subcommand};
use nanohil::{
    arch::{Architecture, BackendMode},
    chain::ChainRunner,
    drill::{self, DrillConfig},
    emulator::HilEmulatorBuilder,
    logsink::LogSink,
    module::{ModuleRegistry, SimulatedModule},
    outcome::{OutcomeSource, Seeded, Threshold},
    report,
    sandbox::{ResourceLimits, RunConfigBuilder},
};
use std::{
    io::stderr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, registry};

#[derive(Debug, Parser)]
#[command(name = "nanohil", about, version)]
pub struct Args {
    #[arg(short, long, default_value_t = Level::INFO)]
    /// Logging level for diagnostics on stderr
    pub log_level: Level,
    #[arg(short = 'L', long)]
    /// Directory for per-target emulation log files. A `nanohil-logs` directory
    /// under the system temporary directory is used if not specified.
    pub log_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Cmd,
}

#[derive(Debug, Subcommand)]
pub enum Cmd {
    /// Hardware-in-the-loop emulation runs
    Hil {
        #[command(subcommand)]
        command: HilCmd,
    },
    /// Attack-chain orchestration and blue-team drills
    Ops {
        #[command(subcommand)]
        command: OpsCmd,
    },
}

#[derive(Debug, Subcommand)]
pub enum HilCmd {
    /// Run one payload against a target chip and print the scored result
    Run {
        /// Payload artifact handed to the booted firmware
        payload: PathBuf,
        /// Target chip name (e.g. cortex-m, riscv32, mips). Chips with no
        /// process emulator run on the mock backend.
        chip: String,
        #[arg(short, long)]
        /// Firmware image to boot. Without firmware the run uses the mock backend.
        firmware: Option<PathBuf>,
        #[arg(short, long, default_value_t = 60)]
        /// Wall-clock timeout for the emulator run, in seconds
        timeout: u64,
        #[arg(short, long)]
        /// Memory ceiling handed to the emulator, in megabytes
        memory_mb: Option<u64>,
        #[arg(short, long)]
        /// Emulator binary override for nonstandard installs
        emulator: Option<PathBuf>,
    },
}

#[derive(Debug, Subcommand)]
pub enum OpsCmd {
    /// Load, validate, and plan a scenario; optionally execute it
    Scenario {
        /// Scenario definition file (JSON)
        file: PathBuf,
        #[arg(short, long)]
        /// Execute the planned chain after validation
        run: bool,
        #[arg(short = 'o', long)]
        /// Report output path; defaults to {name}_scenario_report.json
        report: Option<PathBuf>,
        #[arg(short, long)]
        /// Seed for pseudo-random attack outcomes; outcomes are threshold-based
        /// and fully deterministic if not given
        seed: Option<u64>,
    },
    /// Replay a recorded attack chain end to end
    Replay {
        /// Chain definition file (JSON)
        chain_file: PathBuf,
        #[arg(short = 'o', long)]
        /// Report output path; defaults to {name}_attackreplay_report.json
        report: Option<PathBuf>,
        #[arg(short, long)]
        /// Seed for pseudo-random attack outcomes
        seed: Option<u64>,
    },
    /// Run a blue-team defense drill against simulated incidents
    Blueteam {
        /// Drill configuration file (JSON)
        drill_file: PathBuf,
        #[arg(short = 'o', long)]
        /// Report output path; defaults to {name}_blueteam_report.json
        report: Option<PathBuf>,
    },
}

pub fn main() -> Result<()> {
    let args = Args::parse();

    registry()
        .with(
            fmt::layer()
                .with_writer(stderr)
                .with_filter(tracing_subscriber::filter::LevelFilter::from_level(
                    args.log_level,
                )),
        )
        .init();

    let log_dir = args
        .log_dir
        .unwrap_or_else(|| std::env::temp_dir().join("nanohil-logs"));

    match args.command {
        Cmd::Hil {
            command:
                HilCmd::Run {
                    payload,
                    chip,
                    firmware,
                    timeout,
                    memory_mb,
                    emulator,
                },
        } => hil_run(
            &log_dir, &payload, &chip, firmware, timeout, memory_mb, emulator,
        ),
        Cmd::Ops { command } => match command {
            OpsCmd::Scenario {
                file,
                run,
                report,
                seed,
            } => ops_chain(&file, run, report, seed, "scenario"),
            OpsCmd::Replay {
                chain_file,
                report,
                seed,
            } => ops_chain(&chain_file, true, report, seed, "attackreplay"),
            OpsCmd::Blueteam { drill_file, report } => ops_blueteam(&drill_file, report),
        },
    }
}

fn hil_run(
    log_dir: &Path,
    payload: &Path,
    chip: &str,
    firmware: Option<PathBuf>,
    timeout: u64,
    memory_mb: Option<u64>,
    emulator_override: Option<PathBuf>,
) -> Result<()> {
    let arch = Architecture::from_chip(chip);
    // The process backend needs firmware to boot and an emulator for the
    // architecture; anything else runs on the mock backend
    let backend = if firmware.is_none() {
        warn!("No firmware given for {}; using the mock backend", chip);
        BackendMode::Mock
    } else if arch == Architecture::Other && emulator_override.is_none() {
        warn!("No process emulator for {}; using the mock backend", chip);
        BackendMode::Mock
    } else {
        BackendMode::Process
    };

    let mut config = RunConfigBuilder::default();
    config
        .arch(arch)
        .firmware(firmware.unwrap_or_else(|| payload.to_path_buf()))
        .payload(payload)
        .backend(backend)
        .timeout(Duration::from_secs(timeout))
        .limits(ResourceLimits {
            memory_mb,
            cpu_seconds: None,
        });
    if let Some(path) = emulator_override {
        config.emulator(path);
    }
    let config = config.build()?;

    let emulator = HilEmulatorBuilder::default()
        .target(chip)
        .log_sink(Arc::new(LogSink::new(log_dir)?))
        .build()?;

    let output = emulator.run(&config)?;

    println!(
        "target={} arch={} backend={} status={:?} duration_ms={} risk={:.2} rule={}",
        chip,
        arch,
        output.execution.backend(),
        output.execution.status(),
        output.execution.duration().as_millis(),
        output.risk.score(),
        output.risk.rule()
    );
    print!("{}", output.execution.stdout_lossy());
    eprint!("{}", output.execution.stderr_lossy());

    Ok(())
}

fn ops_chain(
    file: &Path,
    run: bool,
    report_path: Option<PathBuf>,
    seed: Option<u64>,
    kind: &str,
) -> Result<()> {
    let mut runner = ChainRunner::load(file)?;
    runner.validate()?;
    let planned_steps = runner.plan()?.len();
    info!(
        "Chain {} planned: {} steps",
        runner.chain().name,
        planned_steps
    );

    if !run {
        println!(
            "Chain {} validated and planned ({} steps); pass --run to execute",
            runner.chain().name,
            planned_steps
        );
        return Ok(());
    }

    let registry = default_registry(seed);
    let results = runner.execute(&registry)?;
    let summary = report::summarize(&results);

    let path = report_path
        .unwrap_or_else(|| default_report_path(&results.chain_name, kind));
    let written = report::persist(&results, &summary, &path)?;

    println!(
        "Chain {}: {}/{} steps succeeded, overall_success={}",
        results.chain_name, summary.successes, summary.total_steps, summary.overall_success
    );
    for impact in &summary.impacts {
        println!("  impact: {}", impact);
    }
    println!("Report written to {}", written.display());

    Ok(())
}

fn ops_blueteam(drill_file: &Path, report_path: Option<PathBuf>) -> Result<()> {
    let config = DrillConfig::load(drill_file)?;
    let drill_report = config.run();
    let path = report_path
        .unwrap_or_else(|| default_report_path(&drill_report.scenario_name, "blueteam"));
    let written = drill::persist_report(&drill_report, &path)?;

    let contained = drill_report
        .defense_results
        .iter()
        .filter(|r| r.success)
        .count();
    println!(
        "Drill {}: {}/{} incidents contained",
        drill_report.scenario_name,
        contained,
        drill_report.defense_results.len()
    );
    println!("Report written to {}", written.display());

    Ok(())
}

/// The built-in device-category modules. With a seed, outcomes are pseudo-random
/// but reproducible; without one they are threshold-deterministic.
fn default_registry(seed: Option<u64>) -> ModuleRegistry {
    const DEVICE_TYPES: [&str; 5] = [
        "medical",
        "automotive",
        "industrial",
        "consumer",
        "smart_city",
    ];
    let mut registry = ModuleRegistry::new();
    for (index, device_type) in DEVICE_TYPES.iter().enumerate() {
        let outcomes: Box<dyn OutcomeSource> = match seed {
            // Offset per module so categories do not share a decision stream
            Some(seed) => Box::new(Seeded::new(seed.wrapping_add(index as u64))),
            None => Box::new(Threshold::default()),
        };
        registry.register(
            *device_type,
            Box::new(SimulatedModule::with_outcomes(
                *device_type,
                format!("{}-device", device_type),
                outcomes,
            )),
        );
    }
    registry
}

fn default_report_path(name: &str, kind: &str) -> PathBuf {
    PathBuf::from(format!("{}_{}_report.json", name.replace(' ', "_"), kind))
}
