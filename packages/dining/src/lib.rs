//! Command-line front end for the dining philosophers simulator.
//!
//! Parameters come from, in increasing precedence: the built-in defaults, an
//! optional JSON5 config file, the `DINING_SEED` environment variable and the
//! command-line flags.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::{
    fs::File,
    io::{BufWriter, Write as _},
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{Parser, ValueEnum};
use dining_arbiter::{
    Variant,
    config::SimulationConfig,
    report::RunReport,
    simulation::{RunError, Simulation},
};
use dining_log_sink::DEFAULT_LOG_FILE;
use thiserror::Error;

/// Environment variable holding the base seed when `--seed` is not given.
pub const SEED_ENV: &str = "DINING_SEED";

#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error(transparent)]
    Parse(#[from] json5::Error),
    #[error("Invalid DINING_SEED value '{0}'")]
    InvalidSeed(String),
}

#[derive(Debug, Error)]
pub enum InitLoggingError {
    #[error(transparent)]
    SetLogger(#[from] log::SetLoggerError),
}

#[derive(Debug, Error)]
pub enum WriteReportError {
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Which arbiters to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Selection {
    ProbeAndBackoff,
    StateVector,
    /// Probe-and-backoff first, then state-vector, against the same log file.
    Both,
}

impl Selection {
    #[must_use]
    pub fn variants(self) -> Vec<Variant> {
        match self {
            Self::ProbeAndBackoff => vec![Variant::ProbeAndBackoff],
            Self::StateVector => vec![Variant::StateVector],
            Self::Both => Variant::ALL.to_vec(),
        }
    }
}

/// Simulates philosophers sharing forks around a table.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// JSON5 file with simulation parameters.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Arbitration protocol to run.
    #[arg(long, value_enum, default_value_t = Selection::Both)]
    pub variant: Selection,

    /// Number of philosophers (and forks).
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Length of each run in milliseconds.
    #[arg(short, long)]
    pub duration_ms: Option<u64>,

    /// Length of each think step in milliseconds.
    #[arg(long)]
    pub think_ms: Option<u64>,

    /// Base seed for the per-philosopher random streams.
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Event log output path.
    #[arg(short, long, default_value = DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,

    /// Also write the run reports as JSON to this path.
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl Args {
    /// Resolves the simulation parameters, reading the seed fallback from the
    /// process environment.
    ///
    /// # Errors
    ///
    /// * If the config file cannot be read or parsed
    /// * If `DINING_SEED` is set to something that is not a `u64`
    pub fn simulation_config(&self) -> Result<SimulationConfig, LoadConfigError> {
        self.resolve_config(std::env::var(SEED_ENV).ok().as_deref())
    }

    /// Resolves the simulation parameters with an explicit seed fallback.
    ///
    /// When no seed is configured anywhere a random one is picked, so every run
    /// can be reproduced from the seed it prints.
    ///
    /// # Errors
    ///
    /// * If the config file cannot be read or parsed
    /// * If `env_seed` is not a `u64`
    pub fn resolve_config(
        &self,
        env_seed: Option<&str>,
    ) -> Result<SimulationConfig, LoadConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => SimulationConfig::new(),
        };

        if let Some(workers) = self.workers {
            config.workers(workers);
        }
        if let Some(duration_ms) = self.duration_ms {
            config.run_duration(Duration::from_millis(duration_ms));
        }
        if let Some(think_ms) = self.think_ms {
            config.think_duration(Duration::from_millis(think_ms));
        }

        let env_seed = env_seed
            .map(|value| {
                value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| LoadConfigError::InvalidSeed(value.to_string()))
            })
            .transpose()?;

        let seed = self
            .seed
            .or(env_seed)
            .or(config.seed)
            .unwrap_or_else(rand::random);
        config.seed(Some(seed));

        Ok(config)
    }
}

/// Reads a [`SimulationConfig`] from a JSON5 file. Missing fields keep their
/// defaults.
///
/// # Errors
///
/// * If the file cannot be read
/// * If the file is not valid JSON5 or does not describe a config
pub fn load_config(path: &Path) -> Result<SimulationConfig, LoadConfigError> {
    log::debug!("load_config: reading {}", path.display());
    let content = std::fs::read_to_string(path)?;
    Ok(json5::from_str(&content)?)
}

/// Initializes `pretty_env_logger`, taking filters from `DINING_LOG`, then
/// `RUST_LOG`, then a build-dependent default.
///
/// # Errors
///
/// * If a logger has already been installed
pub fn init_logging() -> Result<(), InitLoggingError> {
    #[cfg(debug_assertions)]
    const DEFAULT_LOG_LEVEL: &str = "dining=trace,dining_arbiter=debug";
    #[cfg(not(debug_assertions))]
    const DEFAULT_LOG_LEVEL: &str = "dining=info,dining_arbiter=info";

    let filters = std::env::var("DINING_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());

    pretty_env_logger::formatted_timed_builder()
        .parse_filters(&filters)
        .try_init()?;

    Ok(())
}

/// Runs each variant in turn. Variants not yet started when the simulation is
/// stopped are skipped.
///
/// # Errors
///
/// * If a run fails to start its workers
pub fn run_variants(
    simulation: &Simulation,
    variants: &[Variant],
) -> Result<Vec<RunReport>, RunError> {
    let stop = simulation.stop_handle();
    let mut reports = Vec::with_capacity(variants.len());

    for &variant in variants {
        if stop.is_stopped() {
            log::warn!("Skipping {variant}: simulation was stopped");
            continue;
        }
        reports.push(simulation.run(variant)?);
    }

    Ok(reports)
}

/// The per-philosopher lines and averages printed after a run.
#[must_use]
pub fn format_report(report: &RunReport) -> Vec<String> {
    let mut lines = Vec::with_capacity(report.workers.len() + report.failed.len() + 4);

    lines.push(format!("{}:", report.variant));
    lines.extend(report.workers.iter().map(ToString::to_string));
    lines.extend(
        report
            .failed
            .iter()
            .map(|id| format!("Philosopher {id}: failed, no statistics")),
    );
    lines.extend(report.summary_lines());

    lines
}

/// Writes the reports as pretty-printed JSON.
///
/// # Errors
///
/// * If the file cannot be created or written
/// * If serialization fails
pub fn write_reports(path: &Path, reports: &[RunReport]) -> Result<(), WriteReportError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, reports)?;
    writer.flush()?;
    Ok(())
}
