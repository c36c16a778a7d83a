#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::sync::Arc;

use clap::Parser as _;
use dining::{Args, format_report, init_logging, run_variants, write_reports};
use dining_arbiter::simulation::Simulation;
use dining_log_sink::FileSink;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    init_logging()?;

    let config = args.simulation_config()?;
    let sink = Arc::new(FileSink::create(&args.log_file)?);
    let simulation = Simulation::new(config, sink)?;

    let stop = simulation.stop_handle();
    ctrlc::set_handler(move || {
        log::warn!("Received Ctrl-C, interrupting philosophers");
        stop.stop();
    })?;

    println!(
        "Starting simulation with seed={} philosophers={} duration={}ms log={}",
        config.seed.unwrap_or_default(),
        config.workers,
        config.run_duration.as_millis(),
        args.log_file.display(),
    );

    let reports = run_variants(&simulation, &args.variant.variants())?;

    for report in &reports {
        for line in format_report(report) {
            println!("{line}");
        }
    }

    if let Some(path) = &args.report {
        write_reports(path, &reports)?;
        log::info!("Wrote run reports to {}", path.display());
    }

    log::info!(
        "Simulation finished (seed={}) interrupted={}",
        config.seed.unwrap_or_default(),
        simulation.stop_handle().is_stopped()
    );

    Ok(())
}
