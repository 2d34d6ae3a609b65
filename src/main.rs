use anyhow::Context;
use cbt_cycles::config::{read_window_settings, Args, ExperimentConfig};
use cbt_cycles::data_loading::{discover_exports, load_exports};
use cbt_cycles::output::write_reports;
use cbt_cycles::run_analysis;
use clap::Parser;
use log::debug;

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init();

    let args = Args::parse();

    let mut config = ExperimentConfig::load(&args.config)?;
    if let Some(settings_path) = &args.settings {
        let settings = read_window_settings(settings_path)?;
        debug!("Window settings from {}: {:?}", settings_path.display(), settings);
        config.apply_settings(&settings);
    }
    config.apply_args(&args);
    config.validate().context("Invalid experiment configuration")?;

    let exports = discover_exports(&args.input_path)?;
    println!("Found {} export files", exports.len());
    let raw = load_exports(&exports)?;

    let report = run_analysis(raw, &config).context("Analysis failed")?;

    println!(
        "Processed {} readings ({} missing, {} rejected) across {} days for {} subjects",
        report.normalize.accepted,
        report.normalize.missing,
        report.normalize.rejected(),
        report.days.len(),
        report.subjects.len()
    );
    if !report.uncalibrated.is_empty() {
        println!(
            "Dropped subjects without calibration: {}",
            report
                .uncalibrated
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    for row in &report.summary {
        println!(
            "{} subject {} {}: {}",
            row.day, row.subject, row.cycle, row.summary
        );
    }

    match &args.output_dir {
        Some(dir) => write_reports(dir, &report)?,
        None => println!("No --output-dir given, skipping report files"),
    }

    Ok(())
}
