//! Nasalance batch runner

use anyhow::{Context, bail};
use clap::Parser;
use nasalance::processing::SegmentFiles;
use nasalance::{Args, BatchOrchestrator, Config, init_logging};
use std::process;

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    if args.verbose {
        println!("{}", nasalance::get_library_info());
        println!();
    }

    if let Some(path) = &args.write_default_config {
        Config::create_default_config(path)
            .with_context(|| format!("Cannot write default config to {}", path.display()))?;
        println!("Default config written to {}", path.display());
        return Ok(());
    }

    let config = Config::from_args_and_config(args).context("Invalid configuration")?;

    if !config.input_dir.is_dir() {
        bail!("Input directory does not exist: {}", config.input_dir.display());
    }
    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("Cannot create output directory {}", config.output_dir.display()))?;

    println!("=== Nasalance Batch ===");
    println!("Input: {}", config.input_dir.display());
    println!("Output: {}", config.output_dir.display());
    if config.batch.parallel {
        println!("Mode: Parallel ({} workers)", config.batch.workers);
    } else {
        println!("Mode: Serial");
    }
    println!("=======================\n");

    let segments = Box::new(SegmentFiles::new(&config.input_dir));
    let orchestrator = BatchOrchestrator::new(config, segments)?;
    let report = orchestrator.run()?;

    println!("=== Batch Complete ===");
    println!("{}", report);
    if orchestrator.config().verbose() {
        for outcome in &report.outcomes {
            if let Err(e) = &outcome.result {
                println!("Skipped {}: {}", outcome.recording_id, e);
            }
        }
    }

    Ok(())
}
