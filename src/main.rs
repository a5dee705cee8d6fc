use clap::Parser;
use env_logger::Env;
use geotiff_host_stack::cli::{Args, Command};
use geotiff_host_stack::pipeline::{run_mosaics, run_stacks, MosaicOutcome};
use geotiff_host_stack::{PipelineConfig, Result};
use log::{error, info};
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logger
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    match run(&args) {
        Ok(0) => {
            info!("=== Done! ===");
            ExitCode::SUCCESS
        }
        Ok(failed) => {
            error!("{} unit(s) failed", failed);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns the number of failed units
fn run(args: &Args) -> Result<usize> {
    info!("=== GeoTIFF Host Stack ===");

    // Set thread pool size if specified
    if let Some(n_threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build_global()
            .expect("Failed to build thread pool");
        info!("Using {} threads", n_threads);
    } else {
        info!("Using all available threads");
    }

    let config = PipelineConfig::try_from(args.command.pipeline_args())?;
    info!(
        "Hosts {:?}, years {}-{}",
        config.hosts, config.start_year, config.end_year
    );

    let mut failed = 0;

    if matches!(args.command, Command::Mosaic(_) | Command::Run(_)) {
        for report in run_mosaics(&config) {
            match &report.outcome {
                Ok(MosaicOutcome::Mosaicked(paths)) => {
                    info!("{} {}: {} mosaic(s)", report.host, report.year, paths.len())
                }
                Ok(MosaicOutcome::BelowThreshold { .. }) => {
                    info!("{} {}: skipped (accuracy)", report.host, report.year)
                }
                Err(_) => failed += 1,
            }
        }
    }

    if matches!(args.command, Command::Stack(_) | Command::Run(_)) {
        for report in run_stacks(&config) {
            match &report.outcome {
                Ok(path) => info!("{}: {}", report.host, path.display()),
                Err(_) => failed += 1,
            }
        }
    }

    Ok(failed)
}
