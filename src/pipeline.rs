use crate::config::PipelineConfig;
use crate::error::{Result, StackError};
use crate::io::LazyRaster;
use crate::lookup::{ClassLookup, ThresholdOutcome};
use crate::mosaic::MosaicBuilder;
use crate::reclass::LayerReclassifier;
use crate::stack::StackAggregator;
use crate::tile_index::{glob_in, index_tiles};
use log::{debug, error, info, warn};
use std::path::PathBuf;

#[derive(Debug)]
pub enum MosaicOutcome {
    Mosaicked(Vec<PathBuf>),
    BelowThreshold {
        producer: Option<f64>,
        user: Option<f64>,
    },
}

#[derive(Debug)]
pub struct MosaicReport {
    pub host: String,
    pub year: u16,
    pub outcome: Result<MosaicOutcome>,
}

#[derive(Debug)]
pub struct StackReport {
    pub host: String,
    pub outcome: Result<PathBuf>,
}

/// Mosaic the tiles of one host for one year, if its classification is
/// accurate enough
pub fn mosaic_host_year(
    config: &PipelineConfig,
    builder: &MosaicBuilder,
    host: &str,
    year: u16,
) -> Result<MosaicOutcome> {
    let lookup = ClassLookup::from_path(&config.lookup_path(year))?;

    match lookup.check_accuracy(host, &config.threshold)? {
        ThresholdOutcome::NotMet { producer, user } => {
            info!(
                "\t{} did not meet accuracy threshold (producer: {:?}, user: {:?})",
                host, producer, user
            );
            Ok(MosaicOutcome::BelowThreshold { producer, user })
        }
        ThresholdOutcome::Met => {
            info!("\t{}: accuracy threshold met", host);

            let tile_dir = config.tile_dir(host, year);
            let groups = index_tiles(&tile_dir, &config.tile_pattern)?;
            if groups.is_empty() {
                return Err(StackError::EmptyGroup(format!(
                    "no tiles for {} in {} under {}",
                    host,
                    year,
                    tile_dir.display()
                )));
            }

            info!("\tCreating final mosaic(s) for ids {:?}", groups.keys().collect::<Vec<_>>());
            let dest_dir = config.mosaic_dir(host, year);
            let mut written = Vec::with_capacity(groups.len());
            for (id, result) in builder.build_all(&groups, &dest_dir) {
                debug!("Group {} finished", id);
                written.push(result?);
            }
            Ok(MosaicOutcome::Mosaicked(written))
        }
    }
}

/// Mosaic every configured (host, year) pair
pub fn run_mosaics(config: &PipelineConfig) -> Vec<MosaicReport> {
    let builder = MosaicBuilder::new().with_nodata(config.mosaic_nodata);
    let mut reports = Vec::new();

    for year in config.years() {
        info!("{}: Checking classification accuracies...", year);
        for host in &config.hosts {
            let outcome = mosaic_host_year(config, &builder, host, year);
            if let Err(e) = &outcome {
                error!("{} {}: {}", host, year, e);
            }
            reports.push(MosaicReport {
                host: host.clone(),
                year,
                outcome,
            });
        }
    }

    reports
}

/// The single mosaic of each year in range that has one, in year order
pub fn collect_yearly_mosaics(config: &PipelineConfig, host: &str) -> Result<Vec<(u16, PathBuf)>> {
    let mut mosaics = Vec::new();

    for year in config.years() {
        let dir = config.mosaic_dir(host, year);
        if !dir.is_dir() {
            debug!("No mosaic directory for {} in {}", host, year);
            continue;
        }

        let mut found = Vec::new();
        for path in glob_in(&dir, "*.tif")? {
            if path.to_string_lossy().ends_with(".partial.tif") {
                warn!("Ignoring leftover partial file {}", path.display());
                continue;
            }
            found.push(path);
        }

        match found.len() {
            0 => debug!("No mosaic for {} in {}", host, year),
            1 => mosaics.push((year, found.remove(0))),
            count => return Err(StackError::AmbiguousYear { year, count, dir }),
        }
    }

    Ok(mosaics)
}

/// Reclassify and stack every yearly mosaic of `host`; returns the stack path
pub fn build_stack(config: &PipelineConfig, host: &str) -> Result<PathBuf> {
    let mosaics = collect_yearly_mosaics(config, host)?;
    let (first_year, last_year) = match (mosaics.first(), mosaics.last()) {
        (Some(first), Some(last)) => (first.0, last.0),
        _ => {
            return Err(StackError::EmptyGroup(format!(
                "no yearly mosaics for {} in {}-{}",
                host, config.start_year, config.end_year
            )))
        }
    };

    info!(
        "{}: Stacking and reclassifying mosaics for {} to {}",
        host, first_year, last_year
    );

    let lookup = ClassLookup::from_path(&config.lookup_path(last_year))?;
    let host_code = lookup.code(host)?;
    debug!("{} is class {}", host, host_code);

    let layers = mosaics
        .iter()
        .map(|(_, path)| LazyRaster::open(path))
        .collect::<Result<Vec<_>>>()?;

    info!("\treclassifying...");
    let reclassified = LayerReclassifier::new(config.encoding, host_code).reclassify(layers)?;

    info!("\tstacking...");
    let stack = StackAggregator::new(reclassified)?;

    let dest = config.stack_path(host, first_year, last_year);
    info!("\tsaving...");
    stack.write(&dest, config.chunk_size)?;
    Ok(dest)
}

/// Build the stack of every configured host
pub fn run_stacks(config: &PipelineConfig) -> Vec<StackReport> {
    config
        .hosts
        .iter()
        .map(|host| {
            let outcome = build_stack(config, host);
            if let Err(e) = &outcome {
                error!("{} stack: {}", host, e);
            }
            StackReport {
                host: host.clone(),
                outcome,
            }
        })
        .collect()
}
