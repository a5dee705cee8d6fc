use crate::chunking::DEFAULT_CHUNK_SIZE;
use crate::config::{PipelineConfig, DEFAULT_LOOKUP_FILE, DEFAULT_TILE_PATTERN};
use crate::error::{Result, StackError};
use crate::lookup::AccuracyThreshold;
use crate::mosaic::DEFAULT_MOSAIC_NODATA;
use crate::reclass::EncodingScheme;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "host-stack")]
#[command(about = "Mosaic yearly land-cover tiles and build per-host presence/absence stacks")]
#[command(version)]
#[command(author = "Huimori Project")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Number of threads (default: all available)
    #[arg(short, long, global = true, value_name = "N")]
    pub threads: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Mosaic exported tiles for every host and year
    Mosaic(PipelineArgs),
    /// Reclassify yearly mosaics and stack them per host
    Stack(PipelineArgs),
    /// Mosaic, then stack
    Run(PipelineArgs),
}

impl Command {
    pub fn pipeline_args(&self) -> &PipelineArgs {
        match self {
            Command::Mosaic(args) | Command::Stack(args) | Command::Run(args) => args,
        }
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PipelineArgs {
    /// Project data directory holding per-year tile and mosaic folders
    #[arg(short, long, value_name = "DIR")]
    pub data_dir: PathBuf,

    /// Root of `<year>/<host>_prj` tile folders (default: data dir)
    #[arg(long, value_name = "DIR")]
    pub tile_root: Option<PathBuf>,

    /// Root of `<year>/<host>_mosaic_prj` folders (default: data dir)
    #[arg(long, value_name = "DIR")]
    pub mosaic_root: Option<PathBuf>,

    /// Where per-host stacks are written (default: <data dir>/reclassified_host_stacks)
    #[arg(long, value_name = "DIR")]
    pub stack_root: Option<PathBuf>,

    /// Root of `<year>/<lookup file>` class tables (default: <data dir>/cdl_accuracy_eval)
    #[arg(long, value_name = "DIR")]
    pub lookup_root: Option<PathBuf>,

    /// File name of each year's class lookup table
    #[arg(long, value_name = "FILE", default_value = DEFAULT_LOOKUP_FILE)]
    pub lookup_file: String,

    /// Glob selecting tile files inside a tile folder
    #[arg(long, value_name = "GLOB", default_value = DEFAULT_TILE_PATTERN)]
    pub tile_pattern: String,

    /// Nodata written into mosaics where no tile has coverage
    #[arg(long, value_name = "VALUE", default_value_t = DEFAULT_MOSAIC_NODATA)]
    pub mosaic_nodata: f64,

    /// Host class name, as spelled in the lookup table (repeatable)
    #[arg(long = "host", value_name = "CLASS", required = true)]
    pub hosts: Vec<String>,

    /// First year to process
    #[arg(long, value_name = "YEAR")]
    pub start_year: u16,

    /// Last year to process (inclusive)
    #[arg(long, value_name = "YEAR")]
    pub end_year: u16,

    /// Minimum producer accuracy (0-1)
    #[arg(long, value_name = "FRACTION", default_value_t = 0.5)]
    pub producer_threshold: f64,

    /// Minimum user accuracy (0-1)
    #[arg(long, value_name = "FRACTION", default_value_t = 0.5)]
    pub user_threshold: f64,

    /// Digit marking the host as absent in a year
    #[arg(long, value_name = "DIGIT", default_value_t = 1)]
    pub absent_digit: u8,

    /// Digit marking the host as present in a year
    #[arg(long, value_name = "DIGIT", default_value_t = 2)]
    pub present_digit: u8,

    /// Edge of the square chunks processed at a time, in pixels
    #[arg(long, value_name = "PIXELS", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,
}

impl TryFrom<&PipelineArgs> for PipelineConfig {
    type Error = StackError;

    fn try_from(args: &PipelineArgs) -> Result<Self> {
        let mut config =
            PipelineConfig::new(&args.data_dir, args.hosts.clone(), args.start_year, args.end_year)?;

        if let Some(dir) = &args.tile_root {
            config.tile_root = dir.clone();
        }
        if let Some(dir) = &args.mosaic_root {
            config.mosaic_root = dir.clone();
        }
        if let Some(dir) = &args.stack_root {
            config.stack_root = dir.clone();
        }
        if let Some(dir) = &args.lookup_root {
            config.lookup_root = dir.clone();
        }
        config.lookup_file = args.lookup_file.clone();
        config.tile_pattern = args.tile_pattern.clone();
        config.mosaic_nodata = Some(args.mosaic_nodata);
        config.threshold = AccuracyThreshold::new(args.producer_threshold, args.user_threshold)?;
        config.encoding = EncodingScheme::new(args.absent_digit, args.present_digit)?;
        config.chunk_size = args.chunk_size;

        config.validate()?;
        Ok(config)
    }
}
