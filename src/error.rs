use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Array shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),

    #[error("Invalid tile pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Failed to list tiles: {0}")]
    Glob(#[from] glob::GlobError),

    #[error("Lookup table error: {0}")]
    LookupTable(#[from] csv::Error),

    #[error("Cannot derive composite id from {path}: {reason}")]
    Indexing { path: PathBuf, reason: String },

    #[error("Empty group: {0}")]
    EmptyGroup(String),

    #[error("Layer {layer} ({path}) does not match the first layer's {field}")]
    ProfileMismatch {
        layer: usize,
        path: PathBuf,
        field: &'static str,
    },

    #[error("Invalid encoding configuration: {0}")]
    EncodingConfig(String),

    #[error("Class '{0}' not found in lookup table")]
    UnknownClass(String),

    #[error("Class '{0}' appears more than once in lookup table")]
    DuplicateClass(String),

    #[error("Year {year} has {count} mosaics in {dir}, expected one")]
    AmbiguousYear {
        year: u16,
        count: usize,
        dir: PathBuf,
    },

    #[error("Mosaic failed for {path}: {reason}")]
    MosaicFailed { path: PathBuf, reason: String },

    #[error("Invalid year range: {0}-{1}")]
    InvalidYearRange(u16, u16),

    #[error("Invalid accuracy threshold: {0} (must be within 0..=1)")]
    InvalidThreshold(f64),

    #[error("Input raster has invalid dimensions: {0}x{1}")]
    InvalidDimensions(usize, usize),

    #[error("Invalid chunk size: {0} (must be positive)")]
    InvalidChunkSize(usize),

    #[error("Invalid compression type: {0}")]
    InvalidCompression(String),

    #[error("Invalid tile size: {0} (must be multiple of 16)")]
    InvalidTileSize(usize),

    #[error("Unsupported output data type: {0}")]
    UnsupportedDataType(String),

    #[error("Value {0} does not fit the output data type")]
    ValueOverflow(u64),

    #[error("Stack value {value} cannot be decoded into {layers} layers")]
    UndecodableValue { value: u64, layers: usize },
}

impl StackError {
    /// Whether a failed read is worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            StackError::Gdal(_) => true,
            StackError::Io(e) => e.kind() != std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, StackError>;
