use crate::chunking::{evaluate_in_batches, ChunkGrid, ChunkSource, ChunkWindow};
use crate::error::{Result, StackError};
use crate::options::CreationOptions;
use gdal::raster::{Buffer, GdalDataType, GdalType, RasterBand};
use gdal::{Dataset, DriverManager};
use log::{debug, info, warn};
use ndarray::Array2;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Attempts made for a raster read before the error is surfaced
pub const READ_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Georeferencing and layout of a single-band raster
#[derive(Debug, Clone, PartialEq)]
pub struct RasterProfile {
    pub width: usize,
    pub height: usize,
    pub geotransform: [f64; 6],
    pub projection: String,
    pub block_size: (usize, usize),
    pub data_type: GdalDataType,
    pub nodata: Option<f64>,
}

impl RasterProfile {
    /// Same profile with only the data type replaced
    pub fn with_data_type(&self, data_type: GdalDataType) -> Self {
        Self {
            data_type,
            ..self.clone()
        }
    }

    /// First spatial field in which `other` differs from `self`, if any
    pub fn spatial_mismatch(&self, other: &RasterProfile) -> Option<&'static str> {
        if (self.width, self.height) != (other.width, other.height) {
            Some("shape")
        } else if self.geotransform != other.geotransform {
            Some("transform")
        } else if self.projection != other.projection {
            Some("crs")
        } else {
            None
        }
    }
}

/// Extract the profile of band 1 without reading any pixels
pub fn extract_profile(dataset: &Dataset) -> Result<RasterProfile> {
    let rasterband: RasterBand = dataset.rasterband(1)?;

    let width = rasterband.x_size() as usize;
    let height = rasterband.y_size() as usize;

    if width == 0 || height == 0 {
        return Err(StackError::InvalidDimensions(width, height));
    }

    Ok(RasterProfile {
        width,
        height,
        geotransform: dataset.geo_transform()?,
        projection: dataset.projection(),
        block_size: rasterband.block_size(),
        data_type: rasterband.band_type(),
        nodata: rasterband.no_data_value(),
    })
}

/// Run a read, retrying transient failures with linear back-off
pub fn with_retries<T>(what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < READ_ATTEMPTS => {
                warn!("{} failed (attempt {}/{}): {}", what, attempt, READ_ATTEMPTS, e);
                thread::sleep(RETRY_BACKOFF * attempt);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn open_dataset(path: &Path) -> Result<Dataset> {
    if !path.exists() {
        return Err(StackError::Io(std::io::Error::new(
            ErrorKind::NotFound,
            format!("raster not found: {}", path.display()),
        )));
    }
    Ok(Dataset::open(path)?)
}

/// Open a raster for reading, retrying transient failures
pub fn open_raster(path: &Path) -> Result<Dataset> {
    with_retries(&format!("Opening {}", path.display()), || open_dataset(path))
}

/// Read only the profile of a raster on disk
pub fn read_profile(path: &Path) -> Result<RasterProfile> {
    with_retries(&format!("Reading profile of {}", path.display()), || {
        let dataset = open_dataset(path)?;
        extract_profile(&dataset)
    })
}

/// A categorical raster on disk, read one window at a time
#[derive(Debug, Clone)]
pub struct LazyRaster {
    path: PathBuf,
    profile: RasterProfile,
}

impl LazyRaster {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        info!("Opening input raster: {}", path.display());
        let profile = read_profile(&path)?;
        debug!(
            "{}: {}x{}, block {:?}, {:?}, nodata {:?}",
            path.display(),
            profile.width,
            profile.height,
            profile.block_size,
            profile.data_type,
            profile.nodata
        );
        Ok(Self { path, profile })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn profile(&self) -> &RasterProfile {
        &self.profile
    }

    /// Nodata as a class value, when it is representable as one. Signed
    /// sentinels such as -9999 are kept as they are.
    pub fn nodata_class(&self) -> Option<i64> {
        self.profile
            .nodata
            .filter(|nd| nd.fract() == 0.0 && *nd >= i64::MIN as f64 && *nd <= i64::MAX as f64)
            .map(|nd| nd as i64)
    }

    pub fn read_window(&self, window: &ChunkWindow) -> Result<Array2<i64>> {
        with_retries(&format!("Reading {}", self.path.display()), || {
            let dataset = open_dataset(&self.path)?;
            let rasterband = dataset.rasterband(1)?;

            debug!(
                "Reading chunk: offset=({},{}), size=({},{})",
                window.x_off, window.y_off, window.width, window.height
            );

            let buffer =
                rasterband.read_as::<i64>(window.offset(), window.size(), window.size(), None)?;
            let data_vec: Vec<i64> = buffer.into_iter().collect();
            Ok(Array2::from_shape_vec(window.shape(), data_vec)?)
        })
    }
}

impl ChunkSource for LazyRaster {
    type Elem = i64;

    fn dimensions(&self) -> (usize, usize) {
        (self.profile.width, self.profile.height)
    }

    fn compute(&self, window: &ChunkWindow) -> Result<Array2<i64>> {
        self.read_window(window)
    }
}

/// Create `dir` and its parents; a directory that already exists, including one
/// created concurrently by another worker, is not an error.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    match fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Sibling path a raster is written to before being moved into place
pub fn partial_path(dest: &Path) -> PathBuf {
    dest.with_extension("partial.tif")
}

/// A file being written next to its final destination. Removed on drop unless
/// committed.
pub struct PartialFile {
    path: PathBuf,
    committed: bool,
}

impl PartialFile {
    pub fn for_destination(dest: &Path) -> Result<Self> {
        if let Some(parent) = dest.parent() {
            ensure_dir(parent)?;
        }
        let path = partial_path(dest);
        if path.exists() {
            debug!("Removing stale partial file {}", path.display());
            fs::remove_file(&path)?;
        }
        Ok(Self {
            path,
            committed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move the finished file onto `dest`
    pub fn commit(mut self, dest: &Path) -> Result<()> {
        fs::rename(&self.path, dest)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.committed && self.path.exists() {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!("Could not remove partial file {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Write `source` to `path` as a single-band GeoTIFF described by `profile`.
///
/// This is the point where the deferred chunk graph is evaluated. The file
/// only appears at `path` once every chunk has been written.
pub fn write_raster<S>(source: &S, profile: &RasterProfile, path: &Path, chunk_size: usize) -> Result<()>
where
    S: ChunkSource<Elem = u64>,
{
    if source.dimensions() != (profile.width, profile.height) {
        return Err(StackError::InvalidDimensions(
            source.dimensions().0,
            source.dimensions().1,
        ));
    }

    info!("Creating output raster: {}", path.display());
    let partial = PartialFile::for_destination(path)?;
    let options = CreationOptions::for_block_size(profile.block_size);

    match profile.data_type {
        GdalDataType::UInt32 => {
            write_typed::<u32, S>(source, profile, partial.path(), &options, chunk_size)?
        }
        GdalDataType::UInt64 => {
            write_typed::<u64, S>(source, profile, partial.path(), &options, chunk_size)?
        }
        other => return Err(StackError::UnsupportedDataType(format!("{:?}", other))),
    }

    partial.commit(path)?;
    info!("Successfully wrote {}", path.display());
    Ok(())
}

fn write_typed<T, S>(
    source: &S,
    profile: &RasterProfile,
    path: &Path,
    options: &CreationOptions,
    chunk_size: usize,
) -> Result<()>
where
    T: GdalType + Copy + TryFrom<u64>,
    S: ChunkSource<Elem = u64>,
{
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dataset = driver.create_with_band_type_with_options::<T, _>(
        path,
        profile.width,
        profile.height,
        1,
        &options.to_csl()?,
    )?;

    dataset.set_geo_transform(&profile.geotransform)?;
    if !profile.projection.is_empty() {
        dataset.set_projection(&profile.projection)?;
    }
    if let Some(nd) = profile.nodata {
        dataset.rasterband(1)?.set_no_data_value(Some(nd))?;
    }

    let grid = ChunkGrid::new(profile.width, profile.height, chunk_size)?;
    evaluate_in_batches(source, &grid, |window, data| {
        let values: Vec<T> = data
            .iter()
            .map(|&v| T::try_from(v).map_err(|_| StackError::ValueOverflow(v)))
            .collect::<Result<_>>()?;

        let mut raster_band = dataset.rasterband(1)?;
        let mut buffer = Buffer::new(window.size(), values);
        raster_band.write(window.offset(), window.size(), &mut buffer)?;

        debug!(
            "Wrote chunk at ({},{}) size {}x{}",
            window.x_off, window.y_off, window.width, window.height
        );
        Ok(())
    })?;

    // Closing the dataset flushes it before the rename.
    drop(dataset);
    Ok(())
}
