use crate::error::{Result, StackError};
use crate::io::{open_raster, PartialFile};
use crate::options::CreationOptions;
use crate::tile_index::MosaicGroups;
use gdal::cpl::CslStringList;
use gdal::Dataset;
use log::{debug, info};
use rayon::prelude::*;
use std::ffi::{c_int, CStr, CString};
use std::path::{Path, PathBuf};

/// CRS every mosaic is warped into
pub const TARGET_SRS: &str = "EPSG:4326";

/// Value written where no tile covers the mosaic extent; CDL's background class
pub const DEFAULT_MOSAIC_NODATA: f64 = 0.0;

struct WarpAppOptionsWrapper {
    options: *mut gdal_sys::GDALWarpAppOptions,
}

impl WarpAppOptionsWrapper {
    fn new(args: &[String], dest: &Path) -> Result<Self> {
        let mut c_args = CslStringList::new();
        for arg in args {
            c_args.add_string(arg)?;
        }

        let options =
            unsafe { gdal_sys::GDALWarpAppOptionsNew(c_args.as_ptr(), std::ptr::null_mut()) };
        if options.is_null() {
            return Err(StackError::MosaicFailed {
                path: dest.to_path_buf(),
                reason: format!("invalid warp arguments {:?}: {}", args, last_gdal_error()),
            });
        }
        Ok(Self { options })
    }
}

impl Drop for WarpAppOptionsWrapper {
    fn drop(&mut self) {
        unsafe {
            gdal_sys::GDALWarpAppOptionsFree(self.options);
        }
    }
}

fn last_gdal_error() -> String {
    unsafe {
        let msg = gdal_sys::CPLGetLastErrorMsg();
        if msg.is_null() {
            String::new()
        } else {
            CStr::from_ptr(msg).to_string_lossy().into_owned()
        }
    }
}

/// Warp all `sources`, in order, into a new file at `dest`
fn warp_to_disk(sources: &[Dataset], dest: &Path, args: &[String]) -> Result<()> {
    let failed = |reason: String| StackError::MosaicFailed {
        path: dest.to_path_buf(),
        reason,
    };

    let warp_options = WarpAppOptionsWrapper::new(args, dest)?;
    let dest_str = CString::new(dest.to_string_lossy().as_ref())
        .map_err(|e| failed(format!("invalid destination path: {}", e)))?;

    unsafe {
        let mut handles: Vec<gdal_sys::GDALDatasetH> =
            sources.iter().map(|ds| ds.c_dataset()).collect();
        let mut user_error: c_int = 0;

        let out = gdal_sys::GDALWarp(
            dest_str.as_ptr(),
            std::ptr::null_mut(),
            handles.len() as c_int,
            handles.as_mut_ptr(),
            warp_options.options,
            &mut user_error,
        );

        if user_error != 0 {
            return Err(failed("GDAL Warp: invalid arguments".to_string()));
        }
        if out.is_null() {
            return Err(failed(last_gdal_error()));
        }
        gdal_sys::GDALClose(out);
    }

    Ok(())
}

/// Merges groups of tiles into single reprojected GeoTIFFs
#[derive(Debug, Clone)]
pub struct MosaicBuilder {
    target_srs: String,
    options: CreationOptions,
    nodata: Option<f64>,
}

impl Default for MosaicBuilder {
    fn default() -> Self {
        Self {
            target_srs: TARGET_SRS.to_string(),
            options: CreationOptions::mosaic(),
            nodata: Some(DEFAULT_MOSAIC_NODATA),
        }
    }
}

impl MosaicBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodata tagged on the mosaic and filled into uncovered pixels.
    /// `None` leaves gaps as untagged zeros.
    pub fn with_nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = nodata;
        self
    }

    /// gdalwarp-style argument list. Nearest-neighbour keeps class codes
    /// intact, and sources later in the list overwrite earlier ones.
    pub fn warp_args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "-of",
            "GTiff",
            "-t_srs",
            self.target_srs.as_str(),
            "-r",
            "near",
            "-multi",
            "-wo",
            "NUM_THREADS=ALL_CPUS",
            "-overwrite",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if let Some(nd) = self.nodata {
            args.push("-dstnodata".to_string());
            args.push(nd.to_string());
            args.push("-wo".to_string());
            args.push("INIT_DEST=NO_DATA".to_string());
        }

        for opt in self.options.to_strings() {
            args.push("-co".to_string());
            args.push(opt);
        }
        args
    }

    /// Mosaic one group of tiles into `dest`
    pub fn build(&self, id: &str, tiles: &[PathBuf], dest: &Path) -> Result<PathBuf> {
        if tiles.is_empty() {
            return Err(StackError::EmptyGroup(format!("no tiles to mosaic for '{}'", id)));
        }
        self.options.validate()?;

        info!("Mosaicking {} tile(s) into {}", tiles.len(), dest.display());
        let sources: Vec<Dataset> = tiles
            .iter()
            .map(|tile| open_raster(tile))
            .collect::<Result<_>>()?;

        let partial = PartialFile::for_destination(dest)?;
        let args = self.warp_args();
        debug!("Warp arguments: {:?}", args);
        warp_to_disk(&sources, partial.path(), &args)?;
        drop(sources);

        partial.commit(dest)?;
        info!("Mosaic written: {}", dest.display());
        Ok(dest.to_path_buf())
    }

    /// Mosaic every group into `<dest_dir>/<id>.tif`. Groups are independent
    /// and are built concurrently; each result is reported separately.
    pub fn build_all(&self, groups: &MosaicGroups, dest_dir: &Path) -> Vec<(String, Result<PathBuf>)> {
        groups
            .par_iter()
            .map(|(id, tiles)| {
                let dest = dest_dir.join(format!("{}.tif", id));
                (id.clone(), self.build(id, tiles, &dest))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warp_args_carry_creation_options() {
        let args = MosaicBuilder::new().warp_args();
        let joined = args.join(" ");
        assert!(joined.contains("-t_srs EPSG:4326"));
        assert!(joined.contains("-r near"));
        for opt in [
            "BIGTIFF=YES",
            "BLOCKXSIZE=1024",
            "BLOCKYSIZE=1024",
            "TILED=YES",
            "COMPRESS=LZW",
            "NUM_THREADS=ALL_CPUS",
        ] {
            assert!(joined.contains(&format!("-co {}", opt)), "missing {}", opt);
        }
    }

    #[test]
    fn test_warp_args_tag_uncovered_pixels() {
        let joined = MosaicBuilder::new().warp_args().join(" ");
        assert!(joined.contains("-dstnodata 0"));
        assert!(joined.contains("-wo INIT_DEST=NO_DATA"));

        let joined = MosaicBuilder::new().with_nodata(Some(255.0)).warp_args().join(" ");
        assert!(joined.contains("-dstnodata 255"));

        let joined = MosaicBuilder::new().with_nodata(None).warp_args().join(" ");
        assert!(!joined.contains("-dstnodata"));
        assert!(!joined.contains("INIT_DEST"));
    }

    #[test]
    fn test_invalid_warp_arguments_name_destination() {
        let dest = Path::new("/data/2015/Corn_mosaic_prj/Corn_2015_cdl.partial.tif");
        let args = vec!["-no-such-warp-flag".to_string()];

        match WarpAppOptionsWrapper::new(&args, dest) {
            Err(StackError::MosaicFailed { path, .. }) => assert_eq!(path, dest),
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("bogus flag accepted"),
        }
    }

    #[test]
    fn test_empty_group_rejected_without_output() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("mosaic/Corn_2015_cdl.tif");

        let err = MosaicBuilder::new()
            .build("Corn_2015_cdl", &[], &dest)
            .unwrap_err();

        assert!(matches!(err, StackError::EmptyGroup(_)));
        assert!(!dest.exists());
        assert!(!dest.parent().unwrap().exists());
    }
}
