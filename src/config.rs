use crate::chunking::DEFAULT_CHUNK_SIZE;
use crate::error::{Result, StackError};
use crate::lookup::AccuracyThreshold;
use crate::mosaic::DEFAULT_MOSAIC_NODATA;
use crate::reclass::EncodingScheme;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

pub const DEFAULT_LOOKUP_FILE: &str = "cdl_accu_filtered_wType.csv";
pub const DEFAULT_TILE_PATTERN: &str = "*.tif";

/// Host name as it appears in paths: `/` is replaced by `_`
pub fn host_file_name(host: &str) -> String {
    host.replace('/', "_")
}

/// Everything the pipeline needs, passed explicitly to each stage
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub tile_root: PathBuf,
    pub mosaic_root: PathBuf,
    pub stack_root: PathBuf,
    pub lookup_root: PathBuf,
    pub lookup_file: String,
    pub tile_pattern: String,
    /// Nodata tagged on every mosaic; also fills pixels no tile covers
    pub mosaic_nodata: Option<f64>,
    pub hosts: Vec<String>,
    pub start_year: u16,
    pub end_year: u16,
    pub threshold: AccuracyThreshold,
    pub encoding: EncodingScheme,
    pub chunk_size: usize,
}

impl PipelineConfig {
    /// Config rooted at one data directory, with defaults for everything but
    /// hosts and years
    pub fn new(
        root: impl AsRef<Path>,
        hosts: Vec<String>,
        start_year: u16,
        end_year: u16,
    ) -> Result<Self> {
        let root = root.as_ref();
        let config = Self {
            tile_root: root.to_path_buf(),
            mosaic_root: root.to_path_buf(),
            stack_root: root.join("reclassified_host_stacks"),
            lookup_root: root.join("cdl_accuracy_eval"),
            lookup_file: DEFAULT_LOOKUP_FILE.to_string(),
            tile_pattern: DEFAULT_TILE_PATTERN.to_string(),
            mosaic_nodata: Some(DEFAULT_MOSAIC_NODATA),
            hosts,
            start_year,
            end_year,
            threshold: AccuracyThreshold::default(),
            encoding: EncodingScheme::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start_year > self.end_year {
            return Err(StackError::InvalidYearRange(self.start_year, self.end_year));
        }
        if self.hosts.is_empty() {
            return Err(StackError::EmptyGroup("no hosts configured".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(StackError::InvalidChunkSize(self.chunk_size));
        }
        Ok(())
    }

    pub fn years(&self) -> RangeInclusive<u16> {
        self.start_year..=self.end_year
    }

    /// `<tile_root>/<year>/<host>_prj`
    pub fn tile_dir(&self, host: &str, year: u16) -> PathBuf {
        self.tile_root
            .join(year.to_string())
            .join(format!("{}_prj", host_file_name(host)))
    }

    /// `<mosaic_root>/<year>/<host>_mosaic_prj`
    pub fn mosaic_dir(&self, host: &str, year: u16) -> PathBuf {
        self.mosaic_root
            .join(year.to_string())
            .join(format!("{}_mosaic_prj", host_file_name(host)))
    }

    /// `<lookup_root>/<year>/<lookup_file>`
    pub fn lookup_path(&self, year: u16) -> PathBuf {
        self.lookup_root.join(year.to_string()).join(&self.lookup_file)
    }

    /// `<stack_root>/<host>/<host>_stack_<start>-<end>_reclassified.tif`
    pub fn stack_path(&self, host: &str, first_year: u16, last_year: u16) -> PathBuf {
        let name = host_file_name(host);
        self.stack_root.join(&name).join(format!(
            "{}_stack_{}-{}_reclassified.tif",
            name, first_year, last_year
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PipelineConfig {
        PipelineConfig::new("/data", vec!["Corn".into()], 2015, 2020).unwrap()
    }

    #[test]
    fn test_host_file_name() {
        assert_eq!(host_file_name("Dbl Crop WinWht/Soybeans"), "Dbl Crop WinWht_Soybeans");
        assert_eq!(host_file_name("Corn"), "Corn");
    }

    #[test]
    fn test_layout() {
        let config = config();
        assert_eq!(config.tile_dir("Corn", 2016), PathBuf::from("/data/2016/Corn_prj"));
        assert_eq!(
            config.mosaic_dir("Corn", 2016),
            PathBuf::from("/data/2016/Corn_mosaic_prj")
        );
        assert_eq!(
            config.lookup_path(2016),
            PathBuf::from("/data/cdl_accuracy_eval/2016/cdl_accu_filtered_wType.csv")
        );
        assert_eq!(
            config.stack_path("Corn", 2015, 2020),
            PathBuf::from("/data/reclassified_host_stacks/Corn/Corn_stack_2015-2020_reclassified.tif")
        );
    }

    #[test]
    fn test_mosaic_nodata_defaults_to_background() {
        assert_eq!(config().mosaic_nodata, Some(0.0));
    }

    #[test]
    fn test_years_inclusive() {
        assert_eq!(config().years().count(), 6);
    }

    #[test]
    fn test_rejects_reversed_years() {
        assert!(matches!(
            PipelineConfig::new("/data", vec!["Corn".into()], 2020, 2015),
            Err(StackError::InvalidYearRange(2020, 2015))
        ));
    }

    #[test]
    fn test_rejects_no_hosts() {
        assert!(PipelineConfig::new("/data", Vec::new(), 2015, 2020).is_err());
    }
}
