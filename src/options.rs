use crate::error::{Result, StackError};
use gdal::cpl::CslStringList;

/// Internal tile edge used for every mosaic and stack
pub const MOSAIC_BLOCK_SIZE: usize = 1024;

/// Validate compression type
pub fn validate_compression(compression: &str) -> Result<()> {
    let valid_types = ["DEFLATE", "LZW", "ZSTD", "NONE"];
    if !valid_types.contains(&compression) {
        return Err(StackError::InvalidCompression(compression.to_string()));
    }
    Ok(())
}

/// Validate tile size (must be multiple of 16)
pub fn validate_tile_size(tile_size: usize) -> Result<()> {
    if tile_size == 0 || tile_size % 16 != 0 {
        return Err(StackError::InvalidTileSize(tile_size));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockLayout {
    /// Square-or-rectangular internal tiles
    Tiled { x: usize, y: usize },
    /// Strips of `rows` scanlines each
    Striped { rows: usize },
}

/// GeoTIFF creation options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationOptions {
    pub compression: String,
    pub layout: BlockLayout,
    pub bigtiff: bool,
    pub all_cpus: bool,
}

impl CreationOptions {
    /// The fixed option set every mosaic is written with:
    /// BIGTIFF, 1024x1024 tiles, LZW, multi-threaded I/O.
    pub fn mosaic() -> Self {
        Self {
            compression: "LZW".to_string(),
            layout: BlockLayout::Tiled {
                x: MOSAIC_BLOCK_SIZE,
                y: MOSAIC_BLOCK_SIZE,
            },
            bigtiff: true,
            all_cpus: true,
        }
    }

    /// Mosaic options, but laid out with the given block size so that a derived
    /// raster keeps its parent's block structure.
    pub fn for_block_size(block_size: (usize, usize)) -> Self {
        let (x, y) = block_size;
        let layout = if validate_tile_size(x).is_ok() && validate_tile_size(y).is_ok() {
            BlockLayout::Tiled { x, y }
        } else {
            BlockLayout::Striped { rows: y.max(1) }
        };

        Self {
            layout,
            ..Self::mosaic()
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_compression(&self.compression)?;
        if let BlockLayout::Tiled { x, y } = self.layout {
            validate_tile_size(x)?;
            validate_tile_size(y)?;
        }
        Ok(())
    }

    /// KEY=VALUE strings in the order GDAL documents them
    pub fn to_strings(&self) -> Vec<String> {
        let mut opts = Vec::with_capacity(6);
        opts.push(format!("BIGTIFF={}", if self.bigtiff { "YES" } else { "IF_SAFER" }));
        match self.layout {
            BlockLayout::Tiled { x, y } => {
                opts.push(format!("BLOCKXSIZE={}", x));
                opts.push(format!("BLOCKYSIZE={}", y));
                opts.push("TILED=YES".to_string());
            }
            BlockLayout::Striped { rows } => {
                opts.push(format!("BLOCKYSIZE={}", rows));
            }
        }
        opts.push(format!("COMPRESS={}", self.compression));
        if self.all_cpus {
            opts.push("NUM_THREADS=ALL_CPUS".to_string());
        }
        opts
    }

    pub fn to_csl(&self) -> Result<CslStringList> {
        self.validate()?;
        let mut list = CslStringList::new();
        for opt in self.to_strings() {
            list.add_string(&opt)?;
        }
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_compression_valid() {
        assert!(validate_compression("DEFLATE").is_ok());
        assert!(validate_compression("LZW").is_ok());
        assert!(validate_compression("ZSTD").is_ok());
        assert!(validate_compression("NONE").is_ok());
    }

    #[test]
    fn test_validate_compression_invalid() {
        assert!(validate_compression("INVALID").is_err());
        assert!(validate_compression("lzw").is_err());
    }

    #[test]
    fn test_validate_tile_size() {
        assert!(validate_tile_size(256).is_ok());
        assert!(validate_tile_size(1024).is_ok());
        assert!(validate_tile_size(0).is_err());
        assert!(validate_tile_size(100).is_err());
    }

    #[test]
    fn test_mosaic_options_exact() {
        let opts = CreationOptions::mosaic().to_strings();
        assert_eq!(
            opts,
            vec![
                "BIGTIFF=YES",
                "BLOCKXSIZE=1024",
                "BLOCKYSIZE=1024",
                "TILED=YES",
                "COMPRESS=LZW",
                "NUM_THREADS=ALL_CPUS",
            ]
        );
    }

    #[test]
    fn test_for_block_size_strip_fallback() {
        let opts = CreationOptions::for_block_size((250, 1));
        assert_eq!(opts.layout, BlockLayout::Striped { rows: 1 });
        assert!(!opts.to_strings().contains(&"TILED=YES".to_string()));
        assert!(opts.validate().is_ok());

        let tiled = CreationOptions::for_block_size((256, 512));
        assert_eq!(tiled.layout, BlockLayout::Tiled { x: 256, y: 512 });
    }
}
