// Library exports for testing and reuse

pub mod chunking;
pub mod cli;
pub mod config;
pub mod error;
pub mod io;
pub mod lookup;
pub mod mosaic;
pub mod options;
pub mod pipeline;
pub mod reclass;
pub mod stack;
pub mod tile_index;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use error::{Result, StackError};
pub use io::{read_profile, LazyRaster, RasterProfile};
pub use mosaic::MosaicBuilder;
pub use reclass::{EncodingScheme, LayerReclassifier, ReclassifiedLayer};
pub use stack::{decode, StackAggregator, YearPresence};
pub use tile_index::{composite_id, index_tiles, MosaicGroups};
