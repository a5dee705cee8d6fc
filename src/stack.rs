use crate::chunking::{ChunkSource, ChunkWindow};
use crate::error::{Result, StackError};
use crate::io::{write_raster, RasterProfile};
use crate::reclass::{EncodingScheme, ReclassifiedLayer, SlotCodes, MAX_LAYERS};
use gdal::raster::GdalDataType;
use log::{info, warn};
use ndarray::Array2;
use std::path::Path;

/// Narrowest unsigned type that holds `layers` decimal digits
pub fn stack_data_type(layers: usize) -> Result<GdalDataType> {
    match layers {
        0 => Err(StackError::EmptyGroup("no layers to stack".to_string())),
        1..=9 => Ok(GdalDataType::UInt32),
        10..=MAX_LAYERS => Ok(GdalDataType::UInt64),
        _ => Err(StackError::EncodingConfig(format!(
            "{} layers exceed the {} decimal slots available",
            layers, MAX_LAYERS
        ))),
    }
}

/// Per-year state recovered from one digit of a stack value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearPresence {
    Present,
    Absent,
    NoData,
}

/// Split a stack value into per-layer states, earliest layer first
pub fn decode(value: u64, layers: usize, scheme: &EncodingScheme) -> Result<Vec<YearPresence>> {
    let undecodable = StackError::UndecodableValue { value, layers };
    if layers == 0 || layers > MAX_LAYERS {
        return Err(undecodable);
    }

    let mut flags = vec![YearPresence::NoData; layers];
    let mut rest = value;
    for flag in flags.iter_mut().rev() {
        let digit = (rest % 10) as u8;
        rest /= 10;
        *flag = if digit == scheme.present() {
            YearPresence::Present
        } else if digit == scheme.absent() {
            YearPresence::Absent
        } else if digit == 0 {
            YearPresence::NoData
        } else {
            return Err(undecodable);
        };
    }

    if rest != 0 {
        return Err(undecodable);
    }
    Ok(flags)
}

/// The stack value a pixel with these per-layer states sums to
pub fn encode(flags: &[YearPresence], scheme: &EncodingScheme) -> Result<u64> {
    let codes = scheme.slot_codes(flags.len())?;
    Ok(flags
        .iter()
        .zip(codes)
        .map(|(flag, codes)| match flag {
            YearPresence::Present => codes.present,
            YearPresence::Absent => codes.absent,
            YearPresence::NoData => 0,
        })
        .sum())
}

/// Whether `nodata` is a value the stack stores without loss
fn nodata_fits(nodata: f64, data_type: GdalDataType) -> bool {
    let max = match data_type {
        GdalDataType::UInt32 => u32::MAX as f64,
        _ => u64::MAX as f64,
    };
    nodata.fract() == 0.0 && nodata >= 0.0 && nodata <= max
}

/// True when a pixel with at least one absent or present year can sum to
/// `nodata`, which would mask real data
pub fn nodata_collides(nodata: f64, codes: &[SlotCodes]) -> bool {
    if nodata.fract() != 0.0 || nodata <= 0.0 || nodata > u64::MAX as f64 {
        return false;
    }
    let value = nodata as u64;
    let mut rest = value;
    for code in codes.iter().rev() {
        let scale = 10u64.pow(code.slot);
        let digit = rest % 10;
        rest /= 10;
        if digit != 0 && digit * scale != code.absent && digit * scale != code.present {
            return false;
        }
    }
    rest == 0
}

/// Sums reclassified yearly layers into one multi-year stack
#[derive(Debug)]
pub struct StackAggregator {
    layers: Vec<ReclassifiedLayer>,
    profile: RasterProfile,
}

impl StackAggregator {
    /// All layers must share the first layer's shape, transform and CRS.
    pub fn new(layers: Vec<ReclassifiedLayer>) -> Result<Self> {
        let first = layers
            .first()
            .ok_or_else(|| StackError::EmptyGroup("no layers to stack".to_string()))?;

        for (i, layer) in layers.iter().enumerate().skip(1) {
            if let Some(field) = first.profile().spatial_mismatch(layer.profile()) {
                return Err(StackError::ProfileMismatch {
                    layer: i,
                    path: layer.path().to_path_buf(),
                    field,
                });
            }
        }

        let data_type = stack_data_type(layers.len())?;
        let mut profile = first.profile().with_data_type(data_type);

        if let Some(nd) = profile.nodata {
            let codes: Vec<SlotCodes> = layers.iter().map(|l| l.codes()).collect();
            if !nodata_fits(nd, data_type) {
                warn!(
                    "Nodata {} of {} cannot be stored as {:?}; the stack has no nodata value",
                    nd,
                    first.path().display(),
                    data_type
                );
                profile.nodata = None;
            } else if nodata_collides(nd, &codes) {
                warn!(
                    "Nodata {} is also a valid stack value; those pixels will read as nodata",
                    nd
                );
            }
        }

        Ok(Self { layers, profile })
    }

    /// First layer's profile with the stack data type
    pub fn profile(&self) -> &RasterProfile {
        &self.profile
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Evaluate the whole stack and write it to `path`
    pub fn write(&self, path: &Path, chunk_size: usize) -> Result<()> {
        info!(
            "Stacking {} layers into {:?} raster {}",
            self.layers.len(),
            self.profile.data_type,
            path.display()
        );
        write_raster(self, &self.profile, path, chunk_size)
    }
}

impl ChunkSource for StackAggregator {
    type Elem = u64;

    fn dimensions(&self) -> (usize, usize) {
        (self.profile.width, self.profile.height)
    }

    fn compute(&self, window: &ChunkWindow) -> Result<Array2<u64>> {
        let mut sum = Array2::<u64>::zeros(window.shape());
        for layer in &self.layers {
            sum += &layer.compute(window)?;
        }
        Ok(sum)
    }
}
