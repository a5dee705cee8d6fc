use crate::chunking::{ChunkSource, ChunkWindow};
use crate::error::{Result, StackError};
use crate::io::{LazyRaster, RasterProfile};
use log::{info, warn};
use ndarray::Array2;
use std::path::Path;

/// Most layers a stack can hold: the digit count of `u64::MAX` minus one.
pub const MAX_LAYERS: usize = 19;

/// Absent/present indicator digits. Layer `i` of `n` writes its digit into
/// decimal slot `n - 1 - i`, so the earliest year is the highest-order digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingScheme {
    absent: u8,
    present: u8,
}

impl Default for EncodingScheme {
    fn default() -> Self {
        Self {
            absent: 1,
            present: 2,
        }
    }
}

impl EncodingScheme {
    pub fn new(absent: u8, present: u8) -> Result<Self> {
        if absent > 9 || present > 9 {
            return Err(StackError::EncodingConfig(format!(
                "indicators must be single decimal digits, got absent={} present={}",
                absent, present
            )));
        }
        if absent == present {
            return Err(StackError::EncodingConfig(format!(
                "absent and present indicators must differ, both are {}",
                absent
            )));
        }
        if absent == 0 || present == 0 {
            warn!("An indicator of 0 cannot be told apart from nodata when decoding");
        }
        Ok(Self { absent, present })
    }

    pub fn absent(&self) -> u8 {
        self.absent
    }

    pub fn present(&self) -> u8 {
        self.present
    }

    /// Codes for each of `layers` layers, in layer order
    pub fn slot_codes(&self, layers: usize) -> Result<Vec<SlotCodes>> {
        if layers == 0 {
            return Err(StackError::EmptyGroup("no layers to reclassify".to_string()));
        }
        if layers > MAX_LAYERS {
            return Err(StackError::EncodingConfig(format!(
                "{} layers exceed the {} decimal slots available",
                layers, MAX_LAYERS
            )));
        }

        Ok((0..layers)
            .map(|i| {
                let slot = (layers - 1 - i) as u32;
                let scale = 10u64.pow(slot);
                SlotCodes {
                    slot,
                    absent: u64::from(self.absent) * scale,
                    present: u64::from(self.present) * scale,
                }
            })
            .collect())
    }
}

/// The two values one layer can contribute to the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotCodes {
    pub slot: u32,
    pub absent: u64,
    pub present: u64,
}

/// Map raw class values to slot codes; nodata pixels contribute nothing.
pub fn reclassify_values(
    raw: &Array2<i64>,
    target_class: u32,
    codes: &SlotCodes,
    nodata: Option<i64>,
) -> Array2<u64> {
    let target = i64::from(target_class);
    raw.mapv(|value| {
        if Some(value) == nodata {
            0
        } else if value == target {
            codes.present
        } else {
            codes.absent
        }
    })
}

/// One year's layer, reclassified lazily chunk by chunk
#[derive(Debug, Clone)]
pub struct ReclassifiedLayer {
    source: LazyRaster,
    codes: SlotCodes,
    target_class: u32,
    nodata: Option<i64>,
}

impl ReclassifiedLayer {
    pub fn path(&self) -> &Path {
        self.source.path()
    }

    pub fn profile(&self) -> &RasterProfile {
        self.source.profile()
    }

    pub fn codes(&self) -> SlotCodes {
        self.codes
    }
}

impl ChunkSource for ReclassifiedLayer {
    type Elem = u64;

    fn dimensions(&self) -> (usize, usize) {
        self.source.dimensions()
    }

    fn compute(&self, window: &ChunkWindow) -> Result<Array2<u64>> {
        let raw = self.source.read_window(window)?;
        Ok(reclassify_values(&raw, self.target_class, &self.codes, self.nodata))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LayerReclassifier {
    scheme: EncodingScheme,
    target_class: u32,
}

impl LayerReclassifier {
    pub fn new(scheme: EncodingScheme, target_class: u32) -> Self {
        Self {
            scheme,
            target_class,
        }
    }

    /// Attach slot codes to chronologically ordered layers. No pixels are
    /// read here.
    pub fn reclassify(&self, layers: Vec<LazyRaster>) -> Result<Vec<ReclassifiedLayer>> {
        let codes = self.scheme.slot_codes(layers.len())?;

        Ok(layers
            .into_iter()
            .zip(codes)
            .enumerate()
            .map(|(i, (source, codes))| {
                info!(
                    "Reclassifying layer {} to present: {} | absent: {}",
                    i, codes.present, codes.absent
                );
                let nodata = source.nodata_class();
                ReclassifiedLayer {
                    source,
                    codes,
                    target_class: self.target_class,
                    nodata,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_slot_codes_two_layers() {
        let codes = EncodingScheme::default().slot_codes(2).unwrap();
        assert_eq!(codes[0], SlotCodes { slot: 1, absent: 10, present: 20 });
        assert_eq!(codes[1], SlotCodes { slot: 0, absent: 1, present: 2 });
    }

    #[test]
    fn test_slots_are_distinct() {
        let codes = EncodingScheme::default().slot_codes(MAX_LAYERS).unwrap();
        let mut slots: Vec<u32> = codes.iter().map(|c| c.slot).collect();
        slots.dedup();
        assert_eq!(slots.len(), MAX_LAYERS);
        assert_eq!(codes[0].present, 2 * 10u64.pow(18));
    }

    #[test]
    fn test_scheme_rejects_multi_digit_indicator() {
        assert!(matches!(
            EncodingScheme::new(1, 10),
            Err(StackError::EncodingConfig(_))
        ));
    }

    #[test]
    fn test_scheme_rejects_equal_indicators() {
        assert!(matches!(
            EncodingScheme::new(3, 3),
            Err(StackError::EncodingConfig(_))
        ));
    }

    #[test]
    fn test_slot_codes_rejects_empty_and_oversized() {
        let scheme = EncodingScheme::default();
        assert!(matches!(scheme.slot_codes(0), Err(StackError::EmptyGroup(_))));
        assert!(matches!(
            scheme.slot_codes(MAX_LAYERS + 1),
            Err(StackError::EncodingConfig(_))
        ));
    }

    #[test]
    fn test_reclassify_empty_sequence() {
        let reclassifier = LayerReclassifier::new(EncodingScheme::default(), 1);
        assert!(matches!(
            reclassifier.reclassify(Vec::new()),
            Err(StackError::EmptyGroup(_))
        ));
    }

    #[test]
    fn test_reclassify_values() {
        let raw = arr2(&[[1, 5, 0], [1, 1, 24]]);
        let codes = SlotCodes {
            slot: 2,
            absent: 100,
            present: 200,
        };
        let out = reclassify_values(&raw, 1, &codes, Some(0));
        assert_eq!(out, arr2(&[[200, 100, 0], [200, 200, 100]]));
    }

    #[test]
    fn test_reclassify_values_without_nodata() {
        let raw = arr2(&[[0, 1]]);
        let codes = EncodingScheme::default().slot_codes(1).unwrap()[0];
        let out = reclassify_values(&raw, 1, &codes, None);
        assert_eq!(out, arr2(&[[1, 2]]));
    }

    #[test]
    fn test_reclassify_values_signed_nodata() {
        let raw = arr2(&[[-9999, 0, 1]]);
        let codes = EncodingScheme::default().slot_codes(1).unwrap()[0];

        let out = reclassify_values(&raw, 0, &codes, Some(-9999));
        assert_eq!(out, arr2(&[[0, 2, 1]]));
    }
}
