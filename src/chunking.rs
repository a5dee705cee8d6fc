use crate::error::{Result, StackError};
use log::debug;
use ndarray::Array2;
use rayon::prelude::*;

/// Default chunk edge, matching the 1024x1024 tiling of the mosaics.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// A rectangular pixel window within a raster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkWindow {
    pub x_off: usize,
    pub y_off: usize,
    pub width: usize,
    pub height: usize,
}

impl ChunkWindow {
    pub fn offset(&self) -> (isize, isize) {
        (self.x_off as isize, self.y_off as isize)
    }

    /// GDAL-ordered (columns, rows)
    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// ndarray-ordered (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }
}

#[derive(Debug, Clone)]
pub struct ChunkGrid {
    raster_width: usize,
    raster_height: usize,
    chunk_size: usize,
    pub num_chunks_x: usize,
    pub num_chunks_y: usize,
    pub total_chunks: usize,
}

impl ChunkGrid {
    pub fn new(raster_width: usize, raster_height: usize, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(StackError::InvalidChunkSize(chunk_size));
        }

        let num_chunks_x = raster_width.div_ceil(chunk_size);
        let num_chunks_y = raster_height.div_ceil(chunk_size);
        let total_chunks = num_chunks_x * num_chunks_y;

        debug!(
            "ChunkGrid: {}x{} raster, chunk_size={} → {}x{} chunks ({} total)",
            raster_width, raster_height, chunk_size, num_chunks_x, num_chunks_y, total_chunks
        );

        Ok(Self {
            raster_width,
            raster_height,
            chunk_size,
            num_chunks_x,
            num_chunks_y,
            total_chunks,
        })
    }

    pub fn iter(&self) -> ChunkIterator<'_> {
        ChunkIterator::new(self)
    }

    pub fn window(&self, chunk_idx: usize) -> ChunkWindow {
        let chunk_y = chunk_idx / self.num_chunks_x;
        let chunk_x = chunk_idx % self.num_chunks_x;

        let x_off = chunk_x * self.chunk_size;
        let y_off = chunk_y * self.chunk_size;
        let x_max = ((chunk_x + 1) * self.chunk_size).min(self.raster_width);
        let y_max = ((chunk_y + 1) * self.chunk_size).min(self.raster_height);

        ChunkWindow {
            x_off,
            y_off,
            width: x_max - x_off,
            height: y_max - y_off,
        }
    }
}

pub struct ChunkIterator<'a> {
    grid: &'a ChunkGrid,
    current_idx: usize,
}

impl<'a> ChunkIterator<'a> {
    fn new(grid: &'a ChunkGrid) -> Self {
        Self {
            grid,
            current_idx: 0,
        }
    }
}

impl Iterator for ChunkIterator<'_> {
    type Item = (usize, ChunkWindow);

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_idx < self.grid.total_chunks {
            let window = self.grid.window(self.current_idx);
            let idx = self.current_idx;
            self.current_idx += 1;
            Some((idx, window))
        } else {
            None
        }
    }
}

/// A deferred raster computation that can produce any window on demand.
///
/// Nothing is read or computed until a window is requested, so a chain of
/// sources (read → reclassify → sum) forms a per-chunk task graph that is only
/// evaluated when a writer pulls chunks out of it.
pub trait ChunkSource: Sync {
    type Elem: Copy + Send;

    /// Raster dimensions as (width, height)
    fn dimensions(&self) -> (usize, usize);

    fn compute(&self, window: &ChunkWindow) -> Result<Array2<Self::Elem>>;
}

/// Evaluate `source` over `grid` one batch at a time, handing every finished
/// chunk to `sink` in grid order.
///
/// Each batch holds one chunk per rayon worker, so at most that many chunks
/// are resident at once.
pub fn evaluate_in_batches<S, F>(source: &S, grid: &ChunkGrid, mut sink: F) -> Result<()>
where
    S: ChunkSource,
    F: FnMut(&ChunkWindow, Array2<S::Elem>) -> Result<()>,
{
    let windows: Vec<ChunkWindow> = grid.iter().map(|(_, w)| w).collect();
    let batch_size = rayon::current_num_threads().max(1);

    for (batch_idx, batch) in windows.chunks(batch_size).enumerate() {
        debug!("Evaluating batch {} ({} chunks)", batch_idx, batch.len());

        let computed: Vec<Array2<S::Elem>> = batch
            .par_iter()
            .map(|window| source.compute(window))
            .collect::<Result<_>>()?;

        for (window, data) in batch.iter().zip(computed) {
            sink(window, data)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RowIndex {
        width: usize,
        height: usize,
    }

    impl ChunkSource for RowIndex {
        type Elem = u64;

        fn dimensions(&self) -> (usize, usize) {
            (self.width, self.height)
        }

        fn compute(&self, window: &ChunkWindow) -> Result<Array2<u64>> {
            Ok(Array2::from_shape_fn(window.shape(), |(r, _)| {
                (window.y_off + r) as u64
            }))
        }
    }

    #[test]
    fn test_chunk_grid_simple() {
        let grid = ChunkGrid::new(4000, 4000, 2000).unwrap();
        assert_eq!(grid.num_chunks_x, 2);
        assert_eq!(grid.num_chunks_y, 2);
        assert_eq!(grid.total_chunks, 4);
    }

    #[test]
    fn test_chunk_grid_zero_size() {
        assert!(matches!(
            ChunkGrid::new(10, 10, 0),
            Err(StackError::InvalidChunkSize(0))
        ));
    }

    #[test]
    fn test_window_clipped_at_edge() {
        let grid = ChunkGrid::new(2500, 1100, 1024).unwrap();
        assert_eq!(grid.num_chunks_x, 3);
        assert_eq!(grid.num_chunks_y, 2);

        let last = grid.window(grid.total_chunks - 1);
        assert_eq!(last.x_off, 2048);
        assert_eq!(last.y_off, 1024);
        assert_eq!(last.width, 452);
        assert_eq!(last.height, 76);
    }

    #[test]
    fn test_windows_cover_raster_once() {
        let grid = ChunkGrid::new(37, 23, 8).unwrap();
        let area: usize = grid.iter().map(|(_, w)| w.width * w.height).sum();
        assert_eq!(area, 37 * 23);
    }

    #[test]
    fn test_evaluate_in_batches_visits_in_order() {
        let source = RowIndex {
            width: 10,
            height: 10,
        };
        let grid = ChunkGrid::new(10, 10, 3).unwrap();
        let mut seen = Vec::new();

        evaluate_in_batches(&source, &grid, |window, data| {
            assert_eq!(data.dim(), window.shape());
            assert_eq!(data[[0, 0]], window.y_off as u64);
            seen.push(*window);
            Ok(())
        })
        .unwrap();

        let expected: Vec<ChunkWindow> = grid.iter().map(|(_, w)| w).collect();
        assert_eq!(seen, expected);
    }
}
