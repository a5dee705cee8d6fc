#![allow(dead_code)]

use gdal::cpl::CslStringList;
use gdal::raster::{Buffer, GdalType};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use std::path::Path;

pub const PIXEL: f64 = 0.01;

/// A small tiled EPSG:4326 Byte raster
pub struct Fixture {
    pub origin: (f64, f64),
    pub width: usize,
    pub height: usize,
    pub nodata: Option<f64>,
}

impl Fixture {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            origin: (10.0, 50.0),
            width,
            height,
            nodata: None,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.origin = (x, y);
        self
    }

    pub fn nodata(mut self, value: f64) -> Self {
        self.nodata = Some(value);
        self
    }

    pub fn write(&self, path: &Path, pixel: impl Fn(usize, usize) -> u8) {
        self.write_typed(path, pixel)
    }

    pub fn write_i16(&self, path: &Path, pixel: impl Fn(usize, usize) -> i16) {
        self.write_typed(path, pixel)
    }

    fn write_typed<T: GdalType + Copy>(&self, path: &Path, pixel: impl Fn(usize, usize) -> T) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }

        let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
        let mut options = CslStringList::new();
        for opt in ["TILED=YES", "BLOCKXSIZE=16", "BLOCKYSIZE=16"] {
            options.add_string(opt).unwrap();
        }

        let mut dataset = driver
            .create_with_band_type_with_options::<T, _>(path, self.width, self.height, 1, &options)
            .unwrap();
        dataset
            .set_geo_transform(&[self.origin.0, PIXEL, 0.0, self.origin.1, 0.0, -PIXEL])
            .unwrap();
        let wkt = SpatialRef::from_epsg(4326).unwrap().to_wkt().unwrap();
        dataset.set_projection(&wkt).unwrap();

        let mut band = dataset.rasterband(1).unwrap();
        if let Some(nd) = self.nodata {
            band.set_no_data_value(Some(nd)).unwrap();
        }

        let mut data = Vec::with_capacity(self.width * self.height);
        for row in 0..self.height {
            for col in 0..self.width {
                data.push(pixel(row, col));
            }
        }
        let mut buffer = Buffer::new((self.width, self.height), data);
        band.write((0, 0), (self.width, self.height), &mut buffer).unwrap();
    }
}

/// Whole band 1 as f64, with (width, height) and geotransform
pub struct Pixels {
    pub values: Vec<f64>,
    pub width: usize,
    pub height: usize,
    pub geotransform: [f64; 6],
}

impl Pixels {
    pub fn read(path: &Path) -> Self {
        let dataset = Dataset::open(path).unwrap();
        let (width, height) = dataset.raster_size();
        let band = dataset.rasterband(1).unwrap();
        let buffer = band
            .read_as::<f64>((0, 0), (width, height), (width, height), None)
            .unwrap();
        Self {
            values: buffer.data().to_vec(),
            width,
            height,
            geotransform: dataset.geo_transform().unwrap(),
        }
    }

    pub fn at(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.width + col]
    }

    /// Value of the pixel containing the geographic point (x, y)
    pub fn at_point(&self, x: f64, y: f64) -> f64 {
        let gt = self.geotransform;
        let col = ((x - gt[0]) / gt[1]).floor() as usize;
        let row = ((y - gt[3]) / gt[5]).floor() as usize;
        self.at(row, col)
    }
}
