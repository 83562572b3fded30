use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};

/// Affine pixel to map transform, in GDAL's coefficient order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub origin_y: f64,
    pub rotation_y: f64,
    /// Negative for north-up rasters.
    pub pixel_height: f64,
}

/// GDAL coefficient array.
impl From<[f64; 6]> for GeoTransform {
    fn from(gt: [f64; 6]) -> Self {
        Self {
            origin_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            origin_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }
}

impl From<GeoTransform> for [f64; 6] {
    fn from(gt: GeoTransform) -> Self {
        [
            gt.origin_x,
            gt.pixel_width,
            gt.rotation_x,
            gt.origin_y,
            gt.rotation_y,
            gt.pixel_height,
        ]
    }
}

impl fmt::Display for GeoTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}, {}, {})",
            self.origin_x,
            self.pixel_width,
            self.rotation_x,
            self.origin_y,
            self.rotation_y,
            self.pixel_height
        )
    }
}

/// Bounding box of a raster in its own coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Extent {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Extent {
    /// Derives the corners from the upper-left origin.
    ///
    /// The far edges are `origin + size / pixel_size`; with a negative pixel
    /// height `y_min` ends up below the origin.
    pub fn from_geo_transform(gt: &GeoTransform, rows: usize, columns: usize) -> Result<Self> {
        for (name, value) in [
            ("pixel width", gt.pixel_width),
            ("pixel height", gt.pixel_height),
        ] {
            if value == 0.0 || !value.is_finite() {
                return Err(Error::configuration(format!(
                    "degenerate geotransform, {name} is {value}"
                )));
            }
        }

        Ok(Self {
            x_min: gt.origin_x,
            x_max: gt.origin_x + columns as f64 / gt.pixel_width,
            y_min: gt.origin_y + rows as f64 / gt.pixel_height,
            y_max: gt.origin_y,
        })
    }

    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.x_min, self.x_max, self.y_min, self.y_max
        )
    }
}
