use std::path::Path;

use gdal::Dataset;
use log::{info, warn};
use ndarray::Array2;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::extent::GeoTransform;
use crate::stats::Statistics;

#[derive(Debug, Clone, Serialize)]
pub struct RasterMetadata {
    pub rows: usize,
    pub columns: usize,
    pub band_count: usize,
    pub driver: String,
    pub projection: String,
    pub geo_transform: GeoTransform,
}

/// One band read into memory, exactly as stored.
#[derive(Debug, Clone)]
pub struct BandData {
    /// rows x columns
    pub array: Array2<f64>,
    pub no_data: Option<f64>,
    pub scale: Option<f64>,
    /// Statistics computed by the raster driver, in stored units.
    pub statistics: Option<Statistics>,
}

/// Something a raster can be read from.
pub trait RasterSource {
    fn metadata(&self) -> Result<RasterMetadata>;

    /// Reads a band by its 1-based index.
    fn read_band(&self, index: usize) -> Result<BandData>;
}

fn check_band_index(index: usize, band_count: usize) -> Result<()> {
    if index == 0 || index > band_count {
        return Err(Error::configuration(format!(
            "band {index} requested, raster has {band_count} band(s)"
        )));
    }
    Ok(())
}

/// Raster file opened through GDAL. The dataset is closed when this is
/// dropped.
pub struct GdalRaster {
    dataset: Dataset,
}

impl GdalRaster {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        info!("Opening {}", path.as_ref().display());
        Ok(Self {
            dataset: Dataset::open(path.as_ref())?,
        })
    }

    #[cfg(test)]
    pub fn from_dataset(dataset: Dataset) -> Self {
        Self { dataset }
    }
}

impl RasterSource for GdalRaster {
    fn metadata(&self) -> Result<RasterMetadata> {
        let (columns, rows) = self.dataset.raster_size();

        Ok(RasterMetadata {
            rows,
            columns,
            band_count: self.dataset.raster_count() as usize,
            driver: self.dataset.driver().long_name(),
            projection: self.dataset.projection(),
            geo_transform: self.dataset.geo_transform()?.into(),
        })
    }

    fn read_band(&self, index: usize) -> Result<BandData> {
        check_band_index(index, self.dataset.raster_count() as usize)?;

        let (columns, rows) = self.dataset.raster_size();
        let band = self.dataset.rasterband(index)?;

        let statistics = match band.get_statistics(true, false) {
            Ok(Some(s)) => Some(Statistics {
                min: s.min,
                max: s.max,
                mean: s.mean,
                std_dev: s.std_dev,
            }),
            Ok(None) => None,
            Err(e) => {
                warn!("Band {index} statistics unavailable: {e}");
                None
            }
        };

        let buffer = band.read_as::<f64>((0, 0), (columns, rows), (columns, rows), None)?;
        let (_, data) = buffer.into_shape_and_vec();

        Ok(BandData {
            array: Array2::from_shape_vec((rows, columns), data)?,
            no_data: band.no_data_value(),
            scale: band.scale(),
            statistics,
        })
    }
}

/// Raster held in memory, for driving the analysis without a file.
#[cfg(test)]
pub struct MemoryRaster {
    pub metadata: RasterMetadata,
    pub band: BandData,
}

#[cfg(test)]
impl MemoryRaster {
    pub fn new(geo_transform: [f64; 6], band: BandData) -> Self {
        let (rows, columns) = band.array.dim();
        Self {
            metadata: RasterMetadata {
                rows,
                columns,
                band_count: 1,
                driver: "In Memory".to_string(),
                projection: String::new(),
                geo_transform: geo_transform.into(),
            },
            band,
        }
    }
}

#[cfg(test)]
impl RasterSource for MemoryRaster {
    fn metadata(&self) -> Result<RasterMetadata> {
        Ok(self.metadata.clone())
    }

    fn read_band(&self, index: usize) -> Result<BandData> {
        check_band_index(index, self.metadata.band_count)?;
        Ok(self.band.clone())
    }
}

#[cfg(test)]
mod tests {
    use gdal::raster::Buffer;
    use gdal::DriverManager;

    use super::*;
    use crate::normalize::{normalize, SentinelMatch};

    /// 4 x 3 band with two no-data cells and scale 1.
    fn mem_raster() -> GdalRaster {
        let driver = DriverManager::get_driver_by_name("MEM").unwrap();
        let mut ds = driver
            .create_with_band_type::<f64, _>("", 3, 4, 1)
            .unwrap();
        ds.set_geo_transform(&[100.0, 2.0, 0.0, 500.0, 0.0, -2.0])
            .unwrap();

        let mut rb = ds.rasterband(1).unwrap();
        rb.set_no_data_value(Some(-9999.0)).unwrap();
        rb.set_scale(1.0).unwrap();
        let data = vec![
            0.0, 1.5, 2.0, //
            -9999.0, 4.0, 0.0, //
            6.25, 7.0, -9999.0, //
            9.0, 0.0, 11.0,
        ];
        rb.write((0, 0), (3, 4), &mut Buffer::new((3, 4), data))
            .unwrap();
        drop(rb);

        GdalRaster::from_dataset(ds)
    }

    #[test]
    fn metadata_of_mem_dataset() {
        let raster = mem_raster();
        let meta = raster.metadata().unwrap();

        assert_eq!((meta.rows, meta.columns, meta.band_count), (4, 3, 1));
        assert_eq!(meta.geo_transform.pixel_height, -2.0);
        assert_eq!(meta.geo_transform.origin_x, 100.0);
    }

    #[test]
    fn band_is_read_row_major() {
        let band = mem_raster().read_band(1).unwrap();

        assert_eq!(band.array.dim(), (4, 3));
        assert_eq!(band.array[[0, 1]], 1.5);
        assert_eq!(band.array[[1, 0]], -9999.0);
        assert_eq!(band.array[[2, 0]], 6.25);
        assert_eq!(band.no_data, Some(-9999.0));
        assert_eq!(band.scale, Some(1.0));
    }

    #[test]
    fn driver_statistics_agree_with_array_statistics() {
        let band = mem_raster().read_band(1).unwrap();
        let from_driver = band.statistics.expect("MEM driver computes statistics");

        let cleaned =
            normalize(band.array, band.no_data, band.scale, SentinelMatch::Truncated).unwrap();
        let from_array = Statistics::from_values(cleaned.valid()).unwrap();

        assert!(
            from_driver.agrees_with(&from_array, 1e-9),
            "{from_driver:?} != {from_array:?}"
        );
    }

    #[test]
    fn out_of_range_band_is_rejected() {
        let raster = mem_raster();
        assert!(matches!(
            raster.read_band(0),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            raster.read_band(2),
            Err(Error::Configuration(_))
        ));
    }
}
