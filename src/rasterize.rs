use std::fs;
use std::path::{Path, PathBuf};

use gdal::errors::GdalError;
use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::DriverManager;
use log::{debug, info, warn};

use crate::binning::bin_points;
use crate::dataset::{LasDataset, PointFilter};
use crate::error::{Error, ExecutionError, Result};
use crate::triangulation::{triangulate, Thinning};
use crate::util::Grid;
use crate::{Function, Variable, NODATA};

#[derive(Debug, Clone)]
pub enum Method {
    Bin(Function),
    Triangulate { window: Option<(f64, Thinning)> },
}

#[derive(Debug, Clone)]
pub struct RasterizeParams {
    pub input: PathBuf,
    pub recursive: bool,
    pub res: f64,
    pub filter: PointFilter,
    pub var: Variable,
    pub z_factor: f64,
    /// EPSG code, WKT or PROJ string.
    pub spatial_ref: Option<String>,
    pub method: Method,
    pub output: PathBuf,
}

/// Removes a partially written output unless the write completed.
struct OutputGuard<'a> {
    path: &'a Path,
    committed: bool,
}

impl<'a> OutputGuard<'a> {
    fn new(path: &'a Path) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for OutputGuard<'_> {
    fn drop(&mut self) {
        if self.committed || !self.path.exists() {
            return;
        }
        match fs::remove_file(self.path) {
            Ok(()) => warn!("Removed incomplete raster {}", self.path.display()),
            Err(e) => warn!("Couldn't remove incomplete raster {}: {e}", self.path.display()),
        }
    }
}

fn check_params(params: &RasterizeParams) -> Result<Option<SpatialRef>> {
    if !(params.z_factor.is_finite() && params.z_factor != 0.0) {
        return Err(Error::configuration(format!(
            "invalid z factor {}",
            params.z_factor
        )));
    }

    if let Method::Triangulate {
        window: Some((size, _)),
    } = params.method
    {
        if !(size.is_finite() && size > 0.0) {
            return Err(Error::configuration(format!("invalid window size {size}")));
        }
    }

    params
        .spatial_ref
        .as_deref()
        .map(|def| {
            SpatialRef::from_definition(def)
                .map_err(|e| Error::configuration(format!("spatial reference '{def}': {e}")))
        })
        .transpose()
}

fn write_geotiff(
    path: &Path,
    grid: &Grid,
    srs: Option<&SpatialRef>,
    data: Vec<f64>,
) -> core::result::Result<(), GdalError> {
    let mut ds = DriverManager::get_driver_by_name("GTiff")?
        .create_with_band_type::<f64, _>(path, grid.width, grid.height, 1)?;

    ds.set_geo_transform(&grid.geo_transform())?;
    if let Some(srs) = srs {
        ds.set_spatial_ref(srs)?;
    }

    let mut rb = ds.rasterband(1)?;
    rb.set_no_data_value(Some(NODATA))?;
    rb.set_scale(1.0)?;
    rb.write(
        (0, 0),
        (grid.width, grid.height),
        &mut Buffer::new((grid.width, grid.height), data),
    )?;

    Ok(())
}

/// Builds an elevation GeoTIFF from a LAS dataset and returns its path.
pub fn rasterize(params: &RasterizeParams) -> Result<PathBuf> {
    let srs = check_params(params)?;

    let dataset = LasDataset::open(&params.input, params.recursive)?;
    debug!("Reading {:?}", dataset.files());
    let bounds = params.filter.extent.unwrap_or(dataset.bounds());
    let grid = Grid::new(&bounds, params.res)?;

    let data = match &params.method {
        Method::Bin(func) => bin_points(
            &dataset,
            &grid,
            &params.filter,
            params.var,
            params.z_factor,
            func,
        )?,
        Method::Triangulate { window } => triangulate(
            &dataset,
            &grid,
            &params.filter,
            params.var,
            params.z_factor,
            *window,
        )?,
    };

    info!("Writing {}...", params.output.display());
    let guard = OutputGuard::new(&params.output);
    write_geotiff(&params.output, &grid, srs.as_ref(), data).map_err(ExecutionError::from)?;
    guard.commit();

    info!("Done!");
    Ok(params.output.clone())
}

#[cfg(test)]
mod tests {
    use las::point::Classification;

    use super::*;
    use crate::dataset::tests::{point, write_las};
    use crate::loader::{GdalRaster, RasterSource};

    fn params(dir: &Path, method: Method) -> RasterizeParams {
        let input = dir.join("cloud.las");
        write_las(
            &input,
            &[
                point(0.0, 0.0, 0.0, Classification::Ground),
                point(4.0, 2.0, 0.0, Classification::Ground),
                point(0.5, 1.5, 12.0, Classification::HighVegetation),
                point(3.5, 0.5, 6.0, Classification::Building),
            ],
        );

        RasterizeParams {
            input,
            recursive: false,
            res: 1.0,
            filter: PointFilter::default(),
            var: Variable::Elevation,
            z_factor: 1.0,
            spatial_ref: Some("EPSG:32612".to_string()),
            method,
            output: dir.join("chm.tif"),
        }
    }

    #[test]
    fn binned_raster_is_north_up_with_nodata() {
        let dir = tempfile::tempdir().unwrap();
        let params = params(dir.path(), Method::Bin(Function::Max));

        let out = rasterize(&params).unwrap();
        let raster = GdalRaster::open(&out).unwrap();
        let meta = raster.metadata().unwrap();

        assert_eq!((meta.rows, meta.columns), (2, 4));
        assert_eq!(meta.geo_transform.origin_y, 2.0);
        assert_eq!(meta.geo_transform.pixel_height, -1.0);
        assert!(meta.projection.contains("32612") || meta.projection.contains("UTM"));

        let band = raster.read_band(1).unwrap();
        assert_eq!(band.no_data, Some(NODATA));
        assert_eq!(band.scale, Some(1.0));
        assert_eq!(band.array[[0, 0]], 12.0);
        assert_eq!(band.array[[1, 3]], 6.0);
        assert_eq!(band.array[[0, 1]], NODATA);
    }

    #[test]
    fn triangulated_raster_passes_through_points() {
        let dir = tempfile::tempdir().unwrap();
        let mut params = params(dir.path(), Method::Triangulate { window: None });
        params.spatial_ref = None;
        params.z_factor = 2.0;

        let out = rasterize(&params).unwrap();
        let band = GdalRaster::open(&out).unwrap().read_band(1).unwrap();
        assert_eq!(band.array.dim(), (2, 4));
        // Cell centres that coincide with input points, z doubled.
        assert!((band.array[[0, 0]] - 24.0).abs() < 1e-9);
        assert!((band.array[[1, 3]] - 12.0).abs() < 1e-9);
    }

    #[test]
    fn bad_configuration_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();

        let mut bad_srs = params(dir.path(), Method::Bin(Function::Mean));
        bad_srs.spatial_ref = Some("not a crs".to_string());
        assert!(matches!(rasterize(&bad_srs), Err(Error::Configuration(_))));

        let mut bad_res = params(dir.path(), Method::Bin(Function::Mean));
        bad_res.res = 0.0;
        assert!(matches!(rasterize(&bad_res), Err(Error::Configuration(_))));

        assert!(!bad_res.output.exists());
    }

    #[test]
    fn guard_removes_uncommitted_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.tif");

        fs::write(&path, b"partial").unwrap();
        drop(OutputGuard::new(&path));
        assert!(!path.exists());

        fs::write(&path, b"complete").unwrap();
        OutputGuard::new(&path).commit();
        assert!(path.exists());
    }
}
