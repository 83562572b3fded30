use std::io::Write;

use log::{info, warn};
use serde::Serialize;

use crate::error::Result;
use crate::extent::{Extent, GeoTransform};
use crate::histogram::Distribution;
use crate::loader::{RasterMetadata, RasterSource};
use crate::normalize::{normalize, CleanedArray, SentinelMatch};
use crate::render::{Colormap, HistogramFigure, RasterFigure, Renderer};
use crate::stats::{CellCensus, Statistics};

/// Relative tolerance when checking driver statistics against the array.
const STATISTICS_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// 1-based
    pub band: usize,
    /// Replaces the band's own scale factor.
    pub scale_factor: Option<f64>,
    pub sentinel_match: SentinelMatch,
    pub color_limits: (f64, f64),
    pub colormap: Colormap,
    pub title: String,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            band: 1,
            scale_factor: None,
            sentinel_match: SentinelMatch::default(),
            color_limits: (0.0, 45.0),
            colormap: Colormap::default(),
            title: "CHM Analysis".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub metadata: RasterMetadata,
    pub extent: Extent,
    pub no_data: Option<f64>,
    pub scale_factor: f64,
    pub band_statistics: Option<Statistics>,
    pub array_statistics: Option<Statistics>,
    pub census: CellCensus,
    pub missing_percent: f64,
    pub zero_percent: f64,
    pub non_zero_percent: f64,
    pub distribution: Distribution,
}

fn show<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "None".to_string(), |v| v.to_string())
}

/// Runs the statistics pipeline over one band of `source`, writing the
/// report lines to `out` as each stage completes.
pub fn analyze<S, R, W>(
    source: &S,
    options: &AnalysisOptions,
    renderer: &mut R,
    out: &mut W,
) -> Result<AnalysisReport>
where
    S: RasterSource + ?Sized,
    R: Renderer + ?Sized,
    W: Write,
{
    let metadata = source.metadata()?;
    writeln!(out, "Number of Columns: {}", metadata.columns)?;
    writeln!(out, "Number of Rows: {}", metadata.rows)?;
    writeln!(out, "Number of Bands: {}", metadata.band_count)?;
    writeln!(out, "Driver: {}", metadata.driver)?;
    writeln!(out, "Projection: {}", metadata.projection)?;
    writeln!(out, "Geotransform: {}", metadata.geo_transform)?;

    let extent = Extent::from_geo_transform(&metadata.geo_transform, metadata.rows, metadata.columns)?;
    writeln!(out, "Raster Extent: {extent}")?;

    let band = source.read_band(options.band)?;
    let scale = options.scale_factor.or(band.scale);
    writeln!(out, "No Data Value: {}", show(band.no_data))?;
    writeln!(out, "Scale Factor: {}", show(scale))?;
    match &band.statistics {
        Some(s) => writeln!(out, "Band Statistics: {s}")?,
        None => writeln!(out, "Band Statistics: unavailable")?,
    }

    let band_statistics = band.statistics;
    let cleaned = normalize(band.array, band.no_data, scale, options.sentinel_match)?;
    // normalize() rejected a missing scale already.
    let scale = scale.unwrap_or(1.0);

    let array_statistics = Statistics::from_values(cleaned.valid());
    writeln!(out, "Array Statistics:")?;
    match &array_statistics {
        Some(s) => {
            writeln!(out, "Minimum: {:.2}", s.min)?;
            writeln!(out, "Maximum: {:.2}", s.max)?;
            writeln!(out, "Mean: {:.2}", s.mean)?;
            writeln!(out, "StDev: {:.2}", s.std_dev)?;
        }
        None => writeln!(out, "every cell is no-data")?,
    }

    if let (Some(band), Some(array)) = (&band_statistics, &array_statistics) {
        let band = band.scaled(scale);
        if !band.agrees_with(array, STATISTICS_TOLERANCE) {
            warn!("Band statistics ({band}) disagree with array statistics ({array})");
        }
    }

    let census = CellCensus::of(&cleaned);
    writeln!(out, "% NaN: {:.2}", census.missing_percent())?;
    writeln!(out, "% Zero: {:.2}", census.zero_percent())?;
    writeln!(out, "% Non-Zero: {:.2}", census.non_zero_percent())?;

    let distribution = Distribution::analyze(&cleaned);
    render_figures(
        renderer,
        &cleaned,
        metadata.geo_transform,
        extent,
        &distribution,
        options,
    );

    match &distribution.non_zero_statistics {
        Some(s) => {
            writeln!(out, "min: {} m", s.min)?;
            writeln!(out, "max: {:.2} m", s.max)?;
            writeln!(out, "mean: {:.2} m", s.mean)?;
        }
        None => writeln!(out, "no non-zero cells")?,
    }

    info!("Analysis of band {} complete", options.band);

    Ok(AnalysisReport {
        metadata,
        extent,
        no_data: band.no_data,
        scale_factor: scale,
        band_statistics,
        array_statistics,
        missing_percent: census.missing_percent(),
        zero_percent: census.zero_percent(),
        non_zero_percent: census.non_zero_percent(),
        census,
        distribution,
    })
}

/// Rendering failures are logged and never fail the analysis.
fn render_figures<R: Renderer + ?Sized>(
    renderer: &mut R,
    cleaned: &CleanedArray,
    geo_transform: GeoTransform,
    extent: Extent,
    distribution: &Distribution,
    options: &AnalysisOptions,
) {
    let results = [
        renderer.render_raster(&RasterFigure {
            array: cleaned,
            geo_transform,
            extent,
            color_limits: options.color_limits,
            title: &options.title,
            colormap: options.colormap,
            colorbar_label: "Height (m)",
        }),
        renderer.render_histogram(&HistogramFigure {
            histogram: &distribution.all_pixels,
            title: "Distribution of Structure Heights",
            x_label: "Height (m)",
            y_label: "Relative Frequency",
        }),
        renderer.render_histogram(&HistogramFigure {
            histogram: &distribution.non_zero,
            title: "Distribution of Non-Zero Structure Heights",
            x_label: "Height (m)",
            y_label: "Relative Frequency",
        }),
    ];

    for err in results.into_iter().filter_map(|r| r.err()) {
        warn!("Rendering failed: {err}");
    }
}
