use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use image::{Rgba, RgbaImage};
use log::info;

use crate::error::{Error, Result};
use crate::extent::{Extent, GeoTransform};
use crate::histogram::Histogram;
use crate::normalize::CleanedArray;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Colormap {
    Spectral,
    #[default]
    BuGn,
    Viridis,
    Greys,
}

impl Colormap {
    // ColorBrewer / matplotlib control points, low to high.
    fn stops(self) -> &'static [[u8; 3]] {
        match self {
            Colormap::Spectral => &[
                [158, 1, 66],
                [213, 62, 79],
                [244, 109, 67],
                [253, 174, 97],
                [254, 224, 139],
                [255, 255, 191],
                [230, 245, 152],
                [171, 221, 164],
                [102, 194, 165],
                [50, 136, 189],
                [94, 79, 162],
            ],
            Colormap::BuGn => &[
                [247, 252, 253],
                [229, 245, 249],
                [204, 236, 230],
                [153, 216, 201],
                [102, 194, 164],
                [65, 174, 118],
                [35, 139, 69],
                [0, 109, 44],
                [0, 68, 27],
            ],
            Colormap::Viridis => &[
                [68, 1, 84],
                [72, 40, 120],
                [62, 74, 137],
                [49, 104, 142],
                [38, 130, 142],
                [31, 158, 137],
                [53, 183, 121],
                [109, 205, 89],
                [180, 222, 44],
                [253, 231, 37],
            ],
            Colormap::Greys => &[[255, 255, 255], [0, 0, 0]],
        }
    }

    /// Colour at `t`, clamped to `[0, 1]`.
    pub fn sample(self, t: f64) -> [u8; 3] {
        let stops = self.stops();
        let pos = t.clamp(0.0, 1.0) * (stops.len() - 1) as f64;
        let i = (pos.floor() as usize).min(stops.len() - 2);
        let frac = pos - i as f64;

        let (a, b) = (stops[i], stops[i + 1]);
        [0usize, 1, 2].map(|c| (a[c] as f64 + (b[c] as f64 - a[c] as f64) * frac).round() as u8)
    }
}

/// A georeferenced raster plot.
pub struct RasterFigure<'a> {
    pub array: &'a CleanedArray,
    /// Places the pixels on the map.
    pub geo_transform: GeoTransform,
    /// Reported extent, shown alongside the figure.
    pub extent: Extent,
    pub color_limits: (f64, f64),
    pub title: &'a str,
    pub colormap: Colormap,
    pub colorbar_label: &'a str,
}

pub struct HistogramFigure<'a> {
    pub histogram: &'a Histogram,
    pub title: &'a str,
    pub x_label: &'a str,
    pub y_label: &'a str,
}

/// Output sink for figures. Each figure is self-contained; renderers keep no
/// drawing state between calls.
pub trait Renderer {
    fn render_raster(&mut self, figure: &RasterFigure<'_>) -> Result<()>;

    fn render_histogram(&mut self, figure: &HistogramFigure<'_>) -> Result<()>;
}

/// Discards every figure.
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn render_raster(&mut self, _: &RasterFigure<'_>) -> Result<()> {
        Ok(())
    }

    fn render_histogram(&mut self, _: &HistogramFigure<'_>) -> Result<()> {
        Ok(())
    }
}

const COLORBAR_GAP: u32 = 4;
const COLORBAR_WIDTH: u32 = 16;
const HISTOGRAM_BAR_WIDTH: u32 = 8;
const HISTOGRAM_HEIGHT: u32 = 240;
const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BAR: Rgba<u8> = Rgba([31, 119, 180, 255]);

/// Writes each figure as `<dir>/<title>.png`.
pub struct PngRenderer {
    dir: PathBuf,
}

impl PngRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, title: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{ext}", slug(title)))
    }
}

fn slug(title: &str) -> String {
    let slug = title
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("_");

    if slug.is_empty() {
        "figure".to_string()
    } else {
        slug
    }
}

/// Six-line sidecar with the centre of the upper-left pixel.
fn write_world_file(path: &Path, gt: &GeoTransform) -> Result<()> {
    let contents = format!(
        "{}\n{}\n{}\n{}\n{}\n{}\n",
        gt.pixel_width,
        gt.rotation_y,
        gt.rotation_x,
        gt.pixel_height,
        gt.origin_x + (gt.pixel_width + gt.rotation_x) / 2.0,
        gt.origin_y + (gt.rotation_y + gt.pixel_height) / 2.0
    );
    fs::write(path, contents)?;
    Ok(())
}

fn draw_raster(figure: &RasterFigure<'_>) -> Result<RgbaImage> {
    let (lo, hi) = figure.color_limits;
    if lo.is_nan() || hi.is_nan() || hi <= lo {
        return Err(Error::configuration(format!(
            "color limits ({lo}, {hi}) are empty"
        )));
    }

    let (rows, columns) = figure.array.dim();
    let (w, h) = (columns as u32, rows as u32);
    let mut img = RgbaImage::from_pixel(w + COLORBAR_GAP + COLORBAR_WIDTH, h, BACKGROUND);

    for ((row, col), &v) in figure.array.data().indexed_iter() {
        let px = if v.is_nan() {
            Rgba([0, 0, 0, 0])
        } else {
            let [r, g, b] = figure.colormap.sample((v - lo) / (hi - lo));
            Rgba([r, g, b, 255])
        };
        img.put_pixel(col as u32, row as u32, px);
    }

    // Colorbar, high values at the top.
    for y in 0..h {
        let t = match h {
            1 => 1.0,
            _ => 1.0 - y as f64 / (h - 1) as f64,
        };
        let [r, g, b] = figure.colormap.sample(t);
        for x in 0..COLORBAR_WIDTH {
            img.put_pixel(w + COLORBAR_GAP + x, y, Rgba([r, g, b, 255]));
        }
    }

    Ok(img)
}

fn draw_histogram(histogram: &Histogram) -> RgbaImage {
    let bins = histogram.bins.len() as u32;
    let mut img = RgbaImage::from_pixel(
        bins.max(1) * HISTOGRAM_BAR_WIDTH,
        HISTOGRAM_HEIGHT,
        BACKGROUND,
    );

    let max = histogram.max_weight();
    if max <= 0.0 {
        return img;
    }

    for (i, bin) in histogram.bins.iter().enumerate() {
        let bar = ((bin.weight / max) * HISTOGRAM_HEIGHT as f64).round() as u32;
        let x0 = i as u32 * HISTOGRAM_BAR_WIDTH;
        for x in x0..x0 + HISTOGRAM_BAR_WIDTH - 1 {
            for y in HISTOGRAM_HEIGHT - bar..HISTOGRAM_HEIGHT {
                img.put_pixel(x, y, BAR);
            }
        }
    }

    img
}

impl Renderer for PngRenderer {
    fn render_raster(&mut self, figure: &RasterFigure<'_>) -> Result<()> {
        let img = draw_raster(figure)?;

        let path = self.path_for(figure.title, "png");
        img.save(&path)?;
        // Georeferences the raster part only; the colorbar sits east of it.
        write_world_file(&self.path_for(figure.title, "pgw"), &figure.geo_transform)?;

        info!(
            "Wrote '{}' to {} (extent {}, {} from {} to {}, {:?})",
            figure.title,
            path.display(),
            figure.extent,
            figure.colorbar_label,
            figure.color_limits.0,
            figure.color_limits.1,
            figure.colormap
        );
        Ok(())
    }

    fn render_histogram(&mut self, figure: &HistogramFigure<'_>) -> Result<()> {
        let path = self.path_for(figure.title, "png");
        draw_histogram(figure.histogram).save(&path)?;

        let (lo, hi) = figure.histogram.range().unwrap_or_default();
        info!(
            "Wrote '{}' to {} (x: {} {lo:.2}..{hi:.2}, y: {} up to {:.4})",
            figure.title,
            path.display(),
            figure.x_label,
            figure.y_label,
            figure.histogram.max_weight()
        );
        Ok(())
    }
}
