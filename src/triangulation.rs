use std::collections::HashMap;

use clap::ValueEnum;
use las::point::Classification;
use log::info;
use spade::{DelaunayTriangulation, FloatTriangulation, HasPosition, Point2, Triangulation};

use crate::dataset::{LasDataset, PointFilter};
use crate::error::{ExecutionError, Result};
use crate::util::Grid;
use crate::{get_var, Variable, NODATA};

#[derive(Debug, Copy, Clone)]
struct Point {
    position: Point2<f64>,
    z: f64,
    value: f64,
}

impl Point {
    const fn new(x: f64, y: f64, z: f64, value: f64) -> Self {
        Self {
            position: Point2::new(x, y),
            z,
            value,
        }
    }
}

impl HasPosition for Point {
    type Scalar = f64;

    fn position(&self) -> Point2<Self::Scalar> {
        self.position
    }
}

/// Which point survives in each thinning window.
#[derive(Debug, Default, ValueEnum, Clone, Copy, PartialEq, Eq)]
pub enum Thinning {
    #[default]
    Maximum,
    Minimum,
    ClosestToMean,
}

/// Keeps one point per `window x window` square.
fn thin(points: Vec<Point>, origin: (f64, f64), window: f64, method: Thinning) -> Vec<Point> {
    let mut windows: HashMap<(i64, i64), Vec<Point>> = HashMap::new();
    for p in points {
        let key = (
            ((p.position.x - origin.0) / window).floor() as i64,
            ((origin.1 - p.position.y) / window).floor() as i64,
        );
        windows.entry(key).or_default().push(p);
    }

    let mut kept: Vec<Point> = windows
        .into_values()
        .filter_map(|w| match method {
            Thinning::Maximum => w.into_iter().max_by(|a, b| a.z.total_cmp(&b.z)),
            Thinning::Minimum => w.into_iter().min_by(|a, b| a.z.total_cmp(&b.z)),
            Thinning::ClosestToMean => {
                let mean = w.iter().map(|p| p.z).sum::<f64>() / w.len() as f64;
                w.into_iter()
                    .min_by(|a, b| (a.z - mean).abs().total_cmp(&(b.z - mean).abs()))
            }
        })
        .collect();

    // HashMap order is random; keep insertion deterministic.
    kept.sort_by(|a, b| {
        a.position
            .x
            .total_cmp(&b.position.x)
            .then(a.position.y.total_cmp(&b.position.y))
    });
    kept
}

/// Linear interpolation over a Delaunay triangulation, sampled at cell
/// centres. Cells outside the convex hull are no-data.
pub fn triangulate(
    dataset: &LasDataset,
    grid: &Grid,
    filter: &PointFilter,
    var: Variable,
    z_factor: f64,
    window: Option<(f64, Thinning)>,
) -> Result<Vec<f64>> {
    let mut points: Vec<Point> = Vec::with_capacity(dataset.number_of_points() as usize);

    dataset.try_for_each_point(filter, |point| {
        if point.classification != Classification::HighNoise {
            let value = get_var(&var, &point, z_factor);
            points.push(Point::new(point.x, point.y, point.z, value));
        }
        Ok(())
    })?;

    if points.is_empty() {
        return Err(ExecutionError::NoPoints("nothing to triangulate".to_string()).into());
    }

    if let Some((size, method)) = window {
        let before = points.len();
        points = thin(points, (grid.min_x, grid.max_y), size, method);
        info!("Thinned {before} points to {}", points.len());
    }

    info!("Building triangulation...");
    let mut t = DelaunayTriangulation::<Point>::new();
    for point in points {
        t.insert(point)?;
    }

    info!("Triangulating...");
    let interp = t.barycentric();
    let mut ret: Vec<f64> = Vec::with_capacity(grid.len());
    for row in 0..grid.height {
        for col in 0..grid.width {
            let (x, y) = grid.cell_center(row, col);
            let p = interp
                .interpolate(|v| v.data().value, Point2::new(x, y))
                .unwrap_or(NODATA);
            ret.push(p);
        }
    }

    Ok(ret)
}
