use log::info;

use crate::dataset::{LasDataset, PointFilter};
use crate::error::Result;
use crate::util::Grid;
use crate::{get_var, Function, Variable, NODATA};

pub fn collapse_cell(points: Vec<f64>, function: &Function) -> f64 {
    let len = points.len();
    if len == 0 {
        return NODATA
    }

    match *function {
        Function::Mean => {
            points.into_iter().sum::<f64>() / len as f64
        },
        Function::Median => {
            if len == 1 {
                return points[0]
            }

            let mut points = points;
            points.sort_by(f64::total_cmp);

            match points.len() % 2 == 0 {
                true => (points[len / 2 - 1] + points[len / 2]) / 2.0,
                false => points[len / 2],
            }
        },
        Function::Min => {
            points.into_iter().fold(f64::MAX, |acc, p| acc.min(p))
        },
        Function::Max => {
            points.into_iter().fold(f64::MIN, |acc, p| acc.max(p))
        },
        Function::Count => {
            len as f64
        },
    }
}

pub fn bin_points(
    dataset: &LasDataset,
    grid: &Grid,
    filter: &PointFilter,
    var: Variable,
    z_factor: f64,
    func: &Function,
) -> Result<Vec<f64>> {
    info!("Binning into {}x{} cells...", grid.width, grid.height);
    let mut data: Vec<Vec<f64>> = vec![Vec::new(); grid.len()];

    dataset.try_for_each_point(filter, |point| {
        // Outside the grid only happens with a clip extent.
        if let Some(cell) = grid.cell_index(point.x, point.y).and_then(|i| data.get_mut(i)) {
            cell.push(get_var(&var, &point, z_factor));
        }
        Ok(())
    })?;

    Ok(data
        .into_iter()
        .map(|cell| collapse_cell(cell, func))
        .collect())
}

#[cfg(test)]
mod tests {
    use las::point::Classification;

    use super::*;
    use crate::dataset::tests::{point, write_las};

    #[test]
    fn collapse_functions() {
        let cell = vec![4.0, 1.0, 3.0, 2.0];
        assert_eq!(collapse_cell(cell.clone(), &Function::Mean), 2.5);
        assert_eq!(collapse_cell(cell.clone(), &Function::Median), 2.5);
        assert_eq!(collapse_cell(vec![5.0, 1.0, 3.0], &Function::Median), 3.0);
        assert_eq!(collapse_cell(cell.clone(), &Function::Min), 1.0);
        assert_eq!(collapse_cell(cell.clone(), &Function::Max), 4.0);
        assert_eq!(collapse_cell(cell, &Function::Count), 4.0);
        assert_eq!(collapse_cell(Vec::new(), &Function::Max), NODATA);
    }

    #[test]
    fn points_land_in_north_up_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud.las");
        write_las(
            &path,
            &[
                point(0.0, 0.0, 1.0, Classification::Ground),
                point(3.0, 2.0, 2.0, Classification::Ground),
                point(0.5, 1.5, 10.0, Classification::HighVegetation),
                point(1.5, 1.5, 20.0, Classification::HighVegetation),
                point(1.5, 1.75, 30.0, Classification::HighVegetation),
            ],
        );

        let dataset = LasDataset::open(&path, false).unwrap();
        let grid = Grid::new(&dataset.bounds(), 1.0).unwrap();
        assert_eq!((grid.width, grid.height), (3, 2));

        let data = bin_points(
            &dataset,
            &grid,
            &PointFilter::default(),
            Variable::Elevation,
            2.0,
            &Function::Mean,
        )
        .unwrap();
        assert_eq!(data, vec![20.0, 50.0, 4.0, 2.0, NODATA, NODATA]);

        let veg = PointFilter {
            classes: vec![u8::from(Classification::HighVegetation)],
            ..PointFilter::default()
        };
        let data = bin_points(&dataset, &grid, &veg, Variable::Elevation, 1.0, &Function::Count).unwrap();
        assert_eq!(data, vec![1.0, 2.0, NODATA, NODATA, NODATA, NODATA]);
    }
}
