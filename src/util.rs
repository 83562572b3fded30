use las::Bounds;

use crate::error::{Error, Result};

/// North-up output grid. Row 0 is the northern edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    pub min_x: f64,
    pub max_y: f64,
    pub res: f64,
    pub width: usize,
    pub height: usize,
}

impl Grid {
    pub fn new(bounds: &Bounds, res: f64) -> Result<Self> {
        if !(res.is_finite() && res > 0.0) {
            return Err(Error::configuration(format!("invalid cell size {res}")));
        }

        let width = ((bounds.max.x - bounds.min.x) / res).ceil().max(1.0) as usize;
        let height = ((bounds.max.y - bounds.min.y) / res).ceil().max(1.0) as usize;

        Ok(Self {
            min_x: bounds.min.x,
            max_y: bounds.max.y,
            res,
            width,
            height,
        })
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    /// Row-major index of the cell holding `(x, y)`. Points on the far
    /// edges belong to the last column/row.
    pub fn cell_index(&self, x: f64, y: f64) -> Option<usize> {
        let col = (x - self.min_x) / self.res;
        let row = (self.max_y - y) / self.res;

        if !(0.0..=self.width as f64).contains(&col) || !(0.0..=self.height as f64).contains(&row) {
            return None;
        }

        let col = (col.floor() as usize).min(self.width - 1);
        let row = (row.floor() as usize).min(self.height - 1);
        Some(row * self.width + col)
    }

    /// Centre of the cell at `(row, col)`.
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.min_x + self.res * (col as f64 + 0.5),
            self.max_y - self.res * (row as f64 + 0.5),
        )
    }

    pub fn geo_transform(&self) -> [f64; 6] {
        [self.min_x, self.res, 0.0, self.max_y, 0.0, -self.res]
    }
}
