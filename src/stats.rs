use std::fmt;

use serde::Serialize;

use crate::normalize::CleanedArray;

/// Summary of a set of heights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Statistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
}

impl Statistics {
    /// `None` when `values` is empty.
    pub fn from_values<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        // Welford, so large rasters don't lose precision in the sum of squares.
        let mut count = 0usize;
        let mut mean = 0.0;
        let mut m2 = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        for v in values {
            count += 1;
            let delta = v - mean;
            mean += delta / count as f64;
            m2 += delta * (v - mean);
            min = min.min(v);
            max = max.max(v);
        }

        (count > 0).then(|| Self {
            min,
            max,
            mean,
            std_dev: (m2 / count as f64).sqrt(),
        })
    }

    /// Divides every figure by `scale`, for comparing raw band statistics
    /// with a cleaned array.
    pub fn scaled(&self, scale: f64) -> Self {
        let (min, max) = if scale < 0.0 {
            (self.max / scale, self.min / scale)
        } else {
            (self.min / scale, self.max / scale)
        };

        Self {
            min,
            max,
            mean: self.mean / scale,
            std_dev: self.std_dev / scale.abs(),
        }
    }

    pub fn agrees_with(&self, other: &Self, tolerance: f64) -> bool {
        [
            (self.min, other.min),
            (self.max, other.max),
            (self.mean, other.mean),
            (self.std_dev, other.std_dev),
        ]
        .iter()
        .all(|(a, b)| (a - b).abs() <= tolerance * a.abs().max(b.abs()).max(1.0))
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Minimum={:.2}, Maximum={:.2}, Mean={:.3}, StDev={:.3}",
            self.min, self.max, self.mean, self.std_dev
        )
    }
}

/// Cell counts of a cleaned array, relative to `rows * columns`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CellCensus {
    pub total: usize,
    pub missing: usize,
    pub zero: usize,
    pub non_zero: usize,
}

impl CellCensus {
    pub fn of(array: &CleanedArray) -> Self {
        let mut census = Self {
            total: array.total_cells(),
            missing: 0,
            zero: 0,
            non_zero: 0,
        };

        for &v in array.data() {
            if v.is_nan() {
                census.missing += 1;
            } else if v == 0.0 {
                census.zero += 1;
            } else {
                census.non_zero += 1;
            }
        }

        census
    }

    fn percent(&self, count: usize) -> f64 {
        match self.total {
            0 => 0.0,
            total => 100.0 * count as f64 / total as f64,
        }
    }

    pub fn missing_percent(&self) -> f64 {
        self.percent(self.missing)
    }

    pub fn valid_percent(&self) -> f64 {
        self.percent(self.total - self.missing)
    }

    pub fn zero_percent(&self) -> f64 {
        self.percent(self.zero)
    }

    pub fn non_zero_percent(&self) -> f64 {
        self.percent(self.non_zero)
    }
}
