use serde::Serialize;

use crate::normalize::CleanedArray;
use crate::stats::Statistics;

pub const BIN_COUNT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bin {
    pub start: f64,
    pub end: f64,
    pub weight: f64,
}

/// Weighted histogram with equal-width bins.
///
/// Bins are half-open except the last, which also holds the upper edge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub bins: Vec<Bin>,
}

impl Histogram {
    /// Bins `values` over their observed range, adding `weight` per value.
    pub fn weighted(values: &[f64], bin_count: usize, weight: f64) -> Self {
        let (lower, upper) = match observed_range(values) {
            None => (0.0, 1.0),
            Some((min, max)) if min == max => (min - 0.5, max + 0.5),
            Some(range) => range,
        };

        let width = (upper - lower) / bin_count as f64;
        let mut bins: Vec<Bin> = (0..bin_count)
            .map(|i| Bin {
                start: lower + i as f64 * width,
                end: lower + (i + 1) as f64 * width,
                weight: 0.0,
            })
            .collect();

        if let Some(last) = bins.last_mut() {
            last.end = upper;
        }

        for &v in values {
            let idx = (((v - lower) / width).floor() as usize).min(bin_count - 1);
            bins[idx].weight += weight;
        }

        Self { bins }
    }

    pub fn total_weight(&self) -> f64 {
        self.bins.iter().map(|b| b.weight).sum()
    }

    pub fn max_weight(&self) -> f64 {
        self.bins.iter().map(|b| b.weight).fold(0.0, f64::max)
    }

    /// (lower edge, upper edge)
    pub fn range(&self) -> Option<(f64, f64)> {
        Some((self.bins.first()?.start, self.bins.last()?.end))
    }
}

fn observed_range(values: &[f64]) -> Option<(f64, f64)> {
    values.iter().fold(None, |acc, &v| match acc {
        None => Some((v, v)),
        Some((min, max)) => Some((v.min(min), v.max(max))),
    })
}

/// Relative frequency histograms of a cleaned raster.
#[derive(Debug, Clone, Serialize)]
pub struct Distribution {
    /// Every non-missing cell.
    pub all_pixels: Histogram,
    /// Non-missing cells that are not exactly zero.
    pub non_zero: Histogram,
    pub non_zero_statistics: Option<Statistics>,
}

impl Distribution {
    /// Both histograms weight each cell by `1 / (rows * columns)`, so bare
    /// ground and no-data still count in the denominator.
    pub fn analyze(array: &CleanedArray) -> Self {
        let weight = match array.total_cells() {
            0 => 0.0,
            total => 1.0 / total as f64,
        };

        let valid: Vec<f64> = array.valid().collect();
        let non_zero: Vec<f64> = array.non_zero().collect();

        Self {
            all_pixels: Histogram::weighted(&valid, BIN_COUNT, weight),
            non_zero_statistics: Statistics::from_values(non_zero.iter().copied()),
            non_zero: Histogram::weighted(&non_zero, BIN_COUNT, weight),
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::normalize::{normalize, SentinelMatch};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn bins_span_observed_range() {
        let hist = Histogram::weighted(&[0.0, 2.5, 5.0, 10.0], 4, 1.0);

        assert_eq!(hist.range(), Some((0.0, 10.0)));
        let weights: Vec<f64> = hist.bins.iter().map(|b| b.weight).collect();
        assert_eq!(weights, vec![1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn upper_edge_falls_in_last_bin() {
        let hist = Histogram::weighted(&[1.0, 2.0, 2.0], BIN_COUNT, 1.0);
        assert_eq!(hist.bins.len(), BIN_COUNT);
        assert_eq!(hist.bins[0].weight, 1.0);
        assert_eq!(hist.bins[BIN_COUNT - 1].weight, 2.0);
    }

    #[test]
    fn constant_and_empty_inputs() {
        let hist = Histogram::weighted(&[3.0, 3.0], 2, 0.5);
        assert_eq!(hist.range(), Some((2.5, 3.5)));
        assert_eq!(hist.bins[1].weight, 1.0);

        let hist = Histogram::weighted(&[], BIN_COUNT, 1.0);
        assert_eq!(hist.range(), Some((0.0, 1.0)));
        assert_eq!(hist.total_weight(), 0.0);
    }

    #[test]
    fn relative_frequency_uses_whole_raster_denominator() {
        let raw = array![[0.0, 0.0, 5.0], [-9999.0, 3.0, 0.0]];
        let cleaned = normalize(raw, Some(-9999.0), Some(1.0), SentinelMatch::Truncated).unwrap();
        let dist = Distribution::analyze(&cleaned);

        assert!(close(dist.all_pixels.total_weight(), 5.0 / 6.0));
        assert!(close(dist.non_zero.total_weight(), 2.0 / 6.0));
        assert!(dist.non_zero.total_weight() <= dist.all_pixels.total_weight());
        assert!(dist.all_pixels.total_weight() <= 1.0);
        assert_eq!(dist.non_zero.range(), Some((3.0, 5.0)));

        let stats = dist.non_zero_statistics.unwrap();
        assert_eq!(stats.min, 3.0);
        assert_eq!(stats.max, 5.0);
        assert!(close(stats.mean, 4.0));
    }

    #[test]
    fn all_missing_raster_has_empty_histograms() {
        let raw = array![[-9999.0, -9999.0]];
        let cleaned = normalize(raw, Some(-9999.0), Some(1.0), SentinelMatch::Exact).unwrap();
        let dist = Distribution::analyze(&cleaned);

        assert_eq!(dist.all_pixels.total_weight(), 0.0);
        assert_eq!(dist.non_zero.total_weight(), 0.0);
        assert!(dist.non_zero_statistics.is_none());
    }
}
