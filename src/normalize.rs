use clap::ValueEnum;
use log::{debug, warn};
use ndarray::Array2;

use crate::error::{Error, Result};

/// How raw cells are compared against the band's no-data sentinel.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SentinelMatch {
    /// Compare against the sentinel truncated to an integer.
    #[default]
    Truncated,
    /// Compare against the sentinel as stored.
    Exact,
}

impl SentinelMatch {
    fn target(self, sentinel: f64) -> f64 {
        match self {
            SentinelMatch::Truncated => sentinel.trunc(),
            SentinelMatch::Exact => sentinel,
        }
    }

    /// True when cells holding `sentinel` itself would escape the mask.
    fn alters(self, sentinel: f64) -> bool {
        !sentinel.is_nan() && self.target(sentinel) != sentinel
    }
}

/// Band values with no-data removed and the scale factor applied.
///
/// Missing cells are stored as `NaN`; [`CleanedArray::valid`] and
/// [`CleanedArray::non_zero`] never yield them.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedArray {
    data: Array2<f64>,
}

impl CleanedArray {
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    /// (rows, columns)
    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// `rows * columns`, missing cells included.
    pub fn total_cells(&self) -> usize {
        self.data.len()
    }

    pub fn valid(&self) -> impl Iterator<Item = f64> + '_ {
        self.data.iter().copied().filter(|v| !v.is_nan())
    }

    pub fn non_zero(&self) -> impl Iterator<Item = f64> + '_ {
        self.valid().filter(|&v| v != 0.0)
    }
}

#[cfg(test)]
impl CleanedArray {
    pub fn get(&self, row: usize, column: usize) -> Option<f64> {
        self.data
            .get((row, column))
            .copied()
            .filter(|v| !v.is_nan())
    }

    pub fn into_inner(self) -> Array2<f64> {
        self.data
    }

    pub fn missing_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_nan()).count()
    }
}

/// Masks no-data cells and divides everything else by `scale`.
///
/// Fails before touching the data when the scale factor is absent, zero or
/// not finite.
pub fn normalize(
    raw: Array2<f64>,
    no_data: Option<f64>,
    scale: Option<f64>,
    matching: SentinelMatch,
) -> Result<CleanedArray> {
    let scale = match scale {
        None => return Err(Error::configuration("band has no scale factor")),
        Some(s) if s == 0.0 || !s.is_finite() => {
            return Err(Error::configuration(format!("invalid scale factor {s}")))
        }
        Some(s) => s,
    };

    let target = no_data.map(|sentinel| {
        let target = matching.target(sentinel);
        if matching.alters(sentinel) {
            warn!(
                "No-data value {sentinel} is compared as {target}; cells holding {sentinel} will not be masked"
            );
        }
        target
    });

    let mut data = raw;
    data.mapv_inplace(|v| match target {
        Some(t) if v == t => f64::NAN,
        _ => v / scale,
    });

    debug!("Cleaned array:\n{data}");
    Ok(CleanedArray { data })
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn sentinel_cells_become_missing_and_values_are_scaled() {
        let raw = array![[10.0, -9999.0, 250.0], [0.0, 35.0, -9999.0]];
        let cleaned = normalize(raw, Some(-9999.0), Some(10.0), SentinelMatch::Truncated).unwrap();

        assert_eq!(cleaned.dim(), (2, 3));
        assert_eq!(cleaned.missing_count(), 2);
        assert_eq!(cleaned.get(0, 1), None);
        assert_eq!(cleaned.get(1, 2), None);
        assert_eq!(cleaned.get(0, 0), Some(1.0));
        assert_eq!(cleaned.get(0, 2), Some(25.0));
        assert_eq!(cleaned.get(1, 0), Some(0.0));
        assert_eq!(cleaned.get(1, 1), Some(3.5));
        assert_eq!(cleaned.valid().count(), 4);
    }

    #[test]
    fn end_to_end_example() {
        let raw = array![[0.0, 0.0, 5.0], [-9999.0, 3.0, 0.0]];
        let cleaned = normalize(raw, Some(-9999.0), Some(1.0), SentinelMatch::Truncated).unwrap();

        let data = cleaned.data();
        assert_eq!(data[[0, 0]], 0.0);
        assert_eq!(data[[0, 2]], 5.0);
        assert!(data[[1, 0]].is_nan());
        assert_eq!(data[[1, 1]], 3.0);
        assert_eq!(cleaned.non_zero().collect::<Vec<_>>(), vec![5.0, 3.0]);
    }

    #[test]
    fn renormalizing_is_a_no_op() {
        let raw = array![[1.5, 0.0], [2.25, 8.0]];
        let once = normalize(raw.clone(), None, Some(1.0), SentinelMatch::Truncated).unwrap();
        let twice = normalize(
            once.clone().into_inner(),
            Some(-9999.0),
            Some(1.0),
            SentinelMatch::Truncated,
        )
        .unwrap();

        assert_eq!(once, twice);
        assert_eq!(twice.into_inner(), raw);
    }

    #[test]
    fn degenerate_scale_is_a_configuration_error() {
        for scale in [None, Some(0.0), Some(f64::NAN), Some(f64::INFINITY)] {
            let err = normalize(array![[1.0]], None, scale, SentinelMatch::Truncated).unwrap_err();
            assert!(matches!(err, Error::Configuration(_)), "{scale:?}");
        }
    }

    #[test]
    fn fractional_sentinel_depends_on_matching_mode() {
        let raw = array![[-9999.5, -9999.0, 1.0]];

        let truncated =
            normalize(raw.clone(), Some(-9999.5), Some(1.0), SentinelMatch::Truncated).unwrap();
        assert_eq!(truncated.get(0, 0), Some(-9999.5));
        assert_eq!(truncated.get(0, 1), None);

        let exact = normalize(raw, Some(-9999.5), Some(1.0), SentinelMatch::Exact).unwrap();
        assert_eq!(exact.get(0, 0), None);
        assert_eq!(exact.get(0, 1), Some(-9999.0));
    }

    #[test]
    fn only_fractional_sentinels_are_altered() {
        assert!(SentinelMatch::Truncated.alters(-9999.5));
        assert!(!SentinelMatch::Truncated.alters(-9999.0));
        assert!(!SentinelMatch::Exact.alters(-9999.5));
        assert!(!SentinelMatch::Truncated.alters(f64::NAN));
        assert!(!SentinelMatch::Exact.alters(f64::NAN));
    }

    #[test]
    fn nan_sentinel_masks_nan_cells() {
        let cleaned = normalize(
            array![[f64::NAN, 0.0, 3.0]],
            Some(f64::NAN),
            Some(1.0),
            SentinelMatch::Truncated,
        )
        .unwrap();
        assert_eq!(cleaned.missing_count(), 1);
        assert_eq!(cleaned.valid().collect::<Vec<_>>(), vec![0.0, 3.0]);
    }

    #[test]
    fn nan_input_stays_missing() {
        let cleaned =
            normalize(array![[f64::NAN, 4.0]], None, Some(2.0), SentinelMatch::Exact).unwrap();
        assert_eq!(cleaned.missing_count(), 1);
        assert_eq!(cleaned.get(0, 1), Some(2.0));
    }
}
