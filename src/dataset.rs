use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use las::{Bounds, Point, Reader, Vector};
use log::info;

use crate::error::{ExecutionError, Result};

/// Selects points by their return number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnFilter {
    Number(u8),
    First,
    Last,
    Single,
    FirstOfMany,
    LastOfMany,
}

impl FromStr for ReturnFilter {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "first" => Ok(ReturnFilter::First),
            "last" => Ok(ReturnFilter::Last),
            "single" => Ok(ReturnFilter::Single),
            "first-of-many" => Ok(ReturnFilter::FirstOfMany),
            "last-of-many" => Ok(ReturnFilter::LastOfMany),
            other => match other.parse::<u8>() {
                Ok(n @ 1..=15) => Ok(ReturnFilter::Number(n)),
                _ => Err(format!("'{s}' is not a return filter")),
            },
        }
    }
}

impl ReturnFilter {
    pub fn matches(&self, point: &Point) -> bool {
        let (n, of) = (point.return_number, point.number_of_returns);
        match *self {
            ReturnFilter::Number(r) => n == r,
            ReturnFilter::First => n == 1,
            ReturnFilter::Last => n == of,
            ReturnFilter::Single => of == 1,
            ReturnFilter::FirstOfMany => n == 1 && of > 1,
            ReturnFilter::LastOfMany => n == of && of > 1,
        }
    }
}

/// Which points take part in rasterization. Empty lists accept everything.
#[derive(Debug, Clone, Default)]
pub struct PointFilter {
    pub classes: Vec<u8>,
    pub returns: Vec<ReturnFilter>,
    /// Clip box; points outside are dropped.
    pub extent: Option<Bounds>,
}

impl PointFilter {
    pub fn accepts(&self, point: &Point) -> bool {
        if !self.classes.is_empty() && !self.classes.contains(&u8::from(point.classification)) {
            return false;
        }

        if !self.returns.is_empty() && !self.returns.iter().any(|r| r.matches(point)) {
            return false;
        }

        match &self.extent {
            Some(b) => {
                (b.min.x..=b.max.x).contains(&point.x)
                    && (b.min.y..=b.max.y).contains(&point.y)
                    && (b.min.z..=b.max.z).contains(&point.z)
            }
            None => true,
        }
    }
}

/// One or more las/laz files read as a single point cloud.
#[derive(Debug, Clone)]
pub struct LasDataset {
    files: Vec<PathBuf>,
    bounds: Bounds,
    number_of_points: u64,
}

fn is_point_cloud(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("las") || e.eq_ignore_ascii_case("laz"))
}

fn collect_files(dir: &Path, recursive: bool, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if recursive {
                collect_files(&path, recursive, files)?;
            }
        } else if is_point_cloud(&path) {
            files.push(path);
        }
    }
    Ok(())
}

impl LasDataset {
    /// `input` is a las/laz file or a directory of them.
    pub fn open(input: &Path, recursive: bool) -> Result<Self> {
        let mut files = Vec::new();
        if input.is_dir() {
            collect_files(input, recursive, &mut files)?;
            files.sort();
        } else {
            files.push(input.to_path_buf());
        }

        let mut bounds: Option<Bounds> = None;
        let mut number_of_points = 0;
        for file in &files {
            let reader = Reader::from_path(file)?;
            let header = reader.header();
            number_of_points += header.number_of_points();
            let b = header.bounds();

            bounds = Some(match bounds {
                None => b,
                Some(acc) => Bounds {
                    min: Vector {
                        x: acc.min.x.min(b.min.x),
                        y: acc.min.y.min(b.min.y),
                        z: acc.min.z.min(b.min.z),
                    },
                    max: Vector {
                        x: acc.max.x.max(b.max.x),
                        y: acc.max.y.max(b.max.y),
                        z: acc.max.z.max(b.max.z),
                    },
                },
            });
        }

        let bounds = bounds.ok_or_else(|| {
            ExecutionError::NoPoints(format!("no las/laz files in {}", input.display()))
        })?;

        info!(
            "LAS dataset: {} file(s), {number_of_points} points",
            files.len()
        );

        Ok(Self {
            files,
            bounds,
            number_of_points,
        })
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn number_of_points(&self) -> u64 {
        self.number_of_points
    }

    /// Visits every point the filter accepts, file by file.
    pub fn try_for_each_point<F>(&self, filter: &PointFilter, mut f: F) -> Result<()>
    where
        F: FnMut(Point) -> Result<()>,
    {
        for file in &self.files {
            let mut reader = Reader::from_path(file)?;
            for point in reader.points() {
                let point = point?;
                if filter.accepts(&point) {
                    f(point)?;
                }
            }
        }
        Ok(())
    }
}
