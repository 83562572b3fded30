use std::fmt;
use std::io;

use thiserror::Error;

/// Failures of the point cloud toolkit while building a raster.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Las Error: {0}")]
    LasError(#[from] las::Error),

    #[error("GDAL Error: {0}")]
    GDALError(#[from] gdal::errors::GdalError),

    #[error("Triangulation Insertion Error: {0}")]
    InsertionError(#[from] spade::InsertionError),

    #[error("Point cloud is empty after filtering: {0}")]
    NoPoints(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    #[error("GDAL Error: {0}")]
    GDALError(#[from] gdal::errors::GdalError),

    #[error("Image Error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("JSON Error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Band shape mismatch: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl From<las::Error> for Error {
    fn from(err: las::Error) -> Self {
        Error::Execution(err.into())
    }
}

impl From<spade::InsertionError> for Error {
    fn from(err: spade::InsertionError) -> Self {
        Error::Execution(err.into())
    }
}

/// The three categories every failure is reported under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Execution,
    Configuration,
    Generic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Execution => f.write_str("ExecutionError"),
            ErrorKind::Configuration => f.write_str("ConfigurationError"),
            ErrorKind::Generic => f.write_str("GenericError"),
        }
    }
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Execution(_) => ErrorKind::Execution,
            Error::Configuration(_) => ErrorKind::Configuration,
            _ => ErrorKind::Generic,
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
