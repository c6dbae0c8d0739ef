use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DemGridError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("unrecognized raster extension {0}")]
    Extension(PathBuf),

    #[error("invalid ASCII grid header: {0}")]
    AsciiHeader(String),

    #[error("raster has {actual} samples, expected {expected}")]
    SampleCount { expected: usize, actual: usize },

    #[error("GeoTIFF {0} has no ModelPixelScale/ModelTiepoint geotransform")]
    NoGeoTransform(PathBuf),

    #[error("unsupported GeoTIFF sample format in {0}")]
    SampleFormat(PathBuf),
}
