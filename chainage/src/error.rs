use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainageError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    GeoJson(#[from] geojson::Error),

    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Kml(#[from] kml::Error),

    #[error("{0}")]
    Grid(#[from] demgrid::DemGridError),

    #[error("unrecognized vector extension {0}")]
    Extension(PathBuf),

    #[error("no line features in {0}")]
    EmptyDataset(PathBuf),

    #[error("unsupported EPSG code {0}")]
    Epsg(u32),
}
