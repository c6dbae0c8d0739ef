use clap::Parser;
use std::path::PathBuf;

/// Sample survey lines into elevation-draped node tables.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Input polyline file (.geojson, .json, or .kml).
    pub input: PathBuf,

    /// Station spacing in meters. 0 emits original vertices only.
    #[arg(short, long, default_value_t = 0.0)]
    pub spacing: f64,

    /// Also emit each line's original vertices.
    #[arg(short = 'n', long)]
    pub include_vertices: bool,

    /// Copy source attributes onto every node record.
    #[arg(short = 'a', long)]
    pub retain_attributes: bool,

    /// Write a point-geometry GeoJSON file per group.
    #[arg(short = 'j', long)]
    pub geojson: bool,

    /// Attribute naming the segment group. Falls back to row-index
    /// keys when absent.
    #[arg(short, long)]
    pub group_field: Option<String>,

    /// Elevation raster (.asc, .tif, or .tiff) to drape nodes over.
    #[arg(short = 'r', long)]
    pub raster: Option<PathBuf>,

    /// Nearest-valid-pixel search radius in meters. Defaults to twice
    /// the spacing.
    #[arg(long)]
    pub search_radius: Option<f64>,

    /// EPSG code of the projected working CRS.
    #[arg(long, default_value_t = 3826)]
    pub epsg: u32,

    /// Output directory.
    #[arg(short, long, default_value = "node_output")]
    pub out_dir: PathBuf,
}
