use std::path::PathBuf;

/// Every recognized sampling option, passed once at invocation.
///
/// Replaces the step-by-step prompting of legacy survey tooling: no
/// behavior depends on the order fields are set.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Station spacing along each line, in meters. `0` means
    /// vertices-only mode: emit exactly the original vertices.
    pub spacing_m: f64,

    /// Also emit each line's original vertices (in addition to the
    /// fixed-spacing stations).
    pub include_vertices: bool,

    /// Copy the source feature's attributes onto every node record.
    pub retain_attributes: bool,

    /// Write a point-geometry GeoJSON file per group alongside the CSV.
    pub export_geojson: bool,

    /// Attribute naming the segment group. Features missing the
    /// attribute (or `None`) fall back to row-index keys.
    pub group_field: Option<String>,

    /// Elevation raster to drape stations over. `None` disables
    /// elevation and 3D-length output entirely.
    pub raster: Option<PathBuf>,

    /// Radius of the nearest-valid-pixel search, in meters. Defaults
    /// to twice the spacing (twice the pixel size in vertices-only
    /// mode).
    pub search_radius_m: Option<f64>,

    /// EPSG code of the projected working CRS. Easting/northing and
    /// all distances are computed in this CRS; the raster is assumed
    /// to be in it as well.
    pub projected_epsg: u32,

    /// Directory receiving per-group output and the summary report.
    pub out_dir: PathBuf,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            spacing_m: 0.0,
            include_vertices: false,
            retain_attributes: false,
            export_geojson: false,
            group_field: None,
            raster: None,
            search_radius_m: None,
            // TWD97 / TM2 zone 121, the survey programme's house CRS.
            projected_epsg: 3826,
            out_dir: PathBuf::from("node_output"),
        }
    }
}

impl SamplerConfig {
    /// Effective nearest-neighbor search radius for a grid with the
    /// given pixel width.
    pub fn search_radius(&self, pixel_w: f64) -> f64 {
        match self.search_radius_m {
            Some(radius) => radius,
            None if self.spacing_m > 0.0 => self.spacing_m * 2.0,
            None => pixel_w * 2.0,
        }
    }
}
