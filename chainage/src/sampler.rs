//! Node generation: stationing, elevation draping, distance
//! accumulation, and per-group output.

use crate::{
    feature::{group_features, LineFeature, SegmentGroup},
    math::TransverseMercator,
    report::{self, GroupOutput},
    station::sample_plan_multi,
    ChainageError, SamplerConfig,
};
use demgrid::Grid;
use geo::{geometry::Point, EuclideanDistance};
use log::{debug, warn};
use serde_json::{Map, Value};
use std::{collections::BTreeSet, path::PathBuf};

/// One sample point with every reported attribute.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub longitude: f64,
    pub latitude: f64,
    pub easting: f64,
    pub northing: f64,

    /// Draped elevation; `None` when no valid pixel was within the
    /// search window (or no raster was supplied).
    pub elevation: Option<f64>,

    /// Planar distance to the previous node; `None` for the first
    /// node of a line.
    pub distance_m: Option<f64>,

    /// 3D length of the segment ending here. Equal to `distance_m`
    /// when either endpoint lacks elevation; `None` without a raster.
    pub length_3d: Option<f64>,

    /// Along-line distance (KP), meters from the line's start.
    pub kp: f64,

    /// Running 3D total for the group, as of this node.
    pub total_3d: Option<f64>,

    /// Group key this node belongs to.
    pub group: String,

    /// Retained source attributes.
    pub extra: Map<String, Value>,
}

/// All nodes for one segment group plus its accumulated totals.
#[derive(Debug, Clone)]
pub struct GroupResult {
    pub key: String,
    pub nodes: Vec<NodeRecord>,
    pub total_2d: f64,

    /// `None` when no raster was supplied.
    pub total_3d: Option<f64>,
}

/// Outcome of a whole run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub groups: Vec<GroupOutput>,
    pub report_path: PathBuf,
}

/// Column names the writer owns; retained attributes never shadow
/// them.
pub(crate) const FIXED_COLUMNS: [&str; 9] = [
    "Longitude",
    "Latitude",
    "Easting",
    "Northing",
    "Elevation",
    "Distance_Meters",
    "Length_3D",
    "KP",
    "Total_3D_Length",
];

pub struct Sampler {
    config: SamplerConfig,
    projection: TransverseMercator,
    grid: Option<Grid>,
}

impl Sampler {
    /// Builds a sampler, opening the configured raster once.
    ///
    /// A missing or unreadable raster degrades to no-elevation mode
    /// rather than aborting.
    pub fn new(config: SamplerConfig) -> Result<Self, ChainageError> {
        let projection = TransverseMercator::from_epsg(config.projected_epsg)?;
        let grid = match &config.raster {
            None => None,
            Some(path) => match Grid::open(path) {
                Ok(grid) => {
                    let (cols, rows) = grid.dimensions();
                    debug!("opened raster {path:?}: {cols}x{rows}");
                    Some(grid)
                }
                Err(e) => {
                    warn!("raster {path:?} unavailable ({e}); continuing without elevation");
                    None
                }
            },
        };
        Ok(Self {
            config,
            projection,
            grid,
        })
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    pub fn projection(&self) -> &TransverseMercator {
        &self.projection
    }

    /// Reads the line features at `path` into the working CRS.
    pub fn read(&self, path: &std::path::Path) -> Result<Vec<LineFeature>, ChainageError> {
        crate::feature::read_lines(path, &self.projection)
    }

    /// Processes every segment group and writes its output.
    ///
    /// A group whose output fails to write is logged and skipped; the
    /// remaining groups still run.
    pub fn run(&self, features: &[LineFeature]) -> Result<RunReport, ChainageError> {
        std::fs::create_dir_all(&self.config.out_dir)?;
        let groups = group_features(features, self.config.group_field.as_deref());

        let mut outputs = Vec::with_capacity(groups.len());
        let mut stems = BTreeSet::new();
        for group in &groups {
            let result = self.process_group(group, features);
            if result.nodes.is_empty() {
                continue;
            }
            match report::write_group(&self.config, &result, &mut stems) {
                Ok(output) => outputs.push(output),
                Err(e) => warn!("skipping group {:?}: output failed ({e})", result.key),
            }
        }

        let report_path = report::write_summary(&self.config.out_dir, &outputs)?;
        Ok(RunReport {
            groups: outputs,
            report_path,
        })
    }

    /// Generates the node records for one segment group.
    pub fn process_group(&self, group: &SegmentGroup, features: &[LineFeature]) -> GroupResult {
        let mut nodes = Vec::new();
        let mut total_2d = 0.0;
        let mut total_3d = 0.0;

        for &row in &group.members {
            let feature = &features[row];
            let stations = sample_plan_multi(
                &feature.parts,
                self.config.spacing_m,
                self.config.include_vertices,
            );
            debug!(
                "group {:?} row {row}: {} stations",
                group.key,
                stations.len()
            );

            let mut prev: Option<(Point<f64>, Option<f64>)> = None;
            for station in stations {
                let elevation = self.elevation_at(station.point);
                let (distance_m, length_3d) = match prev {
                    None => (None, None),
                    Some((prev_point, prev_elevation)) => {
                        let d = round_mm(station.point.euclidean_distance(&prev_point));
                        total_2d += d;
                        let length_3d = self.grid.as_ref().map(|_| {
                            // Missing elevation at either end degrades
                            // the segment to its planar length, so the
                            // 3D total stays in sync with the 2D one.
                            let l = match (elevation, prev_elevation) {
                                (Some(elev), Some(prev_elev)) => {
                                    let dz = elev - prev_elev;
                                    (d * d + dz * dz).sqrt()
                                }
                                _ => d,
                            };
                            total_3d += l;
                            l
                        });
                        (Some(d), length_3d)
                    }
                };

                let lonlat = self.projection.inverse(station.point.0);
                nodes.push(NodeRecord {
                    longitude: lonlat.x,
                    latitude: lonlat.y,
                    easting: station.point.x(),
                    northing: station.point.y(),
                    elevation,
                    distance_m,
                    length_3d,
                    kp: round_mm(station.distance),
                    total_3d: self.grid.as_ref().map(|_| total_3d),
                    group: group.key.clone(),
                    extra: self.retained(feature),
                });
                prev = Some((station.point, elevation));
            }
        }

        GroupResult {
            key: group.key.clone(),
            nodes,
            total_2d,
            total_3d: self.grid.as_ref().map(|_| total_3d),
        }
    }
}

/// Private API.
impl Sampler {
    fn elevation_at(&self, point: Point<f64>) -> Option<f64> {
        let grid = self.grid.as_ref()?;
        let radius = self.config.search_radius(grid.transform().pixel_w);
        grid.sample(point.0, radius)
    }

    fn retained(&self, feature: &LineFeature) -> Map<String, Value> {
        if !self.config.retain_attributes {
            return Map::new();
        }
        let group_field = self.config.group_field.as_deref();
        feature
            .properties
            .iter()
            .filter(|(key, _)| {
                !FIXED_COLUMNS.contains(&key.as_str()) && Some(key.as_str()) != group_field
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// Rounds to millimeters, the reporting precision for distances.
fn round_mm(meters: f64) -> f64 {
    (meters * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::{round_mm, Sampler};
    use crate::{
        feature::{LineFeature, SegmentGroup},
        SamplerConfig,
    };
    use approx::assert_relative_eq;
    use geo::geometry::{LineString, MultiLineString};
    use serde_json::{Map, Value};

    fn line_100m() -> LineFeature {
        LineFeature {
            parts: MultiLineString(vec![LineString(vec![
                (250_000.0, 2_700_000.0).into(),
                (250_100.0, 2_700_000.0).into(),
            ])]),
            properties: Map::new(),
        }
    }

    fn sampler(config: SamplerConfig) -> Sampler {
        Sampler::new(config).unwrap()
    }

    fn group_of(features: &[LineFeature]) -> SegmentGroup {
        SegmentGroup {
            key: "test".to_string(),
            members: (0..features.len()).collect(),
        }
    }

    #[test]
    fn test_no_raster_2d_only() {
        let config = SamplerConfig {
            spacing_m: 25.0,
            ..SamplerConfig::default()
        };
        let sampler = sampler(config);
        let features = vec![line_100m()];
        let result = sampler.process_group(&group_of(&features), &features);

        assert_eq!(result.nodes.len(), 5);
        assert_relative_eq!(result.total_2d, 100.0);
        assert_eq!(result.total_3d, None);

        let first = &result.nodes[0];
        assert_eq!(first.distance_m, None);
        assert_eq!(first.length_3d, None);
        assert_eq!(first.elevation, None);
        assert_relative_eq!(first.kp, 0.0);

        for node in &result.nodes[1..] {
            assert_eq!(node.distance_m, Some(25.0));
            assert_eq!(node.length_3d, None);
            assert_eq!(node.total_3d, None);
        }
        assert_relative_eq!(result.nodes.last().unwrap().kp, 100.0);
    }

    #[test]
    fn test_lonlat_reported_in_wgs84() {
        let config = SamplerConfig {
            spacing_m: 50.0,
            ..SamplerConfig::default()
        };
        let sampler = sampler(config);
        let features = vec![line_100m()];
        let result = sampler.process_group(&group_of(&features), &features);

        // 250 km easting is the TWD97 central meridian.
        let first = &result.nodes[0];
        assert_relative_eq!(first.longitude, 121.0, epsilon = 1e-6);
        assert!(first.latitude > 24.0 && first.latitude < 25.0);
    }

    #[test]
    fn test_retained_attributes() {
        let mut properties = Map::new();
        properties.insert("survey".to_string(), Value::String("S-01".to_string()));
        properties.insert("Easting".to_string(), Value::from(1));
        let features = vec![LineFeature {
            properties,
            ..line_100m()
        }];

        let config = SamplerConfig {
            spacing_m: 100.0,
            retain_attributes: true,
            ..SamplerConfig::default()
        };
        let sampler = sampler(config);
        let result = sampler.process_group(&group_of(&features), &features);
        let extra = &result.nodes[0].extra;
        assert_eq!(extra.get("survey"), Some(&Value::String("S-01".into())));
        // Fixed output columns are never shadowed by attributes.
        assert_eq!(extra.get("Easting"), None);
    }

    #[test]
    fn test_flat_raster_3d_equals_2d() {
        let path = std::env::temp_dir().join(format!("chainage_flat_{}.asc", std::process::id()));
        std::fs::write(
            &path,
            "ncols 3\nnrows 1\nxllcorner 249900\nyllcorner 2699950\ncellsize 100\n10 10 10\n",
        )
        .unwrap();

        let config = SamplerConfig {
            spacing_m: 25.0,
            raster: Some(path.clone()),
            ..SamplerConfig::default()
        };
        let sampler = sampler(config);
        let features = vec![line_100m()];
        let result = sampler.process_group(&group_of(&features), &features);
        std::fs::remove_file(&path).unwrap();

        for node in &result.nodes {
            assert_eq!(node.elevation, Some(10.0));
        }
        // Flat terrain: 3D degenerates to 2D.
        assert_relative_eq!(result.total_3d.unwrap(), result.total_2d);
        assert_relative_eq!(result.total_2d, 100.0);
    }

    #[test]
    fn test_missing_elevation_falls_back_to_planar() {
        // One valid cell covering only the first 50 m of the line;
        // zero search radius keeps the gap from being interpolated.
        let path = std::env::temp_dir().join(format!("chainage_gap_{}.asc", std::process::id()));
        std::fs::write(
            &path,
            "ncols 1\nnrows 1\nxllcorner 249950\nyllcorner 2699950\ncellsize 100\n10\n",
        )
        .unwrap();

        let config = SamplerConfig {
            spacing_m: 25.0,
            raster: Some(path.clone()),
            search_radius_m: Some(0.0),
            ..SamplerConfig::default()
        };
        let sampler = sampler(config);
        let features = vec![line_100m()];
        let result = sampler.process_group(&group_of(&features), &features);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(result.nodes[1].elevation, Some(10.0));
        assert_eq!(result.nodes[2].elevation, None);
        // The segment into the gap degrades to its planar length and
        // the 3D total stays in sync with the 2D one.
        assert_eq!(result.nodes[2].length_3d, Some(25.0));
        assert_relative_eq!(result.total_3d.unwrap(), result.total_2d);
    }

    #[test]
    fn test_unreadable_raster_degrades() {
        let config = SamplerConfig {
            spacing_m: 25.0,
            raster: Some(std::path::PathBuf::from("no/such/raster.asc")),
            ..SamplerConfig::default()
        };
        let sampler = sampler(config);
        let features = vec![line_100m()];
        let result = sampler.process_group(&group_of(&features), &features);
        assert_eq!(result.total_3d, None);
        assert!(result.nodes.iter().all(|node| node.elevation.is_none()));
    }

    #[test]
    fn test_run_writes_report() {
        let out_dir = std::env::temp_dir().join(format!("chainage_run_{}", std::process::id()));
        let config = SamplerConfig {
            spacing_m: 50.0,
            out_dir: out_dir.clone(),
            ..SamplerConfig::default()
        };
        let sampler = sampler(config);
        let features = vec![line_100m(), line_100m()];
        let report = sampler.run(&features).unwrap();
        let contents = std::fs::read_to_string(&report.report_path).unwrap();
        std::fs::remove_dir_all(&out_dir).unwrap();

        // No group field configured: one group per row.
        assert_eq!(report.groups.len(), 2);
        assert_eq!(report.groups[0].key, "0");
        assert_eq!(report.groups[1].key, "1");
        assert_eq!(contents.lines().count(), 3);
    }

    #[test]
    fn test_failed_group_output_skips_group() {
        let out_dir = std::env::temp_dir().join(format!("chainage_badout_{}", std::process::id()));
        // A directory squatting on the group's CSV path makes that
        // group's write fail.
        std::fs::create_dir_all(out_dir.join("bad_nodes.csv")).unwrap();

        let keyed = |key: &str| {
            let mut properties = Map::new();
            properties.insert("Line".to_string(), Value::String(key.to_string()));
            LineFeature {
                properties,
                ..line_100m()
            }
        };
        let features = vec![keyed("bad"), keyed("good")];

        let config = SamplerConfig {
            spacing_m: 50.0,
            group_field: Some("Line".to_string()),
            out_dir: out_dir.clone(),
            ..SamplerConfig::default()
        };
        let report = sampler(config).run(&features).unwrap();
        let contents = std::fs::read_to_string(&report.report_path).unwrap();
        std::fs::remove_dir_all(&out_dir).unwrap();

        // The failing group is skipped; the rest still get written
        // and summarized.
        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].key, "good");
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn test_round_mm() {
        assert_relative_eq!(round_mm(1.23456), 1.235);
        assert_relative_eq!(round_mm(99.9994), 99.999);
    }
}
