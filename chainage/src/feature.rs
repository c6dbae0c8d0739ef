//! Polyline input and segment-group resolution.
//!
//! GeoJSON and KML both carry geographic WGS84 coordinates; lines are
//! projected into the working CRS once, at load, so every downstream
//! distance is planar meters.

use crate::{math::TransverseMercator, ChainageError};
use geo::geometry::{Coord, LineString, MultiLineString};
use geojson::GeoJson;
use kml::{types::Geometry as KmlGeometry, Kml, KmlReader};
use log::warn;
use serde_json::{Map, Value};
use std::{fs::File, io::BufReader, path::Path};

/// One polyline feature, in projected coordinates.
#[derive(Debug, Clone)]
pub struct LineFeature {
    /// Constituent parts. Single-part lines are one-element multis.
    pub parts: MultiLineString<f64>,

    /// Source attributes, verbatim.
    pub properties: Map<String, Value>,
}

/// All features sharing one group key, in first-appearance order.
#[derive(Debug, Clone)]
pub struct SegmentGroup {
    pub key: String,

    /// Indices into the feature list.
    pub members: Vec<usize>,
}

/// Reads every line feature from the vector file at `path`.
///
/// Non-line geometries are skipped with a warning. An input with no
/// line features at all is an error.
pub fn read_lines(
    path: &Path,
    projection: &TransverseMercator,
) -> Result<Vec<LineFeature>, ChainageError> {
    let features = match path
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("geojson" | "json") => read_geojson(path, projection),
        Some("kml") => read_kml(path, projection),
        _ => Err(ChainageError::Extension(path.to_owned())),
    }?;

    if features.is_empty() {
        return Err(ChainageError::EmptyDataset(path.to_owned()));
    }
    Ok(features)
}

/// Partitions features into segment groups.
///
/// Features are keyed by the stringified value of `field`; a feature
/// missing the attribute (or all of them, when the column is absent
/// from the dataset) falls back to its row-index string.
pub fn group_features(features: &[LineFeature], field: Option<&str>) -> Vec<SegmentGroup> {
    if let Some(field) = field {
        if !features.iter().any(|f| f.properties.contains_key(field)) {
            warn!("attribute {field:?} not present in any feature; using row-index groups");
        }
    }

    let mut groups: Vec<SegmentGroup> = Vec::new();
    for (row, feature) in features.iter().enumerate() {
        let key = field
            .and_then(|field| feature.properties.get(field))
            .map(stringify)
            .unwrap_or_else(|| row.to_string());
        match groups.iter_mut().find(|group| group.key == key) {
            Some(group) => group.members.push(row),
            None => groups.push(SegmentGroup {
                key,
                members: vec![row],
            }),
        }
    }
    groups
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn read_geojson(
    path: &Path,
    projection: &TransverseMercator,
) -> Result<Vec<LineFeature>, ChainageError> {
    let geojson = GeoJson::from_reader(BufReader::new(File::open(path)?))?;
    let raw = match geojson {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(geometry) => vec![geojson::Feature {
            bbox: None,
            geometry: Some(geometry),
            id: None,
            properties: None,
            foreign_members: None,
        }],
    };

    let total = raw.len();
    let mut features = Vec::with_capacity(total);
    for feature in raw {
        let Some(geometry) = feature.geometry else {
            continue;
        };
        let parts = match geo::Geometry::<f64>::try_from(geometry)? {
            geo::Geometry::LineString(line) => MultiLineString(vec![line]),
            geo::Geometry::MultiLineString(multi) => multi,
            _ => continue,
        };
        features.push(LineFeature {
            parts: project(&parts, projection),
            properties: feature.properties.unwrap_or_default(),
        });
    }
    if features.len() != total {
        warn!(
            "{} of {total} features in {path:?} were not lines and were skipped",
            total - features.len()
        );
    }
    Ok(features)
}

fn read_kml(
    path: &Path,
    projection: &TransverseMercator,
) -> Result<Vec<LineFeature>, ChainageError> {
    let kml = KmlReader::<BufReader<File>, f64>::from_path(path)?.read()?;
    let mut features = Vec::new();
    collect_kml(&kml, projection, &mut features);
    Ok(features)
}

fn collect_kml(kml: &Kml<f64>, projection: &TransverseMercator, out: &mut Vec<LineFeature>) {
    match kml {
        Kml::KmlDocument(doc) => {
            for element in &doc.elements {
                collect_kml(element, projection, out);
            }
        }
        Kml::Document { elements, .. } | Kml::Folder { elements, .. } => {
            for element in elements {
                collect_kml(element, projection, out);
            }
        }
        Kml::Placemark(placemark) => {
            let Some(geometry) = &placemark.geometry else {
                return;
            };
            let mut lines = Vec::new();
            collect_kml_lines(geometry, &mut lines);
            if lines.is_empty() {
                return;
            }
            let mut properties = Map::new();
            if let Some(name) = &placemark.name {
                properties.insert("Name".to_string(), Value::String(name.clone()));
            }
            out.push(LineFeature {
                parts: project(&MultiLineString(lines), projection),
                properties,
            });
        }
        _ => {}
    }
}

fn collect_kml_lines(geometry: &KmlGeometry<f64>, out: &mut Vec<LineString<f64>>) {
    match geometry {
        KmlGeometry::LineString(line) => {
            let coords = line
                .coords
                .iter()
                .map(|c| Coord { x: c.x, y: c.y })
                .collect::<Vec<_>>();
            out.push(LineString(coords));
        }
        KmlGeometry::MultiGeometry(multi) => {
            for geometry in &multi.geometries {
                collect_kml_lines(geometry, out);
            }
        }
        _ => {}
    }
}

fn project(parts: &MultiLineString<f64>, projection: &TransverseMercator) -> MultiLineString<f64> {
    MultiLineString(
        parts
            .0
            .iter()
            .map(|line| LineString(line.0.iter().map(|c| projection.forward(*c)).collect()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::{group_features, read_lines, LineFeature};
    use crate::math::TransverseMercator;
    use approx::assert_relative_eq;
    use geo::geometry::{LineString, MultiLineString};
    use serde_json::{Map, Value};
    use std::path::PathBuf;

    fn feature(props: &[(&str, Value)]) -> LineFeature {
        let mut properties = Map::new();
        for (key, value) in props {
            properties.insert((*key).to_string(), value.clone());
        }
        LineFeature {
            parts: MultiLineString(vec![LineString(vec![
                (0.0, 0.0).into(),
                (1.0, 0.0).into(),
            ])]),
            properties,
        }
    }

    #[test]
    fn test_group_by_attribute() {
        let features = vec![
            feature(&[("Line", Value::String("A".into()))]),
            feature(&[("Line", Value::String("B".into()))]),
            feature(&[("Line", Value::String("A".into()))]),
        ];
        let groups = group_features(&features, Some("Line"));
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, "A");
        assert_eq!(groups[0].members, vec![0, 2]);
        assert_eq!(groups[1].key, "B");
        assert_eq!(groups[1].members, vec![1]);
    }

    #[test]
    fn test_numeric_keys_stringified() {
        let features = vec![feature(&[("zone", Value::from(7))])];
        let groups = group_features(&features, Some("zone"));
        assert_eq!(groups[0].key, "7");
    }

    #[test]
    fn test_absent_column_falls_back_to_row_index() {
        let features = vec![feature(&[]), feature(&[]), feature(&[])];
        let groups = group_features(&features, Some("NoSuchColumn"));
        assert_eq!(groups.len(), 3);
        for (i, group) in groups.iter().enumerate() {
            assert_eq!(group.key, i.to_string());
            assert_eq!(group.members, vec![i]);
        }
    }

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("chainage_{}_{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_read_geojson() {
        let path = temp_file(
            "lines.geojson",
            r#"{
                "type": "FeatureCollection",
                "features": [
                    {
                        "type": "Feature",
                        "properties": {"Line": "A"},
                        "geometry": {
                            "type": "LineString",
                            "coordinates": [[121.0, 24.4], [121.001, 24.4]]
                        }
                    },
                    {
                        "type": "Feature",
                        "properties": {"Line": "B"},
                        "geometry": {"type": "Point", "coordinates": [121.0, 24.4]}
                    }
                ]
            }"#,
        );
        let features = read_lines(&path, &TransverseMercator::twd97()).unwrap();
        std::fs::remove_file(&path).unwrap();

        // The point feature is skipped.
        assert_eq!(features.len(), 1);
        let feature = &features[0];
        assert_eq!(feature.properties.get("Line"), Some(&Value::from("A")));
        // 121°E is TWD97's central meridian.
        let start = feature.parts.0[0].0[0];
        assert_relative_eq!(start.x, 250_000.0, epsilon = 1e-6);
        assert!(start.y > 2_600_000.0 && start.y < 2_800_000.0);
    }

    #[test]
    fn test_read_kml() {
        let path = temp_file(
            "lines.kml",
            r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <Placemark>
      <name>north jetty</name>
      <LineString>
        <coordinates>121.0,24.4,0 121.001,24.4,0</coordinates>
      </LineString>
    </Placemark>
  </Document>
</kml>
"#,
        );
        let features = read_lines(&path, &TransverseMercator::twd97()).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(features.len(), 1);
        assert_eq!(
            features[0].properties.get("Name"),
            Some(&Value::from("north jetty"))
        );
        assert_eq!(features[0].parts.0[0].0.len(), 2);
    }

    #[test]
    fn test_malformed_geojson_is_an_error() {
        let path = temp_file("broken.geojson", "{ \"type\": \"FeatureCollection\",");
        let result = read_lines(&path, &TransverseMercator::twd97());
        std::fs::remove_file(&path).unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_dataset_is_an_error() {
        let path = temp_file(
            "empty.geojson",
            r#"{"type": "FeatureCollection", "features": []}"#,
        );
        let result = read_lines(&path, &TransverseMercator::twd97());
        std::fs::remove_file(&path).unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_extension() {
        let path = PathBuf::from("lines.shp");
        assert!(read_lines(&path, &TransverseMercator::twd97()).is_err());
    }

    #[test]
    fn test_no_field_configured() {
        let features = vec![feature(&[]), feature(&[])];
        let groups = group_features(&features, None);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].key, "1");
    }
}
