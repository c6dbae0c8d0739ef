//! Per-group CSV/GeoJSON output and the run summary report.

use crate::{
    sampler::{GroupResult, NodeRecord, FIXED_COLUMNS},
    ChainageError, SamplerConfig,
};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value as GjValue};
use log::info;
use serde_json::{Map, Value};
use std::{
    collections::BTreeSet,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

/// Where one group's output landed, plus its totals.
#[derive(Debug, Clone)]
pub struct GroupOutput {
    pub key: String,
    pub total_2d: f64,
    pub total_3d: Option<f64>,
    pub csv: PathBuf,
    pub geojson: Option<PathBuf>,
}

/// Writes one group's node table (and optional point file).
///
/// Group keys sanitize into file stems; distinct keys can collide
/// after sanitizing, so a stem already taken in `stems` gains a
/// numeric suffix.
pub fn write_group(
    config: &SamplerConfig,
    result: &GroupResult,
    stems: &mut BTreeSet<String>,
) -> Result<GroupOutput, ChainageError> {
    let mut stem = sanitize(&result.key);
    if !stems.insert(stem.clone()) {
        let mut n = 2;
        stem = loop {
            let candidate = format!("{stem}_{n}");
            if stems.insert(candidate.clone()) {
                break candidate;
            }
            n += 1;
        };
    }
    let group_column = config.group_field.as_deref().unwrap_or("segment_name");
    let extra_columns = extra_columns(&result.nodes);

    let csv = config.out_dir.join(format!("{stem}_nodes.csv"));
    write_csv(&csv, group_column, &extra_columns, result)?;

    let geojson = if config.export_geojson {
        let path = config.out_dir.join(format!("{stem}_nodes.geojson"));
        write_geojson(&path, group_column, &extra_columns, result)?;
        Some(path)
    } else {
        None
    };

    info!(
        "group {:?}: {} nodes -> {csv:?}",
        result.key,
        result.nodes.len()
    );
    Ok(GroupOutput {
        key: result.key.clone(),
        total_2d: result.total_2d,
        total_3d: result.total_3d,
        csv,
        geojson,
    })
}

/// Writes the one-row-per-group summary report, returning its path.
pub fn write_summary(out_dir: &Path, outputs: &[GroupOutput]) -> Result<PathBuf, ChainageError> {
    let path = out_dir.join("processing_report.csv");
    let mut w = BufWriter::new(File::create(&path)?);
    writeln!(
        w,
        "Segment,Total_2D_Distance,Total_3D_Distance,Output_CSV,Output_GeoJSON"
    )?;
    for output in outputs {
        writeln!(
            w,
            "{},{},{},{},{}",
            escape(&output.key),
            output.total_2d,
            fmt_opt(output.total_3d),
            escape(&output.csv.display().to_string()),
            escape(
                &output
                    .geojson
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default()
            ),
        )?;
    }
    w.flush()?;
    Ok(path)
}

/// Union of retained attribute columns across a group's nodes.
fn extra_columns(nodes: &[NodeRecord]) -> Vec<String> {
    let mut columns = BTreeSet::new();
    for node in nodes {
        for key in node.extra.keys() {
            columns.insert(key.clone());
        }
    }
    columns.into_iter().collect()
}

fn write_csv(
    path: &Path,
    group_column: &str,
    extra_columns: &[String],
    result: &GroupResult,
) -> Result<(), ChainageError> {
    let mut w = BufWriter::new(File::create(path)?);

    let mut header: Vec<String> = FIXED_COLUMNS.iter().map(|c| (*c).to_string()).collect();
    header.push(group_column.to_string());
    header.extend(extra_columns.iter().cloned());
    writeln!(
        w,
        "{}",
        header
            .iter()
            .map(|h| escape(h))
            .collect::<Vec<_>>()
            .join(",")
    )?;

    for node in &result.nodes {
        let mut fields = vec![
            node.longitude.to_string(),
            node.latitude.to_string(),
            node.easting.to_string(),
            node.northing.to_string(),
            fmt_opt(node.elevation),
            fmt_opt(node.distance_m),
            fmt_opt(node.length_3d),
            node.kp.to_string(),
            fmt_opt(node.total_3d),
            escape(&node.group),
        ];
        for column in extra_columns {
            let value = node.extra.get(column);
            fields.push(escape(&fmt_value(value)));
        }
        writeln!(w, "{}", fields.join(","))?;
    }
    w.flush()?;
    Ok(())
}

fn write_geojson(
    path: &Path,
    group_column: &str,
    extra_columns: &[String],
    result: &GroupResult,
) -> Result<(), ChainageError> {
    let features = result
        .nodes
        .iter()
        .map(|node| {
            let mut properties = Map::new();
            properties.insert("Longitude".to_string(), node.longitude.into());
            properties.insert("Latitude".to_string(), node.latitude.into());
            properties.insert("Easting".to_string(), node.easting.into());
            properties.insert("Northing".to_string(), node.northing.into());
            properties.insert("Elevation".to_string(), opt_value(node.elevation));
            properties.insert("Distance_Meters".to_string(), opt_value(node.distance_m));
            properties.insert("Length_3D".to_string(), opt_value(node.length_3d));
            properties.insert("KP".to_string(), node.kp.into());
            properties.insert("Total_3D_Length".to_string(), opt_value(node.total_3d));
            properties.insert(group_column.to_string(), Value::String(node.group.clone()));
            for column in extra_columns {
                let value = node.extra.get(column).cloned().unwrap_or(Value::Null);
                properties.insert(column.clone(), value);
            }
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(GjValue::Point(vec![
                    node.longitude,
                    node.latitude,
                ]))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };
    let w = BufWriter::new(File::create(path)?);
    serde_json::to_writer(w, &GeoJson::FeatureCollection(collection))
        .map_err(|e| ChainageError::Io(e.into()))?;
    Ok(())
}

/// Group keys become file stems; strip anything path-hostile.
fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect()
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn fmt_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn opt_value(value: Option<f64>) -> Value {
    value.map_or(Value::Null, Value::from)
}

/// Quotes a CSV field when it contains a delimiter, quote, or newline.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
