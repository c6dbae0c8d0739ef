//! Along-line station generation and elevation draping for survey
//! polylines.
//!
//! Given a polyline dataset and an optional elevation raster, produce
//! ordered sample points ("nodes") along each line, at fixed spacing
//! and/or at original vertices, with draped elevation and derived
//! 2D/3D distances, grouped by a segment-naming attribute and written
//! out as per-group CSV (and optional GeoJSON) plus a one-row-per-
//! group summary report.

mod config;
mod error;
mod feature;
mod math;
mod report;
mod sampler;
mod station;

pub use crate::{
    config::SamplerConfig,
    error::ChainageError,
    feature::{group_features, read_lines, LineFeature, SegmentGroup},
    math::TransverseMercator,
    report::GroupOutput,
    sampler::{GroupResult, NodeRecord, RunReport, Sampler},
    station::{sample_plan, sample_plan_multi, Chainage, Station},
};

pub use demgrid;
pub use geo;
