//! Along-line station generation.

use geo::{
    geometry::{Coord, LineString, MultiLineString, Point},
    EuclideanDistance,
};

/// A generated sample point and its along-line distance in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Station {
    pub point: Point<f64>,
    pub distance: f64,
}

/// Distance-indexed view of a polyline.
///
/// Precomputes cumulative vertex distances so stationing and point
/// projection are both O(segments) worst case.
pub struct Chainage<'a> {
    line: &'a LineString<f64>,

    /// Cumulative distance from the line's start to each vertex.
    cumulative: Vec<f64>,
}

impl<'a> Chainage<'a> {
    pub fn new(line: &'a LineString<f64>) -> Self {
        let mut cumulative = Vec::with_capacity(line.0.len());
        let mut total = 0.0;
        cumulative.push(0.0);
        for pair in line.0.windows(2) {
            total += Point::from(pair[0]).euclidean_distance(&Point::from(pair[1]));
            cumulative.push(total);
        }
        Self { line, cumulative }
    }

    /// Total length of the line in meters.
    pub fn length(&self) -> f64 {
        *self.cumulative.last().unwrap_or(&0.0)
    }

    /// Returns the point at `distance` along the line.
    ///
    /// Distances are clamped to `[0, length]`.
    pub fn point_at(&self, distance: f64) -> Point<f64> {
        let coords = &self.line.0;
        if coords.is_empty() {
            return Point::new(f64::NAN, f64::NAN);
        }
        if distance <= 0.0 {
            return Point::from(coords[0]);
        }
        if distance >= self.length() {
            return Point::from(coords[coords.len() - 1]);
        }
        let seg = match self
            .cumulative
            .binary_search_by(|d| d.total_cmp(&distance))
        {
            Ok(vertex) => return Point::from(coords[vertex]),
            Err(after) => after - 1,
        };
        let seg_len = self.cumulative[seg + 1] - self.cumulative[seg];
        let t = (distance - self.cumulative[seg]) / seg_len;
        let a = coords[seg];
        let b = coords[seg + 1];
        Point::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t)
    }

    /// Returns the along-line distance of the point on the line
    /// nearest to `point`.
    pub fn locate(&self, point: Point<f64>) -> f64 {
        let coords = &self.line.0;
        if coords.len() < 2 {
            return 0.0;
        }
        let mut best = (f64::INFINITY, 0.0);
        for (seg, pair) in coords.windows(2).enumerate() {
            let (offset, along) = project_onto_segment(point.0, pair[0], pair[1]);
            if offset < best.0 {
                best = (offset, self.cumulative[seg] + along);
            }
        }
        best.1
    }

    /// Original vertices with their exact cumulative distances, in
    /// vertex order.
    pub fn vertices(&self) -> impl Iterator<Item = Station> + '_ {
        self.line
            .0
            .iter()
            .zip(self.cumulative.iter())
            .map(|(coord, distance)| Station {
                point: Point::from(*coord),
                distance: *distance,
            })
    }
}

/// Distance from `p` to segment `ab`, and the along-segment distance
/// of the projection foot.
fn project_onto_segment(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> (f64, f64) {
    let ab = Coord {
        x: b.x - a.x,
        y: b.y - a.y,
    };
    let len2 = ab.x * ab.x + ab.y * ab.y;
    let t = if len2 == 0.0 {
        0.0
    } else {
        (((p.x - a.x) * ab.x + (p.y - a.y) * ab.y) / len2).clamp(0.0, 1.0)
    };
    let foot = Coord {
        x: a.x + ab.x * t,
        y: a.y + ab.y * t,
    };
    let offset = Point::from(p).euclidean_distance(&Point::from(foot));
    (offset, t * len2.sqrt())
}

/// Generates the ordered, deduplicated stations for one line.
///
/// `spacing == 0` emits exactly the original vertices. Otherwise
/// stations fall at every multiple of `spacing`, plus the exact
/// endpoint when the last multiple stops short of it, plus (when
/// `include_vertices`) each original vertex.
pub fn sample_plan(line: &LineString<f64>, spacing: f64, include_vertices: bool) -> Vec<Station> {
    plan(std::slice::from_ref(line), spacing, include_vertices)
}

/// Stations for a whole (possibly multi-part) line.
///
/// Distances run continuously across parts: spacing multiples are
/// measured from the whole line's start and interpolated into
/// whichever part contains them, and only the final endpoint is
/// appended. Part boundaries get a station only when a multiple or a
/// vertex lands there.
pub fn sample_plan_multi(
    parts: &MultiLineString<f64>,
    spacing: f64,
    include_vertices: bool,
) -> Vec<Station> {
    plan(&parts.0, spacing, include_vertices)
}

fn plan(parts: &[LineString<f64>], spacing: f64, include_vertices: bool) -> Vec<Station> {
    let chainages: Vec<Chainage> = parts.iter().map(Chainage::new).collect();
    if chainages.is_empty() {
        return Vec::new();
    }
    let mut bases = Vec::with_capacity(chainages.len());
    let mut total = 0.0;
    for chainage in &chainages {
        bases.push(total);
        total += chainage.length();
    }

    let mut stations: Vec<Station> = Vec::new();
    if spacing <= 0.0 {
        vertices_into(&chainages, &bases, &mut stations);
    } else {
        let mut distance = 0.0;
        while distance <= total {
            stations.push(station_at(&chainages, &bases, distance));
            distance += spacing;
        }
        if distance - spacing < total {
            stations.push(station_at(&chainages, &bases, total));
        }
        if include_vertices {
            vertices_into(&chainages, &bases, &mut stations);
        }
    }

    // Ties on distance break by (x, y) so the ordering never depends
    // on generation order.
    stations.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then(a.point.x().total_cmp(&b.point.x()))
            .then(a.point.y().total_cmp(&b.point.y()))
    });
    stations.dedup_by(|a, b| a.distance == b.distance && a.point == b.point);
    stations
}

/// Interpolates the station at `distance` along the concatenated
/// parts.
fn station_at(chainages: &[Chainage], bases: &[f64], distance: f64) -> Station {
    let part = match bases.binary_search_by(|base| base.total_cmp(&distance)) {
        Ok(part) => part,
        Err(0) => 0,
        Err(after) => after - 1,
    }
    .min(chainages.len() - 1);
    Station {
        point: chainages[part].point_at(distance - bases[part]),
        distance,
    }
}

fn vertices_into(chainages: &[Chainage], bases: &[f64], out: &mut Vec<Station>) {
    for (chainage, base) in chainages.iter().zip(bases) {
        out.extend(chainage.vertices().map(|station| Station {
            point: station.point,
            distance: station.distance + base,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::{sample_plan, sample_plan_multi, Chainage, Station};
    use approx::assert_relative_eq;
    use geo::geometry::{LineString, MultiLineString, Point};

    fn straight_100m() -> LineString<f64> {
        LineString(vec![(0.0, 0.0).into(), (100.0, 0.0).into()])
    }

    fn bent_line() -> LineString<f64> {
        LineString(vec![
            (0.0, 0.0).into(),
            (30.0, 0.0).into(),
            (30.0, 40.0).into(),
        ])
    }

    #[test]
    fn test_length() {
        assert_relative_eq!(Chainage::new(&straight_100m()).length(), 100.0);
        assert_relative_eq!(Chainage::new(&bent_line()).length(), 70.0);
    }

    #[test]
    fn test_point_at() {
        let line = bent_line();
        let chainage = Chainage::new(&line);
        assert_eq!(chainage.point_at(0.0), Point::new(0.0, 0.0));
        assert_eq!(chainage.point_at(15.0), Point::new(15.0, 0.0));
        assert_eq!(chainage.point_at(30.0), Point::new(30.0, 0.0));
        assert_eq!(chainage.point_at(50.0), Point::new(30.0, 20.0));
        assert_eq!(chainage.point_at(999.0), Point::new(30.0, 40.0));
    }

    #[test]
    fn test_locate_vertices() {
        let line = bent_line();
        let chainage = Chainage::new(&line);
        assert_relative_eq!(chainage.locate(Point::new(30.0, 0.0)), 30.0);
        assert_relative_eq!(chainage.locate(Point::new(30.0, 40.0)), 70.0);
    }

    #[test]
    fn test_spacing_25_over_100m() {
        let stations = sample_plan(&straight_100m(), 25.0, false);
        let distances: Vec<f64> = stations.iter().map(|s| s.distance).collect();
        assert_eq!(distances, vec![0.0, 25.0, 50.0, 75.0, 100.0]);
    }

    #[test]
    fn test_endpoint_coverage() {
        let stations = sample_plan(&straight_100m(), 30.0, false);
        let distances: Vec<f64> = stations.iter().map(|s| s.distance).collect();
        assert_eq!(distances, vec![0.0, 30.0, 60.0, 90.0, 100.0]);
    }

    #[test]
    fn test_monotonic_distances() {
        let stations = sample_plan(&bent_line(), 7.0, true);
        assert_relative_eq!(stations[0].distance, 0.0);
        for pair in stations.windows(2) {
            assert!(pair[0].distance < pair[1].distance);
        }
        assert_relative_eq!(stations.last().unwrap().distance, 70.0);
    }

    #[test]
    fn test_vertices_only_mode() {
        let line = bent_line();
        let stations = sample_plan(&line, 0.0, false);
        assert_eq!(stations.len(), line.0.len());
        for (station, coord) in stations.iter().zip(line.0.iter()) {
            assert_eq!(station.point, Point::from(*coord));
        }
        let distances: Vec<f64> = stations.iter().map(|s| s.distance).collect();
        assert_eq!(distances, vec![0.0, 30.0, 70.0]);
    }

    #[test]
    fn test_vertex_coincident_with_station_dedups() {
        // The bend at 30 m is both a multiple of 15 and a vertex.
        let stations = sample_plan(&bent_line(), 15.0, true);
        let at_30: Vec<&Station> = stations
            .iter()
            .filter(|s| s.distance == 30.0)
            .collect();
        assert_eq!(at_30.len(), 1);
    }

    #[test]
    fn test_multi_part_continuous_interpolation() {
        let parts = MultiLineString(vec![
            LineString(vec![(0.0, 0.0).into(), (50.0, 0.0).into()]),
            LineString(vec![(50.0, 0.0).into(), (50.0, 30.0).into()]),
        ]);
        let stations = sample_plan_multi(&parts, 20.0, false);
        let distances: Vec<f64> = stations.iter().map(|s| s.distance).collect();
        // Multiples are measured from the whole line's start; the
        // part boundary at 50 m gets no station of its own.
        assert_eq!(distances, vec![0.0, 20.0, 40.0, 60.0, 80.0]);
        // 60 m falls 10 m into the second part.
        assert_relative_eq!(stations[3].point.x(), 50.0);
        assert_relative_eq!(stations[3].point.y(), 10.0);
    }

    #[test]
    fn test_multi_part_vertices_dedup_shared_boundary() {
        let parts = MultiLineString(vec![
            LineString(vec![(0.0, 0.0).into(), (50.0, 0.0).into()]),
            LineString(vec![(50.0, 0.0).into(), (50.0, 30.0).into()]),
        ]);
        let stations = sample_plan_multi(&parts, 0.0, false);
        let distances: Vec<f64> = stations.iter().map(|s| s.distance).collect();
        // The shared vertex at 50 m appears once.
        assert_eq!(distances, vec![0.0, 50.0, 80.0]);
    }
}
