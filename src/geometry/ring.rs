//! Polygon rings and the even-odd containment test.

use serde::{Deserialize, Serialize};

use super::primitives::{BoundingBox, GeoPoint};

/// Rings whose shoelace area is below this are treated as degenerate.
const MIN_RING_AREA: f64 = 1e-12;

/// A closed sequence of vertices, either an exterior ring or a hole.
///
/// The ring is logically closed: a trailing duplicate of the first vertex is
/// accepted on construction and stripped. Degenerate input (fewer than three
/// vertices, collinear vertices, duplicate vertices, self-intersections) is
/// tolerated and never panics; containment results for such rings are
/// best-effort, and a ring with no enclosed area contains nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolygonRing {
    points: Vec<GeoPoint>,
    is_hole: bool,
    bbox: Option<BoundingBox>,
    area: f64,
}

impl PolygonRing {
    pub fn new(mut points: Vec<GeoPoint>, is_hole: bool) -> Self {
        // Strip the closing duplicate; the test below treats the ring as
        // implicitly closed.
        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        let bbox = BoundingBox::from_points(points.iter());
        let area = shoelace_area(&points);
        Self {
            points,
            is_hole,
            bbox,
            area,
        }
    }

    pub fn exterior(points: Vec<GeoPoint>) -> Self {
        Self::new(points, false)
    }

    pub fn hole(points: Vec<GeoPoint>) -> Self {
        Self::new(points, true)
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn is_hole(&self) -> bool {
        self.is_hole
    }

    pub fn bbox(&self) -> Option<&BoundingBox> {
        self.bbox.as_ref()
    }

    pub fn vertex_count(&self) -> usize {
        self.points.len()
    }

    /// A ring that cannot enclose any point: fewer than three vertices, or
    /// (near-)zero shoelace area from collinear/duplicate vertices.
    pub fn is_degenerate(&self) -> bool {
        self.points.len() < 3 || !(self.area.abs() >= MIN_RING_AREA)
    }

    /// Even-odd ray-casting containment test.
    ///
    /// Non-finite coordinates and degenerate rings always return false. A
    /// bounding-box check rejects far-away points before edges are walked.
    /// Behavior for points exactly on a vertex or edge is deterministic but
    /// unspecified (either side).
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        if !lat.is_finite() || !lon.is_finite() || self.is_degenerate() {
            return false;
        }
        match self.bbox {
            Some(ref bbox) if bbox.contains(lat, lon) => {}
            _ => return false,
        }

        let pts = &self.points;
        let mut inside = false;
        let mut j = pts.len() - 1;
        for i in 0..pts.len() {
            let (lat_i, lon_i) = (pts[i].lat, pts[i].lon);
            let (lat_j, lon_j) = (pts[j].lat, pts[j].lon);
            if (lat_i > lat) != (lat_j > lat) {
                let cross = lon_j + (lat - lat_j) / (lat_i - lat_j) * (lon_i - lon_j);
                if lon < cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    /// True when the point lies within `epsilon` degrees of any edge or
    /// vertex of the ring. `epsilon <= 0` never matches.
    pub fn on_edge(&self, lat: f64, lon: f64, epsilon: f64) -> bool {
        if epsilon <= 0.0 || !lat.is_finite() || !lon.is_finite() || self.points.is_empty() {
            return false;
        }
        let pts = &self.points;
        let n = pts.len();
        for i in 0..n {
            let a = pts[i];
            let b = pts[(i + 1) % n];
            if distance_to_segment(lat, lon, a, b) <= epsilon {
                return true;
            }
        }
        false
    }
}

/// Signed shoelace area in degree space. NaN vertices poison the sum, which
/// the degeneracy check then treats as zero-area.
fn shoelace_area(points: &[GeoPoint]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    let mut j = points.len() - 1;
    for i in 0..points.len() {
        sum += points[j].lon * points[i].lat - points[i].lon * points[j].lat;
        j = i;
    }
    sum / 2.0
}

/// Euclidean distance (degree space) from a point to the segment a-b.
fn distance_to_segment(lat: f64, lon: f64, a: GeoPoint, b: GeoPoint) -> f64 {
    let (dx, dy) = (b.lon - a.lon, b.lat - a.lat);
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return ((lon - a.lon).powi(2) + (lat - a.lat).powi(2)).sqrt();
    }
    let t = (((lon - a.lon) * dx + (lat - a.lat) * dy) / len_sq).clamp(0.0, 1.0);
    let (px, py) = (a.lon + t * dx, a.lat + t * dy);
    ((lon - px).powi(2) + (lat - py).powi(2)).sqrt()
}
