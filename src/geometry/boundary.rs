//! Country boundary geometry: polygons with holes, multi-territory countries.

use serde::{Deserialize, Serialize};

use super::primitives::BoundingBox;
use super::ring::PolygonRing;

/// One exterior ring plus zero or more hole rings.
///
/// A point is in the polygon iff it is inside the exterior and outside every
/// hole (even-odd semantics; a hole models an enclave such as Vatican City
/// inside Italy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Polygon {
    exterior: PolygonRing,
    holes: Vec<PolygonRing>,
}

impl Polygon {
    pub fn new(exterior: PolygonRing, holes: Vec<PolygonRing>) -> Self {
        Self { exterior, holes }
    }

    pub fn exterior(&self) -> &PolygonRing {
        &self.exterior
    }

    pub fn holes(&self) -> &[PolygonRing] {
        &self.holes
    }

    pub fn bbox(&self) -> Option<&BoundingBox> {
        self.exterior.bbox()
    }

    pub fn vertex_count(&self) -> usize {
        self.exterior.vertex_count() + self.holes.iter().map(PolygonRing::vertex_count).sum::<usize>()
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        if !self.exterior.contains(lat, lon) {
            return false;
        }
        !self.holes.iter().any(|h| h.contains(lat, lon))
    }
}

/// A country's territory: one or more disjoint polygons (mainland, islands,
/// exclaves) plus identifying metadata.
///
/// The union bounding box and total vertex count are derived once at
/// construction and never recomputed per query. Construction is permissive
/// about content — empty strings, exotic Unicode, and empty polygon lists are
/// all accepted; this type does not validate political data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountryBoundary {
    code: String,
    name: String,
    alpha3: Option<String>,
    polygons: Vec<Polygon>,
    bbox: Option<BoundingBox>,
    vertex_count: usize,
}

impl CountryBoundary {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        alpha3: Option<String>,
        polygons: Vec<Polygon>,
    ) -> Self {
        let bbox = polygons
            .iter()
            .filter_map(Polygon::bbox)
            .fold(None, |acc: Option<BoundingBox>, b| match acc {
                None => Some(*b),
                Some(a) => Some(a.union(b)),
            });
        let vertex_count = polygons.iter().map(Polygon::vertex_count).sum();
        Self {
            code: code.into(),
            name: name.into(),
            alpha3,
            polygons,
            bbox,
            vertex_count,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alpha3(&self) -> Option<&str> {
        self.alpha3.as_deref()
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    /// Union bounding box of all territories; `None` for an empty boundary.
    pub fn bbox(&self) -> Option<&BoundingBox> {
        self.bbox.as_ref()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// True iff the point lies inside any of the country's polygons.
    ///
    /// The union bounding box is checked first, then each polygon's own box,
    /// so a country with many small disjoint territories rejects most points
    /// in O(1) per polygon.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        match self.bbox {
            Some(ref bbox) if bbox.contains(lat, lon) => {}
            _ => return false,
        }
        self.polygons.iter().any(|p| {
            p.bbox().map_or(false, |b| b.contains(lat, lon)) && p.contains(lat, lon)
        })
    }
}
