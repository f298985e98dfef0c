//! Coordinate and bounding-box primitives.

use serde::{Deserialize, Serialize};

/// Scale factor for the quantized (i16) point representation.
const QUANT_SCALE: f64 = 100.0;

/// Geographic point (lat/lon, WGS84 degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Lossy quantized form used by the boundary container: each coordinate
    /// scaled by 100 and rounded to an i16 (saturating). Round-trip error is
    /// at most half a hundredth of a degree.
    pub fn to_quantized(self) -> (i16, i16) {
        (quantize(self.lat), quantize(self.lon))
    }

    pub fn from_quantized(lat: i16, lon: i16) -> Self {
        Self {
            lat: lat as f64 / QUANT_SCALE,
            lon: lon as f64 / QUANT_SCALE,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

fn quantize(v: f64) -> i16 {
    let scaled = (v * QUANT_SCALE).round();
    if scaled >= i16::MAX as f64 {
        i16::MAX
    } else if scaled <= i16::MIN as f64 {
        i16::MIN
    } else {
        scaled as i16
    }
}

/// Clamp a latitude into [-90, 90]. In-range values pass through unchanged;
/// NaN is returned as-is (callers reject non-finite input separately).
pub fn clamp_latitude(lat: f64) -> f64 {
    lat.clamp(-90.0, 90.0)
}

/// Wrap a longitude into [-180, 180), periodic with period 360.
///
/// Correct for arbitrarily large inputs (multiple wraps); idempotent on
/// already-normalized values. Non-finite input is returned as-is.
pub fn normalize_longitude(lon: f64) -> f64 {
    if !lon.is_finite() {
        return lon;
    }
    let wrapped = lon - 360.0 * ((lon + 180.0) / 360.0).floor();
    // Floating error on huge inputs can land just outside the half-open range.
    if wrapped >= 180.0 {
        wrapped - 360.0
    } else if wrapped < -180.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}

/// Axis-aligned lat/lon bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    /// Derive the box enclosing a point set. A single point yields a
    /// degenerate (zero-area) box; an empty set yields `None`.
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a GeoPoint>,
    {
        let mut bbox: Option<BoundingBox> = None;
        for p in points {
            bbox = Some(match bbox {
                None => BoundingBox::new(p.lat, p.lon, p.lat, p.lon),
                Some(b) => BoundingBox::new(
                    b.min_lat.min(p.lat),
                    b.min_lon.min(p.lon),
                    b.max_lat.max(p.lat),
                    b.max_lon.max(p.lon),
                ),
            });
        }
        bbox
    }

    /// Smallest box covering both boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            self.min_lat.min(other.min_lat),
            self.min_lon.min(other.min_lon),
            self.max_lat.max(other.max_lat),
            self.max_lon.max(other.max_lon),
        )
    }

    /// Inclusive of edges; false for any NaN/infinite input.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        if !lat.is_finite() || !lon.is_finite() {
            return false;
        }
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }

    /// True when the boxes overlap, including touching edges and corners.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
            && self.min_lon <= other.max_lon
            && self.max_lon >= other.min_lon
    }
}
