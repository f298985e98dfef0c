//! Geometry model and point-in-polygon engine.
//!
//! Pure data plus containment tests: points, rings with holes,
//! multi-territory country boundaries, bounding boxes.

mod boundary;
mod primitives;
mod ring;

pub use boundary::{CountryBoundary, Polygon};
pub use primitives::{clamp_latitude, normalize_longitude, BoundingBox, GeoPoint};
pub use ring::PolygonRing;
