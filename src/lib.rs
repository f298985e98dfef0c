//! Meridian - boundary-aware offline reverse geocoding
//!
//! Resolves a raw GPS coordinate into structured political geography
//! (country, state/county, city/district) for pipelines that build
//! destination paths from such values. Country resolution runs polygon
//! tests behind a geohash-keyed cache with border-cell disambiguation and
//! falls back to a nearest-named-place search when boundary data is
//! unavailable or inconclusive.

pub mod boundary;
pub mod gazetteer;
pub mod geocoder;
pub mod geohash;
pub mod geometry;
pub mod models;

pub use boundary::{BoundaryIndex, CountryLookup};
pub use gazetteer::PlaceIndex;
pub use geocoder::{GeocoderConfig, ReverseGeocoder};
pub use models::{FeatureClass, LocationData, Place};

/// Outcome of a service initialization attempt.
///
/// Unavailability is not an error: a service that could not load its data
/// file stays in a well-defined empty state and the caller falls back to the
/// next tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    /// Data loaded (or was already loaded).
    Ready,
    /// Data file missing, unreadable, or malformed; service is empty.
    Unavailable,
    /// Initialization was canceled before completing.
    Canceled,
}
