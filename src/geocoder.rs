//! Boundary-aware reverse geocoding.
//!
//! Composes the boundary index and the nearest-place engine into one entry
//! point: resolve the country from polygon data first, use it to filter the
//! nearest-place search, and degrade gracefully to an unfiltered search when
//! boundary data is missing or inconclusive.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::boundary::BoundaryIndex;
use crate::gazetteer::PlaceIndex;
use crate::models::LocationData;
use crate::InitStatus;

/// Paths and toggles owned by the external configuration layer.
#[derive(Debug, Clone)]
pub struct GeocoderConfig {
    /// Flat gazetteer of named places.
    pub gazetteer_path: PathBuf,
    /// Boundary container; `None` disables boundary data entirely.
    pub boundary_path: Option<PathBuf>,
    /// Whether a resolved country restricts the nearest-place search.
    pub use_boundary_filter: bool,
}

/// Per-service outcome of `ReverseGeocoder::initialize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeocoderInit {
    pub boundaries: InitStatus,
    pub places: InitStatus,
}

/// Reverse geocoder with tiered fallback.
///
/// Owns its boundary index and place engine; nothing here is process-global,
/// so tests and composition roots can create isolated instances. All lookup
/// methods are safe under unbounded concurrent invocation.
pub struct ReverseGeocoder {
    config: GeocoderConfig,
    boundaries: BoundaryIndex,
    places: PlaceIndex,
}

impl ReverseGeocoder {
    pub fn new(config: GeocoderConfig) -> Self {
        Self {
            config,
            boundaries: BoundaryIndex::new(),
            places: PlaceIndex::new(),
        }
    }

    /// Initialize both services concurrently; completes once both have
    /// finished attempting to load, regardless of individual success.
    pub async fn initialize(&self, cancel: &CancellationToken) -> GeocoderInit {
        let boundary_init = async {
            match &self.config.boundary_path {
                Some(path) => self.boundaries.initialize(path, cancel).await,
                None => InitStatus::Unavailable,
            }
        };
        let place_init = self.places.initialize(&self.config.gazetteer_path, cancel);
        let (boundaries, places) = tokio::join!(boundary_init, place_init);
        GeocoderInit { boundaries, places }
    }

    /// Resolve a coordinate to structured political geography.
    ///
    /// When the boundary index resolved a single country, the nearest-place
    /// search is filtered to it so a closer place across the border cannot
    /// win. An uninitialized index, ocean, border ambiguity, or a filtered
    /// search with no match all fall back to the unfiltered nearest place.
    /// Returns `None` only when neither layer can produce a result.
    pub fn reverse_geocode(&self, lat: f64, lon: f64) -> Option<LocationData> {
        if self.config.use_boundary_filter && self.boundaries.is_initialized() {
            let lookup = self.boundaries.lookup(lat, lon);
            if let Some(code) = lookup.country.as_deref() {
                if let Some(place) = self.places.find_nearest(lat, lon, Some(code), false) {
                    return Some(LocationData::from_place(&place));
                }
                debug!(country = code, "no place within resolved country, retrying unfiltered");
            }
        }
        self.places.reverse_geocode(lat, lon)
    }

    pub fn boundary_index(&self) -> &BoundaryIndex {
        &self.boundaries
    }

    pub fn place_index(&self) -> &PlaceIndex {
        &self.places
    }
}
