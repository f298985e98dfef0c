//! Nearest-named-place engine over the gazetteer.
//!
//! Places are indexed in an R-tree keyed by their unit-sphere position, so
//! Euclidean (chord) nearest-neighbor order equals great-circle order and a
//! filtered search can walk outward until the first place passing the
//! filters.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use rstar::primitives::GeomWithData;
use rstar::RTree;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::reader::{self, GazetteerSummary};
use crate::geometry::normalize_longitude;
use crate::models::{LocationData, Place};
use crate::InitStatus;

/// Mean Earth radius, kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Squared-chord window within which two places count as equidistant.
const TIE_EPSILON: f64 = 1e-12;

type IndexedPlace = GeomWithData<[f64; 3], usize>;

struct GazetteerState {
    places: Vec<Place>,
    tree: RTree<IndexedPlace>,
}

/// Lookup/hit counters exposed as cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlaceIndexStats {
    pub lookups: u64,
    pub hits: u64,
}

/// Immutable in-memory gazetteer with filtered nearest-neighbor search.
///
/// Safe for unbounded concurrent lookups. Before initialization (or after a
/// failed one) the engine is usable but empty: every lookup returns `None`.
pub struct PlaceIndex {
    state: RwLock<Option<Arc<GazetteerState>>>,
    init_lock: tokio::sync::Mutex<()>,
    lookups: AtomicU64,
    hits: AtomicU64,
}

impl Default for PlaceIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaceIndex {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(None),
            init_lock: tokio::sync::Mutex::new(()),
            lookups: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    /// Install places directly (tests, composition roots with their own
    /// data source).
    pub fn load(&self, places: Vec<Place>) {
        let state = build_state(places);
        *self.state.write().unwrap() = Some(Arc::new(state));
    }

    /// Stream the gazetteer file into memory and build the spatial index.
    ///
    /// Idempotent under concurrent invocation; a missing or unreadable file
    /// leaves the engine usable but empty rather than failing. Cancellation
    /// is cooperative (checked between record batches) and surfaced as its
    /// own status.
    pub async fn initialize(&self, path: &Path, cancel: &CancellationToken) -> InitStatus {
        let _guard = self.init_lock.lock().await;
        if self.is_initialized() {
            return InitStatus::Ready;
        }
        if cancel.is_cancelled() {
            return InitStatus::Canceled;
        }

        let owned = path.to_owned();
        let token = cancel.clone();
        let parse_task = tokio::task::spawn_blocking(move || {
            let file = File::open(&owned)?;
            Ok::<_, std::io::Error>(reader::read_records(BufReader::new(file), &token))
        });
        let result = tokio::select! {
            _ = cancel.cancelled() => return InitStatus::Canceled,
            r = parse_task => r,
        };

        match result {
            Ok(Ok(Some(GazetteerSummary { places, skipped }))) => {
                info!(
                    places = places.len(),
                    skipped,
                    "gazetteer loaded from {}",
                    path.display()
                );
                let state = build_state(places);
                *self.state.write().unwrap() = Some(Arc::new(state));
                InitStatus::Ready
            }
            Ok(Ok(None)) => InitStatus::Canceled,
            Ok(Err(err)) => {
                warn!("gazetteer {} unreadable: {err}", path.display());
                InitStatus::Unavailable
            }
            Err(err) => {
                warn!("gazetteer load task failed: {err}");
                InitStatus::Unavailable
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().unwrap().is_some()
    }

    pub fn place_count(&self) -> usize {
        self.state
            .read()
            .unwrap()
            .as_ref()
            .map_or(0, |s| s.places.len())
    }

    /// Find the place with minimum great-circle distance among those passing
    /// the filters, or `None` when no place qualifies.
    ///
    /// `country_filter` restricts matches to one country code (so a caller
    /// can avoid a geographically closer place on the wrong side of a
    /// border); `cities_only` restricts to city-class places. Among
    /// equidistant places the higher population wins, then the
    /// lexicographically smaller name, so repeated identical lookups return
    /// identical results.
    pub fn find_nearest(
        &self,
        lat: f64,
        lon: f64,
        country_filter: Option<&str>,
        cities_only: bool,
    ) -> Option<Place> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let state = self.state.read().unwrap().clone()?;
        if !lat.is_finite() || !lon.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return None;
        }
        let lon = normalize_longitude(lon);
        let query = unit_vector(lat, lon);

        let mut best: Option<(f64, &Place)> = None;
        for (geom, dist_sq) in state.tree.nearest_neighbor_iter_with_distance_2(&query) {
            if let Some((best_sq, _)) = best {
                if dist_sq > best_sq + TIE_EPSILON {
                    break;
                }
            }
            let place = &state.places[geom.data];
            if cities_only && !place.is_city() {
                continue;
            }
            if let Some(code) = country_filter {
                if place.country_code != code {
                    continue;
                }
            }
            best = match best {
                None => Some((dist_sq, place)),
                Some((best_sq, current)) if prefer(place, current) => Some((best_sq, place)),
                keep => keep,
            };
        }

        let (_, place) = best?;
        self.hits.fetch_add(1, Ordering::Relaxed);
        debug!(
            name = %place.name,
            distance_km = haversine_km(lat, lon, place.lat, place.lon),
            "nearest place"
        );
        Some(place.clone())
    }

    /// Map the unrestricted nearest place into a `LocationData`.
    pub fn reverse_geocode(&self, lat: f64, lon: f64) -> Option<LocationData> {
        self.find_nearest(lat, lon, None, false)
            .map(|place| LocationData::from_place(&place))
    }

    pub fn stats(&self) -> PlaceIndexStats {
        PlaceIndexStats {
            lookups: self.lookups.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
        }
    }
}

fn build_state(places: Vec<Place>) -> GazetteerState {
    let indexed: Vec<IndexedPlace> = places
        .iter()
        .enumerate()
        .map(|(i, place)| GeomWithData::new(unit_vector(place.lat, place.lon), i))
        .collect();
    GazetteerState {
        places,
        tree: RTree::bulk_load(indexed),
    }
}

/// Position on the unit sphere; chord distance between two such vectors is
/// monotonic with great-circle distance.
fn unit_vector(lat: f64, lon: f64) -> [f64; 3] {
    let (lat_rad, lon_rad) = (lat.to_radians(), lon.to_radians());
    [
        lat_rad.cos() * lon_rad.cos(),
        lat_rad.cos() * lon_rad.sin(),
        lat_rad.sin(),
    ]
}

/// Deterministic tie-break: population, then name.
fn prefer(candidate: &Place, current: &Place) -> bool {
    if candidate.population != current.population {
        return candidate.population > current.population;
    }
    candidate.name < current.name
}

/// Great-circle distance via the haversine formula.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FeatureClass;

    fn place(
        name: &str,
        lat: f64,
        lon: f64,
        class: FeatureClass,
        country: &str,
        population: i64,
    ) -> Place {
        Place {
            name: name.to_string(),
            lat,
            lon,
            feature_class: class,
            feature_code: String::new(),
            country_code: country.to_string(),
            admin1: String::new(),
            admin2: String::new(),
            admin3: String::new(),
            admin4: String::new(),
            population,
        }
    }

    fn sample_index() -> PlaceIndex {
        let index = PlaceIndex::new();
        index.load(vec![
            place(
                "New York",
                40.7128,
                -74.0060,
                FeatureClass::PopulatedPlace,
                "US",
                8_336_817,
            ),
            place(
                "Newark",
                40.7357,
                -74.1724,
                FeatureClass::PopulatedPlace,
                "US",
                311_549,
            ),
            place(
                "Bratislava",
                48.1486,
                17.1077,
                FeatureClass::PopulatedPlace,
                "SK",
                423_737,
            ),
            place(
                "Vienna",
                48.2082,
                16.3738,
                FeatureClass::PopulatedPlace,
                "AT",
                1_691_468,
            ),
        ]);
        index
    }

    #[test]
    fn test_find_nearest_unfiltered() {
        let index = sample_index();
        let nearest = index.find_nearest(40.73, -74.0, None, false).unwrap();
        assert_eq!(nearest.name, "New York");
        let nearest = index.find_nearest(48.15, 17.0, None, false).unwrap();
        assert_eq!(nearest.name, "Bratislava");
    }

    #[test]
    fn test_country_filter_overrides_distance() {
        let index = sample_index();
        // Vienna is closer to this point, but the filter pins SK.
        let unfiltered = index.find_nearest(48.21, 16.5, None, false).unwrap();
        assert_eq!(unfiltered.name, "Vienna");
        let filtered = index.find_nearest(48.21, 16.5, Some("SK"), false).unwrap();
        assert_eq!(filtered.name, "Bratislava");
    }

    #[test]
    fn test_country_filter_without_matches_is_none() {
        let index = sample_index();
        // Near New York, filtered to a country with no places in the data.
        assert!(index
            .find_nearest(40.7128, -74.0060, Some("DE"), false)
            .is_none());
    }

    #[test]
    fn test_cities_only_filter() {
        let index = PlaceIndex::new();
        index.load(vec![
            place("Mont Blanc", 45.8325, 6.8654, FeatureClass::Terrain, "FR", 0),
            place(
                "Chamonix",
                45.9237,
                6.8694,
                FeatureClass::PopulatedPlace,
                "FR",
                8_906,
            ),
        ]);
        let near_summit = (45.84, 6.87);
        let any = index
            .find_nearest(near_summit.0, near_summit.1, None, false)
            .unwrap();
        assert_eq!(any.name, "Mont Blanc");
        let city = index
            .find_nearest(near_summit.0, near_summit.1, None, true)
            .unwrap();
        assert_eq!(city.name, "Chamonix");
    }

    #[test]
    fn test_equidistant_tie_break() {
        let index = PlaceIndex::new();
        index.load(vec![
            place("Smallville", 10.0, 10.0, FeatureClass::PopulatedPlace, "XX", 100),
            place("Bigville", 10.0, 10.0, FeatureClass::PopulatedPlace, "XX", 9_000),
            place("Avilla", 10.0, 10.0, FeatureClass::PopulatedPlace, "XX", 9_000),
        ]);
        // Higher population wins; equal population falls back to name order.
        let nearest = index.find_nearest(10.0, 10.0, None, false).unwrap();
        assert_eq!(nearest.name, "Avilla");
    }

    #[test]
    fn test_repeated_lookups_are_identical() {
        let index = sample_index();
        let first = index.find_nearest(48.17, 16.9, None, false).unwrap();
        for _ in 0..10 {
            let again = index.find_nearest(48.17, 16.9, None, false).unwrap();
            assert_eq!(again.name, first.name);
            assert_eq!(again.country_code, first.country_code);
            assert_eq!(again.population, first.population);
        }
    }

    #[test]
    fn test_reverse_geocode_maps_location() {
        let index = sample_index();
        let location = index.reverse_geocode(48.15, 17.11).unwrap();
        assert_eq!(location.city.as_deref(), Some("Bratislava"));
        assert_eq!(location.country.as_deref(), Some("SK"));
    }

    #[test]
    fn test_empty_engine_returns_none() {
        let index = PlaceIndex::new();
        assert!(!index.is_initialized());
        assert_eq!(index.place_count(), 0);
        assert!(index.find_nearest(48.0, 17.0, None, false).is_none());
        assert!(index.reverse_geocode(48.0, 17.0).is_none());
    }

    #[test]
    fn test_adversarial_input_is_none() {
        let index = sample_index();
        assert!(index.find_nearest(f64::NAN, 17.0, None, false).is_none());
        assert!(index.find_nearest(48.0, f64::INFINITY, None, false).is_none());
        assert!(index.find_nearest(91.0, 17.0, None, false).is_none());
    }

    #[test]
    fn test_antimeridian_and_poles_resolve() {
        let index = PlaceIndex::new();
        index.load(vec![
            place("Suva", -18.1416, 178.4419, FeatureClass::PopulatedPlace, "FJ", 88_271),
            place(
                "Longyearbyen",
                78.2232,
                15.6469,
                FeatureClass::PopulatedPlace,
                "SJ",
                2_368,
            ),
        ]);
        // Just across the antimeridian from Fiji: chord geometry still finds
        // Suva rather than wrapping the long way.
        let nearest = index.find_nearest(-18.0, -179.9, None, false).unwrap();
        assert_eq!(nearest.name, "Suva");
        let nearest = index.find_nearest(90.0, 0.0, None, false).unwrap();
        assert_eq!(nearest.name, "Longyearbyen");
    }

    #[test]
    fn test_stats_count_lookups_and_hits() {
        let index = sample_index();
        index.find_nearest(40.73, -74.0, None, false);
        index.find_nearest(40.73, -74.0, Some("DE"), false);
        let stats = index.stats();
        assert_eq!(stats.lookups, 2);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_haversine_known_distance() {
        // Vienna to Bratislava is roughly 55 km.
        let d = haversine_km(48.2082, 16.3738, 48.1486, 17.1077);
        assert!((d - 55.0).abs() < 3.0, "got {d}");
    }

    #[tokio::test]
    async fn test_initialize_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("places.txt");
        std::fs::write(
            &path,
            "3060972\tBratislava\tBratislava\t\t48.14816\t17.10674\tP\tPPLC\tSK\t\t02\t102\t\t\t423737\t\t160\tEurope/Bratislava\t2023-01-01\n",
        )
        .unwrap();

        let index = PlaceIndex::new();
        let cancel = CancellationToken::new();
        assert_eq!(index.initialize(&path, &cancel).await, InitStatus::Ready);
        assert!(index.is_initialized());
        assert_eq!(index.place_count(), 1);

        // Second call is a no-op.
        assert_eq!(index.initialize(&path, &cancel).await, InitStatus::Ready);
    }

    #[tokio::test]
    async fn test_initialize_missing_file_leaves_engine_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = PlaceIndex::new();
        let cancel = CancellationToken::new();
        let status = index
            .initialize(&dir.path().join("absent.txt"), &cancel)
            .await;
        assert_eq!(status, InitStatus::Unavailable);
        assert!(!index.is_initialized());
        assert!(index.find_nearest(48.0, 17.0, None, false).is_none());
    }

    #[tokio::test]
    async fn test_initialize_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("places.txt");
        std::fs::write(&path, "").unwrap();
        let index = PlaceIndex::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(index.initialize(&path, &cancel).await, InitStatus::Canceled);
        assert!(!index.is_initialized());
    }
}
