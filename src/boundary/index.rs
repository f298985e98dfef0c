//! Country-resolution service: polygon tests behind a geohash cache and a
//! border-cell map.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use hashbrown::HashMap;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::store::{self, StoreError};
use crate::geometry::{normalize_longitude, CountryBoundary};
use crate::{geohash, InitStatus};

/// Geohash precision for cache keys. Precision 5 cells are roughly 5 km
/// across, small enough that most cells lie entirely within one country.
pub const CACHE_PRECISION: usize = 5;

/// Outcome of a country resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CountryLookup {
    /// Resolved country code, when exactly one country matched.
    pub country: Option<String>,
    /// No country's territory contains the point.
    pub is_ocean: bool,
    /// The point's cell straddles more than one country.
    pub is_border: bool,
    /// Candidate codes for a border-area point, uncommitted.
    pub candidates: Option<Vec<String>>,
}

impl CountryLookup {
    fn resolved(code: String) -> Self {
        Self {
            country: Some(code),
            ..Self::default()
        }
    }

    fn ocean() -> Self {
        Self {
            is_ocean: true,
            ..Self::default()
        }
    }

    fn border(candidates: Vec<String>) -> Self {
        if candidates.is_empty() {
            Self {
                is_border: true,
                is_ocean: true,
                ..Self::default()
            }
        } else {
            Self {
                is_border: true,
                candidates: Some(candidates),
                ..Self::default()
            }
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.country.is_some()
    }
}

/// Counter snapshot for the index's lookup paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BoundaryIndexStats {
    pub cache_hits: u64,
    pub border_hits: u64,
    pub full_tests: u64,
}

/// Both cell maps live under one lock so a cell is always in at most one of
/// them, including mid-reclassification.
#[derive(Default)]
struct CellCaches {
    resolved: HashMap<String, String>,
    border: HashMap<String, Vec<String>>,
}

/// Boundary index: loaded country boundaries plus the geohash→country cache
/// and border-cell map, safe for unbounded concurrent lookups.
pub struct BoundaryIndex {
    countries: RwLock<Option<Arc<Vec<CountryBoundary>>>>,
    cells: RwLock<CellCaches>,
    init_lock: tokio::sync::Mutex<()>,
    cache_hits: AtomicU64,
    border_hits: AtomicU64,
    full_tests: AtomicU64,
}

impl Default for BoundaryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl BoundaryIndex {
    pub fn new() -> Self {
        Self {
            countries: RwLock::new(None),
            cells: RwLock::new(CellCaches::default()),
            init_lock: tokio::sync::Mutex::new(()),
            cache_hits: AtomicU64::new(0),
            border_hits: AtomicU64::new(0),
            full_tests: AtomicU64::new(0),
        }
    }

    /// Install boundaries directly (tests, composition roots that build
    /// polygons themselves). Resets both cell maps.
    pub fn load(&self, countries: Vec<CountryBoundary>) {
        let mut cells = self.cells.write().unwrap();
        *cells = CellCaches::default();
        *self.countries.write().unwrap() = Some(Arc::new(countries));
    }

    /// Load boundaries and warm caches from a `.geobounds` container.
    ///
    /// Idempotent under concurrent invocation: calls are serialized, and a
    /// call after a successful load returns `Ready` without re-reading the
    /// file. A missing or malformed file leaves the index in the
    /// not-initialized state (callers fall back to non-boundary geocoding)
    /// rather than failing. Cancellation is surfaced as its own status.
    pub async fn initialize(&self, path: &Path, cancel: &CancellationToken) -> InitStatus {
        let _guard = self.init_lock.lock().await;
        if self.is_initialized() {
            return InitStatus::Ready;
        }
        if cancel.is_cancelled() {
            return InitStatus::Canceled;
        }

        let owned = path.to_owned();
        let read_task = tokio::task::spawn_blocking(move || store::read(&owned));
        let result = tokio::select! {
            _ = cancel.cancelled() => return InitStatus::Canceled,
            r = read_task => r,
        };

        match result {
            Ok(Ok(file)) => {
                info!(
                    countries = file.countries.len(),
                    cached_cells = file.geohash_cache.len(),
                    border_cells = file.border_cells.len(),
                    "boundary index initialized from {}",
                    path.display()
                );
                {
                    let mut cells = self.cells.write().unwrap();
                    cells.resolved = file.geohash_cache;
                    cells.border = file.border_cells;
                }
                *self.countries.write().unwrap() = Some(Arc::new(file.countries));
                InitStatus::Ready
            }
            Ok(Err(StoreError::Format(reason))) => {
                warn!("boundary container {} is invalid: {reason}", path.display());
                InitStatus::Unavailable
            }
            Ok(Err(StoreError::Io(err))) => {
                warn!("boundary container {} unreadable: {err}", path.display());
                InitStatus::Unavailable
            }
            Err(err) => {
                warn!("boundary load task failed: {err}");
                InitStatus::Unavailable
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.countries.read().unwrap().is_some()
    }

    pub fn country_count(&self) -> usize {
        self.countries
            .read()
            .unwrap()
            .as_ref()
            .map_or(0, |c| c.len())
    }

    /// Resolve the country containing a point.
    ///
    /// Known border cells always run the full polygon test and report every
    /// matching country as candidates. Other cells hit the single-country
    /// cache when possible; a miss runs the full test and caches only an
    /// unambiguous single match. Ocean results are never cached, so later
    /// data improvements can still claim the cell.
    pub fn lookup(&self, lat: f64, lon: f64) -> CountryLookup {
        let Some(countries) = self.snapshot() else {
            return CountryLookup::default();
        };
        if !lat.is_finite() || !lon.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return CountryLookup::default();
        }
        let lon = normalize_longitude(lon);
        let Ok(hash) = geohash::encode(lat, lon, CACHE_PRECISION) else {
            return CountryLookup::default();
        };

        {
            let cells = self.cells.read().unwrap();
            if cells.border.contains_key(&hash) {
                drop(cells);
                self.border_hits.fetch_add(1, Ordering::Relaxed);
                let matches = scan(&countries, lat, lon);
                debug!(cell = %hash, candidates = matches.len(), "border cell lookup");
                return CountryLookup::border(matches);
            }
            if let Some(code) = cells.resolved.get(&hash) {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                return CountryLookup::resolved(code.clone());
            }
        }

        self.full_tests.fetch_add(1, Ordering::Relaxed);
        let mut matches = scan(&countries, lat, lon);
        match matches.len() {
            0 => CountryLookup::ocean(),
            1 => {
                let code = matches.remove(0);
                self.commit_single(&hash, &code);
                CountryLookup::resolved(code)
            }
            _ => {
                let mut cells = self.cells.write().unwrap();
                cells.resolved.remove(&hash);
                cells.border.entry(hash).or_insert_with(|| matches.clone());
                drop(cells);
                CountryLookup::border(matches)
            }
        }
    }

    /// Whether `code`'s territory contains the point, independent of cache
    /// state.
    pub fn is_in_country(&self, lat: f64, lon: f64, code: &str) -> bool {
        let Some(countries) = self.snapshot() else {
            return false;
        };
        if !lat.is_finite() || !lon.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return false;
        }
        let lon = normalize_longitude(lon);
        countries
            .iter()
            .find(|c| c.code() == code)
            .map_or(false, |c| c.contains(lat, lon))
    }

    /// Raw candidate set for a point, bypassing both cell maps. Useful to a
    /// caller that applies its own tie-break.
    pub fn candidate_countries(&self, lat: f64, lon: f64) -> Vec<String> {
        let Some(countries) = self.snapshot() else {
            return Vec::new();
        };
        if !lat.is_finite() || !lon.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Vec::new();
        }
        scan(&countries, lat, normalize_longitude(lon))
    }

    /// Write boundaries and the current cache state back to a container for
    /// reuse by a later run.
    pub fn persist(&self, path: &Path) -> Result<(), StoreError> {
        let countries = self.snapshot().unwrap_or_default();
        let cells = self.cells.read().unwrap();
        store::write(path, &countries, &cells.resolved, &cells.border)
    }

    pub fn stats(&self) -> BoundaryIndexStats {
        BoundaryIndexStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            border_hits: self.border_hits.load(Ordering::Relaxed),
            full_tests: self.full_tests.load(Ordering::Relaxed),
        }
    }

    fn snapshot(&self) -> Option<Arc<Vec<CountryBoundary>>> {
        self.countries.read().unwrap().clone()
    }

    /// Record a single-country resolution for a cell. If another resolver
    /// already cached a different country for the same cell, the cell is
    /// permanently reclassified as a border cell holding both codes.
    fn commit_single(&self, hash: &str, code: &str) {
        let mut cells = self.cells.write().unwrap();
        if cells.border.contains_key(hash) {
            return;
        }
        match cells.resolved.get(hash) {
            Some(existing) if existing.as_str() != code => {
                let candidates = vec![existing.clone(), code.to_string()];
                debug!(cell = %hash, "conflicting cache entries, reclassifying as border cell");
                cells.resolved.remove(hash);
                cells.border.insert(hash.to_string(), candidates);
            }
            _ => {
                cells.resolved.insert(hash.to_string(), code.to_string());
            }
        }
    }
}

fn scan(countries: &[CountryBoundary], lat: f64, lon: f64) -> Vec<String> {
    countries
        .iter()
        .filter(|c| c.contains(lat, lon))
        .map(|c| c.code().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{GeoPoint, Polygon, PolygonRing};

    fn rect(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Polygon {
        Polygon::new(
            PolygonRing::exterior(vec![
                GeoPoint::new(min_lat, min_lon),
                GeoPoint::new(min_lat, max_lon),
                GeoPoint::new(max_lat, max_lon),
                GeoPoint::new(max_lat, min_lon),
            ]),
            vec![],
        )
    }

    fn central_europe() -> Vec<CountryBoundary> {
        let slovakia = CountryBoundary::new(
            "SK",
            "Slovakia",
            Some("SVK".into()),
            vec![rect(47.7, 16.8, 49.6, 22.6)],
        );
        // Slanted northeastern border keeps Bratislava outside.
        let austria = CountryBoundary::new(
            "AT",
            "Austria",
            Some("AUT".into()),
            vec![Polygon::new(
                PolygonRing::exterior(vec![
                    GeoPoint::new(46.4, 9.5),
                    GeoPoint::new(46.4, 17.2),
                    GeoPoint::new(48.0, 17.2),
                    GeoPoint::new(49.0, 16.0),
                    GeoPoint::new(49.0, 9.5),
                ]),
                vec![],
            )],
        );
        vec![slovakia, austria]
    }

    fn index_with(countries: Vec<CountryBoundary>) -> BoundaryIndex {
        let index = BoundaryIndex::new();
        index.load(countries);
        index
    }

    #[test]
    fn test_lookup_resolves_and_caches() {
        let index = index_with(central_europe());

        let first = index.lookup(48.1486, 17.1077);
        assert_eq!(first.country.as_deref(), Some("SK"));
        assert!(!first.is_border);
        assert_eq!(index.stats().full_tests, 1);

        // Same cell again: cache fast path, no new full test.
        let second = index.lookup(48.1486, 17.1077);
        assert_eq!(second, first);
        assert_eq!(index.stats().cache_hits, 1);
        assert_eq!(index.stats().full_tests, 1);

        let vienna = index.lookup(48.2082, 16.3738);
        assert_eq!(vienna.country.as_deref(), Some("AT"));
    }

    #[test]
    fn test_ocean_is_not_cached() {
        let index = index_with(central_europe());
        for _ in 0..3 {
            let result = index.lookup(0.0, 0.0);
            assert!(result.is_ocean);
            assert!(result.country.is_none());
        }
        // Every ocean probe re-ran the full test.
        assert_eq!(index.stats().full_tests, 3);
        assert_eq!(index.stats().cache_hits, 0);
    }

    #[test]
    fn test_overlapping_claims_become_border_cell() {
        let a = CountryBoundary::new("AA", "Alpha", None, vec![rect(0.0, 0.0, 10.0, 10.0)]);
        let b = CountryBoundary::new("BB", "Beta", None, vec![rect(5.0, 5.0, 15.0, 15.0)]);
        let index = index_with(vec![a, b]);

        let first = index.lookup(7.0, 7.0);
        assert!(first.is_border);
        assert!(first.country.is_none());
        assert_eq!(
            first.candidates.as_deref(),
            Some(&["AA".to_string(), "BB".to_string()][..])
        );

        // The cell is now permanently a border cell: the next lookup takes
        // the border path and re-derives candidates for the point.
        let second = index.lookup(7.0, 7.0);
        assert_eq!(second, first);
        assert_eq!(index.stats().border_hits, 1);
        assert_eq!(index.stats().full_tests, 1);
    }

    #[test]
    fn test_conflicting_cache_commits_reclassify() {
        let index = index_with(central_europe());
        index.commit_single("u2xyz", "SK");
        index.commit_single("u2xyz", "SK"); // same value: harmless
        index.commit_single("u2xyz", "AT"); // conflict: becomes a border cell

        let cells = index.cells.read().unwrap();
        assert!(!cells.resolved.contains_key("u2xyz"));
        assert_eq!(
            cells.border.get("u2xyz").map(Vec::len),
            Some(2),
            "conflicting cell must hold both candidates"
        );
    }

    #[test]
    fn test_border_cell_never_returns_to_cache() {
        let index = index_with(central_europe());
        {
            let mut cells = index.cells.write().unwrap();
            cells.border.insert("u2xyz".into(), vec!["SK".into(), "AT".into()]);
        }
        index.commit_single("u2xyz", "SK");
        let cells = index.cells.read().unwrap();
        assert!(cells.border.contains_key("u2xyz"));
        assert!(!cells.resolved.contains_key("u2xyz"));
    }

    #[test]
    fn test_is_in_country_ignores_cache() {
        let index = index_with(central_europe());
        assert!(index.is_in_country(48.1486, 17.1077, "SK"));
        assert!(!index.is_in_country(48.1486, 17.1077, "AT"));
        assert!(!index.is_in_country(48.1486, 17.1077, "XX"));
    }

    #[test]
    fn test_candidate_countries() {
        let a = CountryBoundary::new("AA", "Alpha", None, vec![rect(0.0, 0.0, 10.0, 10.0)]);
        let b = CountryBoundary::new("BB", "Beta", None, vec![rect(5.0, 5.0, 15.0, 15.0)]);
        let index = index_with(vec![a, b]);

        assert_eq!(index.candidate_countries(7.0, 7.0).len(), 2);
        assert_eq!(index.candidate_countries(2.0, 2.0), vec!["AA".to_string()]);
        assert!(index.candidate_countries(20.0, 20.0).is_empty());
    }

    #[test]
    fn test_adversarial_input_is_null() {
        let index = index_with(central_europe());
        for (lat, lon) in [
            (f64::NAN, 17.0),
            (48.0, f64::NAN),
            (f64::INFINITY, 17.0),
            (91.0, 17.0),
            (-91.0, 17.0),
        ] {
            let result = index.lookup(lat, lon);
            assert!(result.country.is_none());
            assert!(!result.is_ocean);
            assert!(!index.is_in_country(lat, lon, "SK"));
            assert!(index.candidate_countries(lat, lon).is_empty());
        }
    }

    #[test]
    fn test_uninitialized_lookup_is_null() {
        let index = BoundaryIndex::new();
        assert!(!index.is_initialized());
        let result = index.lookup(48.1486, 17.1077);
        assert!(result.country.is_none());
        assert!(!result.is_ocean);
    }

    #[tokio::test]
    async fn test_initialize_from_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("europe.geobounds");
        store::write(&path, &central_europe(), &HashMap::new(), &HashMap::new()).unwrap();

        let index = BoundaryIndex::new();
        let cancel = CancellationToken::new();
        assert_eq!(index.initialize(&path, &cancel).await, InitStatus::Ready);
        assert!(index.is_initialized());
        assert_eq!(index.country_count(), 2);
        assert_eq!(
            index.lookup(48.1486, 17.1077).country.as_deref(),
            Some("SK")
        );

        // Second call is a no-op.
        assert_eq!(index.initialize(&path, &cancel).await, InitStatus::Ready);
    }

    #[tokio::test]
    async fn test_initialize_missing_or_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();

        let index = BoundaryIndex::new();
        let status = index
            .initialize(&dir.path().join("absent.geobounds"), &cancel)
            .await;
        assert_eq!(status, InitStatus::Unavailable);
        assert!(!index.is_initialized());

        let bad = dir.path().join("bad.geobounds");
        std::fs::write(&bad, b"definitely not a container").unwrap();
        let status = index.initialize(&bad, &cancel).await;
        assert_eq!(status, InitStatus::Unavailable);
        assert!(!index.is_initialized());
    }

    #[tokio::test]
    async fn test_initialize_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("europe.geobounds");
        store::write(&path, &central_europe(), &HashMap::new(), &HashMap::new()).unwrap();

        let index = BoundaryIndex::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(index.initialize(&path, &cancel).await, InitStatus::Canceled);
        assert!(!index.is_initialized());
    }

    #[test]
    fn test_persist_round_trips_cache_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warm.geobounds");
        let index = index_with(central_europe());
        index.lookup(48.1486, 17.1077); // warms one cache cell
        index.persist(&path).unwrap();

        let file = store::read(&path).unwrap();
        assert_eq!(file.countries.len(), 2);
        assert_eq!(file.geohash_cache.len(), 1);
        assert!(file.geohash_cache.values().all(|code| code == "SK"));
    }

    #[test]
    fn test_concurrent_lookups() {
        let index = Arc::new(index_with(central_europe()));
        let mut handles = Vec::new();
        for i in 0..8 {
            let index = Arc::clone(&index);
            handles.push(std::thread::spawn(move || {
                for j in 0..200 {
                    let lat = 47.8 + (i as f64) * 0.01 + (j as f64) * 0.0001;
                    let _ = index.lookup(lat, 17.0 + (j % 10) as f64 * 0.1);
                    let _ = index.lookup(0.0, 0.0);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(index.stats().full_tests > 0);
    }
}
