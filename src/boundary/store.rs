//! Binary container for boundary data and the warm lookup caches.
//!
//! Recomputing boundary polygons and warming the geohash cache from raw
//! geographic source data is expensive; this format makes startup a flat,
//! pre-validated load. One file holds three sections, written and read as a
//! unit: the ordered country list (quantized ring points), the
//! geohash→country cache, and the border-cell→candidates map.

use std::fs;
use std::io::Write;
use std::path::Path;

use hashbrown::HashMap;
use thiserror::Error;
use tracing::info;

use crate::geometry::{CountryBoundary, GeoPoint, Polygon, PolygonRing};

/// Conventional extension for boundary container files.
pub const BOUNDARY_FILE_EXTENSION: &str = "geobounds";

/// File signature; bump the trailing digit on layout changes.
const MAGIC: &[u8; 8] = b"MERIDGB1";

/// Container errors. `Format` is distinct from `Io` so a caller can decide to
/// regenerate the file from source data instead of treating the failure as
/// transient.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not a boundary container: {0}")]
    Format(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Deserialized contents of a boundary container.
#[derive(Debug, Default)]
pub struct BoundaryFile {
    pub countries: Vec<CountryBoundary>,
    pub geohash_cache: HashMap<String, String>,
    pub border_cells: HashMap<String, Vec<String>>,
}

/// Write boundaries and cache state to `path`, atomically: the container is
/// staged in a temp file beside the destination and renamed into place.
pub fn write(
    path: &Path,
    countries: &[CountryBoundary],
    geohash_cache: &HashMap<String, String>,
    border_cells: &HashMap<String, Vec<String>>,
) -> Result<(), StoreError> {
    let mut buf = Vec::new();
    buf.extend_from_slice(MAGIC);

    put_u32(&mut buf, countries.len() as u32);
    for country in countries {
        put_string(&mut buf, country.code());
        put_string(&mut buf, country.name());
        match country.alpha3() {
            Some(alpha3) => {
                buf.push(1);
                put_string(&mut buf, alpha3);
            }
            None => buf.push(0),
        }
        put_u32(&mut buf, country.polygons().len() as u32);
        for polygon in country.polygons() {
            put_u32(&mut buf, 1 + polygon.holes().len() as u32);
            put_ring(&mut buf, polygon.exterior());
            for hole in polygon.holes() {
                put_ring(&mut buf, hole);
            }
        }
    }

    put_u32(&mut buf, geohash_cache.len() as u32);
    for (hash, code) in geohash_cache {
        put_string(&mut buf, hash);
        put_string(&mut buf, code);
    }

    put_u32(&mut buf, border_cells.len() as u32);
    for (hash, candidates) in border_cells {
        put_string(&mut buf, hash);
        put_u32(&mut buf, candidates.len() as u32);
        for code in candidates {
            put_string(&mut buf, code);
        }
    }

    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let tmp = match dir {
        Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
        None => tempfile::NamedTempFile::new()?,
    };
    tmp.as_file().write_all(&buf)?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;

    info!(
        countries = countries.len(),
        cached_cells = geohash_cache.len(),
        border_cells = border_cells.len(),
        bytes = buf.len(),
        "wrote boundary container"
    );
    Ok(())
}

/// Read a boundary container. Open/read failures are `Io`; any signature or
/// layout mismatch is `Format`.
pub fn read(path: &Path) -> Result<BoundaryFile, StoreError> {
    let buf = fs::read(path)?;
    let mut r = Reader::new(&buf);

    let magic = r.take(MAGIC.len())?;
    if magic != MAGIC {
        return Err(StoreError::Format("bad signature".to_string()));
    }

    let country_count = r.u32()?;
    let mut countries = Vec::with_capacity(r.capped(country_count)?);
    for _ in 0..country_count {
        let code = r.string()?;
        let name = r.string()?;
        let alpha3 = match r.u8()? {
            0 => None,
            1 => Some(r.string()?),
            v => return Err(StoreError::Format(format!("bad alpha-3 marker {v}"))),
        };
        let polygon_count = r.u32()?;
        let mut polygons = Vec::with_capacity(r.capped(polygon_count)?);
        for _ in 0..polygon_count {
            let ring_count = r.u32()?;
            if ring_count == 0 {
                return Err(StoreError::Format("polygon with no rings".to_string()));
            }
            let exterior = r.ring(false)?;
            let mut holes = Vec::with_capacity(r.capped(ring_count - 1)?);
            for _ in 1..ring_count {
                holes.push(r.ring(true)?);
            }
            polygons.push(Polygon::new(exterior, holes));
        }
        countries.push(CountryBoundary::new(code, name, alpha3, polygons));
    }

    let cache_count = r.u32()?;
    let mut geohash_cache = HashMap::with_capacity(r.capped(cache_count)?);
    for _ in 0..cache_count {
        let hash = r.string()?;
        let code = r.string()?;
        geohash_cache.insert(hash, code);
    }

    let border_count = r.u32()?;
    let mut border_cells = HashMap::with_capacity(r.capped(border_count)?);
    for _ in 0..border_count {
        let hash = r.string()?;
        let candidate_count = r.u32()?;
        let mut candidates = Vec::with_capacity(r.capped(candidate_count)?);
        for _ in 0..candidate_count {
            candidates.push(r.string()?);
        }
        border_cells.insert(hash, candidates);
    }

    if !r.done() {
        return Err(StoreError::Format("trailing data".to_string()));
    }

    Ok(BoundaryFile {
        countries,
        geohash_cache,
        border_cells,
    })
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_string(buf: &mut Vec<u8>, s: &str) {
    put_u32(buf, s.len() as u32);
    buf.extend_from_slice(s.as_bytes());
}

fn put_ring(buf: &mut Vec<u8>, ring: &PolygonRing) {
    put_u32(buf, ring.points().len() as u32);
    for point in ring.points() {
        let (lat, lon) = point.to_quantized();
        buf.extend_from_slice(&lat.to_le_bytes());
        buf.extend_from_slice(&lon.to_le_bytes());
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], StoreError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| StoreError::Format("truncated".to_string()))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, StoreError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, StoreError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn i16(&mut self) -> Result<i16, StoreError> {
        let bytes = self.take(2)?;
        Ok(i16::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn string(&mut self) -> Result<String, StoreError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| StoreError::Format("invalid utf-8 string".to_string()))
    }

    fn ring(&mut self, expect_hole: bool) -> Result<PolygonRing, StoreError> {
        let is_hole = match self.u8()? {
            0 => false,
            1 => true,
            v => return Err(StoreError::Format(format!("bad ring marker {v}"))),
        };
        if is_hole != expect_hole {
            return Err(StoreError::Format("ring order mismatch".to_string()));
        }
        let point_count = self.u32()? as usize;
        // Each point is 4 bytes; a count beyond the remaining bytes is corrupt.
        if point_count.saturating_mul(4) > self.buf.len() - self.pos {
            return Err(StoreError::Format("truncated ring".to_string()));
        }
        let mut points = Vec::with_capacity(point_count);
        for _ in 0..point_count {
            let lat = self.i16()?;
            let lon = self.i16()?;
            points.push(GeoPoint::from_quantized(lat, lon));
        }
        Ok(PolygonRing::new(points, is_hole))
    }

    /// Clamp a declared element count to what the remaining bytes could
    /// possibly hold, for pre-allocation only.
    fn capped(&self, declared: u32) -> Result<usize, StoreError> {
        Ok((declared as usize).min(self.buf.len() - self.pos))
    }

    fn done(&self) -> bool {
        self.pos == self.buf.len()
    }
}
