//! Base-32 geohash codec.
//!
//! Encodes coordinates to fixed-precision cell identifiers via
//! interleaved-bit quantization. The codec knows nothing about country
//! geometry; it exists as a cheap deterministic spatial bucketing key for the
//! boundary index cache and gazetteer clustering.

use thiserror::Error;

use crate::geometry::{clamp_latitude, normalize_longitude, GeoPoint};

pub const MIN_PRECISION: usize = 1;
pub const MAX_PRECISION: usize = 12;

/// Standard geohash alphabet (base 32, excludes a/i/l/o).
const ALPHABET: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeohashError {
    #[error("geohash precision must be in {MIN_PRECISION}..={MAX_PRECISION}, got {0}")]
    InvalidPrecision(usize),

    #[error("invalid geohash string {0:?}")]
    InvalidHash(String),
}

/// Encode a coordinate as a geohash of `precision` characters.
///
/// Precision outside [1, 12] is an input-validation error. Coordinates are
/// clamped/wrapped into geohash range first so out-of-range input still maps
/// to a well-formed key; non-finite input produces a deterministic (if
/// meaningless) cell rather than an error, matching the lookup contract.
pub fn encode(lat: f64, lon: f64, precision: usize) -> Result<String, GeohashError> {
    if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
        return Err(GeohashError::InvalidPrecision(precision));
    }
    let lat = clamp_latitude(lat);
    let lon = normalize_longitude(lon);

    let mut lat_range = (-90.0_f64, 90.0_f64);
    let mut lon_range = (-180.0_f64, 180.0_f64);
    let mut hash = String::with_capacity(precision);
    let mut bits = 0u8;
    let mut current = 0usize;
    let mut even = true; // longitude bit first

    while hash.len() < precision {
        let (range, value) = if even {
            (&mut lon_range, lon)
        } else {
            (&mut lat_range, lat)
        };
        let mid = (range.0 + range.1) / 2.0;
        current <<= 1;
        if value >= mid {
            current |= 1;
            range.0 = mid;
        } else {
            range.1 = mid;
        }
        even = !even;
        bits += 1;
        if bits == 5 {
            hash.push(ALPHABET[current] as char);
            bits = 0;
            current = 0;
        }
    }
    Ok(hash)
}

/// Decode a geohash to the coordinate at the center of its cell.
pub fn decode_center(hash: &str) -> Result<GeoPoint, GeohashError> {
    if hash.is_empty() || hash.len() > MAX_PRECISION {
        return Err(GeohashError::InvalidHash(hash.to_string()));
    }

    let mut lat_range = (-90.0_f64, 90.0_f64);
    let mut lon_range = (-180.0_f64, 180.0_f64);
    let mut even = true;

    for byte in hash.bytes() {
        let index = ALPHABET
            .iter()
            .position(|&c| c == byte)
            .ok_or_else(|| GeohashError::InvalidHash(hash.to_string()))?;
        for shift in (0..5).rev() {
            let range = if even { &mut lon_range } else { &mut lat_range };
            let mid = (range.0 + range.1) / 2.0;
            if (index >> shift) & 1 == 1 {
                range.0 = mid;
            } else {
                range.1 = mid;
            }
            even = !even;
        }
    }

    Ok(GeoPoint::new(
        (lat_range.0 + lat_range.1) / 2.0,
        (lon_range.0 + lon_range.1) / 2.0,
    ))
}
