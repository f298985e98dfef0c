//! Streaming parser for the flat, line-oriented gazetteer.
//!
//! One place per tab-separated line: id, name, ascii name, alternate names,
//! latitude, longitude, feature class, feature code, country code, cc2,
//! admin1-4, population, elevation, dem, timezone, modification date.
//! Malformed lines are skipped and counted, never fatal.

use std::io::Read;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::models::{FeatureClass, Place};

/// Column positions in a gazetteer record.
const COL_NAME: usize = 1;
const COL_LAT: usize = 4;
const COL_LON: usize = 5;
const COL_FEATURE_CLASS: usize = 6;
const COL_FEATURE_CODE: usize = 7;
const COL_COUNTRY: usize = 8;
const COL_ADMIN1: usize = 10;
const COL_ADMIN4: usize = 13;
const COL_POPULATION: usize = 14;

/// How many records to parse between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 4096;

pub struct GazetteerSummary {
    pub places: Vec<Place>,
    pub skipped: usize,
}

/// Parse gazetteer records from a reader. Returns `None` when canceled.
pub fn read_records<R: Read>(
    reader: R,
    cancel: &CancellationToken,
) -> Option<GazetteerSummary> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .comment(Some(b'#'))
        .from_reader(reader);

    let mut places = Vec::new();
    let mut skipped = 0usize;
    let mut seen = 0usize;

    for result in csv_reader.records() {
        seen += 1;
        if seen % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return None;
        }
        match result {
            Ok(record) => match parse_record(&record) {
                Some(place) => places.push(place),
                None => skipped += 1,
            },
            Err(_) => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!(skipped, parsed = places.len(), "gazetteer lines skipped");
    }
    Some(GazetteerSummary { places, skipped })
}

fn parse_record(record: &csv::StringRecord) -> Option<Place> {
    if record.len() <= COL_POPULATION {
        return None;
    }

    let name = record.get(COL_NAME)?.trim();
    if name.is_empty() {
        return None;
    }

    let lat: f64 = record.get(COL_LAT)?.trim().parse().ok()?;
    let lon: f64 = record.get(COL_LON)?.trim().parse().ok()?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return None;
    }

    let class_field = record.get(COL_FEATURE_CLASS)?.trim();
    let feature_class = FeatureClass::from_code(class_field.chars().next()?)?;

    let population = record
        .get(COL_POPULATION)
        .and_then(|p| p.trim().parse::<i64>().ok())
        .unwrap_or(0);

    let admin: Vec<String> = (COL_ADMIN1..=COL_ADMIN4)
        .map(|i| record.get(i).unwrap_or("").trim().to_string())
        .collect();

    Some(Place {
        name: name.to_string(),
        lat,
        lon,
        feature_class,
        feature_code: record.get(COL_FEATURE_CODE).unwrap_or("").trim().to_string(),
        country_code: record.get(COL_COUNTRY).unwrap_or("").trim().to_string(),
        admin1: admin[0].clone(),
        admin2: admin[1].clone(),
        admin3: admin[2].clone(),
        admin4: admin[3].clone(),
        population,
    })
}
