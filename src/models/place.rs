//! Gazetteer place records.

use serde::{Deserialize, Serialize};

/// Feature classification of a gazetteer record.
///
/// A closed set of variants (rather than open string matching) so the
/// city-class filter is provably complete: a place is city-class iff its
/// class is `PopulatedPlace`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureClass {
    /// Administrative region (country, state, district)
    AdminRegion,
    /// Stream, lake, other hydrographic feature
    Hydrographic,
    /// Park, area, other landscape feature
    Area,
    /// City, town, village
    PopulatedPlace,
    /// Road or railroad
    Route,
    /// Spot feature (building, farm)
    Spot,
    /// Mountain, hill, other hypsographic feature
    Terrain,
    /// Undersea feature
    Undersea,
    /// Forest, heath, other vegetation
    Vegetation,
}

impl FeatureClass {
    /// Map a gazetteer feature-class letter to its variant.
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'A' => Some(FeatureClass::AdminRegion),
            'H' => Some(FeatureClass::Hydrographic),
            'L' => Some(FeatureClass::Area),
            'P' => Some(FeatureClass::PopulatedPlace),
            'R' => Some(FeatureClass::Route),
            'S' => Some(FeatureClass::Spot),
            'T' => Some(FeatureClass::Terrain),
            'U' => Some(FeatureClass::Undersea),
            'V' => Some(FeatureClass::Vegetation),
            _ => None,
        }
    }

    pub fn code(&self) -> char {
        match self {
            FeatureClass::AdminRegion => 'A',
            FeatureClass::Hydrographic => 'H',
            FeatureClass::Area => 'L',
            FeatureClass::PopulatedPlace => 'P',
            FeatureClass::Route => 'R',
            FeatureClass::Spot => 'S',
            FeatureClass::Terrain => 'T',
            FeatureClass::Undersea => 'U',
            FeatureClass::Vegetation => 'V',
        }
    }

    /// City-class flag used by the `cities_only` lookup filter.
    pub fn is_city(&self) -> bool {
        matches!(self, FeatureClass::PopulatedPlace)
    }
}

/// A named place from the gazetteer: coordinate, name, administrative
/// hierarchy, population, feature classification.
///
/// Admin fields carry the gazetteer's values verbatim; empty strings mean
/// "not recorded" and map to `None` when a `LocationData` is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub feature_class: FeatureClass,
    pub feature_code: String,
    pub country_code: String,
    pub admin1: String,
    pub admin2: String,
    pub admin3: String,
    pub admin4: String,
    pub population: i64,
}

impl Place {
    pub fn is_city(&self) -> bool {
        self.feature_class.is_city()
    }
}
