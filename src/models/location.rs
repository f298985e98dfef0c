//! Structured location output consumed by the path-templating layer.

use serde::{Deserialize, Serialize};

use super::place::Place;

/// Resolved political geography for a coordinate.
///
/// Fields are optional; absent values are rendered by the consuming layer
/// (typically as "Unknown"). `country` carries the gazetteer country code —
/// whether to render a code or a display name is the consumer's decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl LocationData {
    /// Map a gazetteer place onto the output fields: the place name becomes
    /// the city value, admin1/admin2/admin3 become state/county/district.
    pub fn from_place(place: &Place) -> Self {
        Self {
            district: non_empty(&place.admin3),
            city: non_empty(&place.name),
            county: non_empty(&place.admin2),
            state: non_empty(&place.admin1),
            country: non_empty(&place.country_code),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
