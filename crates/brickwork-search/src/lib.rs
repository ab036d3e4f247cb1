//! Shared geo-filtered list engine for the directory, marketplace, and
//! inspection-job browse surfaces.
//!
//! Filtering is AND-composed from three independent predicates (free-text
//! substring, exact/array-contains categoricals, haversine radius) and never
//! reorders its input; any sort is a separate explicit step.

use brickwork_core::{InspectionJob, Professional, Property, FILTER_ALL};
use serde::Serialize;

pub const CRATE_NAME: &str = "brickwork-search";

/// IUGG mean Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0088;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Great-circle distance in kilometers, symmetric and deterministic.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Value of a categorical field on an entity, as seen by the filter.
#[derive(Debug, Clone, Copy)]
pub enum FieldValue<'a> {
    Scalar(&'a str),
    Many(&'a [String]),
    Absent,
}

/// Entity browsable through the shared list engine.
pub trait Filterable {
    /// Both coordinates, or `None` when the entity is not locatable. An
    /// entity without coordinates is never distance-filtered out and never
    /// receives a distance annotation.
    fn coordinates(&self) -> Option<GeoPoint>;

    /// Free-text fields searched by case-insensitive substring.
    fn search_haystacks(&self) -> Vec<&str>;

    fn categorical(&self, field: &str) -> FieldValue<'_>;
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub text: String,
    pub categoricals: Vec<(String, String)>,
    pub center: Option<GeoPoint>,
    pub radius_km: f64,
}

impl ListFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_categorical(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.categoricals.push((field.into(), value.into()));
        self
    }

    pub fn with_center(mut self, center: GeoPoint, radius_km: f64) -> Self {
        self.center = Some(center);
        self.radius_km = radius_km;
        self
    }
}

/// A passing entity, annotated with its distance from the filter center
/// when both the center and the entity's coordinates are known.
#[derive(Debug, Clone, Serialize)]
pub struct Matched<'a, T> {
    pub entity: &'a T,
    pub distance_km: Option<f64>,
}

fn text_matches<T: Filterable>(entity: &T, needle_lower: &str) -> bool {
    if needle_lower.is_empty() {
        return true;
    }
    entity
        .search_haystacks()
        .iter()
        .any(|hay| hay.to_lowercase().contains(needle_lower))
}

fn categorical_matches<T: Filterable>(entity: &T, field: &str, wanted: &str) -> bool {
    if wanted == FILTER_ALL {
        return true;
    }
    match entity.categorical(field) {
        FieldValue::Scalar(v) => v == wanted,
        FieldValue::Many(vs) => vs.iter().any(|v| v == wanted),
        FieldValue::Absent => false,
    }
}

/// Apply the filter, preserving input order. An entity passes iff every
/// predicate holds; the location predicate is vacuously true for entities
/// without coordinates.
pub fn apply<'a, T: Filterable>(entities: &'a [T], filter: &ListFilter) -> Vec<Matched<'a, T>> {
    let needle_lower = filter.text.to_lowercase();

    entities
        .iter()
        .filter_map(|entity| {
            if !text_matches(entity, &needle_lower) {
                return None;
            }
            if !filter
                .categoricals
                .iter()
                .all(|(field, wanted)| categorical_matches(entity, field, wanted))
            {
                return None;
            }

            let distance_km = match (filter.center, entity.coordinates()) {
                (Some(center), Some(point)) => Some(haversine_km(center, point)),
                _ => None,
            };
            if filter.center.is_some() {
                if let Some(d) = distance_km {
                    if d > filter.radius_km {
                        return None;
                    }
                }
            }

            Some(Matched { entity, distance_km })
        })
        .collect()
}

/// Explicit descending sort by a per-entity key. Kept separate from
/// [`apply`] so ordering is never implied by filtering.
pub fn sort_desc_by<T, K: PartialOrd>(matches: &mut [Matched<'_, T>], key: impl Fn(&T) -> K) {
    matches.sort_by(|a, b| {
        key(b.entity)
            .partial_cmp(&key(a.entity))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

impl Filterable for Professional {
    fn coordinates(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
            _ => None,
        }
    }

    fn search_haystacks(&self) -> Vec<&str> {
        vec![&self.display_name, &self.city]
    }

    fn categorical(&self, field: &str) -> FieldValue<'_> {
        match field {
            "kind" => FieldValue::Scalar(self.kind.as_str()),
            "specialization" => FieldValue::Many(&self.specializations),
            _ => FieldValue::Absent,
        }
    }
}

impl Filterable for Property {
    fn coordinates(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
            _ => None,
        }
    }

    fn search_haystacks(&self) -> Vec<&str> {
        vec![&self.title, &self.address, &self.suburb]
    }

    fn categorical(&self, field: &str) -> FieldValue<'_> {
        match field {
            "currency" => FieldValue::Scalar(&self.currency),
            _ => FieldValue::Absent,
        }
    }
}

impl Filterable for InspectionJob {
    fn coordinates(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
            _ => None,
        }
    }

    fn search_haystacks(&self) -> Vec<&str> {
        vec![&self.property_address, &self.suburb]
    }

    fn categorical(&self, field: &str) -> FieldValue<'_> {
        match field {
            "service_type" => FieldValue::Scalar(self.service_type.as_str()),
            "status" => FieldValue::Scalar(self.status.as_str()),
            _ => FieldValue::Absent,
        }
    }
}
