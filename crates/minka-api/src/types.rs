//! Record types returned by the Minka API and their JSON decoding
//!
//! Records are built exclusively from raw API payloads and are never
//! mutated afterwards. Decoding is lenient about representation (the API
//! serves numbers-as-strings and booleans-as-strings in places) but strict
//! about required fields: a failed record reports every bad field at once
//! instead of stopping at the first one.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::FieldError;
use crate::taxonomy::{IconicTaxon, QualityGrade};

/// One user-submitted sighting
///
/// `id` is always present; every other scalar stays `None` when the API
/// omits it, so "not returned" is distinguishable from "empty".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Observation {
    pub id: i64,
    pub captive: Option<bool>,
    pub created_at: Option<DateTime<FixedOffset>>,
    pub updated_at: Option<DateTime<FixedOffset>>,
    pub observed_on: Option<NaiveDate>,
    pub time_observed_at: Option<DateTime<FixedOffset>>,
    pub description: Option<String>,
    pub iconic_taxon: Option<IconicTaxon>,
    pub taxon_id: Option<i64>,
    pub taxon_name: Option<String>,
    pub taxon_rank: Option<String>,
    /// Slash-separated ancestor id path, root first
    pub taxon_ancestry: Option<String>,
    pub kingdom: Option<String>,
    pub phylum: Option<String>,
    pub class: Option<String>,
    pub order: Option<String>,
    pub family: Option<String>,
    pub genus: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub obscured: Option<bool>,
    pub place_name: Option<String>,
    pub quality_grade: Option<QualityGrade>,
    pub user_id: Option<i64>,
    pub user_login: Option<String>,
    pub license: Option<String>,
    pub device: Option<String>,
    pub identifications_count: Option<i64>,
    pub num_identification_agreements: Option<i64>,
    pub num_identification_disagreements: Option<i64>,
    pub photos: Vec<Photo>,
}

/// One image attached to an observation; all three sizes are required
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Photo {
    pub id: i64,
    pub large_url: String,
    pub medium_url: String,
    pub small_url: String,
    pub license: Option<String>,
    pub attribution: Option<String>,
}

/// A named collection of observations, possibly nested
///
/// Hierarchy is by reference: a project carries its parent and children
/// ids, never their data.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Project {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub created_at: Option<DateTime<FixedOffset>>,
    pub updated_at: Option<DateTime<FixedOffset>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub parent_id: Option<i64>,
    pub children_id: Vec<i64>,
    pub user_id: Option<i64>,
    pub icon_url: Option<String>,
    pub observed_taxa_count: Option<i64>,
}

impl Observation {
    /// Decode one raw observation object
    ///
    /// On failure returns every field that was missing-while-required or
    /// failed coercion.
    pub fn from_json(value: &Value) -> Result<Self, Vec<FieldError>> {
        let Some(map) = value.as_object() else {
            return Err(vec![FieldError::new("(record)", "expected a JSON object")]);
        };
        let mut errs = Vec::new();

        let id = req_i64(map, "id", &mut errs);
        let captive = opt_bool(map, "captive", &mut errs);
        let created_at = opt_datetime(map, "created_at", &mut errs);
        let updated_at = opt_datetime(map, "updated_at", &mut errs);
        let observed_on = opt_date(map, "observed_on", &mut errs);
        let time_observed_at = opt_datetime(map, "time_observed_at", &mut errs);
        let description = opt_string(map, "description", &mut errs).map(|s| collapse_newlines(&s));
        let iconic_taxon = opt_i64(map, "iconic_taxon_id", &mut errs).map(IconicTaxon::from_id);

        let mut taxon_id = opt_i64(map, "taxon_id", &mut errs);
        let mut taxon_name = opt_string(map, "taxon_name", &mut errs);
        let mut taxon_rank = opt_string(map, "taxon_rank", &mut errs);
        let mut taxon_ancestry = opt_string(map, "taxon_ancestry", &mut errs);
        if let Some(taxon) = non_null(map, "taxon").and_then(Value::as_object) {
            if let Some(v) = non_null(taxon, "id") {
                taxon_id = coerce_i64(v, "taxon.id", &mut errs);
            }
            if let Some(v) = non_null(taxon, "name") {
                taxon_name = coerce_string(v, "taxon.name", &mut errs);
            }
            if let Some(v) = non_null(taxon, "rank") {
                taxon_rank = coerce_string(v, "taxon.rank", &mut errs);
            }
            if let Some(v) = non_null(taxon, "ancestry") {
                taxon_ancestry = coerce_string(v, "taxon.ancestry", &mut errs);
            }
        }

        let latitude = opt_f64(map, "latitude", &mut errs);
        let longitude = opt_f64(map, "longitude", &mut errs);
        let obscured = opt_bool(map, "obscured", &mut errs);
        let place_name = opt_string(map, "place_guess", &mut errs)
            .map(|s| collapse_newlines(&s).trim().to_string());
        let quality_grade =
            opt_string(map, "quality_grade", &mut errs).map(|s| QualityGrade::from_api(&s));
        let user_id = opt_i64(map, "user_id", &mut errs);
        let user_login = opt_string(map, "user_login", &mut errs);
        let license = match opt_string(map, "license", &mut errs) {
            Some(l) => Some(l),
            None => opt_string(map, "license_obs", &mut errs),
        };
        let device = opt_string(map, "device", &mut errs);
        let identifications_count = opt_i64(map, "identifications_count", &mut errs);
        let num_identification_agreements =
            opt_i64(map, "num_identification_agreements", &mut errs);
        let num_identification_disagreements =
            opt_i64(map, "num_identification_disagreements", &mut errs);
        let photos = decode_photos(map, &mut errs);

        if !errs.is_empty() {
            return Err(errs);
        }
        Ok(Self {
            id: id.unwrap_or_default(),
            captive,
            created_at,
            updated_at,
            observed_on,
            time_observed_at,
            description,
            iconic_taxon,
            taxon_id,
            taxon_name,
            taxon_rank,
            taxon_ancestry,
            kingdom: None,
            phylum: None,
            class: None,
            order: None,
            family: None,
            genus: None,
            latitude,
            longitude,
            obscured,
            place_name,
            quality_grade,
            user_id,
            user_login,
            license,
            device,
            identifications_count,
            num_identification_agreements,
            num_identification_disagreements,
            photos,
        })
    }
}

impl Project {
    /// Decode one raw project object
    pub fn from_json(value: &Value) -> Result<Self, Vec<FieldError>> {
        let Some(map) = value.as_object() else {
            return Err(vec![FieldError::new("(record)", "expected a JSON object")]);
        };
        let mut errs = Vec::new();

        let id = req_i64(map, "id", &mut errs);
        let title = req_string(map, "title", &mut errs);
        if let Some(t) = &title {
            if t.is_empty() {
                errs.push(FieldError::new("title", "must be non-empty"));
            }
        }
        let description = opt_string(map, "description", &mut errs);
        let created_at = opt_datetime(map, "created_at", &mut errs);
        let updated_at = opt_datetime(map, "updated_at", &mut errs);
        let latitude = opt_f64(map, "latitude", &mut errs);
        let longitude = opt_f64(map, "longitude", &mut errs);
        let parent_id = opt_i64(map, "parent_id", &mut errs);
        let children_id = decode_children(map, &mut errs);
        let user_id = opt_i64(map, "user_id", &mut errs);
        let icon_url = opt_string(map, "icon_url", &mut errs);
        let observed_taxa_count = opt_i64(map, "observed_taxa_count", &mut errs);

        if !errs.is_empty() {
            return Err(errs);
        }
        Ok(Self {
            id: id.unwrap_or_default(),
            title: title.unwrap_or_default(),
            description,
            created_at,
            updated_at,
            latitude,
            longitude,
            parent_id,
            children_id,
            user_id,
            icon_url,
            observed_taxa_count,
        })
    }
}

/// Child project ids come either as a plain `children_id` id array or as a
/// `children` array of project objects
fn decode_children(map: &Map<String, Value>, errs: &mut Vec<FieldError>) -> Vec<i64> {
    if let Some(items) = non_null(map, "children_id").and_then(Value::as_array) {
        return items
            .iter()
            .enumerate()
            .filter_map(|(i, v)| coerce_i64(v, &format!("children_id[{}]", i), errs))
            .collect();
    }
    if let Some(items) = non_null(map, "children").and_then(Value::as_array) {
        return items
            .iter()
            .enumerate()
            .filter_map(|(i, v)| {
                let label = format!("children[{}].id", i);
                match v.as_object().and_then(|m| non_null(m, "id")) {
                    Some(id) => coerce_i64(id, &label, errs),
                    None => {
                        errs.push(FieldError::new(label, "missing required field"));
                        None
                    }
                }
            })
            .collect();
    }
    Vec::new()
}

/// Photos come in two shapes: a flat `photos` array carrying the URLs
/// directly, or an `observation_photos` array nesting them under `photo`.
/// The nested shape wins when both are present.
fn decode_photos(map: &Map<String, Value>, errs: &mut Vec<FieldError>) -> Vec<Photo> {
    if let Some(items) = non_null(map, "observation_photos").and_then(Value::as_array) {
        return items
            .iter()
            .enumerate()
            .filter_map(|(i, v)| decode_nested_photo(v, i, errs))
            .collect();
    }
    if let Some(items) = non_null(map, "photos").and_then(Value::as_array) {
        return items
            .iter()
            .enumerate()
            .filter_map(|(i, v)| decode_flat_photo(v, i, errs))
            .collect();
    }
    Vec::new()
}

fn decode_flat_photo(value: &Value, index: usize, errs: &mut Vec<FieldError>) -> Option<Photo> {
    let label = |f: &str| format!("photos[{}].{}", index, f);
    let Some(map) = value.as_object() else {
        errs.push(FieldError::new(
            format!("photos[{}]", index),
            "expected a JSON object",
        ));
        return None;
    };
    let before = errs.len();
    let id = req_field_i64(map, "id", &label("id"), errs);
    let large_url = req_field_string(map, "large_url", &label("large_url"), errs);
    let medium_url = req_field_string(map, "medium_url", &label("medium_url"), errs);
    let small_url = req_field_string(map, "small_url", &label("small_url"), errs);
    let license = match non_null(map, "license_photo") {
        Some(v) => coerce_string(v, &label("license_photo"), errs),
        None => non_null(map, "license").and_then(|v| coerce_string(v, &label("license"), errs)),
    };
    let attribution =
        non_null(map, "attribution").and_then(|v| coerce_string(v, &label("attribution"), errs));
    if errs.len() > before {
        return None;
    }
    Some(Photo {
        id: id.unwrap_or_default(),
        large_url: large_url.unwrap_or_default(),
        medium_url: medium_url.unwrap_or_default(),
        small_url: small_url.unwrap_or_default(),
        license,
        attribution,
    })
}

fn decode_nested_photo(value: &Value, index: usize, errs: &mut Vec<FieldError>) -> Option<Photo> {
    let label = |f: &str| format!("observation_photos[{}].{}", index, f);
    let Some(map) = value.as_object() else {
        errs.push(FieldError::new(
            format!("observation_photos[{}]", index),
            "expected a JSON object",
        ));
        return None;
    };
    let before = errs.len();
    let id = req_field_i64(map, "id", &label("id"), errs);
    let Some(photo) = non_null(map, "photo").and_then(Value::as_object) else {
        errs.push(FieldError::new(label("photo"), "missing required field"));
        return None;
    };
    let large_url = req_field_string(photo, "large_url", &label("photo.large_url"), errs);
    let medium_url = req_field_string(photo, "medium_url", &label("photo.medium_url"), errs);
    let small_url = req_field_string(photo, "small_url", &label("photo.small_url"), errs);
    let license = match non_null(photo, "license_photo") {
        Some(v) => coerce_string(v, &label("photo.license_photo"), errs),
        None => {
            non_null(photo, "license").and_then(|v| coerce_string(v, &label("photo.license"), errs))
        }
    };
    let attribution = non_null(photo, "attribution")
        .and_then(|v| coerce_string(v, &label("photo.attribution"), errs));
    if errs.len() > before {
        return None;
    }
    Some(Photo {
        id: id.unwrap_or_default(),
        large_url: large_url.unwrap_or_default(),
        medium_url: medium_url.unwrap_or_default(),
        small_url: small_url.unwrap_or_default(),
        license,
        attribution,
    })
}

/// The API embeds literal CR/LF pairs in free-text fields
fn collapse_newlines(s: &str) -> String {
    s.replace("\r\n", " ")
}

fn non_null<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|v| !v.is_null())
}

pub(crate) fn coerce_i64(value: &Value, label: &str, errs: &mut Vec<FieldError>) -> Option<i64> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(v) => Some(v),
            None => {
                errs.push(FieldError::new(label, format!("not an integer: {}", n)));
                None
            }
        },
        Value::String(s) => match s.trim().parse::<i64>() {
            Ok(v) => Some(v),
            Err(_) => {
                errs.push(FieldError::new(label, format!("not an integer: '{}'", s)));
                None
            }
        },
        other => {
            errs.push(FieldError::new(
                label,
                format!("expected an integer, got {}", type_name(other)),
            ));
            None
        }
    }
}

fn coerce_f64(value: &Value, label: &str, errs: &mut Vec<FieldError>) -> Option<f64> {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(v) => Some(v),
            None => {
                errs.push(FieldError::new(label, format!("not a number: {}", n)));
                None
            }
        },
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(v) => Some(v),
            Err(_) => {
                errs.push(FieldError::new(label, format!("not a number: '{}'", s)));
                None
            }
        },
        other => {
            errs.push(FieldError::new(
                label,
                format!("expected a number, got {}", type_name(other)),
            ));
            None
        }
    }
}

fn coerce_bool(value: &Value, label: &str, errs: &mut Vec<FieldError>) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
        other => {
            errs.push(FieldError::new(
                label,
                format!("expected a boolean, got {}", type_name(other)),
            ));
            None
        }
    }
}

pub(crate) fn coerce_string(
    value: &Value,
    label: &str,
    errs: &mut Vec<FieldError>,
) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        other => {
            errs.push(FieldError::new(
                label,
                format!("expected a string, got {}", type_name(other)),
            ));
            None
        }
    }
}

fn coerce_datetime(
    value: &Value,
    label: &str,
    errs: &mut Vec<FieldError>,
) -> Option<DateTime<FixedOffset>> {
    let s = coerce_string(value, label, errs)?;
    match DateTime::parse_from_rfc3339(&s) {
        Ok(dt) => Some(dt),
        Err(_) => {
            errs.push(FieldError::new(label, format!("not a timestamp: '{}'", s)));
            None
        }
    }
}

fn coerce_date(value: &Value, label: &str, errs: &mut Vec<FieldError>) -> Option<NaiveDate> {
    let s = coerce_string(value, label, errs)?;
    if let Ok(d) = NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
        return Some(d);
    }
    // some records carry a full timestamp where a date is expected
    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return Some(dt.date_naive());
    }
    errs.push(FieldError::new(label, format!("not a date: '{}'", s)));
    None
}

fn opt_i64(map: &Map<String, Value>, key: &str, errs: &mut Vec<FieldError>) -> Option<i64> {
    non_null(map, key).and_then(|v| coerce_i64(v, key, errs))
}

fn opt_f64(map: &Map<String, Value>, key: &str, errs: &mut Vec<FieldError>) -> Option<f64> {
    non_null(map, key).and_then(|v| coerce_f64(v, key, errs))
}

fn opt_bool(map: &Map<String, Value>, key: &str, errs: &mut Vec<FieldError>) -> Option<bool> {
    non_null(map, key).and_then(|v| coerce_bool(v, key, errs))
}

fn opt_string(map: &Map<String, Value>, key: &str, errs: &mut Vec<FieldError>) -> Option<String> {
    non_null(map, key).and_then(|v| coerce_string(v, key, errs))
}

fn opt_datetime(
    map: &Map<String, Value>,
    key: &str,
    errs: &mut Vec<FieldError>,
) -> Option<DateTime<FixedOffset>> {
    non_null(map, key).and_then(|v| coerce_datetime(v, key, errs))
}

fn opt_date(map: &Map<String, Value>, key: &str, errs: &mut Vec<FieldError>) -> Option<NaiveDate> {
    non_null(map, key).and_then(|v| coerce_date(v, key, errs))
}

fn req_i64(map: &Map<String, Value>, key: &str, errs: &mut Vec<FieldError>) -> Option<i64> {
    match non_null(map, key) {
        Some(v) => coerce_i64(v, key, errs),
        None => {
            errs.push(FieldError::new(key, "missing required field"));
            None
        }
    }
}

fn req_string(map: &Map<String, Value>, key: &str, errs: &mut Vec<FieldError>) -> Option<String> {
    match non_null(map, key) {
        Some(v) => coerce_string(v, key, errs),
        None => {
            errs.push(FieldError::new(key, "missing required field"));
            None
        }
    }
}

fn req_field_i64(
    map: &Map<String, Value>,
    key: &str,
    label: &str,
    errs: &mut Vec<FieldError>,
) -> Option<i64> {
    match non_null(map, key) {
        Some(v) => coerce_i64(v, label, errs),
        None => {
            errs.push(FieldError::new(label, "missing required field"));
            None
        }
    }
}

fn req_field_string(
    map: &Map<String, Value>,
    key: &str,
    label: &str,
    errs: &mut Vec<FieldError>,
) -> Option<String> {
    match non_null(map, key) {
        Some(v) => coerce_string(v, label, errs),
        None => {
            errs.push(FieldError::new(label, "missing required field"));
            None
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
