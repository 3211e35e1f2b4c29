//! Post-hoc aggregation: taxon counts and tabular flattening

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Serialize;

use crate::taxonomy::{IconicTaxon, QualityGrade};
use crate::types::Observation;

/// One observation flattened to scalar columns, photos dropped
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationRow {
    pub id: i64,
    pub created_at: Option<DateTime<FixedOffset>>,
    pub updated_at: Option<DateTime<FixedOffset>>,
    pub observed_on: Option<NaiveDate>,
    pub description: Option<String>,
    pub iconic_taxon: Option<IconicTaxon>,
    pub taxon_id: Option<i64>,
    pub taxon_name: Option<String>,
    pub taxon_rank: Option<String>,
    pub kingdom: Option<String>,
    pub phylum: Option<String>,
    pub class: Option<String>,
    pub order: Option<String>,
    pub family: Option<String>,
    pub genus: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub place_name: Option<String>,
    pub quality_grade: Option<QualityGrade>,
    pub user_id: Option<i64>,
    pub user_login: Option<String>,
    pub license: Option<String>,
    pub device: Option<String>,
    pub num_identification_agreements: Option<i64>,
    pub num_identification_disagreements: Option<i64>,
    pub photo_count: usize,
}

/// One photo with its parent observation's context, joined by `observation_id`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhotoRow {
    pub observation_id: i64,
    pub photo_id: i64,
    pub iconic_taxon: Option<IconicTaxon>,
    pub taxon_name: Option<String>,
    pub user_login: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub large_url: String,
    pub medium_url: String,
    pub small_url: String,
    pub license: Option<String>,
    pub attribution: Option<String>,
    /// Stable download file name, `{observation_id}_{photo_id}.jpg`
    pub path: String,
}

/// Count observations per iconic taxon; records without one count as unknown
pub fn count_by_taxon(observations: &[Observation]) -> BTreeMap<IconicTaxon, usize> {
    let mut counts = BTreeMap::new();
    for observation in observations {
        let taxon = observation.iconic_taxon.unwrap_or(IconicTaxon::Unknown);
        *counts.entry(taxon).or_insert(0) += 1;
    }
    counts
}

/// Flatten observations into the two correlated tabular views
///
/// Input order is preserved in both outputs; photo rows follow their
/// parent observation's position.
pub fn to_tables(observations: &[Observation]) -> (Vec<ObservationRow>, Vec<PhotoRow>) {
    let mut observation_rows = Vec::with_capacity(observations.len());
    let mut photo_rows = Vec::new();

    for obs in observations {
        observation_rows.push(ObservationRow {
            id: obs.id,
            created_at: obs.created_at,
            updated_at: obs.updated_at,
            observed_on: obs.observed_on,
            description: obs.description.clone(),
            iconic_taxon: obs.iconic_taxon,
            taxon_id: obs.taxon_id,
            taxon_name: obs.taxon_name.clone(),
            taxon_rank: obs.taxon_rank.clone(),
            kingdom: obs.kingdom.clone(),
            phylum: obs.phylum.clone(),
            class: obs.class.clone(),
            order: obs.order.clone(),
            family: obs.family.clone(),
            genus: obs.genus.clone(),
            latitude: obs.latitude,
            longitude: obs.longitude,
            place_name: obs.place_name.clone(),
            quality_grade: obs.quality_grade,
            user_id: obs.user_id,
            user_login: obs.user_login.clone(),
            license: obs.license.clone(),
            device: obs.device.clone(),
            num_identification_agreements: obs.num_identification_agreements,
            num_identification_disagreements: obs.num_identification_disagreements,
            photo_count: obs.photos.len(),
        });

        for photo in &obs.photos {
            photo_rows.push(PhotoRow {
                observation_id: obs.id,
                photo_id: photo.id,
                iconic_taxon: obs.iconic_taxon,
                taxon_name: obs.taxon_name.clone(),
                user_login: obs.user_login.clone(),
                latitude: obs.latitude,
                longitude: obs.longitude,
                large_url: photo.large_url.clone(),
                medium_url: photo.medium_url.clone(),
                small_url: photo.small_url.clone(),
                license: photo.license.clone(),
                attribution: photo.attribution.clone(),
                path: format!("{}_{}.jpg", obs.id, photo.id),
            });
        }
    }

    (observation_rows, photo_rows)
}
