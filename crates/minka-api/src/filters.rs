//! Filter criteria for observation queries and their parameter encoding

use chrono::NaiveDate;

use crate::error::{MinkaError, Result};
use crate::taxonomy::{QualityGrade, FILTER_TAXA};

/// Named, independently-optional filter criteria for an observation fetch
///
/// All set options compose by logical AND; the server resolves the actual
/// intersection. Only `taxon` and `grade` are validated locally (closed
/// enumerations); everything else is passed through.
///
/// ```
/// use minka_api::ObservationFilters;
///
/// let filters = ObservationFilters::new()
///     .with_taxon("fungi")
///     .with_year(2018)
///     .with_num_max(500);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ObservationFilters {
    /// Full-text search term
    pub query: Option<String>,
    /// Restrict to one project by id
    pub id_project: Option<i64>,
    /// Restrict to one project by name (resolved through project search)
    pub project_name: Option<String>,
    /// Restrict to exactly one observation
    pub id_obs: Option<i64>,
    /// Restrict to one contributor's login
    pub user: Option<String>,
    /// Restrict to one iconic taxon (validated against the fixed list)
    pub taxon: Option<String>,
    /// Restrict to one taxonomy node
    pub taxon_id: Option<i64>,
    /// Restrict to one place by id
    pub place_id: Option<i64>,
    /// Restrict to places matching a name (resolved through place search)
    pub place_name: Option<String>,
    /// Restrict to one observation calendar year
    pub year: Option<i32>,
    /// Inclusive lower observation-date bound
    pub starts_on: Option<NaiveDate>,
    /// Inclusive upper observation-date bound
    pub ends_on: Option<NaiveDate>,
    /// Exact upload date
    pub created_on: Option<NaiveDate>,
    /// Inclusive lower upload-date bound
    pub created_d1: Option<NaiveDate>,
    /// Inclusive upper upload-date bound
    pub created_d2: Option<NaiveDate>,
    /// Quality grade: `research`, `casual` or `needs_id`
    pub grade: Option<String>,
    /// Exclusive lower id bound, for manual range splitting
    pub id_above: Option<i64>,
    /// Exclusive upper id bound, for manual range splitting
    pub id_below: Option<i64>,
    /// Cap on the total number of records returned
    pub num_max: Option<usize>,
}

impl ObservationFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_id_project(mut self, id: i64) -> Self {
        self.id_project = Some(id);
        self
    }

    pub fn with_project_name(mut self, name: impl Into<String>) -> Self {
        self.project_name = Some(name.into());
        self
    }

    pub fn with_id_obs(mut self, id: i64) -> Self {
        self.id_obs = Some(id);
        self
    }

    pub fn with_user(mut self, login: impl Into<String>) -> Self {
        self.user = Some(login.into());
        self
    }

    pub fn with_taxon(mut self, taxon: impl Into<String>) -> Self {
        self.taxon = Some(taxon.into());
        self
    }

    pub fn with_taxon_id(mut self, id: i64) -> Self {
        self.taxon_id = Some(id);
        self
    }

    pub fn with_place_id(mut self, id: i64) -> Self {
        self.place_id = Some(id);
        self
    }

    pub fn with_place_name(mut self, name: impl Into<String>) -> Self {
        self.place_name = Some(name.into());
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_starts_on(mut self, date: NaiveDate) -> Self {
        self.starts_on = Some(date);
        self
    }

    pub fn with_ends_on(mut self, date: NaiveDate) -> Self {
        self.ends_on = Some(date);
        self
    }

    pub fn with_created_on(mut self, date: NaiveDate) -> Self {
        self.created_on = Some(date);
        self
    }

    pub fn with_created_d1(mut self, date: NaiveDate) -> Self {
        self.created_d1 = Some(date);
        self
    }

    pub fn with_created_d2(mut self, date: NaiveDate) -> Self {
        self.created_d2 = Some(date);
        self
    }

    pub fn with_grade(mut self, grade: impl Into<String>) -> Self {
        self.grade = Some(grade.into());
        self
    }

    pub fn with_id_above(mut self, id: i64) -> Self {
        self.id_above = Some(id);
        self
    }

    pub fn with_id_below(mut self, id: i64) -> Self {
        self.id_below = Some(id);
        self
    }

    pub fn with_num_max(mut self, num_max: usize) -> Self {
        self.num_max = Some(num_max);
        self
    }

    /// Endpoint path for these filters, assuming `project_name` has
    /// already been resolved to `id_project`
    pub(crate) fn endpoint(&self) -> String {
        if let Some(id) = self.id_project {
            format!("observations/project/{}.json", id)
        } else if let Some(id) = self.id_obs {
            format!("observations/{}.json", id)
        } else if let Some(user) = &self.user {
            format!("observations/{}.json", user)
        } else {
            "observations.json".to_string()
        }
    }

    /// Ordered query parameters implied by the set options
    ///
    /// Fails with [`MinkaError::InvalidFilter`] on a bad `taxon` or `grade`
    /// value, before any request is issued. Emits exactly the keys implied
    /// by the non-absent options, nothing else.
    pub(crate) fn query_params(&self) -> Result<Vec<(String, String)>> {
        let mut params = Vec::new();
        if let Some(query) = &self.query {
            // the API expects the search term quoted
            params.push(("q".to_string(), format!("\"{}\"", query)));
        }
        if let Some(taxon) = &self.taxon {
            params.push(("iconic_taxa".to_string(), canonical_taxon(taxon)?));
        }
        if let Some(place_id) = self.place_id {
            params.push(("place_id".to_string(), place_id.to_string()));
        }
        if let Some(year) = self.year {
            params.push(("year".to_string(), year.to_string()));
        }
        if let Some(taxon_id) = self.taxon_id {
            params.push(("taxon_id".to_string(), taxon_id.to_string()));
        }
        if let Some(grade) = &self.grade {
            params.push(("quality_grade".to_string(), canonical_grade(grade)?));
        }
        if let Some(date) = self.starts_on {
            params.push(("d1".to_string(), date.to_string()));
        }
        if let Some(date) = self.ends_on {
            params.push(("d2".to_string(), date.to_string()));
        }
        if let Some(date) = self.created_on {
            params.push(("created_on".to_string(), date.to_string()));
        }
        if let Some(date) = self.created_d1 {
            params.push(("created_d1".to_string(), date.to_string()));
        }
        if let Some(date) = self.created_d2 {
            params.push(("created_d2".to_string(), date.to_string()));
        }
        if let Some(id) = self.id_above {
            params.push(("id_above".to_string(), id.to_string()));
        }
        if let Some(id) = self.id_below {
            params.push(("id_below".to_string(), id.to_string()));
        }
        Ok(params)
    }
}

/// Match a taxon filter value against the fixed list, case-insensitively,
/// returning the API's canonical spelling
fn canonical_taxon(taxon: &str) -> Result<String> {
    FILTER_TAXA
        .iter()
        .find(|t| t.eq_ignore_ascii_case(taxon.trim()))
        .map(|t| t.to_string())
        .ok_or_else(|| {
            MinkaError::InvalidFilter(format!("'{}' is not a recognized iconic taxon", taxon))
        })
}

fn canonical_grade(grade: &str) -> Result<String> {
    QualityGrade::FILTER_GRADES
        .iter()
        .find(|g| g.eq_ignore_ascii_case(grade.trim()))
        .map(|g| g.to_string())
        .ok_or_else(|| {
            MinkaError::InvalidFilter(format!(
                "'{}' is not a quality grade (expected research, casual or needs_id)",
                grade
            ))
        })
}
