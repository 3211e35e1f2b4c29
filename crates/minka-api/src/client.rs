//! Minka API HTTP client: endpoints and the paginated fetch loop

use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{FieldError, MinkaError, Result};
use crate::filters::ObservationFilters;
use crate::types::{self, Observation, Project};

/// Project selector for [`MinkaClient::get_project`]
#[derive(Debug, Clone, Copy)]
pub enum ProjectQuery<'a> {
    Id(i64),
    Name(&'a str),
}

/// Client for the Minka citizen science observation API
///
/// Page fetches are sequential blocking awaits; there is never more than
/// one request in flight. No request is retried: the first failure aborts
/// the whole fetch.
pub struct MinkaClient {
    http: reqwest::Client,
    base_url: String,
    /// Service enumeration cap; shrunk in tests
    max_results: usize,
}

impl MinkaClient {
    /// Default API base URL
    pub const DEFAULT_BASE_URL: &'static str = "https://minka-sdg.org";
    /// Environment variable overriding the base URL
    pub const BASE_URL_ENV: &'static str = "MINKA_API_URL";
    /// Provider-side page size; every page is requested at this size
    pub const PER_PAGE: usize = 200;
    /// The API stops enumerating past this many records. Callers needing
    /// more must partition the query with `id_above` / `id_below`.
    pub const MAX_RESULTS: usize = 20_000;

    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create a client with default settings (30 second timeout)
    pub fn new() -> Self {
        Self::with_base_url(Self::DEFAULT_BASE_URL)
    }

    /// Create a client against a custom base URL
    pub fn with_base_url(base_url: &str) -> Self {
        Self::with_base_url_and_timeout(base_url, Self::DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom per-request timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_base_url_and_timeout(Self::DEFAULT_BASE_URL, timeout)
    }

    /// Create a client with a custom base URL and per-request timeout
    pub fn with_base_url_and_timeout(base_url: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_results: Self::MAX_RESULTS,
        }
    }

    /// Create a client honoring the `MINKA_API_URL` override
    pub fn from_env() -> Self {
        match env::var(Self::BASE_URL_ENV) {
            Ok(url) if !url.is_empty() => Self::with_base_url(&url),
            _ => Self::new(),
        }
    }

    /// Fetch observations matching the given filters
    ///
    /// Pages through the endpoint until exhaustion, the caller's `num_max`
    /// cap, or the service enumeration cap, whichever comes first. Results
    /// keep the API's native descending-id order. `project_name` and
    /// `place_name` are resolved through their search endpoints first;
    /// with `place_name` the fetch runs once per candidate place id and
    /// the partial lists are concatenated.
    pub async fn get_observations(
        &self,
        filters: &ObservationFilters,
    ) -> Result<Vec<Observation>> {
        // validate enum filters before touching the network
        filters.query_params()?;

        let mut filters = filters.clone();

        if let Some(name) = filters.project_name.take() {
            if filters.id_project.is_none() {
                let slug = slugify(&name);
                let projects = self.get_project(ProjectQuery::Name(&slug)).await?;
                let project = projects.into_iter().next().ok_or_else(|| {
                    MinkaError::InvalidFilter(format!("no project matches name '{}'", name))
                })?;
                filters.id_project = Some(project.id);
            }
        }

        if let Some(place) = filters.place_name.take() {
            if filters.place_id.is_none() {
                let mut observations = Vec::new();
                for place_id in self.search_places(&place).await? {
                    let mut per_place = filters.clone();
                    per_place.place_id = Some(place_id);
                    observations.extend(self.fetch_pages(&per_place).await?);
                }
                return Ok(observations);
            }
        }

        self.fetch_pages(&filters).await
    }

    /// Fetch a project by id (one element) or search by name
    pub async fn get_project(&self, query: ProjectQuery<'_>) -> Result<Vec<Project>> {
        match query {
            ProjectQuery::Id(id) => {
                let url = format!("{}/projects/{}.json", self.base_url, id);
                let body = self.get_body(&url, 1).await?;
                let project = Project::from_json(&body).map_err(|errors| MinkaError::Decode {
                    page: 1,
                    item: 0,
                    errors,
                })?;
                Ok(vec![project])
            }
            ProjectQuery::Name(name) => {
                let url = format!(
                    "{}/projects/search.json?q={}",
                    self.base_url,
                    urlencoding::encode(name)
                );
                let body = self.get_body(&url, 1).await?;
                let items = expect_array(body)?;
                items
                    .iter()
                    .enumerate()
                    .map(|(item, value)| {
                        Project::from_json(value).map_err(|errors| MinkaError::Decode {
                            page: 1,
                            item,
                            errors,
                        })
                    })
                    .collect()
            }
        }
    }

    /// Total observation count per taxon, from the API's taxa sweep
    pub async fn count_by_taxon(&self) -> Result<BTreeMap<String, u64>> {
        let url = format!("{}/taxa.json", self.base_url);
        let body = self.get_body(&url, 1).await?;
        let taxa = expect_array(body)?;

        let mut counts = BTreeMap::new();
        for (item, taxon) in taxa.iter().enumerate() {
            let mut errors = Vec::new();
            let name = match taxon.get("name").filter(|v| !v.is_null()) {
                Some(v) => types::coerce_string(v, "name", &mut errors),
                None => {
                    errors.push(FieldError::new("name", "missing required field"));
                    None
                }
            };
            let count = match taxon.get("observations_count").filter(|v| !v.is_null()) {
                Some(v) => types::coerce_i64(v, "observations_count", &mut errors).unwrap_or(0),
                None => 0,
            };
            if !errors.is_empty() {
                return Err(MinkaError::Decode {
                    page: 1,
                    item,
                    errors,
                });
            }
            counts.insert(name.unwrap_or_default(), count.max(0) as u64);
        }
        Ok(counts)
    }

    /// Candidate place ids matching a place name
    pub async fn search_places(&self, name: &str) -> Result<Vec<i64>> {
        let url = format!(
            "{}/places.json?q={}",
            self.base_url,
            urlencoding::encode(name)
        );
        let body = self.get_body(&url, 1).await?;
        let places = expect_array(body)?;

        let mut ids = Vec::new();
        for (item, place) in places.iter().enumerate() {
            let mut errors = Vec::new();
            let id = match place.get("id").filter(|v| !v.is_null()) {
                Some(v) => types::coerce_i64(v, "id", &mut errors),
                None => {
                    errors.push(FieldError::new("id", "missing required field"));
                    None
                }
            };
            match id {
                Some(id) if errors.is_empty() => ids.push(id),
                _ => {
                    return Err(MinkaError::Decode {
                        page: 1,
                        item,
                        errors,
                    })
                }
            }
        }
        Ok(ids)
    }

    /// The core loop: request bounded-size pages until a stop condition
    async fn fetch_pages(&self, filters: &ObservationFilters) -> Result<Vec<Observation>> {
        let params = filters.query_params()?;
        let endpoint = filters.endpoint();
        let base_url = self.page_url(&endpoint, &params);
        let cap = filters
            .num_max
            .map_or(self.max_results, |n| n.min(self.max_results));

        let mut observations = Vec::new();
        let mut page: u32 = 1;
        loop {
            let url = if page == 1 {
                base_url.clone()
            } else {
                format!("{}&page={}", base_url, page)
            };
            let body = self.get_body(&url, page).await?;
            let items = match body {
                Value::Array(items) => items,
                // the single-observation endpoint answers with one object
                single => return Ok(vec![decode_item(&single, page, 0)?]),
            };
            let received = items.len();
            for (index, item) in items.iter().enumerate() {
                observations.push(decode_item(item, page, index)?);
            }
            debug!(
                page,
                received,
                total = observations.len(),
                "fetched observations page"
            );
            if observations.len() >= cap {
                if cap == self.max_results && filters.num_max.map_or(true, |n| n > cap) {
                    warn!(
                        limit = self.max_results,
                        "service enumeration cap reached, result truncated"
                    );
                }
                observations.truncate(cap);
                break;
            }
            if received < Self::PER_PAGE {
                break;
            }
            page += 1;
        }
        Ok(observations)
    }

    async fn get_body(&self, url: &str, page: u32) -> Result<Value> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(e, page))?;
        let status = response.status();
        if !status.is_success() {
            return Err(MinkaError::Request {
                status: status.as_u16(),
                page,
            });
        }
        response.json().await.map_err(|e| transport_error(e, page))
    }

    fn page_url(&self, endpoint: &str, params: &[(String, String)]) -> String {
        let mut parts: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect();
        parts.push(format!("per_page={}", Self::PER_PAGE));
        format!("{}/{}?{}", self.base_url, endpoint, parts.join("&"))
    }
}

impl Default for MinkaClient {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_item(value: &Value, page: u32, item: usize) -> Result<Observation> {
    Observation::from_json(value).map_err(|errors| MinkaError::Decode { page, item, errors })
}

fn expect_array(body: Value) -> Result<Vec<Value>> {
    match body {
        Value::Array(items) => Ok(items),
        _ => Err(MinkaError::Decode {
            page: 1,
            item: 0,
            errors: vec![FieldError::new("(response)", "expected a JSON array")],
        }),
    }
}

fn transport_error(err: reqwest::Error, page: u32) -> MinkaError {
    if err.is_timeout() {
        MinkaError::Timeout { page }
    } else {
        MinkaError::Http(err)
    }
}

/// Project names are matched by slug: trimmed, whitespace runs to dashes
fn slugify(name: &str) -> String {
    name.trim().split_whitespace().collect::<Vec<_>>().join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    use crate::taxonomy::IconicTaxon;

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("  urba  mar "), "urba-mar");
        assert_eq!(slugify("urbamar"), "urbamar");
    }

    #[tokio::test]
    async fn test_single_page_exhaustion_issues_one_request() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        let app = Router::new().route(
            "/observations.json",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(params.get("iconic_taxa").map(String::as_str), Some("Fungi"));
                    assert_eq!(params.get("year").map(String::as_str), Some("2018"));
                    assert_eq!(params.get("per_page").map(String::as_str), Some("200"));
                    Json(json!([
                        {"id": 313432, "iconic_taxon_id": 13, "observed_on": "2018-05-02"},
                        {"id": 313431, "iconic_taxon_id": 13, "observed_on": "2018-04-30"},
                        {"id": 313430, "iconic_taxon_id": 13, "observed_on": "2018-03-11"}
                    ]))
                }
            }),
        );
        let base = spawn(app).await;

        let client = MinkaClient::with_base_url(&base);
        let filters = ObservationFilters::new().with_taxon("fungi").with_year(2018);
        let observations = client.get_observations(&filters).await.unwrap();

        assert_eq!(observations.len(), 3);
        assert!(observations.windows(2).all(|w| w[0].id > w[1].id));
        assert!(observations
            .iter()
            .all(|o| o.iconic_taxon == Some(IconicTaxon::Fungi)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_multi_page_accumulation_stops_on_short_page() {
        let app = Router::new().route(
            "/observations.json",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                let page: i64 = params.get("page").map_or(1, |p| p.parse().unwrap());
                let items: Vec<Value> = match page {
                    1 => (0..200).map(|i| json!({"id": 500 - i})).collect(),
                    2 => (200..250).map(|i| json!({"id": 500 - i})).collect(),
                    _ => Vec::new(),
                };
                Json(Value::Array(items))
            }),
        );
        let base = spawn(app).await;

        let client = MinkaClient::with_base_url(&base);
        let observations = client
            .get_observations(&ObservationFilters::new())
            .await
            .unwrap();

        assert_eq!(observations.len(), 250);
        assert_eq!(observations[0].id, 500);
        assert_eq!(observations[249].id, 251);
        assert!(observations.windows(2).all(|w| w[0].id > w[1].id));
    }

    #[tokio::test]
    async fn test_num_max_truncates_to_highest_ids() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        let app = Router::new().route(
            "/observations.json",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    let page: i64 = params.get("page").map_or(1, |p| p.parse().unwrap());
                    let first = 10_000 - (page - 1) * 200;
                    let items: Vec<Value> = (0..200).map(|i| json!({"id": first - i})).collect();
                    Json(Value::Array(items))
                }
            }),
        );
        let base = spawn(app).await;

        let client = MinkaClient::with_base_url(&base);
        let observations = client
            .get_observations(&ObservationFilters::new().with_num_max(5))
            .await
            .unwrap();

        assert_eq!(observations.len(), 5);
        assert_eq!(
            observations.iter().map(|o| o.id).collect::<Vec<_>>(),
            vec![10_000, 9_999, 9_998, 9_997, 9_996]
        );
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_service_cap_truncates_unbounded_sweep() {
        let app = Router::new().route(
            "/observations.json",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                let page: i64 = params.get("page").map_or(1, |p| p.parse().unwrap());
                let first = 100_000 - (page - 1) * 200;
                let items: Vec<Value> = (0..200).map(|i| json!({"id": first - i})).collect();
                Json(Value::Array(items))
            }),
        );
        let base = spawn(app).await;

        let mut client = MinkaClient::with_base_url(&base);
        client.max_results = 10;
        let observations = client
            .get_observations(&ObservationFilters::new())
            .await
            .unwrap();

        assert_eq!(observations.len(), 10);
        assert_eq!(observations[0].id, 100_000);
    }

    #[tokio::test]
    async fn test_non_2xx_aborts_with_status_and_page() {
        let app = Router::new().route(
            "/observations.json",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                let page: i64 = params.get("page").map_or(1, |p| p.parse().unwrap());
                if page == 1 {
                    let items: Vec<Value> = (0..200).map(|i| json!({"id": 400 - i})).collect();
                    (StatusCode::OK, Json(Value::Array(items)))
                } else {
                    (StatusCode::BAD_GATEWAY, Json(json!({"error": "upstream"})))
                }
            }),
        );
        let base = spawn(app).await;

        let client = MinkaClient::with_base_url(&base);
        let err = client
            .get_observations(&ObservationFilters::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MinkaError::Request {
                status: 502,
                page: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_decode_failure_aborts_whole_fetch() {
        let app = Router::new().route(
            "/observations.json",
            get(|| async {
                Json(json!([
                    {"id": 44, "user_login": "zolople"},
                    {"user_login": "amxatrac"}
                ]))
            }),
        );
        let base = spawn(app).await;

        let client = MinkaClient::with_base_url(&base);
        let err = client
            .get_observations(&ObservationFilters::new())
            .await
            .unwrap_err();

        match err {
            MinkaError::Decode { page, item, errors } => {
                assert_eq!(page, 1);
                assert_eq!(item, 1);
                assert_eq!(errors[0].field, "id");
            }
            other => panic!("expected Decode error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_single_observation_endpoint_returns_one_object() {
        let app = Router::new().route(
            "/observations/2084.json",
            get(|| async {
                Json(json!({
                    "id": 2084,
                    "iconic_taxon_id": 16,
                    "latitude": "41.773743",
                    "longitude": "3.021853",
                    "quality_grade": "research",
                    "user_login": "amxatrac"
                }))
            }),
        );
        let base = spawn(app).await;

        let client = MinkaClient::with_base_url(&base);
        let observations = client
            .get_observations(&ObservationFilters::new().with_id_obs(2084))
            .await
            .unwrap();

        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].id, 2084);
        assert_eq!(observations[0].iconic_taxon, Some(IconicTaxon::Chromista));
        assert_eq!(observations[0].latitude, Some(41.773743));
    }

    #[tokio::test]
    async fn test_get_project_by_id_and_not_found() {
        let app = Router::new()
            .route(
                "/projects/806.json",
                get(|| async { Json(json!({"id": 806, "title": "Urbamar"})) }),
            )
            .route(
                "/projects/11.json",
                get(|| async { (StatusCode::NOT_FOUND, Json(json!({"error": "Not found"}))) }),
            );
        let base = spawn(app).await;

        let client = MinkaClient::with_base_url(&base);
        let projects = client.get_project(ProjectQuery::Id(806)).await.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].title, "Urbamar");

        let err = client.get_project(ProjectQuery::Id(11)).await.unwrap_err();
        assert!(matches!(
            err,
            MinkaError::Request {
                status: 404,
                page: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_get_project_by_name_returns_all_matches() {
        let app = Router::new().route(
            "/projects/search.json",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params.get("q").map(String::as_str), Some("mar"));
                Json(json!([
                    {"id": 806, "title": "urbamar"},
                    {"id": 23, "title": "ruramar"}
                ]))
            }),
        );
        let base = spawn(app).await;

        let client = MinkaClient::with_base_url(&base);
        let projects = client.get_project(ProjectQuery::Name("mar")).await.unwrap();
        assert_eq!(projects.len(), 2);
        assert_eq!(projects[0].id, 806);
        assert_eq!(projects[1].title, "ruramar");
    }

    #[tokio::test]
    async fn test_project_name_is_slugified_and_resolved() {
        let app = Router::new()
            .route(
                "/projects/search.json",
                get(|Query(params): Query<HashMap<String, String>>| async move {
                    assert_eq!(params.get("q").map(String::as_str), Some("urba-mar"));
                    Json(json!([{"id": 806, "title": "Urba Mar"}]))
                }),
            )
            .route(
                "/observations/project/806.json",
                get(|| async { Json(json!([{"id": 51}, {"id": 50}])) }),
            );
        let base = spawn(app).await;

        let client = MinkaClient::with_base_url(&base);
        let observations = client
            .get_observations(&ObservationFilters::new().with_project_name(" urba  mar "))
            .await
            .unwrap();

        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].id, 51);
    }

    #[tokio::test]
    async fn test_place_name_fans_out_over_candidate_places() {
        let app = Router::new()
            .route(
                "/places.json",
                get(|Query(params): Query<HashMap<String, String>>| async move {
                    assert_eq!(params.get("q").map(String::as_str), Some("girona"));
                    Json(json!([{"id": 1011}, {"id": 2022}]))
                }),
            )
            .route(
                "/observations.json",
                get(|Query(params): Query<HashMap<String, String>>| async move {
                    let place_id: i64 = params.get("place_id").unwrap().parse().unwrap();
                    Json(json!([{"id": place_id}]))
                }),
            );
        let base = spawn(app).await;

        let client = MinkaClient::with_base_url(&base);
        let observations = client
            .get_observations(&ObservationFilters::new().with_place_name("girona"))
            .await
            .unwrap();

        assert_eq!(
            observations.iter().map(|o| o.id).collect::<Vec<_>>(),
            vec![1011, 2022]
        );
    }

    #[tokio::test]
    async fn test_count_by_taxon_sweep() {
        let app = Router::new().route(
            "/taxa.json",
            get(|| async {
                Json(json!([
                    {"name": "Fungi", "observations_count": 5},
                    {"name": "Aves", "observations_count": 12},
                    {"name": "Chromista"}
                ]))
            }),
        );
        let base = spawn(app).await;

        let client = MinkaClient::with_base_url(&base);
        let counts = client.count_by_taxon().await.unwrap();

        assert_eq!(counts.get("Fungi"), Some(&5));
        assert_eq!(counts.get("Aves"), Some(&12));
        assert_eq!(counts.get("Chromista"), Some(&0));
    }

    #[tokio::test]
    async fn test_invalid_taxon_fails_before_any_request() {
        // nothing is listening here; reaching the network would error differently
        let client = MinkaClient::with_base_url("http://127.0.0.1:9");
        let err = client
            .get_observations(
                &ObservationFilters::new()
                    .with_taxon("dragons")
                    .with_project_name("urbamar"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MinkaError::InvalidFilter(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_distinguished_from_other_transport_errors() {
        let app = Router::new().route(
            "/observations.json",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!([]))
            }),
        );
        let base = spawn(app).await;

        let client = MinkaClient::with_base_url_and_timeout(&base, Duration::from_millis(100));
        let err = client
            .get_observations(&ObservationFilters::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MinkaError::Timeout { page: 1 }));
    }
}
