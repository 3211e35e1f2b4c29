//! Rust client for the [Minka](https://minka-sdg.org) citizen science API
//!
//! Queries the observation and project endpoints, pages through results,
//! and decodes them into typed, validated records. Read-only: the crate
//! never mutates anything on the remote side.
//!
//! # Example
//!
//! ```no_run
//! use minka_api::{MinkaClient, ObservationFilters, tables};
//!
//! # async fn example() -> Result<(), minka_api::MinkaError> {
//! let client = MinkaClient::new();
//!
//! // Fetch research-grade fungi observations from 2018, at most 500
//! let filters = ObservationFilters::new()
//!     .with_taxon("fungi")
//!     .with_year(2018)
//!     .with_grade("research")
//!     .with_num_max(500);
//! let observations = client.get_observations(&filters).await?;
//!
//! // Flatten into one row per observation and one row per photo
//! let (rows, photo_rows) = tables::to_tables(&observations);
//! println!("{} observations, {} photos", rows.len(), photo_rows.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Pagination
//!
//! Pages are fetched sequentially at the provider's fixed page size until
//! the endpoint is exhausted, the caller's `num_max` cap is reached, or
//! the service stops enumerating (20,000 records). Results keep the API's
//! native descending-id order, so a caller can page past the service cap
//! by tightening `id_below` to the smallest id seen and fetching again.
//!
//! # Failure model
//!
//! Nothing is retried and no partial result is ever returned: the first
//! bad page or undecodable record aborts the fetch with an error carrying
//! the page (and item) where it happened.

mod client;
mod error;
mod filters;
pub mod tables;
mod taxonomy;
mod types;

pub use client::{MinkaClient, ProjectQuery};
pub use error::{FieldError, MinkaError, Result};
pub use filters::ObservationFilters;
pub use tables::{count_by_taxon, to_tables, ObservationRow, PhotoRow};
pub use taxonomy::{IconicTaxon, QualityGrade, TaxonTree, FILTER_TAXA};
pub use types::{Observation, Photo, Project};
