//! # dcatd-search
//!
//! Search and listing for the dcatd catalog.
//!
//! This crate provides:
//! - Parsing of `GET /datasets` query parameters into a backend query
//! - Facet tallies over the full result set
//! - Paging over backend result streams
//!
//! ## Example
//!
//! ```ignore
//! use dcatd_search::{SearchEngine, SearchParams};
//!
//! let engine = SearchEngine::new(hooks, default_sort);
//! let params = SearchParams::from_pairs(&[("q", "bomen"), ("facet", "/properties/dcat:theme/items")])?;
//! let page = engine.collect(&params).await?;
//! ```

pub mod engine;
pub mod facets;
pub mod params;

pub use engine::{ResultInfo, SearchEngine, SearchItem, SearchPage, SearchStream};
pub use facets::{facet_value, FacetTally};
pub use params::{decode_csv_record, SearchParams};
