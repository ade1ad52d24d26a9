//! Facet tallies: per requested field path, how often each value occurs in
//! the full result set.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use dcatd_core::{Document, FieldPath};

/// Value counts per facet path, keyed by the path as requested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FacetTally(BTreeMap<String, BTreeMap<String, u64>>);

impl FacetTally {
    /// A tally with an empty count map for every requested facet.
    pub fn new(facets: &[FieldPath]) -> Self {
        Self(
            facets
                .iter()
                .map(|f| (f.as_str().to_string(), BTreeMap::new()))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Count every value each facet path reaches in `doc`.
    pub fn add(&mut self, facets: &[FieldPath], doc: &Document) {
        let doc = Value::Object(doc.clone());
        for facet in facets {
            let counts = self.0.entry(facet.as_str().to_string()).or_default();
            for value in facet.extract(&doc) {
                *counts.entry(facet_value(value)).or_insert(0) += 1;
            }
        }
    }

    pub fn counts(&self, facet: &str) -> Option<&BTreeMap<String, u64>> {
        self.0.get(facet)
    }

    pub fn into_inner(self) -> BTreeMap<String, BTreeMap<String, u64>> {
        self.0
    }
}

/// Strings count verbatim; anything else by its JSON text.
pub fn facet_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
