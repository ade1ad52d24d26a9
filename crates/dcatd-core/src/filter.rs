//! Field paths, filters, and the backend-neutral search query.
//!
//! Field paths address values inside a document the way a JSON schema
//! addresses them: `/properties/dcat:distribution/items/properties/dct:format`.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::{Error, Result};

static FIELD_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:/properties/[^/=~<>]+(?:/items)?)+$").unwrap());

/// One step of a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Descend into an object member.
    Property(String),
    /// Fan out over array elements.
    Items,
}

/// Parsed schema-style path into a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    raw: String,
    segments: Vec<PathSegment>,
}

impl FieldPath {
    /// Parse `/properties/<name>[/items]...`.
    pub fn parse(raw: &str) -> Result<Self> {
        if !FIELD_PATH.is_match(raw) {
            return Err(Error::InvalidFilter(format!(
                "not a field path of the form /properties/<name>[/items]: {}",
                raw
            )));
        }
        let mut segments = Vec::new();
        let mut parts = raw.split('/').skip(1);
        while let Some(part) = parts.next() {
            match part {
                "properties" => {
                    // the regex guarantees a name follows
                    let name = parts.next().unwrap_or_default();
                    segments.push(PathSegment::Property(name.to_string()));
                }
                "items" => segments.push(PathSegment::Items),
                other => {
                    return Err(Error::InvalidFilter(format!(
                        "unexpected path segment {} in {}",
                        other, raw
                    )))
                }
            }
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Property names along the path, skipping `items` steps.
    pub fn property_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                PathSegment::Property(name) => Some(name.as_str()),
                PathSegment::Items => None,
            })
            .collect()
    }

    /// Every value the path reaches in `value`.
    ///
    /// `items` steps fan out over arrays; missing members and type
    /// mismatches contribute nothing.
    pub fn extract<'a>(&self, value: &'a Value) -> Vec<&'a Value> {
        let mut out = Vec::new();
        extract_into(value, &self.segments, &mut out);
        out
    }
}

fn extract_into<'a>(value: &'a Value, segments: &[PathSegment], out: &mut Vec<&'a Value>) {
    let Some((first, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };
    match (first, value) {
        (PathSegment::Property(name), Value::Object(map)) => {
            if let Some(child) = map.get(name) {
                extract_into(child, rest, out);
            }
        }
        (PathSegment::Items, Value::Array(items)) => {
            for item in items {
                extract_into(item, rest, out);
            }
        }
        _ => {}
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Filter comparator from a `<comparator>=<value>` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Comparator {
    Eq,
    In,
    Gt,
    Lt,
    Ge,
    Le,
}

impl Comparator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparator::Eq => "eq",
            Comparator::In => "in",
            Comparator::Gt => "gt",
            Comparator::Lt => "lt",
            Comparator::Ge => "ge",
            Comparator::Le => "le",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "eq" => Ok(Comparator::Eq),
            "in" => Ok(Comparator::In),
            "gt" => Ok(Comparator::Gt),
            "lt" => Ok(Comparator::Lt),
            "ge" => Ok(Comparator::Ge),
            "le" => Ok(Comparator::Le),
            other => Err(Error::InvalidFilter(format!("unknown comparator: {}", other))),
        }
    }

    /// Whether the shipped backends evaluate this comparator.
    pub fn is_equality(&self) -> bool {
        matches!(self, Comparator::Eq | Comparator::In)
    }
}

/// A single `path comparator values` condition.
///
/// `values` holds exactly one entry for every comparator except `in`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter {
    pub path: FieldPath,
    pub comparator: Comparator,
    pub values: Vec<String>,
}

impl FieldFilter {
    pub fn new(path: FieldPath, comparator: Comparator, values: Vec<String>) -> Self {
        Self {
            path,
            comparator,
            values,
        }
    }

    /// Reject comparators a backend does not implement.
    pub fn require_equality(&self) -> Result<()> {
        if self.comparator.is_equality() {
            Ok(())
        } else {
            Err(Error::InvalidFilter(format!(
                "comparator {} is not supported for {}",
                self.comparator.as_str(),
                self.path
            )))
        }
    }

    /// In-process evaluation: some value at the path is a string equal to
    /// one of the filter values.
    pub fn matches(&self, doc: &Value) -> bool {
        self.path.extract(doc).into_iter().any(|v| match v {
            Value::String(s) => self.values.iter().any(|f| f == s),
            _ => false,
        })
    }
}

/// Backend-neutral search or listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Free text; empty means a sorted listing instead of a ranked search.
    pub text: String,
    pub filters: Vec<FieldFilter>,
    /// Listing order, descending by the value at this path.
    pub sort: FieldPath,
    pub limit: Option<u64>,
    pub offset: u64,
    /// ISO 639-1 language code.
    pub lang: Option<String>,
}

impl SearchQuery {
    pub fn new(sort: FieldPath) -> Self {
        Self {
            text: String::new(),
            filters: Vec::new(),
            sort,
            limit: None,
            offset: 0,
            lang: None,
        }
    }

    pub fn is_listing(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Copy of this query with paging removed.
    pub fn unpaged(&self) -> Self {
        Self {
            limit: None,
            offset: 0,
            ..self.clone()
        }
    }

    pub fn require_equality_filters(&self) -> Result<()> {
        self.filters.iter().try_for_each(FieldFilter::require_equality)
    }
}
