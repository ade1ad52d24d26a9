//! HTTP query parameters of `GET /datasets`.
//!
//! Filter parameters use a field path as key and `<comparator>=<value>` as
//! value, e.g. `/properties/dcat:theme/items=in=theme:natuur,theme:water`.

use once_cell::sync::Lazy;
use regex::Regex;

use dcatd_core::{Comparator, Error, FieldFilter, FieldPath, Result, SearchQuery};

static FILTER_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:/properties/[^/=~<>]+(?:/items)?)+$").unwrap());

static FILTER_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^(in|eq|gt|lt|ge|le)=(.*)$").unwrap());

pub const PARAM_QUERY: &str = "q";
pub const PARAM_LIMIT: &str = "limit";
pub const PARAM_OFFSET: &str = "offset";
pub const PARAM_FACET: &str = "facet";
pub const PARAM_SORT: &str = "sort";
pub const PARAM_LANG: &str = "lang";

/// Parsed listing/search request, before defaults are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchParams {
    pub text: String,
    pub filters: Vec<FieldFilter>,
    pub facets: Vec<FieldPath>,
    pub sort: Option<FieldPath>,
    pub limit: Option<u64>,
    pub offset: u64,
    pub lang: Option<String>,
}

impl SearchParams {
    /// Parse decoded `(key, value)` pairs in request order.
    ///
    /// Unknown keys are ignored. The first `q`, `limit`, `offset`, `sort`
    /// and `lang` win; `facet` may repeat.
    pub fn from_pairs<K, V>(pairs: &[(K, V)]) -> Result<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut params = SearchParams::default();
        let mut seen_text = false;
        let mut seen_limit = false;
        let mut seen_offset = false;

        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                PARAM_QUERY if !seen_text => {
                    params.text = value.trim().to_string();
                    seen_text = true;
                }
                PARAM_LIMIT if !seen_limit => {
                    params.limit = Some(parse_count(PARAM_LIMIT, value)?);
                    seen_limit = true;
                }
                PARAM_OFFSET if !seen_offset => {
                    params.offset = parse_count(PARAM_OFFSET, value)?;
                    seen_offset = true;
                }
                PARAM_FACET => {
                    let path = FieldPath::parse(value).map_err(|_| {
                        Error::InvalidFilter(format!("Invalid facet path '{}'", value))
                    })?;
                    if !params.facets.contains(&path) {
                        params.facets.push(path);
                    }
                }
                PARAM_SORT if params.sort.is_none() => {
                    params.sort = Some(FieldPath::parse(value).map_err(|_| {
                        Error::InvalidFilter(format!("Invalid sort path '{}'", value))
                    })?);
                }
                PARAM_LANG if params.lang.is_none() => {
                    let lang = value.trim();
                    if !lang.is_empty() {
                        params.lang = Some(lang.to_lowercase());
                    }
                }
                _ if FILTER_KEY.is_match(key) => {
                    let filter = parse_filter(key, value)?;
                    if params
                        .filters
                        .iter()
                        .any(|f| f.path == filter.path && f.comparator == filter.comparator)
                    {
                        return Err(Error::InvalidFilter(format!(
                            "Multiple facet filters for facet {} with comparator {}",
                            key,
                            filter.comparator.as_str()
                        )));
                    }
                    params.filters.push(filter);
                }
                _ => {}
            }
        }
        Ok(params)
    }

    /// Backend query with the sort path defaulted and paging as requested.
    pub fn to_query(&self, default_sort: &FieldPath) -> SearchQuery {
        SearchQuery {
            text: self.text.clone(),
            filters: self.filters.clone(),
            sort: self.sort.clone().unwrap_or_else(|| default_sort.clone()),
            limit: self.limit,
            offset: self.offset,
            lang: self.lang.clone(),
        }
    }
}

fn parse_count(name: &str, value: &str) -> Result<u64> {
    value.trim().parse::<u64>().map_err(|_| {
        Error::InvalidInput(format!(
            "Query parameter '{}' must be a non-negative integer, got '{}'",
            name, value
        ))
    })
}

fn parse_filter(key: &str, value: &str) -> Result<FieldFilter> {
    let captures = FILTER_VALUE.captures(value).ok_or_else(|| {
        Error::InvalidFilter(format!("Unknown comparator in query parameter '{}'", key))
    })?;
    let comparator = Comparator::parse(&captures[1])?;
    let operand = &captures[2];
    let values = if comparator == Comparator::In {
        decode_csv_record(operand).ok_or_else(|| {
            Error::InvalidFilter(format!(
                "Value of query parameter '{}' is not a CSV encoded list of strings; see RFC4180",
                key
            ))
        })?
    } else {
        vec![operand.to_string()]
    };
    Ok(FieldFilter::new(FieldPath::parse(key)?, comparator, values))
}

/// Decode one RFC 4180 record into its distinct fields, in order.
///
/// An empty input is an empty record. Line breaks are not allowed, quoted
/// or not.
pub fn decode_csv_record(line: &str) -> Option<Vec<String>> {
    if line.is_empty() {
        return Some(Vec::new());
    }
    if line.contains(['\r', '\n']) {
        return None;
    }

    let mut fields: Vec<String> = Vec::new();
    let mut chars = line.chars().peekable();
    loop {
        let mut field = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            loop {
                match chars.next() {
                    Some('"') if chars.peek() == Some(&'"') => {
                        chars.next();
                        field.push('"');
                    }
                    Some('"') => break,
                    Some(c) => field.push(c),
                    None => return None,
                }
            }
            match chars.next() {
                Some(',') => {
                    push_distinct(&mut fields, field);
                    continue;
                }
                None => {
                    push_distinct(&mut fields, field);
                    return Some(fields);
                }
                Some(_) => return None,
            }
        }
        loop {
            match chars.next() {
                Some(',') => break,
                Some('"') => return None,
                Some(c) => field.push(c),
                None => {
                    push_distinct(&mut fields, field);
                    return Some(fields);
                }
            }
        }
        push_distinct(&mut fields, field);
    }
}

fn push_distinct(fields: &mut Vec<String>, field: String) {
    if !fields.contains(&field) {
        fields.push(field);
    }
}
