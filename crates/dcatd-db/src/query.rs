//! Translation of [`SearchQuery`] into PostgreSQL text and parameters.
//!
//! Filters become `doc @> $n::jsonb` containment tests and sort paths become
//! `doc #>> $n` with a `text[]` parameter, so no client-supplied value is
//! ever spliced into SQL text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use dcatd_core::{logging, Error, FieldPath, PathSegment, Result, SearchQuery};

/// Characters with meaning in `to_tsquery` input.
static TSQUERY_SPECIAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\\/.,'"|&:()*!<>;\[\]{}]"#).unwrap());

/// Weighted tsvector built from four text parameters starting at `$first`.
pub fn search_vector(first: usize) -> String {
    format!(
        "setweight(to_tsvector('simple', ${a}), 'A') || \
         setweight(to_tsvector('simple', ${b}), 'B') || \
         setweight(to_tsvector('simple', ${c}), 'C') || \
         setweight(to_tsvector('simple', ${d}), 'D')",
        a = first,
        b = first + 1,
        c = first + 2,
        d = first + 3
    )
}

/// Text search configurations shipped with PostgreSQL, by ISO 639-1 code.
const PG_DICTIONARIES: &[(&str, &str)] = &[
    ("da", "danish"),
    ("de", "german"),
    ("en", "english"),
    ("es", "spanish"),
    ("fi", "finnish"),
    ("fr", "french"),
    ("hu", "hungarian"),
    ("it", "italian"),
    ("nb", "norwegian"),
    ("nl", "dutch"),
    ("no", "norwegian"),
    ("pt", "portuguese"),
    ("ro", "romanian"),
    ("ru", "russian"),
    ("sv", "swedish"),
    ("tr", "turkish"),
];

/// Map an ISO 639-1 code to a text search configuration.
///
/// `None` and unknown codes map to `simple`.
pub fn pg_dictionary(iso_639_1: Option<&str>) -> &'static str {
    let Some(code) = iso_639_1 else {
        return "simple";
    };
    match PG_DICTIONARIES.iter().find(|(c, _)| c.eq_ignore_ascii_case(code)) {
        Some((_, dictionary)) => dictionary,
        None => {
            tracing::warn!(
                subsystem = logging::SUBSYSTEM_DATABASE,
                component = "query",
                lang = code,
                "Unknown ISO 639-1 language code, using the simple dictionary"
            );
            "simple"
        }
    }
}

/// Split free text into words safe for `to_tsquery`.
pub fn query_words(text: &str) -> Vec<String> {
    TSQUERY_SPECIAL
        .replace_all(text, " ")
        .split_whitespace()
        .map(str::to_lowercase)
        .collect()
}

/// `w1:* & w2:*`: every word as a prefix.
pub fn prefix_tsquery(words: &[String]) -> String {
    words
        .iter()
        .map(|w| format!("{}:*", w))
        .collect::<Vec<_>>()
        .join(" & ")
}

/// `w1 & w2`: every word in full.
pub fn fullmatch_tsquery(words: &[String]) -> String {
    words.join(" & ")
}

/// JSON document that `doc @> _` tests for `value` at `path`.
///
/// `/properties/a/items/properties/b` with `x` becomes `{"a": [{"b": "x"}]}`.
pub fn containment_document(path: &FieldPath, value: &str) -> Value {
    path.segments()
        .iter()
        .rev()
        .fold(Value::String(value.to_string()), |inner, segment| match segment {
            PathSegment::Items => Value::Array(vec![inner]),
            PathSegment::Property(name) => {
                let mut map = Map::new();
                map.insert(name.clone(), inner);
                Value::Object(map)
            }
        })
}

/// Sort path as the `text[]` operand of `#>>`. Arrays cannot be sorted on.
pub fn sort_keys(path: &FieldPath) -> Result<Vec<String>> {
    if path.segments().contains(&PathSegment::Items) {
        return Err(Error::InvalidFilter(format!(
            "cannot sort on a path through an array: {}",
            path
        )));
    }
    Ok(path.property_names().into_iter().map(str::to_string).collect())
}

/// A WHERE fragment (` AND ...` per filter) and its jsonb parameters,
/// numbered from `$first`.
pub fn filter_clause(query: &SearchQuery, first: usize) -> Result<(String, Vec<Value>)> {
    query.require_equality_filters()?;
    let mut sql = String::new();
    let mut params = Vec::new();
    for filter in &query.filters {
        if filter.values.is_empty() {
            // `in` with an empty set matches nothing
            sql.push_str(" AND FALSE");
            continue;
        }
        let alternatives: Vec<String> = filter
            .values
            .iter()
            .map(|value| {
                params.push(containment_document(&filter.path, value));
                format!("doc @> ${}::jsonb", first + params.len() - 1)
            })
            .collect();
        sql.push_str(&format!(" AND ({})", alternatives.join(" OR ")));
    }
    Ok((sql, params))
}

/// Statement text for a listing (`text` empty) or a ranked search.
///
/// Parameters: `$1` lang dictionary (listing) or prefix tsquery (search),
/// `$2` sort keys or fullmatch tsquery, `$3` limit, `$4` offset, then the
/// filter parameters.
pub fn select_statement(filters: &str, ranked: bool) -> String {
    if ranked {
        format!(
            "SELECT id, doc \
             FROM dataset, to_tsquery('simple', $1) prefix_query, to_tsquery('simple', $2) fullmatch_query \
             WHERE searchable_text @@ prefix_query{filters} \
             ORDER BY 2 * ts_rank_cd(searchable_text, fullmatch_query) \
             + ts_rank_cd(searchable_text, prefix_query) DESC, id \
             LIMIT $3 OFFSET $4",
            filters = filters
        )
    } else {
        format!(
            "SELECT id, doc \
             FROM dataset \
             WHERE ('simple' = $1 OR lang = $1){filters} \
             ORDER BY doc #>> $2 DESC NULLS LAST, id \
             LIMIT $3 OFFSET $4",
            filters = filters
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcatd_core::{Comparator, FieldFilter};
    use serde_json::json;

    fn path(raw: &str) -> FieldPath {
        FieldPath::parse(raw).unwrap()
    }

    #[test]
    fn test_search_vector_numbering() {
        let sql = search_vector(3);
        assert!(sql.contains("to_tsvector('simple', $3), 'A'"));
        assert!(sql.contains("to_tsvector('simple', $6), 'D'"));
    }

    #[test]
    fn test_query_words_strip_operators() {
        assert_eq!(
            query_words("  Bomen & (park)|kaart:* !x "),
            vec!["bomen", "park", "kaart", "x"]
        );
        assert!(query_words("&|!()").is_empty());
    }

    #[test]
    fn test_tsquery_forms() {
        let words = vec!["bomen".to_string(), "park".to_string()];
        assert_eq!(prefix_tsquery(&words), "bomen:* & park:*");
        assert_eq!(fullmatch_tsquery(&words), "bomen & park");
    }

    #[test]
    fn test_pg_dictionary() {
        assert_eq!(pg_dictionary(Some("nl")), "dutch");
        assert_eq!(pg_dictionary(Some("EN")), "english");
        assert_eq!(pg_dictionary(Some("xx")), "simple");
        assert_eq!(pg_dictionary(None), "simple");
    }

    #[test]
    fn test_containment_document_nests_items() {
        assert_eq!(
            containment_document(
                &path("/properties/dcat:distribution/items/properties/dct:format"),
                "csv"
            ),
            json!({"dcat:distribution": [{"dct:format": "csv"}]})
        );
        assert_eq!(
            containment_document(&path("/properties/dcat:theme/items"), "theme:natuur"),
            json!({"dcat:theme": ["theme:natuur"]})
        );
    }

    #[test]
    fn test_sort_keys() {
        assert_eq!(
            sort_keys(&path("/properties/foaf:isPrimaryTopicOf/properties/dct:modified")).unwrap(),
            vec!["foaf:isPrimaryTopicOf", "dct:modified"]
        );
        assert!(sort_keys(&path("/properties/a/items")).is_err());
    }

    #[test]
    fn test_filter_clause_binds_every_value() {
        let mut q = SearchQuery::new(path("/properties/x"));
        q.filters.push(FieldFilter::new(
            path("/properties/color"),
            Comparator::In,
            vec!["red".into(), "blue".into()],
        ));
        q.filters.push(FieldFilter::new(
            path("/properties/shape"),
            Comparator::Eq,
            vec!["round".into()],
        ));
        let (sql, params) = filter_clause(&q, 5).unwrap();
        assert_eq!(
            sql,
            " AND (doc @> $5::jsonb OR doc @> $6::jsonb) AND (doc @> $7::jsonb)"
        );
        assert_eq!(params.len(), 3);
        assert_eq!(params[2], json!({"shape": "round"}));
    }

    #[test]
    fn test_filter_clause_rejects_range_comparators() {
        let mut q = SearchQuery::new(path("/properties/x"));
        q.filters.push(FieldFilter::new(
            path("/properties/n"),
            Comparator::Ge,
            vec!["3".into()],
        ));
        assert!(matches!(filter_clause(&q, 1), Err(Error::InvalidFilter(_))));
    }

    #[test]
    fn test_select_statements() {
        let listing = select_statement("", false);
        assert!(listing.contains("ORDER BY doc #>> $2 DESC NULLS LAST, id"));
        let ranked = select_statement(" AND (doc @> $5::jsonb)", true);
        assert!(ranked.contains("searchable_text @@ prefix_query AND (doc @> $5::jsonb)"));
    }
}
