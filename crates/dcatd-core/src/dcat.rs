//! DCAT-AP metadata profile used by the Amsterdam catalog.
//!
//! Canonicalization compacts full IRIs in property names to the prefixes of
//! [`CONTEXT_PREFIXES`], trims strings, normalizes line endings and drops
//! empty values. It does not run a JSON-LD processor.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::{Error, Result};
use crate::models::{Document, SearchableText};
use crate::traits::{MetadataProfile, Plugin};

pub const PROFILE_NAME: &str = "dcat-ap-ams";

/// Namespace prefixes of the profile's JSON-LD context.
pub const CONTEXT_PREFIXES: &[(&str, &str)] = &[
    ("ams", "http://datacatalogus.amsterdam.nl/"),
    ("ckan", "https://ckan.org/terms/"),
    ("class", "http://datacatalogus.amsterdam.nl/term/classification/"),
    ("dc", "http://purl.org/dc/elements/1.1/"),
    ("dcat", "http://www.w3.org/ns/dcat#"),
    ("dct", "http://purl.org/dc/terms/"),
    ("foaf", "http://xmlns.com/foaf/0.1/"),
    ("lang1", "http://id.loc.gov/vocabulary/iso639-1/"),
    ("lang2", "http://id.loc.gov/vocabulary/iso639-2/"),
    ("org", "http://datacatalogus.amsterdam.nl/term/organization/"),
    ("overheid", "http://standaarden.overheid.nl/owms/terms/"),
    ("overheidds", "http://standaarden.overheid.nl/owms/terms/ds#"),
    ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
    ("rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
    ("skos", "http://www.w3.org/2004/02/skos/core#"),
    ("theme", "http://datacatalogus.amsterdam.nl/term/theme/"),
    ("time", "http://www.w3.org/2006/time#"),
    ("vcard", "http://www.w3.org/2006/vcard/ns#"),
    ("xsd", "http://www.w3.org/2001/XMLSchema#"),
];

const TITLE: &str = "dct:title";
const DESCRIPTION: &str = "dct:description";
const KEYWORD: &str = "dcat:keyword";
const THEME: &str = "dcat:theme";
const LANGUAGE: &str = "dct:language";

/// The `dcat-ap-ams` profile.
#[derive(Debug, Default, Clone)]
pub struct DcatApProfile;

impl DcatApProfile {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Plugin for DcatApProfile {
    fn name(&self) -> &str {
        PROFILE_NAME
    }
}

impl MetadataProfile for DcatApProfile {
    fn canonicalize(&self, doc: Document) -> Result<Document> {
        match canonicalize_value(Value::Object(doc)) {
            Some(Value::Object(mut out)) => {
                out.remove("@context");
                Ok(out)
            }
            Some(_) => Err(Error::Internal(
                "canonicalization produced a non-object".to_string(),
            )),
            None => Ok(Map::new()),
        }
    }

    fn json_schema(&self) -> Value {
        json!({
            "$schema": "http://json-schema.org/draft-04/schema#",
            "type": "object",
            "properties": {
                "dct:title": {"type": "string", "title": "Titel", "pattern": "^[^\\n\\r]*?\\S[^\\n\\r]*$"},
                "dct:description": {"type": "string", "title": "Beschrijving", "format": "markdown"},
                "overheidds:doel": {"type": "string", "title": "Doel", "format": "markdown"},
                "dcat:landingPage": {"type": "string", "title": "URL voor meer informatie", "format": "uri"},
                "dcat:keyword": {"type": "array", "title": "Tags", "items": {"type": "string"}},
                "dcat:theme": {"type": "array", "title": "Thema", "items": {"type": "string", "pattern": "^theme:"}},
                "dct:language": {"type": "string", "title": "Taal", "pattern": "^(?:lang1:\\w\\w|lang2:\\w\\w\\w)$"},
                "dct:accrualPeriodicity": {"type": "string", "title": "Wijzigingsfrequentie"},
                "dct:temporal": {
                    "type": "object",
                    "properties": {
                        "time:hasBeginning": {"type": "string", "format": "date"},
                        "time:hasEnd": {"type": "string", "format": "date"}
                    }
                },
                "foaf:isPrimaryTopicOf": {
                    "type": "object",
                    "readOnly": true,
                    "properties": {
                        "dct:issued": {"type": "string", "format": "date", "title": "Publicatiedatum"},
                        "dct:modified": {"type": "string", "format": "date", "title": "Wijzigingsdatum"}
                    }
                },
                "dcat:distribution": {
                    "type": "array",
                    "title": "Resources",
                    "items": {
                        "type": "object",
                        "properties": {
                            "dct:title": {"type": "string", "title": "Titel"},
                            "dct:description": {"type": "string", "title": "Beschrijving"},
                            "dcat:accessURL": {"type": "string", "format": "uri"},
                            "dct:format": {"type": "string", "title": "Type bestand"},
                            "dcat:byteSize": {"type": "integer", "minimum": 0}
                        },
                        "required": ["dcat:accessURL"]
                    }
                }
            },
            "required": ["dct:title", "dct:description"]
        })
    }

    fn full_text_search_representation(&self, doc: &Document) -> SearchableText {
        let mut text = SearchableText {
            a: string_leaves(doc.get(TITLE)).join("\n\n"),
            b: [string_leaves(doc.get(KEYWORD)), string_leaves(doc.get(THEME))]
                .concat()
                .join("\n\n"),
            c: string_leaves(doc.get(DESCRIPTION)).join("\n\n"),
            d: String::new(),
        };
        let rest: Vec<String> = doc
            .iter()
            .filter(|(k, _)| {
                !k.starts_with('@') && ![TITLE, KEYWORD, THEME, DESCRIPTION].contains(&k.as_str())
            })
            .flat_map(|(_, v)| string_leaves(Some(v)))
            .collect();
        text.d = rest.join("\n\n");
        text
    }

    fn context(&self) -> Value {
        let mut ctx: Map<String, Value> = CONTEXT_PREFIXES
            .iter()
            .map(|(prefix, iri)| (prefix.to_string(), Value::String(iri.to_string())))
            .collect();
        let terms = json!({
            "dcat:keyword": {"@container": "@set"},
            "dcat:landingPage": {"@type": "@id"},
            "dcat:theme": {"@container": "@set", "@type": "@id"},
            "dct:issued": {"@type": "xsd:date"},
            "dct:language": {"@type": "@id"},
            "dct:modified": {"@type": "xsd:date"},
            "foaf:homepage": {"@type": "@id"},
            "foaf:mbox": {"@type": "@id"},
            "vcard:hasEmail": {"@type": "@id"},
            "vcard:hasURL": {"@type": "@id"},
            "vcard:hasLogo": {"@type": "@id"}
        });
        if let Value::Object(terms) = terms {
            ctx.extend(terms);
        }
        Value::Object(ctx)
    }

    /// `dct:language` of the form `lang1:nl` yields `nl`.
    fn language(&self, doc: &Document) -> Option<String> {
        doc.get(LANGUAGE)
            .and_then(Value::as_str)
            .and_then(|s| s.strip_prefix("lang1:"))
            .filter(|code| code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()))
            .map(|code| code.to_ascii_lowercase())
    }
}

/// Replace a leading namespace IRI with its prefix.
pub fn compact_iri(name: &str) -> String {
    CONTEXT_PREFIXES
        .iter()
        .filter(|(_, iri)| name.len() > iri.len() && name.starts_with(iri))
        // longest namespace wins (overheidds before overheid)
        .max_by_key(|(_, iri)| iri.len())
        .map(|(prefix, iri)| format!("{}:{}", prefix, &name[iri.len()..]))
        .unwrap_or_else(|| name.to_string())
}

fn canonicalize_value(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let s = s.trim().replace("\r\n", "\n");
            (!s.is_empty()).then_some(Value::String(s))
        }
        Value::Array(items) => Some(Value::Array(
            items.into_iter().filter_map(canonicalize_value).collect(),
        )),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                if let Some(value) = canonicalize_value(value) {
                    out.insert(compact_iri(&key), value);
                }
            }
            Some(Value::Object(out))
        }
        other => Some(other),
    }
}

fn string_leaves(value: Option<&Value>) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(value) = value {
        collect_strings(value, &mut out);
    }
    out
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) if !s.is_empty() => out.push(s.clone()),
        Value::Number(n) => out.push(n.to_string()),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map
            .iter()
            .filter(|(k, _)| !k.starts_with('@') || k.as_str() == "@value")
            .for_each(|(_, v)| collect_strings(v, out)),
        _ => {}
    }
}
