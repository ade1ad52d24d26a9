//! Inbound normalization and outbound decoration of catalog documents.
//!
//! Writes: parse JSON, canonicalize through the metadata profile, check that
//! self-declared identifiers agree with the request path, strip them, and
//! derive the full-text representation and language. Reads are never
//! re-canonicalized; the stored document is only decorated with `@context`,
//! `@id`, `dct:identifier` and blank-node ids for its distributions.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::hooks::HookRegistry;
use crate::models::{DocId, Document, SearchableText};

pub const ID_KEY: &str = "@id";
pub const CONTEXT_KEY: &str = "@context";
pub const IDENTIFIER_KEY: &str = "dct:identifier";
pub const TITLE_KEY: &str = "dct:title";
pub const DESCRIPTION_KEY: &str = "dct:description";
pub const KEYWORD_KEY: &str = "dcat:keyword";
pub const DISTRIBUTION_KEY: &str = "dcat:distribution";
pub const FORMAT_KEY: &str = "dct:format";

/// A document ready for the storage hooks.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedDocument {
    pub doc: Document,
    pub searchable_text: SearchableText,
    /// ISO 639-1 language code.
    pub lang: String,
}

#[derive(Clone)]
pub struct CanonicalizationPipeline {
    hooks: Arc<HookRegistry>,
    base_url: String,
    default_language: String,
}

impl CanonicalizationPipeline {
    /// `base_url` is the public URL the routes are mounted under.
    pub fn new(
        hooks: Arc<HookRegistry>,
        base_url: impl Into<String>,
        default_language: impl Into<String>,
    ) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            hooks,
            base_url,
            default_language: default_language.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn collection_url(&self) -> String {
        format!("{}datasets", self.base_url)
    }

    pub fn document_url(&self, id: &DocId) -> String {
        format!("{}datasets/{}", self.base_url, id)
    }

    /// Parse a request body into a JSON object.
    pub fn parse_body(body: &[u8]) -> Result<Document> {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(doc)) => Ok(doc),
            Ok(_) => Err(Error::InvalidInput(
                "invalid json: expected an object".to_string(),
            )),
            Err(e) => Err(Error::InvalidInput(format!("invalid json: {}", e))),
        }
    }

    pub fn canonicalize(&self, doc: Document) -> Result<Document> {
        self.hooks.mds_canonicalize(doc)
    }

    /// Canonicalize and prepare a document stored under `id`.
    pub fn prepare(&self, id: &DocId, doc: Document) -> Result<PreparedDocument> {
        let doc = self.canonicalize(doc)?;
        self.prepare_canonical(id, doc)
    }

    /// Prepare an already canonical document.
    ///
    /// Fails with `InvalidInput` when `@id` or `dct:identifier` disagree
    /// with `id`. Both are removed along with `@context`; the stored id
    /// always comes from the request.
    pub fn prepare_canonical(&self, id: &DocId, mut doc: Document) -> Result<PreparedDocument> {
        if let Some(declared) = doc.get(ID_KEY) {
            let expected = self.document_url(id);
            if declared.as_str() != Some(expected.as_str()) {
                return Err(Error::InvalidInput(format!(
                    "Invalid {}: {} != {}",
                    ID_KEY,
                    display_value(declared),
                    expected
                )));
            }
        }
        if let Some(declared) = doc.get(IDENTIFIER_KEY) {
            if identifier_value(declared) != Some(id.as_str()) {
                return Err(Error::InvalidInput(format!(
                    "Invalid {}: {} != {}",
                    IDENTIFIER_KEY,
                    display_value(declared),
                    id
                )));
            }
        }
        doc.remove(ID_KEY);
        doc.remove(IDENTIFIER_KEY);
        doc.remove(CONTEXT_KEY);

        let searchable_text = self.hooks.mds_full_text_search_representation(&doc);
        let lang = self
            .hooks
            .mds_language(&doc)
            .unwrap_or_else(|| self.default_language.clone());

        Ok(PreparedDocument {
            doc,
            searchable_text,
            lang,
        })
    }

    /// Id declared by a canonical document posted to the collection.
    ///
    /// `dct:identifier` wins; otherwise the last path segment of `@id`.
    /// When both are present `@id` must be the URL of that identifier.
    /// `None` means the caller should generate an id.
    pub fn declared_id(&self, doc: &Document) -> Result<Option<DocId>> {
        let at_id = match doc.get(ID_KEY) {
            None => None,
            Some(Value::String(s)) => Some(s.as_str()),
            Some(other) => {
                return Err(Error::InvalidInput(format!(
                    "{} must be a URL, got {}",
                    ID_KEY, other
                )))
            }
        };

        if let Some(declared) = doc.get(IDENTIFIER_KEY) {
            let raw = identifier_value(declared).ok_or_else(|| {
                Error::InvalidInput(format!(
                    "{} must be a string, got {}",
                    IDENTIFIER_KEY, declared
                ))
            })?;
            let id = DocId::parse(raw)?;
            if let Some(url) = at_id {
                let expected = self.document_url(&id);
                if url != expected {
                    return Err(Error::InvalidInput(format!("{} != {}", url, expected)));
                }
            }
            return Ok(Some(id));
        }

        match at_id {
            Some(url) => {
                let segment = url
                    .trim_end_matches('/')
                    .rsplit('/')
                    .next()
                    .filter(|s| !s.is_empty() && !s.contains(':'))
                    .ok_or_else(|| {
                        Error::InvalidInput(format!("{} must be a URL, got {}", ID_KEY, url))
                    })?;
                Ok(Some(DocId::parse(segment)?))
            }
            None => Ok(None),
        }
    }

    /// Decorate a stored document for output.
    pub fn present(&self, id: &DocId, doc: Document) -> Document {
        let mut out = doc;
        out.insert(CONTEXT_KEY.to_string(), self.hooks.mds_context());
        out.insert(ID_KEY.to_string(), Value::String(self.document_url(id)));
        out.insert(IDENTIFIER_KEY.to_string(), Value::String(id.to_string()));
        if let Some(Value::Array(distributions)) = out.get_mut(DISTRIBUTION_KEY) {
            for (n, distribution) in distributions.iter_mut().enumerate() {
                if let Value::Object(d) = distribution {
                    d.insert(ID_KEY.to_string(), Value::String(format!("_:d{}", n + 1)));
                }
            }
        }
        out
    }

    /// Decorate a document for a harvest listing (no `@context`; the
    /// collection carries it).
    pub fn present_in_collection(&self, id: &DocId, doc: Document) -> Document {
        let mut out = self.present(id, doc);
        out.remove(CONTEXT_KEY);
        out
    }

    /// Short collection entry for `GET /datasets`.
    pub fn summarize(&self, id: &DocId, doc: &Document) -> Value {
        let distributions: Vec<Value> = doc
            .get(DISTRIBUTION_KEY)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|d| match d.get(FORMAT_KEY) {
                        Some(format) => json!({ "dct:format": format }),
                        None => json!({}),
                    })
                    .collect()
            })
            .unwrap_or_default();

        json!({
            "@id": self.document_url(id),
            "dct:identifier": id.as_str(),
            "dct:title": doc.get(TITLE_KEY).cloned().unwrap_or_else(|| json!("")),
            "dct:description": doc.get(DESCRIPTION_KEY).cloned().unwrap_or_else(|| json!("")),
            "dcat:keyword": doc.get(KEYWORD_KEY).cloned().unwrap_or_else(|| json!([])),
            "dcat:distribution": distributions,
        })
    }
}

/// Plain string form of `dct:identifier`: `"x"`, `{"@value": "x"}`, or a
/// one-element list of either.
fn identifier_value(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Object(map) => map.get("@value").and_then(Value::as_str),
        Value::Array(items) if items.len() == 1 => identifier_value(&items[0]),
        _ => None,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
