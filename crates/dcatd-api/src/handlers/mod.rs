//! Route handlers.

pub mod collection;
pub mod dataset;
pub mod harvest;
pub mod openapi;
pub mod system;

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde::Serialize;

use dcatd_core::{DocId, ETag, Error, Precondition, Result};

pub const JSON_LD: &str = "application/ld+json";

/// Parse every occurrence of a conditional request header.
pub(crate) fn precondition(headers: &HeaderMap, name: HeaderName) -> Result<Precondition> {
    let values = headers
        .get_all(&name)
        .iter()
        .map(|v| {
            v.to_str().map_err(|_| {
                Error::InvalidInput(format!("Syntax error in request header {}", name))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Precondition::parse(values)
}

pub(crate) fn parse_id(raw: &str) -> Result<DocId> {
    DocId::parse(raw)
}

pub(crate) fn etag_header(etag: &ETag) -> Result<HeaderValue> {
    HeaderValue::from_str(etag.as_str())
        .map_err(|_| Error::Internal(format!("ETag is not a valid header value: {}", etag)))
}

/// Serialize response output. Failures are server faults, not client errors.
pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| Error::Internal(format!("response serialization failed: {}", e)))
}

/// `{"@context":<ctx>,"dcat:dataset":[` ... `]}` around a stream of
/// serialized entries. `tail` runs after the last entry and may add
/// members before the closing brace.
pub(crate) fn json_collection<F>(
    context: &serde_json::Value,
    entries: BoxStream<'static, Result<CollectionChunk>>,
    mut tail: F,
) -> BoxStream<'static, Result<Bytes>>
where
    F: FnMut(CollectionTail) -> Result<String> + Send + 'static,
{
    let head = format!(r#"{{"@context":{},"dcat:dataset":["#, context);
    let mut first = true;
    let body = entries.map(move |chunk| {
        Ok(match chunk? {
            CollectionChunk::Entry(json) => {
                let mut out = String::with_capacity(json.len() + 1);
                if !first {
                    out.push(',');
                }
                first = false;
                out.push_str(&json);
                Bytes::from(out)
            }
            CollectionChunk::End(info) => {
                let mut out = String::from("]");
                out.push_str(&tail(info)?);
                out.push('}');
                Bytes::from(out)
            }
        })
    });
    stream::once(async move { Ok(Bytes::from(head)) })
        .chain(body)
        .boxed()
}

/// Element of a serialized collection.
pub(crate) enum CollectionChunk {
    Entry(String),
    End(CollectionTail),
}

/// Data available once all entries are written.
#[derive(Default)]
pub(crate) struct CollectionTail {
    pub total: Option<u64>,
    /// Serialized facet counts.
    pub facets: Option<String>,
}
