//! Document model shared by every dcatd crate.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::etag::ETag;

/// A catalog document: one JSON-LD object describing a dataset.
pub type Document = Map<String, Value>;

/// Maximum length of a document id, matching the `dataset.id` column.
pub const MAX_ID_LEN: usize = 254;

// =============================================================================
// DOCUMENT ID
// =============================================================================

/// Opaque, URL-safe document identifier.
///
/// Ids are immutable once assigned. Generated ids carry 80 bits of entropy;
/// client-supplied ids (through `PUT /datasets/{id}`) are validated by
/// [`DocId::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(String);

impl DocId {
    /// Validate a client-supplied id.
    ///
    /// Accepts non-empty strings of at most [`MAX_ID_LEN`] bytes made of
    /// unreserved URL characters (`A-Z a-z 0-9 - _ . ~`).
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::InvalidInput("empty document id".to_string()));
        }
        if raw.len() > MAX_ID_LEN {
            return Err(Error::InvalidInput(format!(
                "document id longer than {} bytes",
                MAX_ID_LEN
            )));
        }
        if !raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~'))
        {
            return Err(Error::InvalidInput(format!(
                "document id contains characters that are not URL-safe: {}",
                raw
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DocId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// SEARCHABLE TEXT
// =============================================================================

/// Weighted full-text representation of a document.
///
/// Tier `a` carries the most weight (title), `d` the least (everything else).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchableText {
    pub a: String,
    pub b: String,
    pub c: String,
    pub d: String,
}

impl SearchableText {
    pub fn is_empty(&self) -> bool {
        self.a.is_empty() && self.b.is_empty() && self.c.is_empty() && self.d.is_empty()
    }
}

// =============================================================================
// REVISION
// =============================================================================

/// Result of a storage retrieve.
///
/// `doc` is `None` when the caller already holds the current revision,
/// i.e. the stored ETag matched one of the candidate ETags.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieved {
    pub doc: Option<Document>,
    pub etag: ETag,
}
