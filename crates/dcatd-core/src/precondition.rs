//! Parsing of `If-Match` / `If-None-Match` request headers.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};
use crate::etag::{ETag, ETagSet};

/// A full header value: one or more (possibly weak) entity tags, comma separated.
///
/// Entity tag characters are `%x21 / %x23-7E / obs-text`.
static ETAG_LIST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^\s*(?:W/)?"(?:[\x21\x23-\x7e]|[^\x00-\x7f])+"(?:\s*,\s*(?:W/)?"(?:[\x21\x23-\x7e]|[^\x00-\x7f])+")*\s*$"#,
    )
    .unwrap()
});

static ETAG_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?:W/)?"[^"]+""#).unwrap());

/// Parsed conditional request header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Precondition {
    /// Header not sent (or sent empty).
    #[default]
    Absent,
    /// The wildcard `*`.
    Any,
    /// One or more concrete entity tags.
    ETags(ETagSet),
}

impl Precondition {
    /// Parse every occurrence of one header.
    ///
    /// Multiple header lines are combined with `,` as RFC 7230 §3.2.2
    /// allows. Empty values count as absent; some clients (Swagger UI)
    /// send the header with an empty value when the field is left blank.
    pub fn parse<'a, I>(values: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let joined = values
            .into_iter()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
            .join(", ");

        if joined.is_empty() {
            return Ok(Precondition::Absent);
        }
        if joined == "*" {
            return Ok(Precondition::Any);
        }
        if !ETAG_LIST.is_match(&joined) {
            return Err(Error::InvalidInput(
                "Syntax error in request header: expected '*' or a list of entity tags"
                    .to_string(),
            ));
        }
        let tags: ETagSet = ETAG_ITEM
            .find_iter(&joined)
            .map(|m| ETag::new(m.as_str()))
            .collect();
        Ok(Precondition::ETags(tags))
    }

    /// Parse a single optional header value.
    pub fn parse_header(value: Option<&str>) -> Result<Self> {
        Self::parse(value)
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Precondition::Absent)
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Precondition::Any)
    }

    /// The concrete tag set, if any.
    pub fn etags(&self) -> Option<&ETagSet> {
        match self {
            Precondition::ETags(tags) => Some(tags),
            _ => None,
        }
    }
}
