//! In-process storage and search backend.
//!
//! Compare-and-swap runs under one write lock. Search and id listings copy
//! the matching entries when called, so a stream never observes writes
//! committed after the call.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use dcatd_core::etag::{compute_etag, matches_strong, matches_weak};
use dcatd_core::{
    logging, DocId, Document, DocumentStream, ETag, ETagSet, Error, IdStream, Plugin, Result,
    Retrieved, SearchBackend, SearchQuery, SearchableText, StorageBackend,
};

use crate::ids::generate_id;
use crate::query::query_words;

/// ts_rank default weights for tiers D, C, B, A.
const TIER_WEIGHTS: [f64; 4] = [0.1, 0.2, 0.4, 1.0];

#[derive(Debug, Clone)]
struct Entry {
    doc: Document,
    etag: ETag,
    searchable_text: SearchableText,
    lang: String,
}

/// Storage and search over a `BTreeMap` behind a tokio `RwLock`.
#[derive(Debug, Default)]
pub struct MemoryDatasetStore {
    entries: RwLock<BTreeMap<DocId, Entry>>,
}

impl MemoryDatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Stored language tag of a document.
    pub async fn lang_of(&self, id: &DocId) -> Option<String> {
        self.entries.read().await.get(id).map(|e| e.lang.clone())
    }
}

#[async_trait]
impl Plugin for MemoryDatasetStore {
    fn name(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl StorageBackend for MemoryDatasetStore {
    async fn retrieve(&self, id: &DocId, candidate_etags: Option<&ETagSet>) -> Result<Retrieved> {
        let entries = self.entries.read().await;
        let entry = entries
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("dataset {}", id)))?;
        let doc = match candidate_etags {
            Some(tags) if matches_weak(&entry.etag, tags) => None,
            _ => Some(entry.doc.clone()),
        };
        Ok(Retrieved {
            doc,
            etag: entry.etag.clone(),
        })
    }

    async fn create(
        &self,
        id: &DocId,
        doc: &Document,
        searchable_text: &SearchableText,
        lang: &str,
    ) -> Result<ETag> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(id) {
            return Err(Error::AlreadyExists(format!("dataset {}", id)));
        }
        let etag = compute_etag(doc);
        entries.insert(
            id.clone(),
            Entry {
                doc: doc.clone(),
                etag: etag.clone(),
                searchable_text: searchable_text.clone(),
                lang: lang.to_string(),
            },
        );
        Ok(etag)
    }

    async fn update(
        &self,
        id: &DocId,
        doc: &Document,
        searchable_text: &SearchableText,
        candidate_etags: &ETagSet,
        lang: &str,
    ) -> Result<ETag> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("dataset {}", id)))?;
        if !matches_strong(&entry.etag, candidate_etags) {
            return Err(Error::PreconditionFailed(format!(
                "dataset {} has ETag {}",
                id, entry.etag
            )));
        }
        let etag = compute_etag(doc);
        *entry = Entry {
            doc: doc.clone(),
            etag: etag.clone(),
            searchable_text: searchable_text.clone(),
            lang: lang.to_string(),
        };
        Ok(etag)
    }

    async fn delete(&self, id: &DocId, candidate_etags: &ETagSet) -> Result<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("dataset {}", id)))?;
        if !matches_strong(&entry.etag, candidate_etags) {
            return Err(Error::PreconditionFailed(format!(
                "dataset {} has ETag {}",
                id, entry.etag
            )));
        }
        entries.remove(id);
        Ok(())
    }

    async fn list_ids(&self) -> Result<IdStream> {
        let ids: Vec<DocId> = self.entries.read().await.keys().cloned().collect();
        Ok(stream::iter(ids.into_iter().map(Ok)).boxed())
    }

    async fn new_id(&self) -> Result<DocId> {
        generate_id()
    }
}

#[async_trait]
impl SearchBackend for MemoryDatasetStore {
    async fn search(&self, query: &SearchQuery) -> Result<DocumentStream> {
        query.require_equality_filters()?;
        let words = query_words(&query.text);
        let snapshot: Vec<(DocId, Entry)> = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .filter(|(_, e)| {
                    let doc = Value::Object(e.doc.clone());
                    query.filters.iter().all(|f| f.matches(&doc))
                })
                .map(|(id, e)| (id.clone(), e.clone()))
                .collect()
        };

        let mut hits: Vec<(DocId, Document)> = if words.is_empty() {
            let lang = query.lang.as_deref();
            let mut listed: Vec<(Option<String>, DocId, Document)> = snapshot
                .into_iter()
                .filter(|(_, e)| lang.map_or(true, |l| e.lang == l))
                .map(|(id, e)| {
                    let key = sort_key(&query.sort, &e.doc);
                    (key, id, e.doc)
                })
                .collect();
            // descending by key, missing keys last, then id ascending
            listed.sort_by(|a, b| match (&a.0, &b.0) {
                (Some(x), Some(y)) => y.cmp(x).then_with(|| a.1.cmp(&b.1)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => a.1.cmp(&b.1),
            });
            listed.into_iter().map(|(_, id, doc)| (id, doc)).collect()
        } else {
            let mut ranked: Vec<(f64, DocId, Document)> = snapshot
                .into_iter()
                .filter_map(|(id, e)| rank(&words, &e.searchable_text).map(|r| (r, id, e.doc)))
                .collect();
            ranked.sort_by(|a, b| {
                b.0.partial_cmp(&a.0)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.1.cmp(&b.1))
            });
            ranked.into_iter().map(|(_, id, doc)| (id, doc)).collect()
        };

        let total = hits.len();
        let offset = usize::try_from(query.offset).unwrap_or(usize::MAX).min(total);
        hits.drain(..offset);
        if let Some(limit) = query.limit {
            hits.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }

        debug!(
            subsystem = logging::SUBSYSTEM_DATABASE,
            component = "memory",
            op = "search",
            query = %query.text,
            total_count = total,
            result_count = hits.len(),
            "Search snapshot taken"
        );
        Ok(stream::iter(hits.into_iter().map(Ok)).boxed())
    }
}

fn sort_key(path: &dcatd_core::FieldPath, doc: &Document) -> Option<String> {
    let doc = Value::Object(doc.clone());
    path.extract(&doc).first().map(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Every word must prefix some token. Full-word hits count double.
fn rank(words: &[String], text: &SearchableText) -> Option<f64> {
    let tiers = [&text.d, &text.c, &text.b, &text.a].map(|t| tokens(t));
    let mut score = 0.0;
    for word in words {
        let mut matched = false;
        for (weight, tier) in TIER_WEIGHTS.iter().zip(tiers.iter()) {
            for token in tier {
                if token == word {
                    score += 3.0 * weight;
                    matched = true;
                } else if token.starts_with(word.as_str()) {
                    score += weight;
                    matched = true;
                }
            }
        }
        if !matched {
            return None;
        }
    }
    Some(score)
}
