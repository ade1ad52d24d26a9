//! Backend contracts for dcatd plugins.
//!
//! Storage, search and metadata-profile implementations implement these
//! traits and are registered with the [`HookRegistry`](crate::HookRegistry)
//! at startup.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::error::Result;
use crate::etag::{ETag, ETagSet};
use crate::filter::SearchQuery;
use crate::models::{DocId, Document, Retrieved, SearchableText};

/// Lazy, finite sequence of `(id, document)` search hits.
///
/// Dropping the stream releases whatever backend resources feed it.
pub type DocumentStream = BoxStream<'static, Result<(DocId, Document)>>;

/// Lazy, finite sequence of stored document ids.
pub type IdStream = BoxStream<'static, Result<DocId>>;

// =============================================================================
// LIFECYCLE
// =============================================================================

/// Lifecycle hooks shared by every plugin.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Unique plugin name; one plugin registered for several hook
    /// categories is initialized once.
    fn name(&self) -> &str;

    /// Called once before the server accepts requests.
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Called once after the server stops accepting requests.
    async fn deinitialize(&self) -> Result<()> {
        Ok(())
    }

    /// `None` when healthy, otherwise a diagnostic message.
    async fn health_check(&self) -> Option<String> {
        None
    }
}

// =============================================================================
// STORAGE
// =============================================================================

/// Conditional-write document store.
///
/// `update` and `delete` must compare the stored ETag against the candidate
/// set and mutate in one atomic step: of two concurrent writers holding the
/// same stale set, exactly one succeeds.
#[async_trait]
pub trait StorageBackend: Plugin {
    /// Fetch the current revision.
    ///
    /// With `candidate_etags`, `doc` is `None` when the stored ETag weakly
    /// matches one of them. Fails with `NotFound` for unknown ids.
    async fn retrieve(&self, id: &DocId, candidate_etags: Option<&ETagSet>) -> Result<Retrieved>;

    /// Store a new document. Fails with `AlreadyExists`.
    async fn create(
        &self,
        id: &DocId,
        doc: &Document,
        searchable_text: &SearchableText,
        lang: &str,
    ) -> Result<ETag>;

    /// Replace a document whose stored ETag is in `candidate_etags`.
    /// Fails with `PreconditionFailed` or `NotFound`.
    async fn update(
        &self,
        id: &DocId,
        doc: &Document,
        searchable_text: &SearchableText,
        candidate_etags: &ETagSet,
        lang: &str,
    ) -> Result<ETag>;

    /// Remove a document whose stored ETag is in `candidate_etags`.
    /// Fails with `PreconditionFailed` or `NotFound`.
    async fn delete(&self, id: &DocId, candidate_etags: &ETagSet) -> Result<()>;

    /// Every stored id; each call starts a fresh scan.
    async fn list_ids(&self) -> Result<IdStream>;

    /// A fresh collision-resistant id.
    async fn new_id(&self) -> Result<DocId>;
}

// =============================================================================
// SEARCH
// =============================================================================

/// Full-text search and sorted listing.
#[async_trait]
pub trait SearchBackend: Plugin {
    /// Ranked search when `query.text` is non-empty, sorted listing
    /// otherwise. Fails with `InvalidFilter` for unsupported filters.
    async fn search(&self, query: &SearchQuery) -> Result<DocumentStream>;
}

// =============================================================================
// METADATA PROFILE
// =============================================================================

/// Metadata schema collaborator: normalization and derived representations.
pub trait MetadataProfile: Plugin {
    /// Normalize field names and structure of an inbound document.
    fn canonicalize(&self, doc: Document) -> Result<Document>;

    /// JSON schema describing valid documents.
    fn json_schema(&self) -> Value;

    fn full_text_search_representation(&self, doc: &Document) -> SearchableText;

    /// JSON-LD `@context` attached to outbound documents.
    fn context(&self) -> Value;

    /// ISO 639-1 language of the document, if the profile can tell.
    fn language(&self, _doc: &Document) -> Option<String> {
        None
    }
}
