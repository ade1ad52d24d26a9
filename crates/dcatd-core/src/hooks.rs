//! Hook registry: typed dispatch from named operations to plugins.
//!
//! Plugins are registered per category (storage, search, metadata profile)
//! once at startup. The resulting table is immutable and shared behind an
//! `Arc`, so lookups need no locking.
//!
//! | Policy | Behaviour |
//! |--------|-----------|
//! | first-result | call implementations in registration order until one returns a non-sentinel result |
//! | broadcast | call every implementation; the first error aborts and is surfaced |
//!
//! Registration is static, so replay-style hooks behave as broadcast.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::etag::{ETag, ETagSet};
use crate::filter::SearchQuery;
use crate::logging;
use crate::models::{DocId, Document, Retrieved, SearchableText};
use crate::traits::{DocumentStream, IdStream, MetadataProfile, Plugin, SearchBackend, StorageBackend};

/// How results of several implementations are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultPolicy {
    FirstResult,
    Broadcast,
}

/// Every hook the registry dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookName {
    Initialize,
    Deinitialize,
    HealthCheck,
    StorageRetrieve,
    StorageRetrieveIds,
    StorageCreate,
    StorageUpdate,
    StorageDelete,
    StorageId,
    SearchSearch,
    MdsCanonicalize,
    MdsJsonSchema,
    MdsFullTextSearchRepresentation,
    MdsContext,
    MdsLanguage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Lifecycle,
    Storage,
    Search,
    Profile,
}

impl HookName {
    pub const ALL: [HookName; 15] = [
        HookName::Initialize,
        HookName::Deinitialize,
        HookName::HealthCheck,
        HookName::StorageRetrieve,
        HookName::StorageRetrieveIds,
        HookName::StorageCreate,
        HookName::StorageUpdate,
        HookName::StorageDelete,
        HookName::StorageId,
        HookName::SearchSearch,
        HookName::MdsCanonicalize,
        HookName::MdsJsonSchema,
        HookName::MdsFullTextSearchRepresentation,
        HookName::MdsContext,
        HookName::MdsLanguage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookName::Initialize => "initialize",
            HookName::Deinitialize => "deinitialize",
            HookName::HealthCheck => "health_check",
            HookName::StorageRetrieve => "storage_retrieve",
            HookName::StorageRetrieveIds => "storage_retrieve_ids",
            HookName::StorageCreate => "storage_create",
            HookName::StorageUpdate => "storage_update",
            HookName::StorageDelete => "storage_delete",
            HookName::StorageId => "storage_id",
            HookName::SearchSearch => "search_search",
            HookName::MdsCanonicalize => "mds_canonicalize",
            HookName::MdsJsonSchema => "mds_json_schema",
            HookName::MdsFullTextSearchRepresentation => "mds_full_text_search_representation",
            HookName::MdsContext => "mds_context",
            HookName::MdsLanguage => "mds_language",
        }
    }

    pub fn policy(&self) -> ResultPolicy {
        match self.category() {
            Category::Lifecycle => ResultPolicy::Broadcast,
            _ => ResultPolicy::FirstResult,
        }
    }

    /// Required hooks must have an implementation before the server starts.
    pub fn is_required(&self) -> bool {
        matches!(self, HookName::StorageRetrieve | HookName::StorageRetrieveIds)
    }

    fn category(&self) -> Category {
        match self {
            HookName::Initialize | HookName::Deinitialize | HookName::HealthCheck => {
                Category::Lifecycle
            }
            HookName::StorageRetrieve
            | HookName::StorageRetrieveIds
            | HookName::StorageCreate
            | HookName::StorageUpdate
            | HookName::StorageDelete
            | HookName::StorageId => Category::Storage,
            HookName::SearchSearch => Category::Search,
            HookName::MdsCanonicalize
            | HookName::MdsJsonSchema
            | HookName::MdsFullTextSearchRepresentation
            | HookName::MdsContext
            | HookName::MdsLanguage => Category::Profile,
        }
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Collects plugin registrations before the table is frozen.
#[derive(Default)]
pub struct HookRegistryBuilder {
    storage: Vec<Arc<dyn StorageBackend>>,
    search: Vec<Arc<dyn SearchBackend>>,
    profiles: Vec<Arc<dyn MetadataProfile>>,
    plugins: Vec<Arc<dyn Plugin>>,
    call_timeout: Option<Duration>,
}

impl HookRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a storage backend for all `storage_*` hooks.
    pub fn storage<T: StorageBackend + 'static>(mut self, backend: Arc<T>) -> Self {
        self.add_plugin(backend.clone());
        self.storage.push(backend);
        self
    }

    /// Register a search backend for `search_search`.
    pub fn search<T: SearchBackend + 'static>(mut self, backend: Arc<T>) -> Self {
        self.add_plugin(backend.clone());
        self.search.push(backend);
        self
    }

    /// Register a metadata profile for all `mds_*` hooks.
    pub fn profile<T: MetadataProfile + 'static>(mut self, profile: Arc<T>) -> Self {
        self.add_plugin(profile.clone());
        self.profiles.push(profile);
        self
    }

    /// Bound every backend call; expiry fails the call with `Timeout`.
    pub fn call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    fn add_plugin(&mut self, plugin: Arc<dyn Plugin>) {
        if !self.plugins.iter().any(|p| p.name() == plugin.name()) {
            self.plugins.push(plugin);
        }
    }

    /// Freeze the table. Fails when a required hook has no implementation.
    pub fn build(self) -> Result<HookRegistry> {
        let registry = HookRegistry {
            storage: self.storage,
            search: self.search,
            profiles: self.profiles,
            plugins: self.plugins,
            call_timeout: self.call_timeout,
        };

        let missing = registry.missing_required();
        if !missing.is_empty() {
            let names: Vec<_> = missing.iter().map(HookName::as_str).collect();
            return Err(Error::Config(format!(
                "no implementations for required hooks: {}",
                names.join(", ")
            )));
        }

        for hook in HookName::ALL {
            debug!(
                subsystem = logging::SUBSYSTEM_HOOKS,
                component = "registry",
                hook = hook.as_str(),
                implementations = ?registry.implementations(hook),
                "Hook dispatch table"
            );
        }
        Ok(registry)
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Immutable dispatch table.
pub struct HookRegistry {
    storage: Vec<Arc<dyn StorageBackend>>,
    search: Vec<Arc<dyn SearchBackend>>,
    profiles: Vec<Arc<dyn MetadataProfile>>,
    plugins: Vec<Arc<dyn Plugin>>,
    call_timeout: Option<Duration>,
}

impl HookRegistry {
    pub fn builder() -> HookRegistryBuilder {
        HookRegistryBuilder::new()
    }

    /// Names of the plugins implementing `hook`, in dispatch order.
    pub fn implementations(&self, hook: HookName) -> Vec<&str> {
        match hook.category() {
            Category::Lifecycle => self.plugins.iter().map(|p| p.name()).collect(),
            Category::Storage => self.storage.iter().map(|p| p.name()).collect(),
            Category::Search => self.search.iter().map(|p| p.name()).collect(),
            Category::Profile => self.profiles.iter().map(|p| p.name()).collect(),
        }
    }

    pub fn missing_required(&self) -> Vec<HookName> {
        HookName::ALL
            .into_iter()
            .filter(|h| h.is_required() && self.implementations(*h).is_empty())
            .collect()
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout
    }

    async fn bounded<T, F>(&self, hook: HookName, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| timed_out(hook, limit))?,
            None => fut.await,
        }
    }

    /// Bound every item of a backend stream by the call timeout.
    ///
    /// An item that does not arrive in time yields `Error::Timeout` and ends
    /// the stream, dropping the backend side.
    fn bounded_stream<T: Send + 'static>(
        &self,
        hook: HookName,
        inner: BoxStream<'static, Result<T>>,
    ) -> BoxStream<'static, Result<T>> {
        let Some(limit) = self.call_timeout else {
            return inner;
        };
        stream::unfold(Some(inner), move |state| async move {
            let Some(mut inner) = state else {
                return None;
            };
            match tokio::time::timeout(limit, inner.next()).await {
                Ok(Some(item)) => Some((item, Some(inner))),
                Ok(None) => None,
                Err(_) => Some((Err(timed_out(hook, limit)), None)),
            }
        })
        .boxed()
    }

    fn primary_storage(&self, hook: HookName) -> Result<&Arc<dyn StorageBackend>> {
        self.storage
            .first()
            .ok_or_else(|| Error::Config(format!("no implementation for {}", hook.as_str())))
    }

    // ─── Lifecycle (broadcast) ─────────────────────────────────────────────

    pub async fn initialize(&self) -> Result<()> {
        for plugin in &self.plugins {
            let start = Instant::now();
            self.bounded(HookName::Initialize, plugin.initialize()).await?;
            info!(
                subsystem = logging::SUBSYSTEM_HOOKS,
                hook = "initialize",
                plugin = plugin.name(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Plugin initialized"
            );
        }
        Ok(())
    }

    pub async fn deinitialize(&self) -> Result<()> {
        for plugin in &self.plugins {
            self.bounded(HookName::Deinitialize, plugin.deinitialize())
                .await?;
            info!(
                subsystem = logging::SUBSYSTEM_HOOKS,
                hook = "deinitialize",
                plugin = plugin.name(),
                "Plugin deinitialized"
            );
        }
        Ok(())
    }

    /// Diagnostics of every unhealthy plugin, in registration order.
    pub async fn health_check(&self) -> Vec<String> {
        let mut failures = Vec::new();
        for plugin in &self.plugins {
            let result = match self.call_timeout {
                Some(limit) => tokio::time::timeout(limit, plugin.health_check())
                    .await
                    .unwrap_or_else(|_| Some(format!("{}: health check timed out", plugin.name()))),
                None => plugin.health_check().await,
            };
            if let Some(diagnostic) = result {
                warn!(
                    subsystem = logging::SUBSYSTEM_HOOKS,
                    hook = "health_check",
                    plugin = plugin.name(),
                    error = %diagnostic,
                    "Plugin reported unhealthy"
                );
                failures.push(diagnostic);
            }
        }
        failures
    }

    // ─── Storage (first-result) ────────────────────────────────────────────

    /// Ask each storage backend in turn; `NotFound` moves on to the next.
    pub async fn storage_retrieve(
        &self,
        id: &DocId,
        candidate_etags: Option<&ETagSet>,
    ) -> Result<Retrieved> {
        for backend in &self.storage {
            match self
                .bounded(HookName::StorageRetrieve, backend.retrieve(id, candidate_etags))
                .await
            {
                Err(e) if e.is_not_found() => {
                    debug!(
                        subsystem = logging::SUBSYSTEM_HOOKS,
                        hook = "storage_retrieve",
                        plugin = backend.name(),
                        dataset_id = %id,
                        "Not found, trying next implementation"
                    );
                }
                other => return other,
            }
        }
        Err(Error::NotFound(format!("dataset {}", id)))
    }

    pub async fn storage_retrieve_ids(&self) -> Result<IdStream> {
        let backend = self.primary_storage(HookName::StorageRetrieveIds)?;
        let ids = self
            .bounded(HookName::StorageRetrieveIds, backend.list_ids())
            .await?;
        Ok(self.bounded_stream(HookName::StorageRetrieveIds, ids))
    }

    pub async fn storage_create(
        &self,
        id: &DocId,
        doc: &Document,
        searchable_text: &SearchableText,
        lang: &str,
    ) -> Result<ETag> {
        let backend = self.primary_storage(HookName::StorageCreate)?;
        self.bounded(
            HookName::StorageCreate,
            backend.create(id, doc, searchable_text, lang),
        )
        .await
    }

    pub async fn storage_update(
        &self,
        id: &DocId,
        doc: &Document,
        searchable_text: &SearchableText,
        candidate_etags: &ETagSet,
        lang: &str,
    ) -> Result<ETag> {
        let backend = self.primary_storage(HookName::StorageUpdate)?;
        self.bounded(
            HookName::StorageUpdate,
            backend.update(id, doc, searchable_text, candidate_etags, lang),
        )
        .await
    }

    pub async fn storage_delete(&self, id: &DocId, candidate_etags: &ETagSet) -> Result<()> {
        let backend = self.primary_storage(HookName::StorageDelete)?;
        self.bounded(HookName::StorageDelete, backend.delete(id, candidate_etags))
            .await
    }

    pub async fn storage_id(&self) -> Result<DocId> {
        let backend = self.primary_storage(HookName::StorageId)?;
        self.bounded(HookName::StorageId, backend.new_id()).await
    }

    // ─── Search (first-result) ─────────────────────────────────────────────

    /// Empty stream when no search backend is registered.
    pub async fn search_search(&self, query: &SearchQuery) -> Result<DocumentStream> {
        match self.search.first() {
            Some(backend) => {
                let hits = self
                    .bounded(HookName::SearchSearch, backend.search(query))
                    .await?;
                Ok(self.bounded_stream(HookName::SearchSearch, hits))
            }
            None => Ok(stream::empty().boxed()),
        }
    }

    // ─── Metadata profile (first-result) ───────────────────────────────────

    pub fn mds_name(&self) -> Option<&str> {
        self.profiles.first().map(|p| p.name())
    }

    /// Identity when no profile is registered.
    pub fn mds_canonicalize(&self, doc: Document) -> Result<Document> {
        match self.profiles.first() {
            Some(profile) => profile.canonicalize(doc),
            None => Ok(doc),
        }
    }

    pub fn mds_json_schema(&self) -> Value {
        self.profiles
            .first()
            .map(|p| p.json_schema())
            .unwrap_or_else(|| Value::Object(Default::default()))
    }

    pub fn mds_full_text_search_representation(&self, doc: &Document) -> SearchableText {
        self.profiles
            .first()
            .map(|p| p.full_text_search_representation(doc))
            .unwrap_or_default()
    }

    pub fn mds_context(&self) -> Value {
        self.profiles
            .first()
            .map(|p| p.context())
            .unwrap_or_else(|| Value::Object(Default::default()))
    }

    /// First profile that can tell the document's language.
    pub fn mds_language(&self, doc: &Document) -> Option<String> {
        self.profiles.iter().find_map(|p| p.language(doc))
    }
}

fn timed_out(hook: HookName, limit: Duration) -> Error {
    warn!(
        subsystem = logging::SUBSYSTEM_HOOKS,
        hook = hook.as_str(),
        timeout_ms = limit.as_millis() as u64,
        "Backend call timed out"
    );
    Error::Timeout(format!(
        "{} did not complete within {}ms",
        hook.as_str(),
        limit.as_millis()
    ))
}
