//! Optimistic concurrency control for catalog documents.
//!
//! Conditional request headers decide what a request may do:
//!
//! | Request | Header | Path |
//! |---------|--------|------|
//! | PUT | `If-None-Match: *` | create, `AlreadyExists` is 412 |
//! | PUT | `If-Match: "<etag>"...` | update, mismatch 412, unknown 404 |
//! | DELETE | `If-Match: "<etag>"...` | delete, mismatch 412, unknown 404 |
//! | GET | `If-None-Match` | 304 when the current ETag matches |
//!
//! Header validation is pure and runs before the body is parsed or any
//! backend is called. Conditional writes are never retried here; the
//! storage backend's compare-and-swap linearizes writes per id.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::etag::{matches_strong, matches_weak, ETag, ETagSet};
use crate::hooks::HookRegistry;
use crate::logging;
use crate::models::{DocId, Document};
use crate::pipeline::PreparedDocument;
use crate::precondition::Precondition;

/// What a PUT is allowed to do, decided from its headers alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteIntent {
    Create,
    Update(ETagSet),
}

/// Terminal state of a conditional request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Created(ETag),
    Updated(ETag),
    Deleted,
    NotModified(ETag),
    Found { doc: Document, etag: ETag },
}

impl Outcome {
    pub fn status_code(&self) -> u16 {
        match self {
            Outcome::Created(_) => 201,
            Outcome::Updated(_) | Outcome::Deleted => 204,
            Outcome::NotModified(_) => 304,
            Outcome::Found { .. } => 200,
        }
    }

    pub fn etag(&self) -> Option<&ETag> {
        match self {
            Outcome::Created(etag)
            | Outcome::Updated(etag)
            | Outcome::NotModified(etag)
            | Outcome::Found { etag, .. } => Some(etag),
            Outcome::Deleted => None,
        }
    }
}

fn reject_both(if_match: &Precondition, if_none_match: &Precondition) -> Result<()> {
    if !if_match.is_absent() && !if_none_match.is_absent() {
        return Err(Error::InvalidInput(
            "Endpoint supports either If-Match or If-None-Match in a single request, not both"
                .to_string(),
        ));
    }
    Ok(())
}

/// Decide between create and update for a PUT.
pub fn resolve_put_intent(
    if_match: &Precondition,
    if_none_match: &Precondition,
) -> Result<WriteIntent> {
    reject_both(if_match, if_none_match)?;
    match (if_match, if_none_match) {
        (Precondition::ETags(tags), _) => Ok(WriteIntent::Update(tags.clone())),
        (Precondition::Any, _) => Err(Error::InvalidInput(
            "Endpoint does not support If-Match: *. Must provide one or more concrete ETags"
                .to_string(),
        )),
        (Precondition::Absent, Precondition::Any) => Ok(WriteIntent::Create),
        (Precondition::Absent, _) => Err(Error::InvalidInput(
            "For inserts of new documents, provide If-None-Match: *".to_string(),
        )),
    }
}

/// A DELETE needs a concrete `If-Match` set.
pub fn resolve_delete_intent(
    if_match: &Precondition,
    if_none_match: &Precondition,
) -> Result<ETagSet> {
    reject_both(if_match, if_none_match)?;
    match if_match {
        Precondition::ETags(tags) => Ok(tags.clone()),
        Precondition::Any => Err(Error::InvalidInput(
            "Endpoint does not support If-Match: *. Must provide one or more concrete ETags"
                .to_string(),
        )),
        Precondition::Absent => Err(Error::InvalidInput(
            "Deleting a document requires If-Match with one or more concrete ETags".to_string(),
        )),
    }
}

/// Maps conditional requests onto storage hooks.
#[derive(Clone)]
pub struct ConcurrencyController {
    hooks: Arc<HookRegistry>,
}

impl ConcurrencyController {
    pub fn new(hooks: Arc<HookRegistry>) -> Self {
        Self { hooks }
    }

    /// Conditional read.
    ///
    /// `If-None-Match` uses weak comparison and `*` matches any existing
    /// document. A concrete `If-Match` uses strong comparison and fails with
    /// `PreconditionFailed` on mismatch; `If-Match: *` is rejected.
    pub async fn read(
        &self,
        id: &DocId,
        if_match: &Precondition,
        if_none_match: &Precondition,
    ) -> Result<Outcome> {
        if if_match.is_any() {
            return Err(Error::InvalidInput(
                "Endpoint does not support If-Match: *".to_string(),
            ));
        }

        let retrieved = self
            .hooks
            .storage_retrieve(id, if_none_match.etags())
            .await?;
        let etag = retrieved.etag;

        if let Some(tags) = if_match.etags() {
            if !matches_strong(&etag, tags) {
                debug!(
                    subsystem = logging::SUBSYSTEM_CORE,
                    component = "controller",
                    op = "read",
                    dataset_id = %id,
                    etag = %etag,
                    "If-Match did not match current revision"
                );
                return Err(Error::PreconditionFailed(format!(
                    "current ETag of {} is {}",
                    id, etag
                )));
            }
        }

        match (retrieved.doc, if_none_match) {
            (None, _) | (Some(_), Precondition::Any) => Ok(Outcome::NotModified(etag)),
            (Some(_), Precondition::ETags(tags)) if matches_weak(&etag, tags) => {
                Ok(Outcome::NotModified(etag))
            }
            (Some(doc), _) => Ok(Outcome::Found { doc, etag }),
        }
    }

    /// Conditional create or update of a prepared document.
    pub async fn write(
        &self,
        id: &DocId,
        intent: &WriteIntent,
        prepared: &PreparedDocument,
    ) -> Result<Outcome> {
        let start = Instant::now();
        let outcome = match intent {
            WriteIntent::Create => {
                let etag = self
                    .hooks
                    .storage_create(id, &prepared.doc, &prepared.searchable_text, &prepared.lang)
                    .await?;
                Outcome::Created(etag)
            }
            WriteIntent::Update(candidates) => {
                let etag = self
                    .hooks
                    .storage_update(
                        id,
                        &prepared.doc,
                        &prepared.searchable_text,
                        candidates,
                        &prepared.lang,
                    )
                    .await?;
                Outcome::Updated(etag)
            }
        };

        let op = match intent {
            WriteIntent::Create => "create",
            WriteIntent::Update(_) => "update",
        };
        info!(
            subsystem = logging::SUBSYSTEM_CORE,
            component = "controller",
            op,
            dataset_id = %id,
            etag = outcome.etag().map(ETag::as_str).unwrap_or_default(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Dataset written"
        );
        Ok(outcome)
    }

    /// Conditional delete.
    pub async fn delete(&self, id: &DocId, candidates: &ETagSet) -> Result<Outcome> {
        self.hooks.storage_delete(id, candidates).await?;
        info!(
            subsystem = logging::SUBSYSTEM_CORE,
            component = "controller",
            op = "delete",
            dataset_id = %id,
            "Dataset deleted"
        );
        Ok(Outcome::Deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etag::compute_etag;
    use crate::models::{Retrieved, SearchableText};
    use crate::traits::{IdStream, Plugin, StorageBackend};
    use async_trait::async_trait;
    use futures::{stream, StreamExt};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Minimal compare-and-swap store that counts backend calls.
    #[derive(Default)]
    struct CasStore {
        docs: Mutex<HashMap<DocId, (Document, ETag)>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Plugin for CasStore {
        fn name(&self) -> &str {
            "cas"
        }
    }

    #[async_trait]
    impl StorageBackend for CasStore {
        async fn retrieve(&self, id: &DocId, etags: Option<&ETagSet>) -> Result<Retrieved> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let docs = self.docs.lock().unwrap();
            let (doc, etag) = docs
                .get(id)
                .cloned()
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
            let doc = match etags {
                Some(tags) if matches_weak(&etag, tags) => None,
                _ => Some(doc),
            };
            Ok(Retrieved { doc, etag })
        }

        async fn create(
            &self,
            id: &DocId,
            doc: &Document,
            _: &SearchableText,
            _: &str,
        ) -> Result<ETag> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut docs = self.docs.lock().unwrap();
            if docs.contains_key(id) {
                return Err(Error::AlreadyExists(id.to_string()));
            }
            let etag = compute_etag(doc);
            docs.insert(id.clone(), (doc.clone(), etag.clone()));
            Ok(etag)
        }

        async fn update(
            &self,
            id: &DocId,
            doc: &Document,
            _: &SearchableText,
            etags: &ETagSet,
            _: &str,
        ) -> Result<ETag> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut docs = self.docs.lock().unwrap();
            let current = docs
                .get(id)
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
            if !matches_strong(&current.1, etags) {
                return Err(Error::PreconditionFailed(id.to_string()));
            }
            let etag = compute_etag(doc);
            docs.insert(id.clone(), (doc.clone(), etag.clone()));
            Ok(etag)
        }

        async fn delete(&self, id: &DocId, etags: &ETagSet) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut docs = self.docs.lock().unwrap();
            let current = docs
                .get(id)
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
            if !matches_strong(&current.1, etags) {
                return Err(Error::PreconditionFailed(id.to_string()));
            }
            docs.remove(id);
            Ok(())
        }

        async fn list_ids(&self) -> Result<IdStream> {
            Ok(stream::empty().boxed())
        }

        async fn new_id(&self) -> Result<DocId> {
            DocId::parse("fresh")
        }
    }

    fn setup() -> (Arc<CasStore>, ConcurrencyController) {
        let store = Arc::new(CasStore::default());
        let hooks = HookRegistry::builder().storage(store.clone()).build().unwrap();
        (store, ConcurrencyController::new(Arc::new(hooks)))
    }

    fn prepared(v: serde_json::Value) -> PreparedDocument {
        PreparedDocument {
            doc: v.as_object().cloned().unwrap(),
            searchable_text: SearchableText::default(),
            lang: "nl".to_string(),
        }
    }

    fn tags(values: &[&ETag]) -> ETagSet {
        values.iter().map(|t| (*t).clone()).collect()
    }

    fn header(v: &str) -> Precondition {
        Precondition::parse_header(Some(v)).unwrap()
    }

    #[test]
    fn test_put_intent_create_requires_wildcard() {
        assert_eq!(
            resolve_put_intent(&Precondition::Absent, &Precondition::Any).unwrap(),
            WriteIntent::Create
        );
        assert!(matches!(
            resolve_put_intent(&Precondition::Absent, &header(r#""abc""#)),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            resolve_put_intent(&Precondition::Absent, &Precondition::Absent),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_put_intent_update_requires_concrete_tags() {
        let intent = resolve_put_intent(&header(r#""a", "b""#), &Precondition::Absent).unwrap();
        match intent {
            WriteIntent::Update(set) => assert_eq!(set.len(), 2),
            other => panic!("expected update, got {other:?}"),
        }
        let err = resolve_put_intent(&Precondition::Any, &Precondition::Absent).unwrap_err();
        assert!(err.to_string().contains("concrete ETags"));
    }

    #[test]
    fn test_both_headers_rejected() {
        let err = resolve_put_intent(&header(r#""a""#), &Precondition::Any).unwrap_err();
        assert!(err.to_string().contains("not both"));
        assert!(resolve_delete_intent(&header(r#""a""#), &Precondition::Any).is_err());
    }

    #[test]
    fn test_delete_intent() {
        assert_eq!(
            resolve_delete_intent(&header(r#""a""#), &Precondition::Absent)
                .unwrap()
                .len(),
            1
        );
        assert!(resolve_delete_intent(&Precondition::Any, &Precondition::Absent).is_err());
        assert!(resolve_delete_intent(&Precondition::Absent, &Precondition::Absent).is_err());
    }

    #[tokio::test]
    async fn test_create_then_duplicate_create() {
        let (_, controller) = setup();
        let id = DocId::parse("abc").unwrap();
        let outcome = controller
            .write(&id, &WriteIntent::Create, &prepared(json!({"title": "x"})))
            .await
            .unwrap();
        assert_eq!(outcome.status_code(), 201);
        let err = controller
            .write(&id, &WriteIntent::Create, &prepared(json!({"title": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_update_with_current_and_stale_etag() {
        let (_, controller) = setup();
        let id = DocId::parse("abc").unwrap();
        let h1 = match controller
            .write(&id, &WriteIntent::Create, &prepared(json!({"title": "x"})))
            .await
            .unwrap()
        {
            Outcome::Created(etag) => etag,
            other => panic!("unexpected {other:?}"),
        };

        let update = WriteIntent::Update(tags(&[&h1]));
        let outcome = controller
            .write(&id, &update, &prepared(json!({"title": "y"})))
            .await
            .unwrap();
        let h2 = outcome.etag().unwrap().clone();
        assert_eq!(outcome.status_code(), 204);
        assert_ne!(h1, h2);

        let err = controller
            .write(&id, &update, &prepared(json!({"title": "z"})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn test_update_unknown_is_not_found() {
        let (_, controller) = setup();
        let id = DocId::parse("missing").unwrap();
        let err = controller
            .write(
                &id,
                &WriteIntent::Update(tags(&[&ETag::new("\"x\"")])),
                &prepared(json!({})),
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_read_not_modified_until_changed() {
        let (_, controller) = setup();
        let id = DocId::parse("abc").unwrap();
        let h1 = controller
            .write(&id, &WriteIntent::Create, &prepared(json!({"title": "x"})))
            .await
            .unwrap()
            .etag()
            .cloned()
            .unwrap();

        let inm = Precondition::ETags(tags(&[&h1]));
        for _ in 0..3 {
            let outcome = controller.read(&id, &Precondition::Absent, &inm).await.unwrap();
            assert_eq!(outcome, Outcome::NotModified(h1.clone()));
        }

        controller
            .write(
                &id,
                &WriteIntent::Update(tags(&[&h1])),
                &prepared(json!({"title": "y"})),
            )
            .await
            .unwrap();
        let outcome = controller.read(&id, &Precondition::Absent, &inm).await.unwrap();
        assert_eq!(outcome.status_code(), 200);
    }

    #[tokio::test]
    async fn test_read_weak_if_none_match_and_wildcard() {
        let (_, controller) = setup();
        let id = DocId::parse("abc").unwrap();
        let h1 = controller
            .write(&id, &WriteIntent::Create, &prepared(json!({"title": "x"})))
            .await
            .unwrap()
            .etag()
            .cloned()
            .unwrap();

        let weak = ETag::new(format!("W/{}", h1.as_str()));
        let outcome = controller
            .read(&id, &Precondition::Absent, &Precondition::ETags(tags(&[&weak])))
            .await
            .unwrap();
        assert_eq!(outcome.status_code(), 304);

        let outcome = controller
            .read(&id, &Precondition::Absent, &Precondition::Any)
            .await
            .unwrap();
        assert_eq!(outcome.status_code(), 304);
    }

    #[tokio::test]
    async fn test_read_if_match_rules() {
        let (store, controller) = setup();
        let id = DocId::parse("abc").unwrap();
        let err = controller
            .read(&id, &Precondition::Any, &Precondition::Absent)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);

        controller
            .write(&id, &WriteIntent::Create, &prepared(json!({"title": "x"})))
            .await
            .unwrap();
        let err = controller
            .read(&id, &header(r#""stale""#), &Precondition::Absent)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let (_, controller) = setup();
        let id = DocId::parse("nope").unwrap();
        let err = controller
            .read(&id, &Precondition::Absent, &Precondition::Any)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_wrong_then_right_etag() {
        let (_, controller) = setup();
        let id = DocId::parse("abc").unwrap();
        let h1 = controller
            .write(&id, &WriteIntent::Create, &prepared(json!({"title": "x"})))
            .await
            .unwrap()
            .etag()
            .cloned()
            .unwrap();

        let err = controller
            .delete(&id, &tags(&[&ETag::new("\"wrong\"")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PreconditionFailed(_)));

        assert_eq!(
            controller.delete(&id, &tags(&[&h1])).await.unwrap(),
            Outcome::Deleted
        );
        let err = controller
            .read(&id, &Precondition::Absent, &Precondition::Absent)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
