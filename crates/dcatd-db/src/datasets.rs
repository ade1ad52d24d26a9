//! PostgreSQL storage and search backend.
//!
//! Conditional writes are single statements (`... WHERE id = $n AND etag =
//! ANY($m)`), so the compare and the swap happen in one atomic step inside
//! the database. Result streams run their statement in a read-only
//! transaction on a spawned task and stop as soon as the consumer goes away.

use std::time::Instant;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use sqlx::postgres::{PgArguments, PgPool, PgRow};
use sqlx::types::Json;
use sqlx::{Arguments, Row};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use dcatd_core::etag::{compute_etag, matches_weak};
use dcatd_core::{
    logging, DocId, Document, DocumentStream, ETag, ETagSet, Error, IdStream, Plugin, Result,
    Retrieved, SearchBackend, SearchQuery, SearchableText, StorageBackend,
};

use crate::ids::generate_id;
use crate::pool::log_pool_metrics;
use crate::query::{
    filter_clause, fullmatch_tsquery, pg_dictionary, prefix_tsquery, query_words, search_vector,
    select_statement, sort_keys,
};

/// Rows buffered between the database task and the consumer.
const ROW_BUFFER: usize = 64;

/// Datasets table backend.
#[derive(Clone)]
pub struct PgDatasetStore {
    pool: PgPool,
}

impl PgDatasetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Distinguish `NotFound` from `PreconditionFailed` after a conditional
    /// write touched no row.
    async fn write_conflict(&self, id: &DocId) -> Error {
        let current: std::result::Result<Option<String>, sqlx::Error> =
            sqlx::query_scalar("SELECT etag FROM dataset WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await;
        match current {
            Ok(Some(etag)) => {
                Error::PreconditionFailed(format!("dataset {} has ETag {}", id, etag))
            }
            Ok(None) => Error::NotFound(format!("dataset {}", id)),
            Err(e) => Error::Database(e),
        }
    }
}

/// Strong tags only; weak tags never satisfy a conditional write.
fn strong_candidates(candidate_etags: &ETagSet) -> Vec<String> {
    candidate_etags
        .iter()
        .filter(|tag| !tag.is_weak())
        .map(|tag| tag.as_str().to_string())
        .collect()
}

fn bind<'q, T>(args: &mut PgArguments, value: T) -> Result<()>
where
    T: 'q + sqlx::Encode<'q, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    args.add(value)
        .map_err(|e| Error::Internal(format!("failed to bind query parameter: {}", e)))
}

fn decode_dataset(row: PgRow) -> Result<(DocId, Document)> {
    let id: String = row.try_get("id")?;
    let Json(doc): Json<Document> = row.try_get("doc")?;
    Ok((DocId::parse(&id)?, doc))
}

fn decode_id(row: PgRow) -> Result<DocId> {
    let id: String = row.try_get("id")?;
    DocId::parse(&id)
}

/// Run `sql` on a spawned task and forward decoded rows through a channel.
fn spawn_rows<T>(
    pool: PgPool,
    sql: String,
    args: PgArguments,
    decode: fn(PgRow) -> Result<T>,
) -> futures::stream::BoxStream<'static, Result<T>>
where
    T: Send + 'static,
{
    let (sender, receiver) = mpsc::channel(ROW_BUFFER);
    tokio::spawn(async move {
        if let Err(e) = forward_rows(&pool, &sql, args, decode, &sender).await {
            warn!(
                subsystem = logging::SUBSYSTEM_DATABASE,
                component = "datasets",
                op = "stream",
                error = %e,
                "Result stream aborted"
            );
            let _ = sender.send(Err(e)).await;
        }
    });
    ReceiverStream::new(receiver).boxed()
}

async fn forward_rows<T>(
    pool: &PgPool,
    sql: &str,
    args: PgArguments,
    decode: fn(PgRow) -> Result<T>,
    sender: &mpsc::Sender<Result<T>>,
) -> Result<()> {
    // one statement snapshot for the whole stream
    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION READ ONLY")
        .execute(&mut *tx)
        .await?;
    {
        let mut rows = sqlx::query_with(sql, args).fetch(&mut *tx);
        loop {
            tokio::select! {
                _ = sender.closed() => break,
                row = rows.try_next() => match row? {
                    Some(row) => {
                        if sender.send(decode(row)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    }
    tx.rollback().await?;
    Ok(())
}

#[async_trait]
impl Plugin for PgDatasetStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn initialize(&self) -> Result<()> {
        log_pool_metrics(&self.pool);
        Ok(())
    }

    async fn deinitialize(&self) -> Result<()> {
        info!(
            subsystem = logging::SUBSYSTEM_DATABASE,
            component = "datasets",
            op = "close",
            "Closing database connection pool"
        );
        self.pool.close().await;
        Ok(())
    }

    async fn health_check(&self) -> Option<String> {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => None,
            Err(e) => Some(format!("Postgres connection problem: {}", e)),
        }
    }
}

#[async_trait]
impl StorageBackend for PgDatasetStore {
    async fn retrieve(&self, id: &DocId, candidate_etags: Option<&ETagSet>) -> Result<Retrieved> {
        let row: Option<(Json<Document>, String)> =
            sqlx::query_as("SELECT doc, etag FROM dataset WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        let (Json(doc), etag) = row.ok_or_else(|| Error::NotFound(format!("dataset {}", id)))?;
        let etag = ETag::new(etag);
        let doc = match candidate_etags {
            Some(tags) if matches_weak(&etag, tags) => None,
            _ => Some(doc),
        };
        Ok(Retrieved { doc, etag })
    }

    async fn create(
        &self,
        id: &DocId,
        doc: &Document,
        searchable_text: &SearchableText,
        lang: &str,
    ) -> Result<ETag> {
        let etag = compute_etag(doc);
        let sql = format!(
            "INSERT INTO dataset (id, doc, etag, searchable_text, lang) \
             VALUES ($1, $2, $3, {}, $8)",
            search_vector(4)
        );
        let result = sqlx::query(&sql)
            .bind(id.as_str())
            .bind(Json(doc))
            .bind(etag.as_str())
            .bind(&searchable_text.a)
            .bind(&searchable_text.b)
            .bind(&searchable_text.c)
            .bind(&searchable_text.d)
            .bind(pg_dictionary(Some(lang)))
            .execute(&self.pool)
            .await;
        match result {
            Ok(_) => {
                debug!(
                    subsystem = logging::SUBSYSTEM_DATABASE,
                    component = "datasets",
                    op = "create",
                    dataset_id = %id,
                    etag = %etag,
                    "Dataset inserted"
                );
                Ok(etag)
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(Error::AlreadyExists(format!("dataset {}", id)))
            }
            Err(e) => Err(Error::Database(e)),
        }
    }

    async fn update(
        &self,
        id: &DocId,
        doc: &Document,
        searchable_text: &SearchableText,
        candidate_etags: &ETagSet,
        lang: &str,
    ) -> Result<ETag> {
        let etag = compute_etag(doc);
        let sql = format!(
            "UPDATE dataset SET doc = $1, searchable_text = {}, lang = $6, etag = $7 \
             WHERE id = $8 AND etag = ANY($9) RETURNING id",
            search_vector(2)
        );
        let updated: Option<String> = sqlx::query_scalar(&sql)
            .bind(Json(doc))
            .bind(&searchable_text.a)
            .bind(&searchable_text.b)
            .bind(&searchable_text.c)
            .bind(&searchable_text.d)
            .bind(pg_dictionary(Some(lang)))
            .bind(etag.as_str())
            .bind(id.as_str())
            .bind(strong_candidates(candidate_etags))
            .fetch_optional(&self.pool)
            .await?;
        if updated.is_none() {
            return Err(self.write_conflict(id).await);
        }
        debug!(
            subsystem = logging::SUBSYSTEM_DATABASE,
            component = "datasets",
            op = "update",
            dataset_id = %id,
            etag = %etag,
            "Dataset updated"
        );
        Ok(etag)
    }

    async fn delete(&self, id: &DocId, candidate_etags: &ETagSet) -> Result<()> {
        let result = sqlx::query("DELETE FROM dataset WHERE id = $1 AND etag = ANY($2)")
            .bind(id.as_str())
            .bind(strong_candidates(candidate_etags))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(self.write_conflict(id).await);
        }
        debug!(
            subsystem = logging::SUBSYSTEM_DATABASE,
            component = "datasets",
            op = "delete",
            dataset_id = %id,
            "Dataset deleted"
        );
        Ok(())
    }

    async fn list_ids(&self) -> Result<IdStream> {
        Ok(spawn_rows(
            self.pool.clone(),
            "SELECT id FROM dataset ORDER BY id".to_string(),
            PgArguments::default(),
            decode_id,
        ))
    }

    async fn new_id(&self) -> Result<DocId> {
        generate_id()
    }
}

#[async_trait]
impl SearchBackend for PgDatasetStore {
    async fn search(&self, query: &SearchQuery) -> Result<DocumentStream> {
        let start = Instant::now();
        let words = query_words(&query.text);
        let ranked = !words.is_empty();
        let (filters, filter_params) = filter_clause(query, 5)?;
        let sql = select_statement(&filters, ranked);

        let mut args = PgArguments::default();
        if ranked {
            bind(&mut args, prefix_tsquery(&words))?;
            bind(&mut args, fullmatch_tsquery(&words))?;
        } else {
            bind(&mut args, pg_dictionary(query.lang.as_deref()).to_string())?;
            bind(&mut args, sort_keys(&query.sort)?)?;
        }
        bind(&mut args, query.limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX)))?;
        bind(&mut args, i64::try_from(query.offset).unwrap_or(i64::MAX))?;
        for param in filter_params {
            bind(&mut args, Json(param))?;
        }

        debug!(
            subsystem = logging::SUBSYSTEM_DATABASE,
            component = "datasets",
            op = "search",
            query = %query.text,
            ranked,
            filter_count = query.filters.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Search statement prepared"
        );
        Ok(spawn_rows(self.pool.clone(), sql, args, decode_dataset))
    }
}
