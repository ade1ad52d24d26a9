//! `/datasets`: search/listing and creation with a server-chosen id.

use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use tracing::{error, info};

use dcatd_core::pipeline::ID_KEY;
use dcatd_core::{logging, CanonicalizationPipeline, Error, WriteIntent};
use dcatd_search::{SearchItem, SearchParams};

use super::{etag_header, json_collection, to_json, CollectionChunk, CollectionTail};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Collection member holding the number of matches.
pub const TOTAL_KEY: &str = "void:documents";
/// Collection member holding facet value counts.
pub const FACETS_KEY: &str = "ams:facet_info";

/// Streamed search result: dataset summaries first, then totals.
pub async fn get_collection(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> ApiResult<Response> {
    let params = SearchParams::from_pairs(&pairs)?;
    let results = state.search.search(&params).await?;
    let faceted = !params.facets.is_empty();

    let pipeline = state.pipeline.clone();
    let entries = results
        .map(move |item| match item? {
            SearchItem::Hit(id, doc) => Ok(CollectionChunk::Entry(to_json(
                &pipeline.summarize(&id, &doc),
            )?)),
            SearchItem::Summary(info) => Ok(CollectionChunk::End(CollectionTail {
                total: info.total,
                facets: faceted.then(|| to_json(&info.facets)).transpose()?,
            })),
        })
        .boxed();

    let body = json_collection(&state.hooks.mds_context(), entries, |tail| {
        let mut out = String::new();
        if let Some(total) = tail.total {
            out.push_str(&format!(",\"{}\":{}", TOTAL_KEY, total));
        }
        if let Some(facets) = tail.facets {
            out.push_str(&format!(",\"{}\":{}", FACETS_KEY, facets));
        }
        Ok(out)
    })
    .map(|chunk| {
        chunk.map_err(|e| {
            error!(
                subsystem = logging::SUBSYSTEM_API,
                component = "collection",
                error = %e,
                "Dataset collection stream aborted"
            );
            e
        })
    });

    Ok((
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        Body::from_stream(body),
    )
        .into_response())
}

/// Create a dataset; the id comes from the document or is generated.
pub async fn post_collection(State(state): State<AppState>, body: Bytes) -> ApiResult<Response> {
    let doc = CanonicalizationPipeline::parse_body(&body)?;
    let mut doc = state.pipeline.canonicalize(doc)?;
    let id = match state.pipeline.declared_id(&doc)? {
        Some(id) => id,
        None => state.hooks.storage_id().await?,
    };
    // consistency with the id was checked above
    doc.remove(ID_KEY);
    let prepared = state.pipeline.prepare_canonical(&id, doc)?;

    let outcome = match state
        .controller
        .write(&id, &WriteIntent::Create, &prepared)
        .await
    {
        Ok(outcome) => outcome,
        Err(Error::AlreadyExists(_)) => {
            return Err(ApiError::BadRequest(format!(
                "Document with id {} already exists",
                id
            )))
        }
        Err(e) => return Err(e.into()),
    };

    info!(
        subsystem = logging::SUBSYSTEM_API,
        component = "collection",
        op = "post",
        dataset_id = %id,
        "Dataset created"
    );

    let location = HeaderValue::from_str(&state.pipeline.document_url(&id))
        .map_err(|e| Error::Internal(e.to_string()))?;
    let mut response = StatusCode::CREATED.into_response();
    let headers = response.headers_mut();
    if let Some(etag) = outcome.etag() {
        headers.insert(header::ETAG, etag_header(etag)?);
    }
    headers.insert(header::LOCATION, location);
    Ok(response)
}
