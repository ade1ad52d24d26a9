//! `/harvest`: every stored dataset in full, for downstream harvesters.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use tracing::error;

use dcatd_core::{logging, SearchQuery};

use super::{json_collection, to_json, CollectionChunk, CollectionTail, JSON_LD};
use crate::error::ApiResult;
use crate::state::AppState;

/// One unpaged listing scan in default sort order; documents come straight
/// from the search backend.
pub async fn get_harvest(State(state): State<AppState>) -> ApiResult<Response> {
    let query = SearchQuery::new(state.search.default_sort().clone());
    let hits = state.hooks.search_search(&query).await?;

    let pipeline = state.pipeline.clone();
    let entries = hits
        .map(move |hit| {
            let (id, doc) = hit?;
            Ok(CollectionChunk::Entry(to_json(
                &pipeline.present_in_collection(&id, doc),
            )?))
        })
        .chain(futures::stream::once(async {
            Ok(CollectionChunk::End(CollectionTail::default()))
        }))
        .boxed();

    let body = json_collection(&state.hooks.mds_context(), entries, |_| Ok(String::new())).map(
        |chunk| {
            chunk.map_err(|e| {
                error!(
                    subsystem = logging::SUBSYSTEM_API,
                    component = "harvest",
                    error = %e,
                    "Harvest stream aborted"
                );
                e
            })
        },
    );

    Ok((
        [(header::CONTENT_TYPE, HeaderValue::from_static(JSON_LD))],
        Body::from_stream(body),
    )
        .into_response())
}
