//! `/datasets/{id}`: conditional read, create/update and delete.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use dcatd_core::{
    resolve_delete_intent, resolve_put_intent, CanonicalizationPipeline, Outcome,
};

use super::{etag_header, parse_id, precondition, to_json, JSON_LD};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn get_dataset(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let id = parse_id(&id)?;
    let if_match = precondition(&headers, header::IF_MATCH)?;
    let if_none_match = precondition(&headers, header::IF_NONE_MATCH)?;

    match state.controller.read(&id, &if_match, &if_none_match).await? {
        Outcome::Found { doc, etag } => {
            let body = to_json(&state.pipeline.present(&id, doc))?;
            Ok((
                StatusCode::OK,
                [
                    (header::ETAG, etag_header(&etag)?),
                    (header::CONTENT_TYPE, header::HeaderValue::from_static(JSON_LD)),
                ],
                body,
            )
                .into_response())
        }
        outcome => Ok(empty_response(&outcome)?),
    }
}

/// Create with `If-None-Match: *`, update with `If-Match: <etags>`.
pub async fn put_dataset(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let id = parse_id(&id)?;
    let if_match = precondition(&headers, header::IF_MATCH)?;
    let if_none_match = precondition(&headers, header::IF_NONE_MATCH)?;
    let intent = resolve_put_intent(&if_match, &if_none_match)?;

    let doc = CanonicalizationPipeline::parse_body(&body)?;
    let prepared = state.pipeline.prepare(&id, doc)?;
    let outcome = state.controller.write(&id, &intent, &prepared).await?;
    Ok(empty_response(&outcome)?)
}

pub async fn delete_dataset(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let id = parse_id(&id)?;
    let if_match = precondition(&headers, header::IF_MATCH)?;
    let if_none_match = precondition(&headers, header::IF_NONE_MATCH)?;
    let candidates = resolve_delete_intent(&if_match, &if_none_match)?;

    let outcome = state.controller.delete(&id, &candidates).await?;
    Ok(empty_response(&outcome)?)
}

/// Status and `Etag` of a bodyless outcome.
fn empty_response(outcome: &Outcome) -> dcatd_core::Result<Response> {
    let status = StatusCode::from_u16(outcome.status_code())
        .map_err(|e| dcatd_core::Error::Internal(e.to_string()))?;
    let mut response = status.into_response();
    if let Some(etag) = outcome.etag() {
        response.headers_mut().insert(header::ETAG, etag_header(etag)?);
    }
    Ok(response)
}
