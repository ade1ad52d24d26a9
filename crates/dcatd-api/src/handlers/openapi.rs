//! OpenAPI description of the HTTP interface, with the metadata profile's
//! JSON schema as the dataset schema.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::state::AppState;

pub fn openapi_document(state: &AppState) -> Value {
    let if_match = json!({
        "name": "If-Match", "in": "header", "required": false,
        "schema": {"type": "string"},
        "description": "One or more ETags of the revision being replaced or deleted"
    });
    let if_none_match = json!({
        "name": "If-None-Match", "in": "header", "required": false,
        "schema": {"type": "string"},
        "description": "`*` to create; ETags for a conditional GET"
    });
    let id = json!({
        "name": "id", "in": "path", "required": true,
        "schema": {"type": "string", "maxLength": 254, "pattern": "^[A-Za-z0-9_.~-]+$"}
    });
    let error = json!({"$ref": "#/components/schemas/Error"});
    let dataset = json!({"$ref": "#/components/schemas/Dataset"});

    let collection = json!({
        "get": {
            "summary": "Search or list datasets",
            "parameters": search_parameters(),
            "responses": {
                "200": {"description": "Dataset collection"},
                "400": {"description": "Bad query", "content": {"application/json": {"schema": error}}}
            }
        },
        "post": {
            "summary": "Create a dataset",
            "requestBody": {"content": {"application/json": {"schema": dataset}}},
            "responses": {
                "201": {"description": "Created; `Etag` and `Location` set"},
                "400": {"description": "Invalid document", "content": {"application/json": {"schema": error}}}
            }
        }
    });
    let document = json!({
        "get": {
            "parameters": [id, if_match, if_none_match],
            "responses": {
                "200": {"description": "The dataset", "content": {"application/ld+json": {"schema": dataset}}},
                "304": {"description": "Not modified"},
                "404": {"description": "Not found"},
                "412": {"description": "Precondition failed"}
            }
        },
        "put": {
            "parameters": [id, if_match, if_none_match],
            "requestBody": {"content": {"application/json": {"schema": dataset}}},
            "responses": {
                "201": {"description": "Created"},
                "204": {"description": "Updated"},
                "400": {"description": "Bad request"},
                "404": {"description": "Not found"},
                "412": {"description": "Precondition failed"}
            }
        },
        "delete": {
            "parameters": [id, if_match],
            "responses": {
                "204": {"description": "Deleted"},
                "400": {"description": "Bad request"},
                "404": {"description": "Not found"},
                "412": {"description": "Precondition failed"}
            }
        }
    });

    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "dcatd",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "DCAT-AP metadata catalog"
        },
        "servers": [{"url": state.config.base_url}],
        "paths": {
            "/datasets": collection,
            "/datasets/{id}": document,
            "/harvest": {
                "get": {"summary": "All datasets in full", "responses": {"200": {"description": "Dataset collection"}}}
            },
            "/system/health": {
                "get": {
                    "responses": {
                        "200": {"description": "Healthy"},
                        "503": {"description": "A backend is unhealthy"}
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "Dataset": state.hooks.mds_json_schema(),
                "Error": {
                    "type": "object",
                    "properties": {"error": {"type": "string"}},
                    "required": ["error"]
                }
            }
        }
    })
}

fn search_parameters() -> Value {
    json!([
        {"name": "q", "in": "query", "schema": {"type": "string"}},
        {"name": "limit", "in": "query", "schema": {"type": "integer", "minimum": 0}},
        {"name": "offset", "in": "query", "schema": {"type": "integer", "minimum": 0}},
        {"name": "facet", "in": "query", "schema": {"type": "array", "items": {"type": "string"}}},
        {"name": "sort", "in": "query", "schema": {"type": "string"}},
        {"name": "lang", "in": "query", "schema": {"type": "string"}}
    ])
}

pub async fn openapi_json(State(state): State<AppState>) -> impl IntoResponse {
    Json(openapi_document(&state))
}

pub async fn openapi_yaml(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let yaml = serde_yaml::to_string(&openapi_document(&state))
        .map_err(|e| dcatd_core::Error::Internal(e.to_string()))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/yaml")],
        yaml,
    ))
}
