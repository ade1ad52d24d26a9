//! # dcatd-api
//!
//! HTTP interface of the dcatd metadata catalog.
//!
//! | Route | Handler |
//! |-------|---------|
//! | `GET/PUT/DELETE /datasets/{id}` | conditional read, create/update, delete |
//! | `GET/POST /datasets` | search and listing, create with generated id |
//! | `GET /harvest` | every dataset in full |
//! | `GET /system/health` | plugin health |
//! | `GET /openapi`, `/openapi.yaml` | API description |
//!
//! Routes are mounted under the path of `BASE_URL`.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tower_http::{
    catch_panic::CatchPanicLayer,
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

pub use config::{AppConfig, StorageBackendKind, StorageMode};
pub use error::{ApiError, ApiResult};
pub use state::AppState;

use handlers::{collection, dataset, harvest, openapi, system};
use middleware::{cors_layer, rate_limit_middleware, MakeRequestUuidV7};

/// Build the application router with all middleware.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/datasets",
            get(collection::get_collection).post(collection::post_collection),
        )
        .route(
            "/datasets/:id",
            get(dataset::get_dataset)
                .put(dataset::put_dataset)
                .delete(dataset::delete_dataset),
        )
        .route("/harvest", get(harvest::get_harvest))
        .route("/system/health", get(system::health))
        .route("/openapi", get(openapi::openapi_json))
        .route("/openapi.yaml", get(openapi::openapi_yaml));

    let mount = state.config.mount_path().to_string();
    let routes = if mount.is_empty() {
        api
    } else {
        Router::new().nest(&mount, api)
    };

    routes
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(cors_layer(&state.config.allowed_origins))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_body_bytes))
        .layer(CatchPanicLayer::new())
        .with_state(state)
}
