//! HTTP transport: Elasticsearch-v7-compatible routes over the engine.

pub mod handlers;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::core::Registry;
use crate::error::GalenaError;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
}

impl AppState {
    pub fn new(registry: Arc<Registry>) -> Self {
        AppState { registry }
    }
}

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health))
        .route(
            "/api/index",
            put(handlers::create_index).get(handlers::list_indexes),
        )
        .route(
            "/api/index/:names",
            delete(handlers::delete_indexes).head(handlers::index_exists),
        )
        .route(
            "/api/:target/_mapping",
            get(handlers::get_mapping).put(handlers::put_mapping),
        )
        .route("/api/:target/_doc", post(handlers::create_document))
        .route(
            "/api/:target/_doc/:id",
            put(handlers::put_document).delete(handlers::delete_document),
        )
        .route("/api/_bulk", post(handlers::bulk))
        .route("/api/:target/_bulk", post(handlers::bulk_target))
        .route("/api/:target/_search", post(handlers::search))
        .route("/api/:target/_analyze", post(handlers::analyze))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// An API error: the engine error plus its HTTP status.
#[derive(Debug)]
pub struct ApiError(pub GalenaError);

impl From<GalenaError> for ApiError {
    fn from(e: GalenaError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GalenaError::Parsing(_)
            | GalenaError::XContentParse { .. }
            | GalenaError::Mapping(_)
            | GalenaError::Cancelled(_) => StatusCode::BAD_REQUEST,
            GalenaError::NotFound(_) => StatusCode::NOT_FOUND,
            GalenaError::Runtime(_)
            | GalenaError::Storage(_)
            | GalenaError::Io(_)
            | GalenaError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "error": error_message(&self.0) }));
        (status, body).into_response()
    }
}

/// Strip the kind prefix so clients see the plain message.
fn error_message(e: &GalenaError) -> String {
    match e {
        GalenaError::Parsing(msg)
        | GalenaError::Mapping(msg)
        | GalenaError::NotFound(msg)
        | GalenaError::Runtime(msg)
        | GalenaError::Storage(msg)
        | GalenaError::Cancelled(msg) => msg.clone(),
        GalenaError::XContentParse { .. } => e.chain(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (GalenaError::parsing("bad"), StatusCode::BAD_REQUEST),
            (GalenaError::mapping("bad"), StatusCode::BAD_REQUEST),
            (GalenaError::not_found("gone"), StatusCode::NOT_FOUND),
            (
                GalenaError::runtime("broken"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                GalenaError::storage("broken"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            let response = ApiError(error).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
