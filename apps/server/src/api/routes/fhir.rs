//! FHIR API Routes
//!
//! Mounted under `/fhir`. Paths are case-sensitive and `Path` decodes percent-encoded
//! UTF-8, so `/Task/abc%20def` addresses id `abc def`. Both `/Task` and `/Task/` are
//! accepted.

use crate::api::handlers::{create_resource, read_resource, search_resources, update_resource};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn fhir_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/:resource_type",
            get(search_resources).post(create_resource),
        )
        .route(
            "/:resource_type/",
            get(search_resources).post(create_resource),
        )
        .route(
            "/:resource_type/:id",
            get(read_resource).put(update_resource),
        )
}
