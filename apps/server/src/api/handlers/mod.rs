//! Request handlers for API endpoints
//!
//! Reads and searches are proxied to the resource store. Writes of the coordinated
//! resources go through the services so every Task change carries its CareTeam
//! consequence in the same transaction.

pub mod resources;

pub use resources::*;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value as JsonValue;

const FHIR_JSON_UTF8: &str = "application/fhir+json; charset=utf-8";

/// FHIR JSON response, with `Location` for created resources.
pub(crate) fn fhir_response(status: StatusCode, resource: JsonValue) -> Response {
    let location = (status == StatusCode::CREATED)
        .then(|| crate::models::local_reference(&resource))
        .flatten()
        .and_then(|r| r.reference);

    let mut response = (status, Json(resource)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(FHIR_JSON_UTF8));
    if let Some(value) = location.and_then(|l| HeaderValue::from_str(&l).ok()) {
        headers.insert(header::LOCATION, value);
    }
    response
}
