//! Custom Axum extractors for FHIR content types.

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::Value as JsonValue;

/// JSON resource body. Accepts `application/fhir+json`, `application/json` and a missing
/// content type; XML is not supported.
pub struct FhirBody(pub JsonValue);

/// Error type for [`FhirBody`] extraction failures.
#[derive(Debug)]
pub struct FhirBodyRejection {
    status: StatusCode,
    message: String,
}

impl IntoResponse for FhirBodyRejection {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "resourceType": "OperationOutcome",
            "issue": [{
                "severity": "error",
                "code": if self.status == StatusCode::UNSUPPORTED_MEDIA_TYPE { "not-supported" } else { "invalid" },
                "diagnostics": self.message,
            }]
        });
        let mut response = (self.status, axum::Json(body)).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/fhir+json; charset=utf-8"),
        );
        response
    }
}

fn media_type(req: &Request) -> String {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase()
}

#[async_trait]
impl<S> FromRequest<S> for FhirBody
where
    S: Send + Sync,
{
    type Rejection = FhirBodyRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let media_type = media_type(&req);
        if !matches!(
            media_type.as_str(),
            "" | "application/fhir+json" | "application/json"
        ) {
            return Err(FhirBodyRejection {
                status: StatusCode::UNSUPPORTED_MEDIA_TYPE,
                message: format!("Unsupported content type '{media_type}', expected application/fhir+json"),
            });
        }

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| FhirBodyRejection {
                status: StatusCode::BAD_REQUEST,
                message: format!("Failed to read request body: {e}"),
            })?;

        let value: JsonValue = serde_json::from_slice(&bytes).map_err(|e| FhirBodyRejection {
            status: StatusCode::BAD_REQUEST,
            message: format!("Invalid JSON in request body: {e}"),
        })?;

        if !value.is_object() {
            return Err(FhirBodyRejection {
                status: StatusCode::BAD_REQUEST,
                message: "Request body must be a FHIR resource object".to_string(),
            });
        }

        Ok(FhirBody(value))
    }
}
