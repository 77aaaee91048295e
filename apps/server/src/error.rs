//! Error types for the orchestrator API

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::careteam::CareTeamError;
use crate::client::ClientError;
use crate::policy::PolicyError;
use crate::subscriptions::SubscriptionError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Business rule violation: {0}")]
    BusinessRule(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] ClientError),

    #[error(transparent)]
    CareTeam(#[from] CareTeamError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<carelink_models::Error> for Error {
    fn from(e: carelink_models::Error) -> Self {
        Error::InvalidResource(e.to_string())
    }
}

fn store_status(e: &ClientError) -> StatusCode {
    if e.is_not_found() {
        e.status()
            .and_then(|s| StatusCode::from_u16(s).ok())
            .unwrap_or(StatusCode::NOT_FOUND)
    } else if e.status() == Some(412) {
        // A resource changed between read and commit.
        StatusCode::CONFLICT
    } else {
        StatusCode::BAD_GATEWAY
    }
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidResource(_) | Error::InvalidReference(_) => StatusCode::BAD_REQUEST,
            Error::BusinessRule(_) => StatusCode::CONFLICT,
            Error::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Store(e) => store_status(e),
            Error::CareTeam(e) => match e {
                CareTeamError::CarePlanNotFound(_) => StatusCode::BAD_REQUEST,
                CareTeamError::Client(e) => store_status(e),
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Policy(e) => match e {
                PolicyError::AccessDenied => StatusCode::FORBIDDEN,
                PolicyError::NotAuthenticated => StatusCode::UNAUTHORIZED,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Subscription(_) | Error::Internal(_) | Error::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match &self {
            Error::Internal(_) | Error::Other(_) => {
                tracing::error!("Internal error: {}", self);
                "Internal server error".to_string()
            }
            Error::Store(e) if !e.is_not_found() => {
                tracing::error!(error = %e, "Resource store request failed");
                match e.diagnostics() {
                    Some(diagnostics) => format!("{self}: {diagnostics}"),
                    None => self.to_string(),
                }
            }
            _ if status == StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!(error = %self, "Request failed");
                self.to_string()
            }
            _ => self.to_string(),
        };

        let body = Json(json!({
            "resourceType": "OperationOutcome",
            "issue": [{
                "severity": "error",
                "code": status_to_fhir_code(status),
                "diagnostics": error_message
            }]
        }));

        let mut response = (status, body).into_response();

        // Always emit a FHIR content type for OperationOutcome errors.
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/fhir+json; charset=utf-8"),
        );

        response
    }
}

fn status_to_fhir_code(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "invalid",
        StatusCode::UNAUTHORIZED => "login",
        StatusCode::FORBIDDEN => "forbidden",
        StatusCode::NOT_FOUND => "not-found",
        StatusCode::GONE => "deleted",
        StatusCode::METHOD_NOT_ALLOWED => "not-supported",
        StatusCode::CONFLICT => "business-rule",
        StatusCode::BAD_GATEWAY => "transient",
        _ => "exception",
    }
}
